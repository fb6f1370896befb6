// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, GeometryError>;

/// Errors that can occur while assembling geometry buckets
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Invalid positions: {0}")]
    InvalidPositions(String),

    #[error("Index {index} out of range for bucket with {num_vertices} vertices")]
    IndexOutOfRange { index: u32, num_vertices: usize },

    #[error("Index width mismatch: bucket with {num_vertices} vertices needs {expected:?}, got {actual:?}")]
    IndexWidthMismatch {
        num_vertices: usize,
        expected: crate::IndexWidth,
        actual: crate::IndexWidth,
    },

    #[error("Index buffer length {len} is not a multiple of {stride}")]
    RaggedIndices { len: usize, stride: usize },

    #[error("Empty geometry: {0}")]
    Empty(String),
}
