// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for layer allocation, data textures and scene state.

use strata_geometry::{GeometryError, PrimitiveType};

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the batching core.
///
/// Capacity and contract errors are returned at the call site. GL compile
/// failures are not errors here: they are recorded on the program and the
/// affected pass is skipped.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A mutating call arrived after `build()`.
    #[error("{what} is already built")]
    AlreadyBuilt { what: String },

    /// A call arrived after `destroy()`.
    #[error("{what} has been destroyed")]
    Destroyed { what: String },

    /// A data texture would have no rows.
    #[error("data texture '{label}' would have zero rows")]
    EmptyDataTexture { label: &'static str },

    /// Texel data does not match the texture format.
    #[error("data texture '{label}': {reason}")]
    TexelMismatch { label: &'static str, reason: String },

    /// Neither an existing layer nor a fresh one can hold the geometry.
    #[error("capacity exceeded for geometry '{geometry}': {reason}")]
    CapacityExceeded { geometry: String, reason: String },

    /// The geometry's primitive type differs from the layer's.
    #[error("primitive mismatch: layer holds {expected}, geometry is {actual}")]
    PrimitiveMismatch {
        expected: PrimitiveType,
        actual: PrimitiveType,
    },

    #[error("unknown geometry: {0}")]
    UnknownGeometry(String),

    #[error("unknown mesh: {0}")]
    UnknownMesh(String),

    #[error("unknown object: {0}")]
    UnknownObject(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },

    /// The mesh is already owned by another object.
    #[error("mesh '{mesh}' already belongs to object '{object}'")]
    MeshAlreadyOwned { mesh: String, object: String },

    #[error("mesh index {index} out of range (layer has {len} meshes)")]
    InvalidMeshIndex { index: u32, len: usize },

    #[error("view slot {0} is not registered")]
    UnknownView(usize),

    #[error("all {max} view slots are in use")]
    ViewSlotsExhausted { max: usize },

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),
}

impl Error {
    pub(crate) fn destroyed(what: impl Into<String>) -> Self {
        Error::Destroyed { what: what.into() }
    }

    pub(crate) fn already_built(what: impl Into<String>) -> Self {
        Error::AlreadyBuilt { what: what.into() }
    }
}
