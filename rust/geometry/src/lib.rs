// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Strata Geometry
//!
//! Geometry buckets and the helpers that produce them: index-width selection,
//! 16-bit position quantization, bucketing of large meshes, RTC origins and
//! feature-edge extraction. Everything here is CPU-side and immutable once
//! built; layers in `strata-core` consume the buckets.

pub mod bounds;
pub mod bucket;
pub mod edges;
pub mod error;
pub mod geometry;
pub mod index;
pub mod primitive;
pub mod quantize;
pub mod rtc;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point3, Vector3};

pub use bounds::Aabb;
pub use bucket::{build_buckets, BucketData, BucketSource, GeometryBucket};
pub use edges::{build_edge_indices, DEFAULT_EDGE_THRESHOLD};
pub use error::{GeometryError, Result};
pub use geometry::{CompressedGeometry, GeometrySource};
pub use index::{IndexBuffer, IndexWidth};
pub use primitive::PrimitiveType;
pub use quantize::{decode_matrix, decode_position, decode_positions, quantize_positions};
pub use rtc::{rtc_positions, RtcOrigin, DEFAULT_RTC_CELL_SIZE};
