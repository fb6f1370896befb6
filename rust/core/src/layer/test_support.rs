// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::LayerMeshParams;
use nalgebra::Matrix4;
use std::sync::Arc;
use strata_geometry::{CompressedGeometry, GeometrySource, PrimitiveType};

/// Triangle strip over `num_vertices` distinct vertices
pub(crate) fn strip_geometry(id: &str, num_vertices: usize) -> Arc<CompressedGeometry> {
    let positions: Vec<f64> = (0..num_vertices)
        .flat_map(|i| [i as f64, (i % 2) as f64, 0.0])
        .collect();
    let indices: Vec<u32> = (0..num_vertices as u32 - 2)
        .flat_map(|i| [i, i + 1, i + 2])
        .collect();
    Arc::new(
        CompressedGeometry::compress(
            id,
            PrimitiveType::Triangles,
            &GeometrySource {
                positions: &positions,
                indices: &indices,
                ..Default::default()
            },
            1 << 16,
            10.0,
        )
        .unwrap(),
    )
}

pub(crate) fn mesh_params(geometry_id: &str) -> LayerMeshParams<'_> {
    LayerMeshParams {
        geometry_id,
        matrix: Matrix4::identity(),
        color: [200, 100, 50],
        opacity: 255,
        metallic: 0,
        roughness: 255,
        view_matrix_index: 0,
        tag: 0,
    }
}
