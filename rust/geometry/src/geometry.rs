// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compressed geometry: the unit layers store and meshes instance.

use crate::{
    build_buckets, build_edge_indices, quantize_positions, Aabb, BucketSource,
    GeometryBucket, GeometryError, IndexWidth, Matrix4, PrimitiveType, Result,
};

/// Uncompressed input for [`CompressedGeometry::compress`]
#[derive(Debug, Clone, Default)]
pub struct GeometrySource<'a> {
    /// Positions (x, y, z), already relative to the mesh's RTC origin
    pub positions: &'a [f64],
    pub indices: &'a [u32],
    /// Explicit edges; generated for triangle geometry when absent
    pub edge_indices: Option<&'a [u32]>,
    /// Vertex colors (r, g, b, a)
    pub colors: Option<&'a [u8]>,
}

/// Quantized, bucketed geometry shared by every mesh that instances it
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedGeometry {
    id: String,
    primitive: PrimitiveType,
    buckets: Vec<GeometryBucket>,
    decode_matrix: Matrix4<f64>,
    aabb: Aabb,
}

impl CompressedGeometry {
    /// Wrap pre-built buckets sharing one decode matrix.
    pub fn new(
        id: impl Into<String>,
        primitive: PrimitiveType,
        buckets: Vec<GeometryBucket>,
        decode_matrix: Matrix4<f64>,
    ) -> Result<Self> {
        let id = id.into();
        if buckets.is_empty() {
            return Err(GeometryError::Empty(format!("geometry '{}' has no buckets", id)));
        }
        let stride = primitive.vertices_per_primitive();
        for bucket in &buckets {
            if bucket.num_indices() % stride != 0 {
                return Err(GeometryError::RaggedIndices {
                    len: bucket.num_indices(),
                    stride,
                });
            }
        }
        let mut aabb = Aabb::empty();
        for bucket in &buckets {
            for p in bucket.positions_compressed().chunks_exact(3) {
                aabb.expand_point(&crate::decode_position([p[0], p[1], p[2]], &decode_matrix));
            }
        }
        Ok(Self {
            id,
            primitive,
            buckets,
            decode_matrix,
            aabb,
        })
    }

    /// Quantize and bucket raw positions.
    pub fn compress(
        id: impl Into<String>,
        primitive: PrimitiveType,
        source: &GeometrySource<'_>,
        max_bucket_vertices: usize,
        edge_threshold: f64,
    ) -> Result<Self> {
        if source.positions.len() % 3 != 0 {
            return Err(GeometryError::InvalidPositions(format!(
                "length {} is not a multiple of 3",
                source.positions.len()
            )));
        }
        let aabb = Aabb::from_positions(source.positions);
        if aabb.is_empty() {
            return Err(GeometryError::Empty("geometry has no positions".to_string()));
        }
        let (quantized, decode) = quantize_positions(source.positions, &aabb);
        let generated;
        let edge_indices = match source.edge_indices {
            Some(edges) => Some(edges),
            None if primitive.is_triangles() => {
                generated = build_edge_indices(source.positions, source.indices, edge_threshold);
                Some(&generated[..])
            }
            None => None,
        };
        let buckets = build_buckets(
            &BucketSource {
                positions_compressed: &quantized,
                uvs_compressed: None,
                colors_compressed: source.colors,
                indices: source.indices,
                edge_indices,
            },
            primitive,
            max_bucket_vertices,
        )?;
        Self::new(id, primitive, buckets, decode)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn primitive(&self) -> PrimitiveType {
        self.primitive
    }

    pub fn buckets(&self) -> &[GeometryBucket] {
        &self.buckets
    }

    pub fn decode_matrix(&self) -> &Matrix4<f64> {
        &self.decode_matrix
    }

    /// Local-space bounds of the decoded positions
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Vertices uploaded when this geometry enters a layer
    pub fn num_vertices(&self) -> usize {
        self.buckets.iter().map(|b| b.num_vertices()).sum()
    }

    /// Primitives per index width, indexed by [`IndexWidth::slot`]
    pub fn primitives_by_width(&self) -> [usize; 3] {
        let mut counts = [0usize; 3];
        for bucket in &self.buckets {
            counts[bucket.index_width().slot()] += bucket.num_primitives(self.primitive);
        }
        counts
    }

    /// Edge lines per index width, indexed by [`IndexWidth::slot`]
    pub fn edges_by_width(&self) -> [usize; 3] {
        let mut counts = [0usize; 3];
        for bucket in &self.buckets {
            counts[bucket.index_width().slot()] += bucket.num_edges();
        }
        counts
    }

    /// Widths used by at least one bucket
    pub fn index_widths(&self) -> impl Iterator<Item = IndexWidth> + '_ {
        IndexWidth::ALL
            .into_iter()
            .filter(move |w| self.buckets.iter().any(|b| b.index_width() == *w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad() -> (Vec<f64>, Vec<u32>) {
        (
            vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 2.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn test_compress_quad() {
        let (positions, indices) = quad();
        let geometry = CompressedGeometry::compress(
            "quad",
            PrimitiveType::Triangles,
            &GeometrySource {
                positions: &positions,
                indices: &indices,
                ..Default::default()
            },
            1 << 16,
            10.0,
        )
        .unwrap();

        assert_eq!(geometry.buckets().len(), 1);
        assert_eq!(geometry.num_vertices(), 4);
        assert_eq!(geometry.primitives_by_width(), [2, 0, 0]);
        // Boundary edges only; the diagonal is coplanar
        assert_eq!(geometry.edges_by_width(), [4, 0, 0]);
        assert_relative_eq!(geometry.aabb().max.x, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_lines_have_no_generated_edges() {
        let positions = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let geometry = CompressedGeometry::compress(
            "line",
            PrimitiveType::Lines,
            &GeometrySource {
                positions: &positions,
                indices: &[0, 1],
                ..Default::default()
            },
            1 << 16,
            10.0,
        )
        .unwrap();
        assert_eq!(geometry.edges_by_width(), [0, 0, 0]);
        assert_eq!(geometry.primitives_by_width(), [1, 0, 0]);
    }

    #[test]
    fn test_empty_buckets_rejected() {
        let err = CompressedGeometry::new("g", PrimitiveType::Points, vec![], Matrix4::identity());
        assert!(err.is_err());
    }

    #[test]
    fn test_short_colors_rejected() {
        let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let result = CompressedGeometry::compress(
            "tri",
            PrimitiveType::Triangles,
            &GeometrySource {
                positions: &positions,
                indices: &[0, 1, 2],
                colors: Some(&[255, 0, 0, 255]),
                ..Default::default()
            },
            1 << 16,
            10.0,
        );
        assert!(matches!(result, Err(GeometryError::InvalidPositions(_))));
    }

    #[test]
    fn test_trailing_position_components_rejected() {
        let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 5.0];
        let result = CompressedGeometry::compress(
            "tri",
            PrimitiveType::Triangles,
            &GeometrySource {
                positions: &positions,
                indices: &[0, 1, 2],
                ..Default::default()
            },
            1 << 16,
            10.0,
        );
        assert!(matches!(result, Err(GeometryError::InvalidPositions(_))));
    }

    #[test]
    fn test_ragged_bucket_rejected() {
        let bucket = GeometryBucket::new(crate::BucketData {
            positions_compressed: vec![0; 9],
            indices: Some(vec![0, 1, 2, 0]),
            ..Default::default()
        })
        .unwrap();
        let result = CompressedGeometry::new(
            "ragged",
            PrimitiveType::Triangles,
            vec![bucket],
            Matrix4::identity(),
        );
        assert_eq!(
            result.unwrap_err(),
            GeometryError::RaggedIndices { len: 4, stride: 3 }
        );
    }
}
