// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometry buckets
//!
//! Hardware index buffers are limited in value range. A bucket groups the
//! vertices one set of 8, 16 or 32-bit indices can address, so a large mesh
//! is stored as several buckets, each with the narrowest index width that fits.
//! Buckets are immutable once built and never re-split.

use crate::{GeometryError, IndexBuffer, IndexWidth, PrimitiveType, Result};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Raw arrays for one bucket, indices still 32-bit
#[derive(Debug, Clone, Default)]
pub struct BucketData {
    /// Quantized positions (x, y, z)
    pub positions_compressed: Vec<u16>,
    /// Quantized texture coordinates (u, v)
    pub uvs_compressed: Option<Vec<u16>>,
    /// Vertex colors (r, g, b, a)
    pub colors_compressed: Option<Vec<u8>>,
    /// Primitive indices
    pub indices: Option<Vec<u32>>,
    /// Edge line indices (pairs)
    pub edge_indices: Option<Vec<u32>>,
}

/// An immutable chunk of quantized geometry addressed by one index width
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryBucket {
    positions_compressed: Vec<u16>,
    uvs_compressed: Option<Vec<u16>>,
    colors_compressed: Option<Vec<u8>>,
    indices: Option<IndexBuffer>,
    edge_indices: Option<IndexBuffer>,
}

impl GeometryBucket {
    /// Build a bucket, narrowing indices to the width its vertex count needs
    pub fn new(data: BucketData) -> Result<Self> {
        let num_vertices = check_positions(&data.positions_compressed)?;
        let width = IndexWidth::for_vertex_count(num_vertices);

        let indices = data
            .indices
            .as_deref()
            .map(|i| narrow_checked(i, width, num_vertices))
            .transpose()?;
        let edge_indices = data
            .edge_indices
            .as_deref()
            .filter(|e| !e.is_empty())
            .map(|e| narrow_checked(e, width, num_vertices))
            .transpose()?;

        Self::checked(
            data.positions_compressed,
            data.uvs_compressed,
            data.colors_compressed,
            indices,
            edge_indices,
        )
    }

    /// Build a bucket from indices the caller has already narrowed.
    ///
    /// The index width must be exactly the one `IndexWidth::for_vertex_count`
    /// selects for the bucket's vertex count.
    pub fn from_index_buffers(
        positions_compressed: Vec<u16>,
        uvs_compressed: Option<Vec<u16>>,
        colors_compressed: Option<Vec<u8>>,
        indices: Option<IndexBuffer>,
        edge_indices: Option<IndexBuffer>,
    ) -> Result<Self> {
        let num_vertices = check_positions(&positions_compressed)?;
        let expected = IndexWidth::for_vertex_count(num_vertices);
        for buffer in indices.iter().chain(edge_indices.iter()) {
            if buffer.width() != expected {
                return Err(GeometryError::IndexWidthMismatch {
                    num_vertices,
                    expected,
                    actual: buffer.width(),
                });
            }
            check_range(buffer.iter(), num_vertices)?;
        }
        Self::checked(
            positions_compressed,
            uvs_compressed,
            colors_compressed,
            indices,
            edge_indices,
        )
    }

    fn checked(
        positions_compressed: Vec<u16>,
        uvs_compressed: Option<Vec<u16>>,
        colors_compressed: Option<Vec<u8>>,
        indices: Option<IndexBuffer>,
        edge_indices: Option<IndexBuffer>,
    ) -> Result<Self> {
        let num_vertices = positions_compressed.len() / 3;
        if let Some(uvs) = &uvs_compressed {
            if uvs.len() != num_vertices * 2 {
                return Err(GeometryError::InvalidPositions(format!(
                    "{} uv components for {} vertices",
                    uvs.len(),
                    num_vertices
                )));
            }
        }
        if let Some(colors) = &colors_compressed {
            if colors.len() != num_vertices * 4 {
                return Err(GeometryError::InvalidPositions(format!(
                    "{} color components for {} vertices",
                    colors.len(),
                    num_vertices
                )));
            }
        }
        if let Some(edges) = &edge_indices {
            if edges.len() % 2 != 0 {
                return Err(GeometryError::RaggedIndices {
                    len: edges.len(),
                    stride: 2,
                });
            }
        }
        Ok(Self {
            positions_compressed,
            uvs_compressed,
            colors_compressed,
            indices,
            edge_indices,
        })
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.positions_compressed.len() / 3
    }

    #[inline]
    pub fn num_indices(&self) -> usize {
        self.indices.as_ref().map_or(0, |i| i.len())
    }

    #[inline]
    pub fn num_edge_indices(&self) -> usize {
        self.edge_indices.as_ref().map_or(0, |i| i.len())
    }

    /// Width every index of this bucket is stored at
    #[inline]
    pub fn index_width(&self) -> IndexWidth {
        IndexWidth::for_vertex_count(self.num_vertices())
    }

    /// Number of primitives drawn from this bucket.
    ///
    /// Point buckets without indices draw every vertex once.
    pub fn num_primitives(&self, primitive: PrimitiveType) -> usize {
        match &self.indices {
            Some(indices) => indices.len() / primitive.vertices_per_primitive(),
            None if primitive == PrimitiveType::Points => self.num_vertices(),
            None => 0,
        }
    }

    /// Number of edge lines
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.num_edge_indices() / 2
    }

    pub fn positions_compressed(&self) -> &[u16] {
        &self.positions_compressed
    }

    pub fn uvs_compressed(&self) -> Option<&[u16]> {
        self.uvs_compressed.as_deref()
    }

    pub fn colors_compressed(&self) -> Option<&[u8]> {
        self.colors_compressed.as_deref()
    }

    pub fn indices(&self) -> Option<&IndexBuffer> {
        self.indices.as_ref()
    }

    pub fn edge_indices(&self) -> Option<&IndexBuffer> {
        self.edge_indices.as_ref()
    }
}

fn check_positions(positions: &[u16]) -> Result<usize> {
    if positions.is_empty() {
        return Err(GeometryError::Empty("bucket has no positions".to_string()));
    }
    if positions.len() % 3 != 0 {
        return Err(GeometryError::InvalidPositions(format!(
            "length {} is not a multiple of 3",
            positions.len()
        )));
    }
    Ok(positions.len() / 3)
}

fn check_range(indices: impl Iterator<Item = u32>, num_vertices: usize) -> Result<()> {
    for index in indices {
        if index as usize >= num_vertices {
            return Err(GeometryError::IndexOutOfRange {
                index,
                num_vertices,
            });
        }
    }
    Ok(())
}

fn narrow_checked(indices: &[u32], width: IndexWidth, num_vertices: usize) -> Result<IndexBuffer> {
    check_range(indices.iter().copied(), num_vertices)?;
    IndexBuffer::from_u32(indices, width)
}

/// Borrowed source arrays for [`build_buckets`]
#[derive(Debug, Clone, Copy)]
pub struct BucketSource<'a> {
    pub positions_compressed: &'a [u16],
    pub uvs_compressed: Option<&'a [u16]>,
    pub colors_compressed: Option<&'a [u8]>,
    pub indices: &'a [u32],
    pub edge_indices: Option<&'a [u32]>,
}

/// Accumulates one bucket while primitives are distributed
struct BucketBuilder {
    remap: FxHashMap<u32, u32>,
    positions: Vec<u16>,
    uvs: Option<Vec<u16>>,
    colors: Option<Vec<u8>>,
    indices: Vec<u32>,
    edges: Vec<u32>,
}

impl BucketBuilder {
    fn new(source: &BucketSource<'_>) -> Self {
        Self {
            remap: FxHashMap::default(),
            positions: Vec::new(),
            uvs: source.uvs_compressed.map(|_| Vec::new()),
            colors: source.colors_compressed.map(|_| Vec::new()),
            indices: Vec::new(),
            edges: Vec::new(),
        }
    }

    #[inline]
    fn num_vertices(&self) -> usize {
        self.positions.len() / 3
    }

    /// Distinct vertices of `verts` this bucket does not hold yet
    fn missing(&self, verts: &[u32]) -> usize {
        let mut count = 0;
        for (i, v) in verts.iter().enumerate() {
            if !self.remap.contains_key(v) && !verts[..i].contains(v) {
                count += 1;
            }
        }
        count
    }

    fn vertex(&mut self, v: u32, source: &BucketSource<'_>) -> u32 {
        if let Some(&local) = self.remap.get(&v) {
            return local;
        }
        let local = self.num_vertices() as u32;
        let s = v as usize;
        self.positions
            .extend_from_slice(&source.positions_compressed[s * 3..s * 3 + 3]);
        if let (Some(dst), Some(src)) = (self.uvs.as_mut(), source.uvs_compressed) {
            dst.extend_from_slice(&src[s * 2..s * 2 + 2]);
        }
        if let (Some(dst), Some(src)) = (self.colors.as_mut(), source.colors_compressed) {
            dst.extend_from_slice(&src[s * 4..s * 4 + 4]);
        }
        self.remap.insert(v, local);
        local
    }

    fn finish(self) -> Result<GeometryBucket> {
        GeometryBucket::new(BucketData {
            positions_compressed: self.positions,
            uvs_compressed: self.uvs,
            colors_compressed: self.colors,
            indices: Some(self.indices),
            edge_indices: if self.edges.is_empty() {
                None
            } else {
                Some(self.edges)
            },
        })
    }
}

/// Split an indexed geometry into buckets of at most `max_bucket_vertices`.
///
/// Primitives are never split across buckets. Each edge lands in a bucket
/// holding one of its vertices, pulling the other vertex in when needed.
pub fn build_buckets(
    source: &BucketSource<'_>,
    primitive: PrimitiveType,
    max_bucket_vertices: usize,
) -> Result<Vec<GeometryBucket>> {
    let num_source_vertices = check_positions(source.positions_compressed)?;
    if let Some(uvs) = source.uvs_compressed {
        if uvs.len() != num_source_vertices * 2 {
            return Err(GeometryError::InvalidPositions(format!(
                "{} uv components for {} vertices",
                uvs.len(),
                num_source_vertices
            )));
        }
    }
    if let Some(colors) = source.colors_compressed {
        if colors.len() != num_source_vertices * 4 {
            return Err(GeometryError::InvalidPositions(format!(
                "{} color components for {} vertices",
                colors.len(),
                num_source_vertices
            )));
        }
    }
    let stride = primitive.vertices_per_primitive();
    let max_vertices = max_bucket_vertices.max(stride).max(2);

    let identity: Vec<u32>;
    let indices = if source.indices.is_empty() && primitive == PrimitiveType::Points {
        identity = (0..num_source_vertices as u32).collect();
        &identity[..]
    } else {
        source.indices
    };
    if indices.is_empty() {
        return Err(GeometryError::Empty(format!("{} geometry without indices", primitive)));
    }
    if indices.len() % stride != 0 {
        return Err(GeometryError::RaggedIndices {
            len: indices.len(),
            stride,
        });
    }
    check_range(indices.iter().copied(), num_source_vertices)?;

    let mut builders = vec![BucketBuilder::new(source)];
    let mut vertex_buckets: FxHashMap<u32, SmallVec<[usize; 2]>> = FxHashMap::default();

    for prim in indices.chunks_exact(stride) {
        let current = builders.len() - 1;
        if builders[current].num_vertices() + builders[current].missing(prim) > max_vertices {
            builders.push(BucketBuilder::new(source));
        }
        let current = builders.len() - 1;
        for &v in prim {
            let local = builders[current].vertex(v, source);
            builders[current].indices.push(local);
            let owners = vertex_buckets.entry(v).or_default();
            if !owners.contains(&current) {
                owners.push(current);
            }
        }
    }

    if let Some(edges) = source.edge_indices {
        if edges.len() % 2 != 0 {
            return Err(GeometryError::RaggedIndices {
                len: edges.len(),
                stride: 2,
            });
        }
        check_range(edges.iter().copied(), num_source_vertices)?;

        for edge in edges.chunks_exact(2) {
            let (a, b) = (edge[0], edge[1]);
            let target = pick_edge_bucket(&builders, &vertex_buckets, a, b, max_vertices)
                .unwrap_or_else(|| {
                    builders.push(BucketBuilder::new(source));
                    builders.len() - 1
                });
            for v in [a, b] {
                let local = builders[target].vertex(v, source);
                builders[target].edges.push(local);
                let owners = vertex_buckets.entry(v).or_default();
                if !owners.contains(&target) {
                    owners.push(target);
                }
            }
        }
    }

    builders.into_iter().map(BucketBuilder::finish).collect()
}

fn pick_edge_bucket(
    builders: &[BucketBuilder],
    vertex_buckets: &FxHashMap<u32, SmallVec<[usize; 2]>>,
    a: u32,
    b: u32,
    max_vertices: usize,
) -> Option<usize> {
    let owners_a = vertex_buckets.get(&a).map(|o| o.as_slice()).unwrap_or(&[]);
    let owners_b = vertex_buckets.get(&b).map(|o| o.as_slice()).unwrap_or(&[]);

    owners_a
        .iter()
        .find(|&&i| owners_b.contains(&i))
        .or_else(|| {
            owners_a
                .iter()
                .chain(owners_b.iter())
                .find(|&&i| builders[i].num_vertices() < max_vertices)
        })
        .copied()
        .or_else(|| {
            let last = builders.len() - 1;
            (builders[last].num_vertices() + builders[last].missing(&[a, b]) <= max_vertices)
                .then_some(last)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_strip(quads: usize) -> (Vec<u16>, Vec<u32>) {
        // A strip of quads: 2 * (quads + 1) vertices, 2 triangles per quad
        let mut positions = Vec::new();
        for i in 0..=quads {
            positions.extend_from_slice(&[i as u16, 0, 0, i as u16, 1, 0]);
        }
        let mut indices = Vec::new();
        for i in 0..quads as u32 {
            let a = i * 2;
            indices.extend_from_slice(&[a, a + 1, a + 2, a + 1, a + 3, a + 2]);
        }
        (positions, indices)
    }

    #[test]
    fn test_bucket_width_from_vertex_count() {
        let positions = vec![0u16; 256 * 3];
        let bucket = GeometryBucket::new(BucketData {
            positions_compressed: positions,
            indices: Some(vec![0, 1, 255]),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(bucket.index_width(), IndexWidth::U16);
        assert_eq!(bucket.indices().unwrap().width(), IndexWidth::U16);
        assert_eq!(bucket.num_primitives(PrimitiveType::Triangles), 1);
    }

    #[test]
    fn test_bucket_rejects_out_of_range_index() {
        let err = GeometryBucket::new(BucketData {
            positions_compressed: vec![0; 9],
            indices: Some(vec![0, 1, 3]),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(
            err,
            GeometryError::IndexOutOfRange {
                index: 3,
                num_vertices: 3
            }
        );
    }

    #[test]
    fn test_from_index_buffers_checks_width() {
        let err = GeometryBucket::from_index_buffers(
            vec![0; 9],
            None,
            None,
            Some(IndexBuffer::U16(vec![0, 1, 2])),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, GeometryError::IndexWidthMismatch { .. }));
    }

    #[test]
    fn test_build_buckets_splits_without_breaking_triangles() {
        let (positions, indices) = grid_strip(200);
        let source = BucketSource {
            positions_compressed: &positions,
            uvs_compressed: None,
            colors_compressed: None,
            indices: &indices,
            edge_indices: None,
        };
        let buckets = build_buckets(&source, PrimitiveType::Triangles, 100).unwrap();

        assert!(buckets.len() > 1);
        let total_triangles: usize = buckets
            .iter()
            .map(|b| b.num_primitives(PrimitiveType::Triangles))
            .sum();
        assert_eq!(total_triangles, 400);
        for bucket in &buckets {
            assert!(bucket.num_vertices() <= 100);
            assert_eq!(bucket.index_width(), IndexWidth::U8);
        }
    }

    #[test]
    fn test_build_buckets_places_edges() {
        let (positions, indices) = grid_strip(4);
        let edges = vec![0, 2, 2, 4, 4, 6, 6, 8, 1, 9];
        let source = BucketSource {
            positions_compressed: &positions,
            uvs_compressed: None,
            colors_compressed: None,
            indices: &indices,
            edge_indices: Some(&edges),
        };
        let buckets = build_buckets(&source, PrimitiveType::Triangles, 1000).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].num_edges(), 5);
        assert_eq!(buckets[0].num_vertices(), 10);
    }

    #[test]
    fn test_points_without_indices() {
        let positions = vec![1u16; 30];
        let source = BucketSource {
            positions_compressed: &positions,
            uvs_compressed: None,
            colors_compressed: None,
            indices: &[],
            edge_indices: None,
        };
        let buckets = build_buckets(&source, PrimitiveType::Points, 4).unwrap();
        assert_eq!(buckets.len(), 3);
        let points: usize = buckets
            .iter()
            .map(|b| b.num_primitives(PrimitiveType::Points))
            .sum();
        assert_eq!(points, 10);
    }

    #[test]
    fn test_build_buckets_checks_attribute_lengths() {
        let (positions, indices) = grid_strip(1);
        let source = BucketSource {
            positions_compressed: &positions,
            uvs_compressed: Some(&[0, 0, 1, 1]),
            colors_compressed: None,
            indices: &indices,
            edge_indices: None,
        };
        assert!(matches!(
            build_buckets(&source, PrimitiveType::Triangles, 16),
            Err(GeometryError::InvalidPositions(_))
        ));
    }
}
