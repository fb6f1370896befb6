// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Feature edge extraction for triangle geometries

use nalgebra::{Point3, Vector3};
use rustc_hash::FxHashMap;

/// Default crease angle in degrees
pub const DEFAULT_EDGE_THRESHOLD: f64 = 10.0;

struct EdgeInfo {
    a: u32,
    b: u32,
    normal: Vector3<f64>,
    faces: u32,
    sharp: bool,
}

/// Derive edge line indices from a triangle mesh.
///
/// An edge is kept when it borders a single triangle, or when the normals of
/// the triangles sharing it differ by more than `threshold_degrees`.
/// Coincident vertices are welded first, so split normals/uvs don't produce
/// spurious boundary edges.
pub fn build_edge_indices(positions: &[f64], indices: &[u32], threshold_degrees: f64) -> Vec<u32> {
    let num_vertices = positions.len() / 3;
    let mut weld: FxHashMap<[u64; 3], u32> = FxHashMap::default();
    let mut canonical = Vec::with_capacity(num_vertices);
    for (i, chunk) in positions.chunks_exact(3).enumerate() {
        let key = [chunk[0].to_bits(), chunk[1].to_bits(), chunk[2].to_bits()];
        canonical.push(*weld.entry(key).or_insert(i as u32));
    }

    let point = |i: u32| {
        let i = i as usize * 3;
        Point3::new(positions[i], positions[i + 1], positions[i + 2])
    };
    let cos_threshold = threshold_degrees.to_radians().cos();

    let mut lookup: FxHashMap<(u32, u32), usize> = FxHashMap::default();
    let mut edges: Vec<EdgeInfo> = Vec::new();

    for tri in indices.chunks_exact(3) {
        if tri.iter().any(|&i| i as usize >= num_vertices) {
            continue;
        }
        let normal = (point(tri[1]) - point(tri[0])).cross(&(point(tri[2]) - point(tri[0])));
        let length = normal.norm();
        if length == 0.0 {
            continue;
        }
        let normal = normal / length;

        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            let (ca, cb) = (canonical[a as usize], canonical[b as usize]);
            let key = if ca < cb { (ca, cb) } else { (cb, ca) };
            match lookup.get(&key) {
                Some(&idx) => {
                    let edge = &mut edges[idx];
                    edge.faces += 1;
                    if edge.normal.dot(&normal) < cos_threshold {
                        edge.sharp = true;
                    }
                }
                None => {
                    lookup.insert(key, edges.len());
                    edges.push(EdgeInfo {
                        a,
                        b,
                        normal,
                        faces: 1,
                        sharp: false,
                    });
                }
            }
        }
    }

    let mut out = Vec::new();
    for edge in edges.iter().filter(|e| e.faces == 1 || e.sharp) {
        out.push(edge.a);
        out.push(edge.b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_quad_keeps_only_outline() {
        // Two coplanar triangles: the shared diagonal is not a feature edge
        let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        let indices = [0, 1, 2, 0, 2, 3];
        let edges = build_edge_indices(&positions, &indices, DEFAULT_EDGE_THRESHOLD);
        assert_eq!(edges.len(), 8);
    }

    #[test]
    fn test_folded_quad_keeps_crease() {
        let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let indices = [0, 1, 2, 0, 3, 1];
        let edges = build_edge_indices(&positions, &indices, DEFAULT_EDGE_THRESHOLD);
        // 4 boundary edges + the 90 degree crease
        assert_eq!(edges.len(), 10);
    }
}
