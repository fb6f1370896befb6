// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 16-bit position quantization
//!
//! Positions are stored on the GPU as unsigned 16-bit integers relative to the
//! geometry's bounding box. The decode matrix maps them back to model space in
//! the vertex shader.

use crate::Aabb;
use nalgebra::{Matrix4, Point3, Vector3};

const QUANTIZE_MAX: f64 = 65535.0;

/// Quantize flat `[x, y, z, ...]` positions against `aabb`.
///
/// Returns the quantized positions and the matrix that decodes them.
pub fn quantize_positions(positions: &[f64], aabb: &Aabb) -> (Vec<u16>, Matrix4<f64>) {
    let min = if aabb.is_empty() { Point3::origin() } else { aabb.min };
    let extent = aabb.extent();
    // A flat axis still needs a non-zero scale so the matrix stays invertible
    let range = extent.map(|e| if e > 0.0 { e } else { 1.0 });
    let multiplier = range.map(|r| QUANTIZE_MAX / r);

    let mut quantized = Vec::with_capacity(positions.len());
    for chunk in positions.chunks_exact(3) {
        for axis in 0..3 {
            let v = ((chunk[axis] - min.coords[axis]) * multiplier[axis]).round();
            quantized.push(v.clamp(0.0, QUANTIZE_MAX) as u16);
        }
    }

    (quantized, decode_matrix(&min, &range))
}

/// Decode matrix for a box with lower corner `min` and per-axis `range`
pub fn decode_matrix(min: &Point3<f64>, range: &[f64; 3]) -> Matrix4<f64> {
    let scale = Vector3::new(
        range[0] / QUANTIZE_MAX,
        range[1] / QUANTIZE_MAX,
        range[2] / QUANTIZE_MAX,
    );
    Matrix4::new_translation(&min.coords) * Matrix4::new_nonuniform_scaling(&scale)
}

/// Decode one quantized position
#[inline]
pub fn decode_position(quantized: [u16; 3], decode: &Matrix4<f64>) -> Point3<f64> {
    decode.transform_point(&Point3::new(
        quantized[0] as f64,
        quantized[1] as f64,
        quantized[2] as f64,
    ))
}

/// Decode a flat quantized position array
pub fn decode_positions(quantized: &[u16], decode: &Matrix4<f64>) -> Vec<f64> {
    let mut out = Vec::with_capacity(quantized.len());
    for chunk in quantized.chunks_exact(3) {
        let p = decode_position([chunk[0], chunk[1], chunk[2]], decode);
        out.extend_from_slice(&[p.x, p.y, p.z]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quantize_corners_exact() {
        let positions = [-5.0, 0.0, 2.0, 5.0, 10.0, 2.0];
        let aabb = Aabb::from_positions(&positions);
        let (q, decode) = quantize_positions(&positions, &aabb);

        assert_eq!(&q[0..3], &[0, 0, 0]);
        assert_eq!(&q[3..6], &[65535, 65535, 0]);

        let p = decode_position([q[3], q[4], q[5]], &decode);
        assert_relative_eq!(p.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(p.y, 10.0, epsilon = 1e-9);
        // Flat axis decodes back to its single value
        assert_relative_eq!(p.z, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_quantization_error_bounded() {
        let positions = [0.0, 0.0, 0.0, 0.3333, 7.77, 100.0, 100.0, 100.0, 100.0];
        let aabb = Aabb::from_positions(&positions);
        let (q, decode) = quantize_positions(&positions, &aabb);
        let decoded = decode_positions(&q, &decode);
        for (a, b) in positions.iter().zip(decoded.iter()) {
            assert!((a - b).abs() <= 100.0 / 65535.0);
        }
    }
}
