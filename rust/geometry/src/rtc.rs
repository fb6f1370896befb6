// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relative-to-center (RTC) origins
//!
//! GPUs draw in f32. A georeferenced model sitting millions of metres from the
//! world origin loses centimetre precision once converted, so positions are
//! stored relative to a tile origin and the origin is folded into the view
//! matrix on the CPU in f64.

use nalgebra::Point3;

/// Default RTC tile edge length in metres
pub const DEFAULT_RTC_CELL_SIZE: f64 = 1000.0;

/// Origin subtracted from positions before they are quantized
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RtcOrigin {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl RtcOrigin {
    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn from_point(point: Point3<f64>) -> Self {
        Self {
            x: point.x,
            y: point.y,
            z: point.z,
        }
    }

    #[inline]
    pub fn from_array(a: [f64; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }

    #[inline]
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Check if the origin is far enough out to matter (>10km)
    #[inline]
    pub fn is_significant(&self) -> bool {
        const THRESHOLD: f64 = 10000.0;
        self.x.abs() > THRESHOLD || self.y.abs() > THRESHOLD || self.z.abs() > THRESHOLD
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    /// Origin of the tile containing `center`, snapped to a `cell_size` grid
    pub fn tile_for(center: Point3<f64>, cell_size: f64) -> Self {
        let snap = |v: f64| (v / cell_size).round() * cell_size;
        Self::new(snap(center.x), snap(center.y), snap(center.z))
    }

    /// Bit pattern usable as an exact hash/equality key
    #[inline]
    pub fn key(&self) -> [u64; 3] {
        [self.x.to_bits(), self.y.to_bits(), self.z.to_bits()]
    }

    /// Combine two origins (mesh origin on top of a geometry origin)
    #[inline]
    pub fn offset_by(&self, other: &RtcOrigin) -> RtcOrigin {
        RtcOrigin::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Subtract this origin from flat world positions, in f64
    pub fn to_relative(&self, positions: &[f64]) -> Vec<f64> {
        if self.is_zero() {
            return positions.to_vec();
        }
        let mut out = Vec::with_capacity(positions.len());
        for chunk in positions.chunks_exact(3) {
            out.push(chunk[0] - self.x);
            out.push(chunk[1] - self.y);
            out.push(chunk[2] - self.z);
        }
        out
    }
}

/// Move positions into an RTC tile when they sit far from the world origin.
///
/// Returns the zero origin and the positions unchanged for models that are
/// already near the origin.
pub fn rtc_positions(positions: &[f64], cell_size: f64) -> (RtcOrigin, Vec<f64>) {
    let center = crate::Aabb::from_positions(positions).center();
    let origin = RtcOrigin::from_point(center);
    if !origin.is_significant() {
        return (RtcOrigin::default(), positions.to_vec());
    }
    let tile = RtcOrigin::tile_for(center, cell_size);
    let relative = tile.to_relative(positions);
    (tile, relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_significance() {
        assert!(RtcOrigin::new(500000.0, 5000000.0, 100.0).is_significant());
        assert!(!RtcOrigin::default().is_significant());
        assert!(RtcOrigin::default().is_zero());
    }

    #[test]
    fn test_rtc_positions_preserve_precision() {
        // Swiss UTM style coordinates; two points 1mm apart
        let positions = [2679012.0, 1247892.0, 432.0, 2679012.001, 1247892.0, 432.0];
        let (origin, relative) = rtc_positions(&positions, DEFAULT_RTC_CELL_SIZE);
        assert!(!origin.is_zero());

        let dx = relative[3] as f32 - relative[0] as f32;
        assert!((dx - 0.001).abs() < 0.0001);
    }

    #[test]
    fn test_near_origin_left_alone() {
        let positions = [0.0, 0.0, 0.0, 10.0, 10.0, 10.0];
        let (origin, relative) = rtc_positions(&positions, DEFAULT_RTC_CELL_SIZE);
        assert!(origin.is_zero());
        assert_eq!(relative, positions.to_vec());
    }
}
