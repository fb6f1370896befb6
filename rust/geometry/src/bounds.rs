// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Axis-aligned bounding boxes

use nalgebra::{Matrix4, Point3};

/// Axis-aligned bounding box in f64 precision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// An inverted box that any expansion will overwrite
    #[inline]
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    #[inline]
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Bounds of a flat `[x, y, z, ...]` position array
    pub fn from_positions(positions: &[f64]) -> Self {
        let mut aabb = Self::empty();
        positions.chunks_exact(3).for_each(|chunk| {
            aabb.expand_point(&Point3::new(chunk[0], chunk[1], chunk[2]));
        });
        aabb
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[inline]
    pub fn expand_point(&mut self, p: &Point3<f64>) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    #[inline]
    pub fn expand_aabb(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        self.expand_point(&other.min);
        self.expand_point(&other.max);
    }

    #[inline]
    pub fn center(&self) -> Point3<f64> {
        if self.is_empty() {
            return Point3::origin();
        }
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// Size along each axis (zero for an empty box)
    #[inline]
    pub fn extent(&self) -> [f64; 3] {
        if self.is_empty() {
            return [0.0; 3];
        }
        [
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        ]
    }

    /// Bounds of this box's eight corners after transformation
    pub fn transform(&self, matrix: &Matrix4<f64>) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut out = Aabb::empty();
        for i in 0..8 {
            let corner = Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.expand_point(&matrix.transform_point(&corner));
        }
        out
    }

    /// Flat `[minx, miny, minz, maxx, maxy, maxz]`
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_empty_and_expand() {
        let mut aabb = Aabb::empty();
        assert!(aabb.is_empty());
        aabb.expand_point(&Point3::new(1.0, 2.0, 3.0));
        aabb.expand_point(&Point3::new(-1.0, 0.0, 5.0));
        assert!(!aabb.is_empty());
        assert_eq!(aabb.min, Point3::new(-1.0, 0.0, 3.0));
        assert_eq!(aabb.max, Point3::new(1.0, 2.0, 5.0));
        assert_eq!(aabb.center(), Point3::new(0.0, 1.0, 4.0));
    }

    #[test]
    fn test_transform_translates_bounds() {
        let aabb = Aabb::from_positions(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let moved = aabb.transform(&Matrix4::new_translation(&Vector3::new(10.0, 0.0, 0.0)));
        assert_eq!(moved.min, Point3::new(10.0, 0.0, 0.0));
        assert_eq!(moved.max, Point3::new(11.0, 1.0, 1.0));
    }
}
