// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scene meshes: one placed instance of a geometry

use nalgebra::Matrix4;
use strata_geometry::{Aabb, RtcOrigin};

/// Parameters for [`super::SceneModel::create_mesh`]
#[derive(Debug, Clone)]
pub struct MeshParams<'a> {
    pub id: &'a str,
    pub geometry_id: &'a str,
    /// Modeling matrix. Relative to `origin` when one is given, world
    /// coordinates otherwise.
    pub matrix: Matrix4<f64>,
    /// RTC origin; picked from the mesh's world bounds when `None`
    pub origin: Option<RtcOrigin>,
    /// Linear RGB in 0..=1
    pub color: [f32; 3],
    pub opacity: f32,
    pub metallic: f32,
    pub roughness: f32,
}

impl<'a> MeshParams<'a> {
    /// White, opaque, rough, untransformed mesh of `geometry_id`
    pub fn new(id: &'a str, geometry_id: &'a str) -> Self {
        Self {
            id,
            geometry_id,
            matrix: Matrix4::identity(),
            origin: None,
            color: [1.0; 3],
            opacity: 1.0,
            metallic: 0.0,
            roughness: 1.0,
        }
    }
}

/// Quantize a 0..=1 factor to a texel byte
#[inline]
pub(crate) fn unit_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[derive(Debug, Clone)]
pub struct SceneMesh {
    pub(crate) id: String,
    pub(crate) geometry_id: String,
    /// Index of the layer in the model's allocator
    pub(crate) layer: usize,
    pub(crate) mesh_index: u32,
    pub(crate) origin: RtcOrigin,
    /// Origin-relative modeling matrix
    pub(crate) matrix: Matrix4<f64>,
    pub(crate) aabb: Aabb,
    pub(crate) color: [u8; 3],
    pub(crate) opacity: u8,
    pub(crate) metallic: u8,
    pub(crate) roughness: u8,
    /// Index of the owning object
    pub(crate) object: Option<usize>,
}

impl SceneMesh {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn geometry_id(&self) -> &str {
        &self.geometry_id
    }

    /// Layer index within the owning model
    pub fn layer(&self) -> usize {
        self.layer
    }

    /// Slot of the mesh in its layer's data textures
    pub fn mesh_index(&self) -> u32 {
        self.mesh_index
    }

    pub fn origin(&self) -> RtcOrigin {
        self.origin
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    /// World-space bounds
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    pub fn opacity(&self) -> u8 {
        self.opacity
    }

    pub fn metallic(&self) -> u8 {
        self.metallic
    }

    pub fn roughness(&self) -> u8 {
        self.roughness
    }

    pub fn has_object(&self) -> bool {
        self.object.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_to_u8_clamps() {
        assert_eq!(unit_to_u8(0.0), 0);
        assert_eq!(unit_to_u8(1.0), 255);
        assert_eq!(unit_to_u8(0.5), 128);
        assert_eq!(unit_to_u8(-3.0), 0);
        assert_eq!(unit_to_u8(7.0), 255);
    }
}
