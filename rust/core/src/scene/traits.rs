// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Narrow setter surfaces through which scene-side code reaches the layers
//!
//! Callers hold an [`ObjectMut`] or [`MeshMut`] and never touch layers or
//! mesh indices directly.

use super::SceneModel;
use crate::flags::RenderFlags;
use crate::Result;
use nalgebra::Matrix4;
use strata_geometry::Aabb;

pub trait RendererModel {
    fn id(&self) -> &str;
    fn aabb(&self) -> Aabb;
    fn is_built(&self) -> bool;
    fn build(&mut self) -> Result<()>;
    fn destroy(&mut self);
    fn begin_deferred_flags(&mut self);
    /// Returns the number of texture uploads issued.
    fn commit_deferred_flags(&mut self) -> Result<usize>;
}

/// Per-view state of one object. Every setter returns whether anything
/// changed; repeating a value is a no-op.
pub trait RendererObject {
    fn id(&self) -> &str;
    fn aabb(&self) -> Aabb;
    fn flags(&self, view: usize) -> Option<RenderFlags>;
    fn set_flag(&mut self, view: usize, flag: RenderFlags, value: bool) -> Result<bool>;
    /// `None` restores the meshes' own colors.
    fn set_colorize(&mut self, view: usize, rgb: Option<[f32; 3]>) -> Result<bool>;
    /// `None` restores the meshes' own opacity.
    fn set_opacity(&mut self, view: usize, opacity: Option<f32>) -> Result<bool>;
    fn set_offset(&mut self, view: usize, offset: [f32; 3]) -> Result<bool>;

    fn set_visible(&mut self, view: usize, visible: bool) -> Result<bool> {
        self.set_flag(view, RenderFlags::VISIBLE, visible)
    }

    fn set_culled(&mut self, view: usize, culled: bool) -> Result<bool> {
        self.set_flag(view, RenderFlags::CULLED, culled)
    }

    fn set_pickable(&mut self, view: usize, pickable: bool) -> Result<bool> {
        self.set_flag(view, RenderFlags::PICKABLE, pickable)
    }

    fn set_clippable(&mut self, view: usize, clippable: bool) -> Result<bool> {
        self.set_flag(view, RenderFlags::CLIPPABLE, clippable)
    }

    fn set_collidable(&mut self, view: usize, collidable: bool) -> Result<bool> {
        self.set_flag(view, RenderFlags::COLLIDABLE, collidable)
    }

    fn set_edges(&mut self, view: usize, edges: bool) -> Result<bool> {
        self.set_flag(view, RenderFlags::EDGES, edges)
    }

    fn set_xrayed(&mut self, view: usize, xrayed: bool) -> Result<bool> {
        self.set_flag(view, RenderFlags::XRAYED, xrayed)
    }

    fn set_highlighted(&mut self, view: usize, highlighted: bool) -> Result<bool> {
        self.set_flag(view, RenderFlags::HIGHLIGHTED, highlighted)
    }

    fn set_selected(&mut self, view: usize, selected: bool) -> Result<bool> {
        self.set_flag(view, RenderFlags::SELECTED, selected)
    }
}

/// View-independent state of one mesh
pub trait RendererMesh {
    fn id(&self) -> &str;
    /// Origin-relative modeling matrix
    fn set_matrix(&mut self, matrix: &Matrix4<f64>) -> Result<()>;
    fn set_color(&mut self, rgb: [f32; 3]) -> Result<()>;
    fn set_opacity(&mut self, opacity: f32) -> Result<()>;
    fn set_metallic(&mut self, metallic: f32) -> Result<()>;
    fn set_roughness(&mut self, roughness: f32) -> Result<()>;
    fn set_view_matrix_index(&mut self, index: u32) -> Result<()>;
}

/// Mutable handle on one object of a [`SceneModel`]
pub struct ObjectMut<'a> {
    pub(super) model: &'a mut SceneModel,
    pub(super) index: usize,
}

impl RendererObject for ObjectMut<'_> {
    fn id(&self) -> &str {
        &self.model.objects[self.index].id
    }

    fn aabb(&self) -> Aabb {
        self.model.objects[self.index].aabb
    }

    fn flags(&self, view: usize) -> Option<RenderFlags> {
        self.model.objects[self.index].flags(view)
    }

    fn set_flag(&mut self, view: usize, flag: RenderFlags, value: bool) -> Result<bool> {
        self.model.set_object_flag(self.index, view, flag, value)
    }

    fn set_colorize(&mut self, view: usize, rgb: Option<[f32; 3]>) -> Result<bool> {
        self.model.set_object_colorize(self.index, view, rgb)
    }

    fn set_opacity(&mut self, view: usize, opacity: Option<f32>) -> Result<bool> {
        self.model.set_object_opacity(self.index, view, opacity)
    }

    fn set_offset(&mut self, view: usize, offset: [f32; 3]) -> Result<bool> {
        self.model.set_object_offset(self.index, view, offset)
    }
}

/// Mutable handle on one mesh of a [`SceneModel`]
pub struct MeshMut<'a> {
    pub(super) model: &'a mut SceneModel,
    pub(super) index: usize,
}

impl RendererMesh for MeshMut<'_> {
    fn id(&self) -> &str {
        &self.model.meshes[self.index].id
    }

    fn set_matrix(&mut self, matrix: &Matrix4<f64>) -> Result<()> {
        self.model.set_mesh_matrix(self.index, matrix)
    }

    fn set_color(&mut self, rgb: [f32; 3]) -> Result<()> {
        self.model.set_mesh_color(self.index, rgb)
    }

    fn set_opacity(&mut self, opacity: f32) -> Result<()> {
        self.model.set_mesh_opacity(self.index, opacity)
    }

    fn set_metallic(&mut self, metallic: f32) -> Result<()> {
        self.model.set_mesh_material(self.index, Some(metallic), None)
    }

    fn set_roughness(&mut self, roughness: f32) -> Result<()> {
        self.model.set_mesh_material(self.index, None, Some(roughness))
    }

    fn set_view_matrix_index(&mut self, index: u32) -> Result<()> {
        self.model.set_mesh_view_matrix_index(self.index, index)
    }
}
