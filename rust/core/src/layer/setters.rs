// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-mesh state setters
//!
//! Before `build()` setters only update the CPU mirrors. Afterwards each
//! write is uploaded at once, unless flags are deferred, in which case the
//! dirty range of every texture is uploaded by `commit_deferred_flags`.

use super::{matrix_texels, Layer, LayerState, LayerView};
use crate::data_texture::{DataTexture, Texel};
use crate::flags::{MeshState, RenderFlags};
use crate::gpu::GpuBackend;
use crate::{Error, Result};
use nalgebra::Matrix4;

/// Write a mirror and upload it unless deferred
fn write_texels<T: Texel + PartialEq>(
    texture: &mut DataTexture,
    first: usize,
    values: &[T],
    deferred: bool,
    gpu: &dyn GpuBackend,
) -> Result<()> {
    if texture.write(first, values)? && !deferred {
        texture.flush(gpu)?;
    }
    Ok(())
}

impl Layer {
    fn check_mesh(&self, mesh: u32) -> Result<usize> {
        if self.state == LayerState::Destroyed {
            return Err(Error::destroyed(format!("layer {}", self.id)));
        }
        let index = mesh as usize;
        if index >= self.meshes.len() {
            return Err(Error::InvalidMeshIndex {
                index: mesh,
                len: self.meshes.len(),
            });
        }
        Ok(index)
    }

    fn view_mut(&mut self, slot: usize) -> Result<&mut LayerView> {
        self.views
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(Error::UnknownView(slot))
    }

    /// Replace a mesh's flags and transparency in one view.
    ///
    /// Counters are reclassified and the pass texel rewritten only when the
    /// state actually changes. Returns whether it did.
    pub fn set_mesh_flags(
        &mut self,
        view: usize,
        mesh: u32,
        flags: RenderFlags,
        transparent: bool,
    ) -> Result<bool> {
        let index = self.check_mesh(mesh)?;
        let deferred = self.deferred;
        let gpu = std::rc::Rc::clone(&self.gpu);
        let state = self.view_mut(view)?;

        let old = state.states[index];
        let new = MeshState::new(flags, transparent);
        if old == new {
            return Ok(false);
        }
        state.counts.reclassify(&old, &new);
        state.states[index] = new;
        if let Some(textures) = state.textures.as_mut() {
            let texel = new.pass_texel();
            write_texels(&mut textures.flags, index * 2 + 1, &texel, deferred, &*gpu)?;
        }
        Ok(true)
    }

    pub fn set_mesh_visible(
        &mut self,
        view: usize,
        mesh: u32,
        flags: RenderFlags,
        transparent: bool,
    ) -> Result<bool> {
        self.set_mesh_flags(view, mesh, flags, transparent)
    }

    pub fn set_mesh_culled(
        &mut self,
        view: usize,
        mesh: u32,
        flags: RenderFlags,
        transparent: bool,
    ) -> Result<bool> {
        self.set_mesh_flags(view, mesh, flags, transparent)
    }

    pub fn set_mesh_collidable(
        &mut self,
        view: usize,
        mesh: u32,
        flags: RenderFlags,
        transparent: bool,
    ) -> Result<bool> {
        self.set_mesh_flags(view, mesh, flags, transparent)
    }

    pub fn set_mesh_pickable(
        &mut self,
        view: usize,
        mesh: u32,
        flags: RenderFlags,
        transparent: bool,
    ) -> Result<bool> {
        self.set_mesh_flags(view, mesh, flags, transparent)
    }

    pub fn set_mesh_clippable(
        &mut self,
        view: usize,
        mesh: u32,
        flags: RenderFlags,
        transparent: bool,
    ) -> Result<bool> {
        self.set_mesh_flags(view, mesh, flags, transparent)
    }

    pub fn set_mesh_edges(
        &mut self,
        view: usize,
        mesh: u32,
        flags: RenderFlags,
        transparent: bool,
    ) -> Result<bool> {
        self.set_mesh_flags(view, mesh, flags, transparent)
    }

    pub fn set_mesh_xrayed(
        &mut self,
        view: usize,
        mesh: u32,
        flags: RenderFlags,
        transparent: bool,
    ) -> Result<bool> {
        self.set_mesh_flags(view, mesh, flags, transparent)
    }

    pub fn set_mesh_highlighted(
        &mut self,
        view: usize,
        mesh: u32,
        flags: RenderFlags,
        transparent: bool,
    ) -> Result<bool> {
        self.set_mesh_flags(view, mesh, flags, transparent)
    }

    pub fn set_mesh_selected(
        &mut self,
        view: usize,
        mesh: u32,
        flags: RenderFlags,
        transparent: bool,
    ) -> Result<bool> {
        self.set_mesh_flags(view, mesh, flags, transparent)
    }

    /// Opacity changes move a mesh between the opaque and transparent passes.
    pub fn set_mesh_transparent(
        &mut self,
        view: usize,
        mesh: u32,
        flags: RenderFlags,
        transparent: bool,
    ) -> Result<bool> {
        self.set_mesh_flags(view, mesh, flags, transparent)
    }

    /// Color and opacity of a mesh in one view
    pub fn set_mesh_color(&mut self, view: usize, mesh: u32, rgba: [u8; 4]) -> Result<()> {
        let index = self.check_mesh(mesh)?;
        let deferred = self.deferred;
        let gpu = std::rc::Rc::clone(&self.gpu);
        let state = self.view_mut(view)?;
        state.colors[index] = rgba;
        if let Some(textures) = state.textures.as_mut() {
            write_texels(&mut textures.flags, index * 2, &rgba, deferred, &*gpu)?;
        }
        Ok(())
    }

    /// World-space translation applied after the modeling matrix in one view
    pub fn set_mesh_offset(&mut self, view: usize, mesh: u32, offset: [f32; 3]) -> Result<()> {
        let index = self.check_mesh(mesh)?;
        let deferred = self.deferred;
        let gpu = std::rc::Rc::clone(&self.gpu);
        let state = self.view_mut(view)?;
        state.offsets[index] = offset;
        if let Some(textures) = state.textures.as_mut() {
            let texel = [offset[0], offset[1], offset[2], 0.0];
            write_texels(&mut textures.offsets, index, &texel, deferred, &*gpu)?;
        }
        Ok(())
    }

    pub fn set_mesh_matrix(&mut self, mesh: u32, matrix: &Matrix4<f64>) -> Result<()> {
        let index = self.check_mesh(mesh)?;
        self.meshes[index].matrix = *matrix;
        if let Some(textures) = self.textures.as_mut() {
            let texels = matrix_texels(matrix);
            write_texels(
                &mut textures.mesh_matrices,
                index * 4,
                &texels,
                self.deferred,
                &*self.gpu,
            )?;
        }
        Ok(())
    }

    pub fn set_mesh_metallic(&mut self, mesh: u32, metallic: u8) -> Result<()> {
        let index = self.check_mesh(mesh)?;
        self.meshes[index].metallic = metallic;
        self.write_material(index)
    }

    pub fn set_mesh_roughness(&mut self, mesh: u32, roughness: u8) -> Result<()> {
        let index = self.check_mesh(mesh)?;
        self.meshes[index].roughness = roughness;
        self.write_material(index)
    }

    fn write_material(&mut self, index: usize) -> Result<()> {
        let mesh = &self.meshes[index];
        let texel = [mesh.metallic, mesh.roughness, 0, 0];
        if let Some(textures) = self.textures.as_mut() {
            write_texels(
                &mut textures.mesh_material,
                index,
                &texel,
                self.deferred,
                &*self.gpu,
            )?;
        }
        Ok(())
    }

    /// Select the view-matrix uniform entry every slot of the mesh uses.
    pub fn set_mesh_view_matrix_index(&mut self, mesh: u32, view_matrix_index: u32) -> Result<()> {
        let index = self.check_mesh(mesh)?;
        let slots = self.meshes[index].slots.clone();
        let mut texels = Vec::with_capacity(slots.len() * 4);
        for slot in slots.clone() {
            let info = &mut self.slots[slot as usize];
            info.view_matrix_index = view_matrix_index;
            texels.extend_from_slice(&info.texel());
        }
        if let (Some(textures), false) = (self.textures.as_mut(), texels.is_empty()) {
            write_texels(
                &mut textures.slot_info,
                slots.start as usize,
                &texels,
                self.deferred,
                &*self.gpu,
            )?;
        }
        Ok(())
    }

    /// Hold uploads until `commit_deferred_flags`.
    pub fn begin_deferred_flags(&mut self) {
        self.deferred = true;
    }

    /// Upload everything written while deferred, one region per texture.
    ///
    /// Returns the number of uploads issued.
    pub fn commit_deferred_flags(&mut self) -> Result<usize> {
        self.deferred = false;
        if self.state != LayerState::Built {
            return Ok(0);
        }
        let gpu = std::rc::Rc::clone(&self.gpu);
        let mut uploads = 0;
        if let Some(textures) = self.textures.as_mut() {
            uploads += textures.flush(&*gpu)?;
        }
        for view in self.views.iter_mut().flatten() {
            if let Some(textures) = view.textures.as_mut() {
                uploads += textures.flush(&*gpu)?;
            }
        }
        Ok(uploads)
    }

    /// Push state written before `build()` to the GPU.
    ///
    /// Built textures already carry that state; this uploads anything
    /// written between `build()` and the first frame.
    pub fn flush_init_flags(&mut self) -> Result<()> {
        self.commit_deferred_flags().map(|_| ())
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }
}
