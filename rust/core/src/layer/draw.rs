// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Draw call emission

use super::{Layer, LayerState};
use crate::flags::RenderPass;
use crate::gpu::{DrawCall, DrawMode, DrawState, TextureHandle, Uniform};
use crate::renderer::RendererProgram;
use strata_geometry::PrimitiveType;

impl Layer {
    /// Draw every mesh of this layer that the vertex shader keeps for `pass`.
    ///
    /// Emits one non-indexed draw per populated index width. Returns the
    /// number of draw calls, zero when the pass has nothing to draw, the
    /// program failed to compile, or the layer is not built.
    pub fn draw(
        &self,
        view: usize,
        pass: RenderPass,
        program: &RendererProgram,
        uniforms: &[(&'static str, Uniform)],
    ) -> u32 {
        if self.state != LayerState::Built || pass == RenderPass::NotRendered {
            return 0;
        }
        let (Some(shared), Some(view_state)) = (self.textures.as_ref(), self.view(view)) else {
            return 0;
        };
        let Some(view_textures) = view_state.textures.as_ref() else {
            return 0;
        };
        if !view_state.counts.has_work(pass) {
            return 0;
        }
        let Some(program) = program.handle() else {
            return 0;
        };

        let edges = pass.is_edges();
        if edges && !self.primitive.is_triangles() {
            return 0;
        }
        let (classes, mode, per_primitive) = match (edges, self.primitive) {
            (true, _) => (&shared.edges, DrawMode::Lines, 2),
            (false, PrimitiveType::Lines) => (&shared.primitives, DrawMode::Lines, 2),
            (false, PrimitiveType::Points) => (&shared.primitives, DrawMode::Points, 1),
            (false, _) => (&shared.primitives, DrawMode::Triangles, 3),
        };
        let state = DrawState {
            blend: pass.is_blended(),
            depth_write: !pass.is_blended(),
            cull_back_faces: self.primitive == PrimitiveType::Solid && !edges,
        };

        let shared_handles: Option<[(&'static str, TextureHandle); 7]> = (|| {
            Some([
                ("uPositions", shared.positions.handle()?),
                ("uSlotInfo", shared.slot_info.handle()?),
                ("uDecodeMatrices", shared.decode_matrices.handle()?),
                ("uMeshMatrices", shared.mesh_matrices.handle()?),
                ("uMeshMaterial", shared.mesh_material.handle()?),
                ("uMeshFlags", view_textures.flags.handle()?),
                ("uMeshOffsets", view_textures.offsets.handle()?),
            ])
        })();
        let Some(shared_handles) = shared_handles else {
            return 0;
        };

        let mut all_uniforms = Vec::with_capacity(uniforms.len() + 2);
        all_uniforms.extend_from_slice(uniforms);
        all_uniforms.push(("uRenderPass", Uniform::UInt(u32::from(pass.value()))));
        all_uniforms.push(("uTexWidth", Uniform::Int(self.row as i32)));

        let mut draws = 0;
        for class in classes.iter().flatten() {
            let (Some(indices), Some(prim_to_slot)) =
                (class.indices.handle(), class.prim_to_slot.handle())
            else {
                continue;
            };
            let mut bindings = Vec::with_capacity(shared_handles.len() + 2);
            bindings.extend_from_slice(&shared_handles);
            bindings.push(("uIndices", indices));
            bindings.push(("uPrimToSlot", prim_to_slot));

            self.gpu.draw(&DrawCall {
                program,
                mode,
                vertex_count: class.num_primitives * per_primitive,
                state,
                textures: &bindings,
                uniforms: &all_uniforms,
            });
            draws += 1;
        }
        draws
    }
}
