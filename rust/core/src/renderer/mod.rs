// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shader programs and the frame loop
//!
//! Programs are identified by [`RendererKind`] and compiled per view against
//! that view's [`SceneShaderConfig`] (section planes, lights, log depth).
//! Vertex shaders pull everything from the layer's data textures, indexed by
//! `gl_VertexID`, and drop meshes whose pass texel differs from the pass
//! being drawn.

mod cache;
mod frame;
mod kind;
mod program;
pub mod shaders;

pub use cache::{CacheState, RendererCache};
pub use frame::{pick_view, render_view, FrameStats};
pub use kind::{PrimitiveClass, ProgramPass, RenderQuality, RendererKind, SceneShaderConfig};
pub use program::RendererProgram;
pub use shaders::MAX_VIEW_MATRICES;
