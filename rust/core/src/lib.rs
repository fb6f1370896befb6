// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Strata Core
//!
//! Layered geometry batching for large BIM/CAD scenes. Meshes from many
//! unrelated objects are packed into a bounded number of GPU-resident
//! layers; each layer exposes its positions, matrices, per-mesh flags and
//! indices as data textures so a single draw call renders every mesh of a
//! layer for a given pass.
//!
//! ## Overview
//!
//! - **Layers**: fixed-capacity batches with first-fit placement
//! - **Data textures**: typed arrays addressed as 2D textures, with
//!   sub-region re-upload for cheap flag updates
//! - **Per-view state**: visibility, selection, highlight and x-ray tracked
//!   independently for every view
//! - **Deferred flags**: batched state changes become one upload per texture
//! - **Renderer programs**: one parameterized program per primitive, pass
//!   and quality, cached per view and invalidated by config hash
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata_core::{gpu::RecordingGpu, MeshParams, ObjectParams, StrataConfig, Viewer};
//! use strata_geometry::{GeometrySource, PrimitiveType};
//!
//! let mut viewer = Viewer::new(Rc::new(RecordingGpu::new()), StrataConfig::default())?;
//! let view = viewer.create_view(800, 600)?;
//! let key = viewer.create_model("site")?;
//! let model = viewer.model_mut(key).unwrap();
//! model.create_geometry("wall", PrimitiveType::Triangles, &GeometrySource {
//!     positions: &positions,
//!     indices: &indices,
//!     ..Default::default()
//! })?;
//! model.create_mesh(&MeshParams::new("wall-1", "wall"))?;
//! model.create_object(&ObjectParams { id: "W1", mesh_ids: &["wall-1"], view_layer: None })?;
//! model.build()?;
//!
//! viewer.set_objects_selected(view, &["W1"], true)?;
//! viewer.render(view)?;
//! ```

pub mod allocator;
pub mod config;
pub mod data_texture;
pub mod error;
pub mod flags;
pub mod gpu;
pub mod layer;
pub mod pick;
pub mod renderer;
pub mod scene;
pub mod view;
pub mod viewer;

pub use allocator::{AllocatorStats, LayerAllocator, Placement};
pub use config::StrataConfig;
pub use data_texture::{DataTexture, Texel, TexelData};
pub use error::{Error, Result};
pub use flags::{MeshState, RenderFlags, RenderPass};
pub use gpu::{GpuBackend, RecordingGpu};
pub use layer::{Layer, LayerCapacity, LayerMeshParams, MeshCounts};
pub use pick::{decode_pick_color, encode_pick_color};
pub use renderer::{
    CacheState, FrameStats, RenderQuality, RendererCache, RendererKind, RendererProgram,
    SceneShaderConfig,
};
pub use scene::{
    MeshMut, MeshParams, ObjectMut, ObjectParams, ObjectViewState, RendererMesh, RendererModel,
    RendererObject, SceneMesh, SceneModel, SceneObject,
};
pub use view::{Camera, DirectionalLight, Lighting, SectionPlane, View, ViewMaterials};
pub use viewer::{ModelKey, PickResult, Viewer};
