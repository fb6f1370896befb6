// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The viewer: views, their program caches, and the models they show
//!
//! Everything mutable goes through here between frames. State setters only
//! mark views dirty; `render` decides once per frame whether a view needs
//! any GPU work.

use crate::config::StrataConfig;
use crate::gpu::GpuBackend;
use crate::layer::Layer;
use crate::renderer::{pick_view, render_view, FrameStats, RenderQuality, RendererCache};
use crate::scene::{ObjectMut, RendererObject, SceneModel};
use crate::view::{Camera, Lighting, SectionPlane, View, ViewMaterials, ViewRegistry};
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use std::fmt;
use std::rc::Rc;

new_key_type! {
    /// Handle of a model owned by a [`Viewer`]
    pub struct ModelKey;
}

/// What is under a picked pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickResult {
    pub model: ModelKey,
    pub model_id: String,
    /// `None` for meshes no object claimed
    pub object_id: Option<String>,
    pub mesh_id: String,
}

pub struct Viewer {
    gpu: Rc<dyn GpuBackend>,
    config: StrataConfig,
    views: ViewRegistry,
    /// One per view slot, created and destroyed with the view
    caches: Vec<Option<RendererCache>>,
    models: SlotMap<ModelKey, SceneModel>,
    model_ids: FxHashMap<String, ModelKey>,
}

impl fmt::Debug for Viewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Viewer")
            .field("config", &self.config)
            .field("views", &self.views.active_slots())
            .field("models", &self.models.len())
            .finish_non_exhaustive()
    }
}

impl Viewer {
    pub fn new(gpu: Rc<dyn GpuBackend>, config: StrataConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            gpu,
            views: ViewRegistry::with_capacity(config.max_views),
            caches: (0..config.max_views).map(|_| None).collect(),
            config,
            models: SlotMap::with_key(),
            model_ids: FxHashMap::default(),
        })
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    pub fn gpu(&self) -> &Rc<dyn GpuBackend> {
        &self.gpu
    }

    // ---- views ----

    /// Open a view in the lowest free slot and start tracking it in every
    /// model.
    pub fn create_view(&mut self, width: u32, height: u32) -> Result<usize> {
        let slot = self.views.register(View::new(width, height))?;
        self.caches[slot] = Some(RendererCache::new(Rc::clone(&self.gpu)));
        for model in self.models.values_mut().filter(|m| !m.is_destroyed()) {
            model.register_view(slot)?;
        }
        tracing::debug!(slot, width, height, "view created");
        Ok(slot)
    }

    /// Release a view's slot, its programs and its per-layer textures.
    pub fn destroy_view(&mut self, slot: usize) -> Result<()> {
        self.views.release(slot)?;
        if let Some(mut cache) = self.caches.get_mut(slot).and_then(Option::take) {
            cache.on_view_destroyed();
        }
        for model in self.models.values_mut() {
            model.release_view(slot);
        }
        tracing::debug!(slot, "view destroyed");
        Ok(())
    }

    pub fn view(&self, slot: usize) -> Option<&View> {
        self.views.get(slot)
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }

    pub fn renderer_cache(&self, slot: usize) -> Option<&RendererCache> {
        self.caches.get(slot).and_then(Option::as_ref)
    }

    /// Apply a change to a view, invalidating its programs when the change
    /// affects shader configuration.
    fn update_view(&mut self, slot: usize, f: impl FnOnce(&mut View)) -> Result<()> {
        let view = self.views.get_mut(slot).ok_or(Error::UnknownView(slot))?;
        f(view);
        if view.needs_rebuild() {
            if let Some(cache) = self.caches.get_mut(slot).and_then(Option::as_mut) {
                cache.invalidate();
            }
        }
        Ok(())
    }

    pub fn set_view_camera(&mut self, slot: usize, camera: Camera) -> Result<()> {
        self.update_view(slot, |v| v.set_camera(camera))
    }

    pub fn set_section_planes(&mut self, slot: usize, planes: Vec<SectionPlane>) -> Result<()> {
        self.update_view(slot, |v| v.set_section_planes(planes))
    }

    pub fn set_lighting(&mut self, slot: usize, lighting: Lighting) -> Result<()> {
        self.update_view(slot, |v| v.set_lighting(lighting))
    }

    pub fn set_view_materials(&mut self, slot: usize, materials: ViewMaterials) -> Result<()> {
        self.update_view(slot, |v| v.set_materials(materials))
    }

    pub fn set_log_depth(&mut self, slot: usize, log_depth: bool) -> Result<()> {
        self.update_view(slot, |v| v.set_log_depth(log_depth))
    }

    pub fn set_quality(&mut self, slot: usize, quality: RenderQuality) -> Result<()> {
        self.update_view(slot, |v| v.set_quality(quality))
    }

    pub fn set_canvas_size(&mut self, slot: usize, width: u32, height: u32) -> Result<()> {
        self.update_view(slot, |v| v.set_canvas_size(width, height))
    }

    // ---- models ----

    /// Create an empty model tracking every open view.
    pub fn create_model(&mut self, id: &str) -> Result<ModelKey> {
        if self.model_ids.contains_key(id) {
            return Err(Error::DuplicateId {
                kind: "model",
                id: id.to_string(),
            });
        }
        let model = SceneModel::new(
            id,
            Rc::clone(&self.gpu),
            &self.config,
            &self.views.active_slots(),
        );
        let key = self.models.insert(model);
        self.model_ids.insert(id.to_string(), key);
        Ok(key)
    }

    pub fn model(&self, key: ModelKey) -> Option<&SceneModel> {
        self.models.get(key)
    }

    pub fn model_mut(&mut self, key: ModelKey) -> Option<&mut SceneModel> {
        self.models.get_mut(key)
    }

    pub fn model_key(&self, id: &str) -> Option<ModelKey> {
        self.model_ids.get(id).copied()
    }

    pub fn models(&self) -> impl Iterator<Item = (ModelKey, &SceneModel)> {
        self.models.iter()
    }

    /// Destroy a model and release its layers. Views redraw without it.
    pub fn destroy_model(&mut self, key: ModelKey) -> Result<()> {
        let mut model = self
            .models
            .remove(key)
            .ok_or_else(|| Error::UnknownModel(format!("{key:?}")))?;
        model.destroy();
        self.model_ids.remove(model.id());
        for slot in self.views.active_slots() {
            if let Some(view) = self.views.get_mut(slot) {
                view.mark_needs_render();
            }
        }
        Ok(())
    }

    // ---- object state ----

    /// Apply `f` to every named object of every model, batching texture
    /// uploads per model. Returns how many objects changed.
    fn update_objects<F>(&mut self, view: usize, ids: &[&str], mut f: F) -> Result<usize>
    where
        F: FnMut(&mut ObjectMut<'_>) -> Result<bool>,
    {
        if !self.views.contains(view) {
            return Err(Error::UnknownView(view));
        }
        let mut changed = 0;
        let mut found = vec![false; ids.len()];
        for model in self.models.values_mut().filter(|m| !m.is_destroyed()) {
            model.begin_deferred_flags();
            let mut outcome = Ok(());
            for (i, id) in ids.iter().enumerate() {
                let Some(mut object) = model.object_mut(id) else {
                    continue;
                };
                found[i] = true;
                match f(&mut object) {
                    Ok(true) => changed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }
            model.commit_deferred_flags()?;
            outcome?;
        }
        if let Some(i) = found.iter().position(|f| !f) {
            return Err(Error::UnknownObject(ids[i].to_string()));
        }
        Ok(changed)
    }

    pub fn set_objects_visible(
        &mut self,
        view: usize,
        ids: &[&str],
        visible: bool,
    ) -> Result<usize> {
        self.update_objects(view, ids, |o| o.set_visible(view, visible))
    }

    pub fn set_objects_culled(&mut self, view: usize, ids: &[&str], culled: bool) -> Result<usize> {
        self.update_objects(view, ids, |o| o.set_culled(view, culled))
    }

    pub fn set_objects_pickable(
        &mut self,
        view: usize,
        ids: &[&str],
        pickable: bool,
    ) -> Result<usize> {
        self.update_objects(view, ids, |o| o.set_pickable(view, pickable))
    }

    pub fn set_objects_selected(
        &mut self,
        view: usize,
        ids: &[&str],
        selected: bool,
    ) -> Result<usize> {
        self.update_objects(view, ids, |o| o.set_selected(view, selected))
    }

    pub fn set_objects_highlighted(
        &mut self,
        view: usize,
        ids: &[&str],
        highlighted: bool,
    ) -> Result<usize> {
        self.update_objects(view, ids, |o| o.set_highlighted(view, highlighted))
    }

    pub fn set_objects_xrayed(&mut self, view: usize, ids: &[&str], xrayed: bool) -> Result<usize> {
        self.update_objects(view, ids, |o| o.set_xrayed(view, xrayed))
    }

    pub fn set_objects_edges(&mut self, view: usize, ids: &[&str], edges: bool) -> Result<usize> {
        self.update_objects(view, ids, |o| o.set_edges(view, edges))
    }

    pub fn set_objects_colorized(
        &mut self,
        view: usize,
        ids: &[&str],
        rgb: Option<[f32; 3]>,
    ) -> Result<usize> {
        self.update_objects(view, ids, |o| o.set_colorize(view, rgb))
    }

    pub fn set_objects_opacity(
        &mut self,
        view: usize,
        ids: &[&str],
        opacity: Option<f32>,
    ) -> Result<usize> {
        self.update_objects(view, ids, |o| o.set_opacity(view, opacity))
    }

    pub fn set_objects_offset(
        &mut self,
        view: usize,
        ids: &[&str],
        offset: [f32; 3],
    ) -> Result<usize> {
        self.update_objects(view, ids, |o| o.set_offset(view, offset))
    }

    // ---- frames ----

    /// Draw a view if anything it shows changed since its last frame.
    ///
    /// Returns `None` when the view was clean.
    pub fn render(&mut self, slot: usize) -> Result<Option<FrameStats>> {
        let view = self.views.get_mut(slot).ok_or(Error::UnknownView(slot))?;
        let mut dirty = view.needs_render();
        for model in self.models.values_mut() {
            dirty |= model.take_needs_render(slot);
        }
        if !dirty {
            return Ok(None);
        }
        let cache = self
            .caches
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(Error::UnknownView(slot))?;
        if view.needs_rebuild() {
            cache.on_view_compiled(&view.shader_config());
            view.programs_rebuilt();
        }
        let layers = self
            .models
            .values()
            .flat_map(|m| m.layers().iter());
        let stats = render_view(&*self.gpu, slot, view, cache, layers);
        view.frame_rendered();
        if stats.skipped_programs > 0 {
            tracing::warn!(
                slot,
                skipped = stats.skipped_programs,
                "passes skipped after shader compile errors"
            );
        }
        Ok(Some(stats))
    }

    /// Render every dirty view.
    pub fn render_all(&mut self) -> Result<Vec<(usize, FrameStats)>> {
        let mut frames = Vec::new();
        for slot in self.views.active_slots() {
            if let Some(stats) = self.render(slot)? {
                frames.push((slot, stats));
            }
        }
        Ok(frames)
    }

    /// Resolve the canvas pixel `(x, y)` of a view to a mesh and object.
    pub fn pick(&mut self, slot: usize, x: u32, y: u32) -> Result<Option<PickResult>> {
        let view = self.views.get(slot).ok_or(Error::UnknownView(slot))?;
        let cache = self
            .caches
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(Error::UnknownView(slot))?;

        // Pick id 0 is the background
        let mut owners: Vec<(ModelKey, usize)> = Vec::new();
        let mut layers: Vec<(u16, &Layer)> = Vec::new();
        'models: for (key, model) in &self.models {
            for (index, layer) in model.layers().iter().enumerate() {
                if !layer.is_built() || layer.is_empty() {
                    continue;
                }
                let Ok(pick_id) = u16::try_from(owners.len() + 1) else {
                    tracing::warn!("more pickable layers than pick ids; ignoring the rest");
                    break 'models;
                };
                owners.push((key, index));
                layers.push((pick_id, layer));
            }
        }

        let Some((pick_id, mesh_index)) =
            pick_view(&*self.gpu, slot, view, cache, &layers, x, y)
        else {
            return Ok(None);
        };
        let Some(&(key, layer)) = (pick_id as usize)
            .checked_sub(1)
            .and_then(|i| owners.get(i))
        else {
            return Ok(None);
        };
        let model = &self.models[key];
        let Some(mesh) = model.mesh_at(layer, u32::from(mesh_index)) else {
            return Ok(None);
        };
        Ok(Some(PickResult {
            model: key,
            model_id: model.id().to_string(),
            object_id: model.object_of(mesh).map(|o| o.id().to_string()),
            mesh_id: mesh.id().to_string(),
        }))
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        for model in self.models.values_mut() {
            model.destroy();
        }
        for cache in self.caches.iter_mut().flatten() {
            cache.on_view_destroyed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::RecordingGpu;
    use crate::scene::{MeshParams, ObjectParams};
    use strata_geometry::{GeometrySource, PrimitiveType};

    fn viewer(gpu: &Rc<RecordingGpu>) -> Viewer {
        Viewer::new(gpu.clone(), StrataConfig::default()).unwrap()
    }

    fn add_box_model(viewer: &mut Viewer, id: &str) -> ModelKey {
        let key = viewer.create_model(id).unwrap();
        let model = viewer.model_mut(key).unwrap();
        let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        model
            .create_geometry(
                "quad",
                PrimitiveType::Triangles,
                &GeometrySource {
                    positions: &positions,
                    indices: &[0, 1, 2, 0, 2, 3],
                    ..Default::default()
                },
            )
            .unwrap();
        model.create_mesh(&MeshParams::new("m", "quad")).unwrap();
        model
            .create_object(&ObjectParams {
                id: "obj",
                mesh_ids: &["m"],
                view_layer: None,
            })
            .unwrap();
        model.build().unwrap();
        key
    }

    #[test]
    fn test_render_is_dirty_driven() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut viewer = viewer(&gpu);
        let view = viewer.create_view(100, 100).unwrap();
        add_box_model(&mut viewer, "a");

        let first = viewer.render(view).unwrap().unwrap();
        assert!(first.draw_calls > 0);
        assert!(viewer.render(view).unwrap().is_none());

        viewer.set_objects_selected(view, &["obj"], true).unwrap();
        assert!(viewer.render(view).unwrap().is_some());
    }

    #[test]
    fn test_unknown_object_reported() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut viewer = viewer(&gpu);
        let view = viewer.create_view(100, 100).unwrap();
        add_box_model(&mut viewer, "a");
        let err = viewer
            .set_objects_visible(view, &["obj", "nope"], false)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownObject(ref id) if id == "nope"));
    }

    #[test]
    fn test_duplicate_model_id() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut viewer = viewer(&gpu);
        viewer.create_model("a").unwrap();
        assert!(matches!(
            viewer.create_model("a"),
            Err(Error::DuplicateId { kind: "model", .. })
        ));
    }

    #[test]
    fn test_section_planes_invalidate_cache() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut viewer = viewer(&gpu);
        let view = viewer.create_view(100, 100).unwrap();
        add_box_model(&mut viewer, "a");
        viewer.render(view).unwrap();
        let before = viewer.renderer_cache(view).unwrap().hash().map(str::to_string);

        viewer
            .set_section_planes(
                view,
                vec![SectionPlane {
                    pos: [0.5, 0.0, 0.0],
                    dir: [1.0, 0.0, 0.0],
                    active: true,
                }],
            )
            .unwrap();
        assert_eq!(
            viewer.renderer_cache(view).unwrap().state(),
            crate::renderer::CacheState::Invalid
        );
        viewer.render(view).unwrap();
        let after = viewer.renderer_cache(view).unwrap().hash().map(str::to_string);
        assert_ne!(before, after);
    }
}
