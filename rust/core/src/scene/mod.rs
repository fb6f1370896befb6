// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scene models: the geometries, meshes and objects of one loaded file
//!
//! A model is filled while building (`create_geometry*`, `create_mesh`,
//! `create_object`) and frozen by `build()`. Object state is kept per view
//! slot and pushed into the layers each mesh was placed in.

mod mesh;
mod object;
mod traits;

pub use mesh::{MeshParams, SceneMesh};
pub use object::{ObjectViewState, SceneObject};
pub use traits::{MeshMut, ObjectMut, RendererMesh, RendererModel, RendererObject};

use crate::allocator::{AllocatorStats, LayerAllocator};
use crate::config::StrataConfig;
use crate::flags::RenderFlags;
use crate::gpu::GpuBackend;
use crate::layer::{Layer, LayerMeshParams};
use crate::{Error, Result};
use mesh::unit_to_u8;
use nalgebra::{Matrix4, Vector3};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use strata_geometry::{Aabb, CompressedGeometry, GeometrySource, PrimitiveType, RtcOrigin};

/// Parameters for [`SceneModel::create_object`]
#[derive(Debug, Clone, Default)]
pub struct ObjectParams<'a> {
    pub id: &'a str,
    pub mesh_ids: &'a [&'a str],
    /// Grouping key, such as a storey or discipline
    pub view_layer: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelState {
    Building,
    Built,
    Destroyed,
}

/// Which parts of an object's state differ between two snapshots
struct StateDiff {
    flags: bool,
    color: bool,
    offset: bool,
}

impl StateDiff {
    fn between(old: &ObjectViewState, new: &ObjectViewState) -> Self {
        Self {
            flags: old.flags != new.flags || old.opacity != new.opacity,
            color: old.colorize != new.colorize || old.opacity != new.opacity,
            offset: old.offset != new.offset,
        }
    }
}

pub struct SceneModel {
    id: String,
    config: StrataConfig,
    allocator: LayerAllocator,
    geometries: FxHashMap<String, Arc<CompressedGeometry>>,
    meshes: Vec<SceneMesh>,
    mesh_ids: FxHashMap<String, usize>,
    objects: Vec<SceneObject>,
    object_ids: FxHashMap<String, usize>,
    view_slots: SmallVec<[usize; 4]>,
    aabb: Aabb,
    state: ModelState,
    deferred: bool,
    /// Bit per view slot with changes not yet rendered
    dirty_views: u32,
}

impl fmt::Debug for SceneModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneModel")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("geometries", &self.geometries.len())
            .field("meshes", &self.meshes.len())
            .field("objects", &self.objects.len())
            .field("layers", &self.allocator.layers().len())
            .finish_non_exhaustive()
    }
}

impl SceneModel {
    /// Create an empty model tracking state for `view_slots`.
    pub fn new(
        id: impl Into<String>,
        gpu: Rc<dyn GpuBackend>,
        config: &StrataConfig,
        view_slots: &[usize],
    ) -> Self {
        Self {
            id: id.into(),
            config: config.clone(),
            allocator: LayerAllocator::from_config(gpu, config),
            geometries: FxHashMap::default(),
            meshes: Vec::new(),
            mesh_ids: FxHashMap::default(),
            objects: Vec::new(),
            object_ids: FxHashMap::default(),
            view_slots: view_slots.iter().copied().collect(),
            aabb: Aabb::empty(),
            state: ModelState::Building,
            deferred: false,
            dirty_views: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_built(&self) -> bool {
        self.state == ModelState::Built
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == ModelState::Destroyed
    }

    /// World-space bounds of every mesh
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn num_geometries(&self) -> usize {
        self.geometries.len()
    }

    pub fn num_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn num_layers(&self) -> usize {
        self.allocator.layers().len()
    }

    pub fn num_vertices(&self) -> usize {
        self.allocator.stats().vertices
    }

    pub fn stats(&self) -> AllocatorStats {
        self.allocator.stats()
    }

    pub fn layers(&self) -> &[Layer] {
        self.allocator.layers()
    }

    pub fn view_slots(&self) -> &[usize] {
        &self.view_slots
    }

    pub fn geometry(&self, id: &str) -> Option<&Arc<CompressedGeometry>> {
        self.geometries.get(id)
    }

    pub fn mesh(&self, id: &str) -> Option<&SceneMesh> {
        self.mesh_ids.get(id).map(|&i| &self.meshes[i])
    }

    pub fn meshes(&self) -> &[SceneMesh] {
        &self.meshes
    }

    pub fn object(&self, id: &str) -> Option<&SceneObject> {
        self.object_ids.get(id).map(|&i| &self.objects[i])
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    /// Objects sharing a view layer
    pub fn objects_in_view_layer<'a>(
        &'a self,
        view_layer: &'a str,
    ) -> impl Iterator<Item = &'a SceneObject> + 'a {
        self.objects
            .iter()
            .filter(move |o| o.view_layer.as_deref() == Some(view_layer))
    }

    pub fn object_mut(&mut self, id: &str) -> Option<ObjectMut<'_>> {
        let index = *self.object_ids.get(id)?;
        Some(ObjectMut { model: self, index })
    }

    pub fn mesh_mut(&mut self, id: &str) -> Option<MeshMut<'_>> {
        let index = *self.mesh_ids.get(id)?;
        Some(MeshMut { model: self, index })
    }

    /// Mesh drawn at `mesh_index` of layer `layer`, as reported by picking
    pub fn mesh_at(&self, layer: usize, mesh_index: u32) -> Option<&SceneMesh> {
        let tag = self.allocator.layer(layer)?.mesh_tag(mesh_index)?;
        self.meshes.get(tag as usize)
    }

    /// Object owning a mesh
    pub fn object_of(&self, mesh: &SceneMesh) -> Option<&SceneObject> {
        mesh.object.map(|i| &self.objects[i])
    }

    /// Whether anything visible in `view` changed since it was last rendered
    pub fn needs_render(&self, view: usize) -> bool {
        view < 32 && self.dirty_views & (1 << view) != 0
    }

    pub(crate) fn take_needs_render(&mut self, view: usize) -> bool {
        let dirty = self.needs_render(view);
        if dirty {
            self.dirty_views &= !(1 << view);
        }
        dirty
    }

    fn mark_dirty(&mut self, view: usize) {
        if view < 32 {
            self.dirty_views |= 1 << view;
        }
    }

    fn mark_all_dirty(&mut self) {
        for i in 0..self.view_slots.len() {
            self.mark_dirty(self.view_slots[i]);
        }
    }

    fn check_building(&self) -> Result<()> {
        match self.state {
            ModelState::Building => Ok(()),
            ModelState::Built => Err(Error::already_built(format!("model {}", self.id))),
            ModelState::Destroyed => Err(Error::destroyed(format!("model {}", self.id))),
        }
    }

    fn check_live(&self) -> Result<()> {
        if self.state == ModelState::Destroyed {
            return Err(Error::destroyed(format!("model {}", self.id)));
        }
        Ok(())
    }

    /// Quantize and bucket uncompressed geometry.
    pub fn create_geometry(
        &mut self,
        id: &str,
        primitive: PrimitiveType,
        source: &GeometrySource<'_>,
    ) -> Result<()> {
        self.check_building()?;
        if self.geometries.contains_key(id) {
            return Err(Error::DuplicateId {
                kind: "geometry",
                id: id.to_string(),
            });
        }
        let geometry = CompressedGeometry::compress(
            id,
            primitive,
            source,
            self.config.max_bucket_vertices,
            self.config.edge_threshold,
        )?;
        self.geometries.insert(id.to_string(), Arc::new(geometry));
        Ok(())
    }

    /// Register geometry whose buckets were quantized elsewhere.
    pub fn create_geometry_compressed(&mut self, geometry: CompressedGeometry) -> Result<()> {
        self.check_building()?;
        if self.geometries.contains_key(geometry.id()) {
            return Err(Error::DuplicateId {
                kind: "geometry",
                id: geometry.id().to_string(),
            });
        }
        self.geometries
            .insert(geometry.id().to_string(), Arc::new(geometry));
        Ok(())
    }

    /// Place a mesh instancing a registered geometry.
    ///
    /// The mesh is invisible until an object claims it. Returns its index
    /// in [`SceneModel::meshes`].
    pub fn create_mesh(&mut self, params: &MeshParams<'_>) -> Result<usize> {
        self.check_building()?;
        if self.mesh_ids.contains_key(params.id) {
            return Err(Error::DuplicateId {
                kind: "mesh",
                id: params.id.to_string(),
            });
        }
        let geometry = self
            .geometries
            .get(params.geometry_id)
            .cloned()
            .ok_or_else(|| Error::UnknownGeometry(params.geometry_id.to_string()))?;

        let (origin, matrix) = match params.origin {
            Some(origin) => (origin, params.matrix),
            None => {
                let world = geometry.aabb().transform(&params.matrix);
                let origin = RtcOrigin::tile_for(world.center(), self.config.rtc_cell_size);
                (origin, translation(&origin, -1.0) * params.matrix)
            }
        };
        let aabb = geometry
            .aabb()
            .transform(&(translation(&origin, 1.0) * matrix));

        let index = self.meshes.len();
        let color = params.color.map(unit_to_u8);
        let opacity = unit_to_u8(params.opacity);
        let metallic = unit_to_u8(params.metallic);
        let roughness = unit_to_u8(params.roughness);
        let placement = self.allocator.place(
            &geometry,
            origin,
            &LayerMeshParams {
                geometry_id: params.geometry_id,
                matrix,
                color,
                opacity,
                metallic,
                roughness,
                view_matrix_index: 0,
                tag: index as u32,
            },
            &self.view_slots,
        )?;

        self.meshes.push(SceneMesh {
            id: params.id.to_string(),
            geometry_id: params.geometry_id.to_string(),
            layer: placement.layer,
            mesh_index: placement.mesh_index,
            origin,
            matrix,
            aabb,
            color,
            opacity,
            metallic,
            roughness,
            object: None,
        });
        self.mesh_ids.insert(params.id.to_string(), index);
        self.aabb.expand_aabb(&aabb);
        Ok(index)
    }

    /// Group meshes into an object. Each view starts it visible, pickable,
    /// clippable and collidable.
    pub fn create_object(&mut self, params: &ObjectParams<'_>) -> Result<usize> {
        self.check_building()?;
        if self.object_ids.contains_key(params.id) {
            return Err(Error::DuplicateId {
                kind: "object",
                id: params.id.to_string(),
            });
        }
        let mut meshes: SmallVec<[usize; 2]> = SmallVec::new();
        for &mesh_id in params.mesh_ids {
            let m = *self
                .mesh_ids
                .get(mesh_id)
                .ok_or_else(|| Error::UnknownMesh(mesh_id.to_string()))?;
            let owner = match self.meshes[m].object {
                Some(o) => Some(self.objects[o].id.clone()),
                None if meshes.contains(&m) => Some(params.id.to_string()),
                None => None,
            };
            if let Some(object) = owner {
                return Err(Error::MeshAlreadyOwned {
                    mesh: mesh_id.to_string(),
                    object,
                });
            }
            meshes.push(m);
        }

        let index = self.objects.len();
        let mut aabb = Aabb::empty();
        for &m in &meshes {
            self.meshes[m].object = Some(index);
            aabb.expand_aabb(&self.meshes[m].aabb);
        }
        let mut object = SceneObject {
            id: params.id.to_string(),
            meshes,
            aabb,
            view_layer: params.view_layer.map(str::to_string),
            views: Vec::new(),
        };
        for &slot in &self.view_slots {
            object.add_view(slot);
        }
        self.objects.push(object);
        self.object_ids.insert(params.id.to_string(), index);

        for i in 0..self.view_slots.len() {
            let slot = self.view_slots[i];
            for k in 0..self.objects[index].meshes.len() {
                let m = self.objects[index].meshes[k];
                self.refresh_mesh(m, slot)?;
            }
        }
        Ok(index)
    }

    /// Build every layer. The model's shape is frozen afterwards.
    pub fn build(&mut self) -> Result<()> {
        self.check_building()?;
        self.allocator.build_all()?;
        self.state = ModelState::Built;
        let orphans = self.meshes.iter().filter(|m| m.object.is_none()).count();
        if orphans > 0 {
            tracing::warn!(
                model = %self.id,
                orphans,
                "meshes without an object are never drawn"
            );
        }
        let stats = self.allocator.stats();
        tracing::debug!(
            model = %self.id,
            layers = stats.layers,
            meshes = stats.meshes,
            vertices = stats.vertices,
            objects = self.objects.len(),
            "model built"
        );
        self.mark_all_dirty();
        Ok(())
    }

    /// Release every layer. Safe to call before `build()` and more than once.
    pub fn destroy(&mut self) {
        if self.state == ModelState::Destroyed {
            return;
        }
        self.allocator.destroy_all();
        self.state = ModelState::Destroyed;
        self.geometries.clear();
        self.mark_all_dirty();
        tracing::debug!(model = %self.id, "model destroyed");
    }

    /// Start tracking a view slot; every object starts in its initial state.
    pub fn register_view(&mut self, slot: usize) -> Result<()> {
        self.check_live()?;
        if self.view_slots.contains(&slot) {
            return Ok(());
        }
        self.allocator.register_view(slot)?;
        self.view_slots.push(slot);
        for object in &mut self.objects {
            object.add_view(slot);
        }
        let batch = !self.deferred;
        if batch {
            self.allocator.begin_deferred_flags();
        }
        for m in 0..self.meshes.len() {
            self.refresh_mesh(m, slot)?;
        }
        if batch {
            self.allocator.commit_deferred_flags()?;
        }
        self.mark_dirty(slot);
        Ok(())
    }

    pub fn release_view(&mut self, slot: usize) {
        self.allocator.release_view(slot);
        self.view_slots.retain(|s| *s != slot);
        for object in &mut self.objects {
            object.remove_view(slot);
        }
        if slot < 32 {
            self.dirty_views &= !(1 << slot);
        }
    }

    /// Hold texture uploads until `commit_deferred_flags`.
    pub fn begin_deferred_flags(&mut self) {
        self.deferred = true;
        self.allocator.begin_deferred_flags();
    }

    /// Returns the number of texture uploads issued.
    pub fn commit_deferred_flags(&mut self) -> Result<usize> {
        self.deferred = false;
        self.allocator.commit_deferred_flags()
    }

    fn object_state(&self, object: usize, view: usize) -> Result<ObjectViewState> {
        self.objects[object]
            .view_state(view)
            .copied()
            .ok_or(Error::UnknownView(view))
    }

    /// State a mesh should show in `view`; meshes without an object stay
    /// hidden.
    fn mesh_view_state(&self, mesh: usize, view: usize) -> ObjectViewState {
        self.meshes[mesh]
            .object
            .and_then(|o| self.objects[o].view_state(view).copied())
            .unwrap_or(ObjectViewState {
                flags: RenderFlags::empty(),
                ..Default::default()
            })
    }

    fn layer_of(&mut self, mesh: usize) -> Result<(&mut Layer, u32)> {
        let mesh = &self.meshes[mesh];
        let layer = self
            .allocator
            .layer_mut(mesh.layer)
            .ok_or_else(|| Error::UnknownMesh(mesh.id.clone()))?;
        Ok((layer, mesh.mesh_index))
    }

    /// Push a mesh's complete state for one view into its layer.
    fn refresh_mesh(&mut self, mesh: usize, view: usize) -> Result<()> {
        let state = self.mesh_view_state(mesh, view);
        self.push_mesh_state(
            mesh,
            view,
            &state,
            &StateDiff {
                flags: true,
                color: true,
                offset: true,
            },
        )
    }

    fn push_mesh_state(
        &mut self,
        mesh: usize,
        view: usize,
        state: &ObjectViewState,
        diff: &StateDiff,
    ) -> Result<()> {
        let SceneMesh { color, opacity, .. } = self.meshes[mesh];
        let transparent = state.is_transparent(opacity);
        let (layer, mesh_index) = self.layer_of(mesh)?;
        if diff.flags {
            layer.set_mesh_flags(view, mesh_index, state.flags, transparent)?;
        }
        if diff.color {
            layer.set_mesh_color(view, mesh_index, state.mesh_rgba(color, opacity))?;
        }
        if diff.offset {
            layer.set_mesh_offset(view, mesh_index, state.offset)?;
        }
        Ok(())
    }

    /// Store an object's new state for a view and propagate it to every
    /// mesh. Returns false when nothing changed.
    fn apply_object_state(
        &mut self,
        object: usize,
        view: usize,
        new: ObjectViewState,
    ) -> Result<bool> {
        self.check_live()?;
        let old = self.object_state(object, view)?;
        if old == new {
            return Ok(false);
        }
        if let Some(slot) = self.objects[object].views.get_mut(view) {
            *slot = Some(new);
        }
        let diff = StateDiff::between(&old, &new);
        let meshes = self.objects[object].meshes.clone();
        for m in meshes {
            self.push_mesh_state(m, view, &new, &diff)?;
        }
        self.mark_dirty(view);
        Ok(true)
    }

    pub(crate) fn set_object_flag(
        &mut self,
        object: usize,
        view: usize,
        flag: RenderFlags,
        value: bool,
    ) -> Result<bool> {
        let mut state = self.object_state(object, view)?;
        if state.flags.contains(flag) == value {
            return Ok(false);
        }
        state.flags.set(flag, value);
        self.apply_object_state(object, view, state)
    }

    pub(crate) fn set_object_colorize(
        &mut self,
        object: usize,
        view: usize,
        rgb: Option<[f32; 3]>,
    ) -> Result<bool> {
        let mut state = self.object_state(object, view)?;
        state.colorize = rgb.map(|c| c.map(unit_to_u8));
        self.apply_object_state(object, view, state)
    }

    pub(crate) fn set_object_opacity(
        &mut self,
        object: usize,
        view: usize,
        opacity: Option<f32>,
    ) -> Result<bool> {
        let mut state = self.object_state(object, view)?;
        state.opacity = opacity.map(unit_to_u8);
        self.apply_object_state(object, view, state)
    }

    pub(crate) fn set_object_offset(
        &mut self,
        object: usize,
        view: usize,
        offset: [f32; 3],
    ) -> Result<bool> {
        let mut state = self.object_state(object, view)?;
        state.offset = offset;
        self.apply_object_state(object, view, state)
    }

    pub(crate) fn set_mesh_matrix(&mut self, mesh: usize, matrix: &Matrix4<f64>) -> Result<()> {
        self.check_live()?;
        let (layer, mesh_index) = self.layer_of(mesh)?;
        layer.set_mesh_matrix(mesh_index, matrix)?;

        let geometry_aabb = self
            .geometries
            .get(&self.meshes[mesh].geometry_id)
            .map(|g| *g.aabb());
        let entry = &mut self.meshes[mesh];
        entry.matrix = *matrix;
        if let Some(local) = geometry_aabb {
            entry.aabb = local.transform(&(translation(&entry.origin, 1.0) * matrix));
        }
        if let Some(o) = entry.object {
            let mut aabb = Aabb::empty();
            for &m in &self.objects[o].meshes {
                aabb.expand_aabb(&self.meshes[m].aabb);
            }
            self.objects[o].aabb = aabb;
        }
        self.aabb = self
            .meshes
            .iter()
            .fold(Aabb::empty(), |mut acc, m| {
                acc.expand_aabb(&m.aabb);
                acc
            });
        self.mark_all_dirty();
        Ok(())
    }

    pub(crate) fn set_mesh_color(&mut self, mesh: usize, rgb: [f32; 3]) -> Result<()> {
        self.check_live()?;
        self.meshes[mesh].color = rgb.map(unit_to_u8);
        self.refresh_mesh_views(mesh, false)
    }

    pub(crate) fn set_mesh_opacity(&mut self, mesh: usize, opacity: f32) -> Result<()> {
        self.check_live()?;
        self.meshes[mesh].opacity = unit_to_u8(opacity);
        self.refresh_mesh_views(mesh, true)
    }

    /// Re-push a mesh's color, and its flags when transparency may have
    /// changed, in every view.
    fn refresh_mesh_views(&mut self, mesh: usize, flags: bool) -> Result<()> {
        let diff = StateDiff {
            flags,
            color: true,
            offset: false,
        };
        for i in 0..self.view_slots.len() {
            let view = self.view_slots[i];
            let state = self.mesh_view_state(mesh, view);
            self.push_mesh_state(mesh, view, &state, &diff)?;
            self.mark_dirty(view);
        }
        Ok(())
    }

    pub(crate) fn set_mesh_material(
        &mut self,
        mesh: usize,
        metallic: Option<f32>,
        roughness: Option<f32>,
    ) -> Result<()> {
        self.check_live()?;
        let (layer, mesh_index) = self.layer_of(mesh)?;
        if let Some(metallic) = metallic.map(unit_to_u8) {
            layer.set_mesh_metallic(mesh_index, metallic)?;
            self.meshes[mesh].metallic = metallic;
        }
        let (layer, mesh_index) = self.layer_of(mesh)?;
        if let Some(roughness) = roughness.map(unit_to_u8) {
            layer.set_mesh_roughness(mesh_index, roughness)?;
            self.meshes[mesh].roughness = roughness;
        }
        self.mark_all_dirty();
        Ok(())
    }

    pub(crate) fn set_mesh_view_matrix_index(&mut self, mesh: usize, index: u32) -> Result<()> {
        self.check_live()?;
        let (layer, mesh_index) = self.layer_of(mesh)?;
        layer.set_mesh_view_matrix_index(mesh_index, index)?;
        self.mark_all_dirty();
        Ok(())
    }
}

impl RendererModel for SceneModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn aabb(&self) -> Aabb {
        self.aabb
    }

    fn is_built(&self) -> bool {
        SceneModel::is_built(self)
    }

    fn build(&mut self) -> Result<()> {
        SceneModel::build(self)
    }

    fn destroy(&mut self) {
        SceneModel::destroy(self)
    }

    fn begin_deferred_flags(&mut self) {
        SceneModel::begin_deferred_flags(self)
    }

    fn commit_deferred_flags(&mut self) -> Result<usize> {
        SceneModel::commit_deferred_flags(self)
    }
}

/// Translation by `sign * origin`
fn translation(origin: &RtcOrigin, sign: f64) -> Matrix4<f64> {
    Matrix4::new_translation(&Vector3::new(
        sign * origin.x,
        sign * origin.y,
        sign * origin.z,
    ))
}
