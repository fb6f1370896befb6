// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layers: batches of meshes sharing one set of data textures
//!
//! A layer holds meshes of a single primitive type around a single RTC
//! origin. Geometry vertices are uploaded once per layer and shared by every
//! mesh instancing them; each mesh gets one slot per geometry bucket, and its
//! primitives are appended to the index textures of the bucket's width.
//!
//! Lifecycle: meshes are added while building, `build()` lays out and
//! uploads every texture, after which only state setters are accepted.
//! `destroy()` releases all GPU resources.

mod counts;
mod draw;
mod setters;
mod textures;

pub use counts::MeshCounts;

use crate::flags::{MeshState, RenderPass};
use crate::gpu::GpuBackend;
use crate::{Error, Result};
use nalgebra::Matrix4;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;
use std::sync::Arc;
use strata_geometry::{CompressedGeometry, IndexWidth, PrimitiveType, RtcOrigin};
use textures::{matrix_texels, IndexClass, LayerBuffers, LayerTextures, ViewTextures};

/// Per-layer budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerCapacity {
    pub max_vertices: usize,
    /// Primitives (and, separately, edges) per index width
    pub max_primitives: usize,
    pub max_slots: usize,
    pub max_meshes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayerState {
    Building,
    Built,
    Destroyed,
}

/// A mesh to add to a layer; its geometry must already be in the layer
#[derive(Debug, Clone)]
pub struct LayerMeshParams<'a> {
    pub geometry_id: &'a str,
    /// Modeling matrix, relative to the layer origin
    pub matrix: Matrix4<f64>,
    pub color: [u8; 3],
    pub opacity: u8,
    pub metallic: u8,
    pub roughness: u8,
    /// Entry of the view-matrix uniform array the mesh is drawn with
    pub view_matrix_index: u32,
    /// Caller's handle for the mesh, returned by picking
    pub tag: u32,
}

#[derive(Debug)]
struct PlacedGeometry {
    geometry: Arc<CompressedGeometry>,
    decode_index: u32,
    /// Vertex base of each bucket
    vertex_bases: SmallVec<[u32; 1]>,
}

#[derive(Debug, Clone)]
struct LayerMesh {
    slots: Range<u32>,
    matrix: Matrix4<f64>,
    color: [u8; 3],
    opacity: u8,
    metallic: u8,
    roughness: u8,
    tag: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotInfo {
    vertex_base: u32,
    mesh_index: u32,
    decode_index: u32,
    view_matrix_index: u32,
}

impl SlotInfo {
    fn texel(&self) -> [u32; 4] {
        [
            self.vertex_base,
            self.mesh_index,
            self.decode_index,
            self.view_matrix_index,
        ]
    }
}

/// Mesh state of one view
#[derive(Debug)]
struct LayerView {
    counts: MeshCounts,
    states: Vec<MeshState>,
    colors: Vec<[u8; 4]>,
    offsets: Vec<[f32; 3]>,
    textures: Option<ViewTextures>,
}

pub struct Layer {
    id: u32,
    primitive: PrimitiveType,
    origin: RtcOrigin,
    capacity: LayerCapacity,
    row: u32,
    gpu: Rc<dyn GpuBackend>,
    state: LayerState,
    deferred: bool,

    positions: Vec<u16>,
    num_vertices: usize,
    geometries: FxHashMap<String, PlacedGeometry>,
    decode_matrices: Vec<Matrix4<f64>>,
    slots: Vec<SlotInfo>,
    meshes: Vec<LayerMesh>,
    primitives: [IndexClass; 3],
    edges: [IndexClass; 3],
    /// Indexed by view slot
    views: Vec<Option<LayerView>>,
    textures: Option<LayerTextures>,
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("primitive", &self.primitive)
            .field("origin", &self.origin)
            .field("state", &self.state)
            .field("num_vertices", &self.num_vertices)
            .field("num_meshes", &self.meshes.len())
            .finish_non_exhaustive()
    }
}

impl Layer {
    /// Create an empty layer with state for each registered view slot.
    pub fn new(
        id: u32,
        primitive: PrimitiveType,
        origin: RtcOrigin,
        capacity: LayerCapacity,
        texture_width: u32,
        gpu: Rc<dyn GpuBackend>,
        view_slots: &[usize],
    ) -> Self {
        let mut layer = Self {
            id,
            primitive,
            origin,
            capacity,
            row: texture_width,
            gpu,
            state: LayerState::Building,
            deferred: false,
            positions: Vec::new(),
            num_vertices: 0,
            geometries: FxHashMap::default(),
            decode_matrices: Vec::new(),
            slots: Vec::new(),
            meshes: Vec::new(),
            primitives: Default::default(),
            edges: Default::default(),
            views: Vec::new(),
            textures: None,
        };
        for &slot in view_slots {
            layer.views_resize(slot);
            layer.views[slot] = Some(layer.empty_view());
        }
        layer
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn primitive(&self) -> PrimitiveType {
        self.primitive
    }

    pub fn origin(&self) -> RtcOrigin {
        self.origin
    }

    pub fn capacity(&self) -> &LayerCapacity {
        &self.capacity
    }

    pub fn is_built(&self) -> bool {
        self.state == LayerState::Built
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == LayerState::Destroyed
    }

    /// True when no mesh was ever added
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn num_meshes(&self) -> usize {
        self.meshes.len()
    }

    /// Vertices uploaded, counting each geometry once
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Primitives per index width, before build
    pub fn num_primitives(&self, width: IndexWidth) -> usize {
        self.primitives[width.slot()].len()
    }

    pub fn has_geometry(&self, geometry_id: &str) -> bool {
        self.geometries.contains_key(geometry_id)
    }

    pub fn mesh_counts(&self, view: usize) -> Option<&MeshCounts> {
        self.view(view).map(|v| &v.counts)
    }

    /// Whether drawing `pass` for `view` could produce any fragment
    pub fn has_work(&self, view: usize, pass: RenderPass) -> bool {
        self.state == LayerState::Built
            && self.view(view).is_some_and(|v| v.counts.has_work(pass))
    }

    pub fn mesh_state(&self, view: usize, mesh: u32) -> Option<MeshState> {
        self.view(view)?.states.get(mesh as usize).copied()
    }

    pub fn mesh_tag(&self, mesh: u32) -> Option<u32> {
        self.meshes.get(mesh as usize).map(|m| m.tag)
    }

    pub fn mesh_slots(&self, mesh: u32) -> Option<Range<u32>> {
        self.meshes.get(mesh as usize).map(|m| m.slots.clone())
    }

    /// Vertex base, mesh index, decode index and view-matrix index of a slot
    pub fn slot_info(&self, slot: u32) -> Option<[u32; 4]> {
        self.slots.get(slot as usize).map(SlotInfo::texel)
    }

    /// The two flags texels of a mesh as uploaded, once built
    pub fn mesh_flags_texels(&self, view: usize, mesh: u32) -> Option<[[u8; 4]; 2]> {
        let texture = &self.view(view)?.textures.as_ref()?.flags;
        let color = texture.texel::<u8>(mesh as usize * 2)?;
        let passes = texture.texel::<u8>(mesh as usize * 2 + 1)?;
        Some([
            [color[0], color[1], color[2], color[3]],
            [passes[0], passes[1], passes[2], passes[3]],
        ])
    }

    /// Layers draw whole meshes; triangle-level picking is not supported.
    pub fn can_pick_triangle(&self) -> bool {
        false
    }

    /// Whether a mesh of `geometry` fits without exceeding any budget.
    pub fn can_create_mesh(&self, geometry: &CompressedGeometry) -> bool {
        self.check_fit(geometry).is_ok()
    }

    fn check_fit(&self, geometry: &CompressedGeometry) -> std::result::Result<(), String> {
        if self.state != LayerState::Building {
            return Err(format!("layer {} no longer accepts meshes", self.id));
        }
        if geometry.primitive() != self.primitive {
            return Err(format!(
                "{} geometry in a {} layer",
                geometry.primitive(),
                self.primitive
            ));
        }
        let cap = &self.capacity;
        let new_vertices = if self.has_geometry(geometry.id()) {
            0
        } else {
            geometry.num_vertices()
        };
        if self.num_vertices + new_vertices > cap.max_vertices {
            return Err(format!(
                "{} + {} vertices exceeds {}",
                self.num_vertices, new_vertices, cap.max_vertices
            ));
        }
        let primitives = geometry.primitives_by_width();
        let edges = geometry.edges_by_width();
        for width in IndexWidth::ALL {
            let s = width.slot();
            if self.primitives[s].len() + primitives[s] > cap.max_primitives {
                return Err(format!(
                    "{} + {} {}-bit primitives exceeds {}",
                    self.primitives[s].len(),
                    primitives[s],
                    width.bits(),
                    cap.max_primitives
                ));
            }
            if self.edges[s].len() + edges[s] > cap.max_primitives {
                return Err(format!(
                    "{} + {} {}-bit edges exceeds {}",
                    self.edges[s].len(),
                    edges[s],
                    width.bits(),
                    cap.max_primitives
                ));
            }
        }
        if self.slots.len() + geometry.buckets().len() > cap.max_slots {
            return Err(format!(
                "{} + {} slots exceeds {}",
                self.slots.len(),
                geometry.buckets().len(),
                cap.max_slots
            ));
        }
        if self.meshes.len() >= cap.max_meshes {
            return Err(format!("layer already holds {} meshes", self.meshes.len()));
        }
        Ok(())
    }

    fn check_building(&self) -> Result<()> {
        match self.state {
            LayerState::Building => Ok(()),
            LayerState::Built => Err(Error::already_built(format!("layer {}", self.id))),
            LayerState::Destroyed => Err(Error::destroyed(format!("layer {}", self.id))),
        }
    }

    /// Upload a geometry's vertices. Adding a geometry twice is a no-op.
    pub fn create_geometry_compressed(&mut self, geometry: Arc<CompressedGeometry>) -> Result<()> {
        self.check_building()?;
        if geometry.primitive() != self.primitive {
            return Err(Error::PrimitiveMismatch {
                expected: self.primitive,
                actual: geometry.primitive(),
            });
        }
        if self.has_geometry(geometry.id()) {
            return Ok(());
        }
        let needed = geometry.num_vertices();
        if self.num_vertices + needed > self.capacity.max_vertices {
            return Err(Error::CapacityExceeded {
                geometry: geometry.id().to_string(),
                reason: format!(
                    "{} + {} vertices exceeds {}",
                    self.num_vertices, needed, self.capacity.max_vertices
                ),
            });
        }

        let decode_index = self.decode_matrices.len() as u32;
        self.decode_matrices.push(*geometry.decode_matrix());
        let mut vertex_bases = SmallVec::new();
        for bucket in geometry.buckets() {
            vertex_bases.push(self.num_vertices as u32);
            self.positions.extend_from_slice(bucket.positions_compressed());
            self.num_vertices += bucket.num_vertices();
        }
        self.geometries.insert(
            geometry.id().to_string(),
            PlacedGeometry {
                geometry,
                decode_index,
                vertex_bases,
            },
        );
        Ok(())
    }

    /// Add a mesh instancing a geometry already in this layer.
    ///
    /// Returns the mesh index used by every per-mesh setter. The mesh starts
    /// with empty flags in every view.
    pub fn create_mesh(&mut self, params: &LayerMeshParams<'_>) -> Result<u32> {
        self.check_building()?;
        let placed = self
            .geometries
            .get(params.geometry_id)
            .ok_or_else(|| Error::UnknownGeometry(params.geometry_id.to_string()))?;
        let geometry = Arc::clone(&placed.geometry);
        let decode_index = placed.decode_index;
        let vertex_bases = placed.vertex_bases.clone();
        self.check_fit(&geometry)
            .map_err(|reason| Error::CapacityExceeded {
                geometry: geometry.id().to_string(),
                reason,
            })?;

        let mesh_index = self.meshes.len() as u32;
        let first_slot = self.slots.len() as u32;
        for (bucket, &vertex_base) in geometry.buckets().iter().zip(vertex_bases.iter()) {
            let slot = self.slots.len() as u32;
            self.slots.push(SlotInfo {
                vertex_base,
                mesh_index,
                decode_index,
                view_matrix_index: params.view_matrix_index,
            });

            let class = &mut self.primitives[bucket.index_width().slot()];
            let count = bucket.num_primitives(self.primitive);
            match bucket.indices() {
                Some(indices) => class.indices.extend(indices.iter()),
                None => class.indices.extend(0..count as u32),
            }
            class
                .prim_to_slot
                .extend(std::iter::repeat(slot as u16).take(count));

            if let Some(edges) = bucket.edge_indices() {
                let class = &mut self.edges[bucket.index_width().slot()];
                class.indices.extend(edges.iter());
                class
                    .prim_to_slot
                    .extend(std::iter::repeat(slot as u16).take(bucket.num_edges()));
            }
        }

        self.meshes.push(LayerMesh {
            slots: first_slot..self.slots.len() as u32,
            matrix: params.matrix,
            color: params.color,
            opacity: params.opacity,
            metallic: params.metallic,
            roughness: params.roughness,
            tag: params.tag,
        });
        let color = [params.color[0], params.color[1], params.color[2], params.opacity];
        for view in self.views.iter_mut().flatten() {
            let state = MeshState::default();
            view.counts.add_mesh(&state);
            view.states.push(state);
            view.colors.push(color);
            view.offsets.push([0.0; 3]);
        }
        Ok(mesh_index)
    }

    /// Lay out and upload all textures. Meshes can no longer be added.
    ///
    /// On failure nothing stays on the GPU and the layer is still building,
    /// so a retry fails the same way instead of drawing nothing.
    pub fn build(&mut self) -> Result<()> {
        self.check_building()?;
        if self.meshes.is_empty() {
            self.state = LayerState::Built;
            tracing::debug!(layer = self.id, "built empty layer");
            return Ok(());
        }

        let gpu = Rc::clone(&self.gpu);
        let buffers = LayerBuffers {
            positions: &self.positions,
            slot_info: self.slots.iter().flat_map(SlotInfo::texel).collect(),
            decode_matrices: self.decode_matrices.iter().flat_map(matrix_texels).collect(),
            mesh_matrices: self
                .meshes
                .iter()
                .flat_map(|m| matrix_texels(&m.matrix))
                .collect(),
            mesh_material: self
                .meshes
                .iter()
                .flat_map(|m| [m.metallic, m.roughness, 0, 0])
                .collect(),
            primitives: &self.primitives,
            edges: &self.edges,
            vertices_per_primitive: self.primitive.vertices_per_primitive(),
        };
        let mut textures = LayerTextures::build(buffers, self.row, &*gpu).map_err(|err| {
            tracing::warn!(layer = self.id, error = %err, "layer build failed");
            err
        })?;

        let mut built: Vec<(usize, ViewTextures)> = Vec::new();
        for (slot, view) in self.views.iter().enumerate() {
            let Some(view) = view else { continue };
            match ViewTextures::build(&view.states, &view.colors, &view.offsets, self.row, &*gpu) {
                Ok(view_textures) => built.push((slot, view_textures)),
                Err(err) => {
                    tracing::warn!(layer = self.id, view = slot, error = %err, "layer build failed");
                    textures.destroy(&*gpu);
                    for (_, mut view_textures) in built {
                        view_textures.destroy(&*gpu);
                    }
                    return Err(err);
                }
            }
        }

        self.textures = Some(textures);
        for (slot, view_textures) in built {
            if let Some(view) = self.views[slot].as_mut() {
                view.textures = Some(view_textures);
            }
        }
        self.state = LayerState::Built;

        tracing::debug!(
            layer = self.id,
            primitive = %self.primitive,
            vertices = self.num_vertices,
            meshes = self.meshes.len(),
            slots = self.slots.len(),
            "layer built"
        );
        self.positions = Vec::new();
        self.primitives = Default::default();
        self.edges = Default::default();
        Ok(())
    }

    /// Release every texture. Later draws are no-ops and setters fail.
    pub fn destroy(&mut self) {
        if self.state == LayerState::Destroyed {
            return;
        }
        let gpu = Rc::clone(&self.gpu);
        if let Some(mut textures) = self.textures.take() {
            textures.destroy(&*gpu);
        }
        for view in self.views.iter_mut().flatten() {
            if let Some(mut textures) = view.textures.take() {
                textures.destroy(&*gpu);
            }
        }
        self.state = LayerState::Destroyed;
        self.positions = Vec::new();
        self.geometries.clear();
        tracing::debug!(layer = self.id, "layer destroyed");
    }

    /// Start tracking state for a view slot.
    ///
    /// Meshes start with empty flags; the owning model pushes object state
    /// afterwards.
    pub fn register_view(&mut self, slot: usize) -> Result<()> {
        if self.state == LayerState::Destroyed {
            return Err(Error::destroyed(format!("layer {}", self.id)));
        }
        self.views_resize(slot);
        if self.views[slot].is_some() {
            return Ok(());
        }
        let mut view = self.empty_view();
        if self.state == LayerState::Built && !self.meshes.is_empty() {
            view.textures = Some(ViewTextures::build(
                &view.states,
                &view.colors,
                &view.offsets,
                self.row,
                &*self.gpu,
            )?);
        }
        self.views[slot] = Some(view);
        Ok(())
    }

    /// Drop a view slot's state and textures.
    pub fn release_view(&mut self, slot: usize) {
        if let Some(mut view) = self.views.get_mut(slot).and_then(Option::take) {
            if let Some(mut textures) = view.textures.take() {
                textures.destroy(&*self.gpu);
            }
        }
    }

    fn views_resize(&mut self, slot: usize) {
        if self.views.len() <= slot {
            self.views.resize_with(slot + 1, || None);
        }
    }

    fn empty_view(&self) -> LayerView {
        let n = self.meshes.len();
        let counts = MeshCounts {
            num_meshes: n as u32,
            ..Default::default()
        };
        LayerView {
            counts,
            states: vec![MeshState::default(); n],
            colors: self
                .meshes
                .iter()
                .map(|m| [m.color[0], m.color[1], m.color[2], m.opacity])
                .collect(),
            offsets: vec![[0.0; 3]; n],
            textures: None,
        }
    }

    fn view(&self, slot: usize) -> Option<&LayerView> {
        self.views.get(slot).and_then(Option::as_ref)
    }
}

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod tests;
