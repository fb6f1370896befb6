// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Views: independent cameras over the same scene
//!
//! Each view occupies a slot in a fixed-capacity registry. Object state,
//! layer flag textures and program caches are all indexed by that slot, so
//! views never see each other's selection, visibility or colors.

use crate::renderer::{RenderQuality, SceneShaderConfig, MAX_VIEW_MATRICES};
use crate::{Error, Result};
use nalgebra::{Matrix4, Point3, Vector3};
use smallvec::SmallVec;
use strata_geometry::RtcOrigin;

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub view_matrix: Matrix4<f64>,
    pub proj_matrix: Matrix4<f64>,
    /// Far plane distance, used by the logarithmic depth buffer
    pub far: f64,
    /// Matrices for `uViewMatrices[1..]`, selected per mesh
    pub extra_view_matrices: SmallVec<[Matrix4<f64>; 3]>,
}

impl Default for Camera {
    fn default() -> Self {
        let mut camera = Self {
            view_matrix: Matrix4::identity(),
            proj_matrix: Matrix4::identity(),
            far: 10_000.0,
            extra_view_matrices: SmallVec::new(),
        };
        camera.look_at(
            Point3::new(0.0, 0.0, 10.0),
            Point3::origin(),
            Vector3::new(0.0, 1.0, 0.0),
        );
        camera.perspective(60f64.to_radians(), 1.0, 0.1, 10_000.0);
        camera
    }
}

impl Camera {
    pub fn look_at(&mut self, eye: Point3<f64>, target: Point3<f64>, up: Vector3<f64>) {
        self.view_matrix = Matrix4::look_at_rh(&eye, &target, &up);
    }

    pub fn perspective(&mut self, fovy: f64, aspect: f64, near: f64, far: f64) {
        self.proj_matrix = Matrix4::new_perspective(aspect, fovy, near, far);
        self.far = far;
    }

    /// View matrices for a layer at `origin`, padded with the main matrix.
    ///
    /// The origin translation is folded in at f64 so the shader only ever
    /// sees origin-relative coordinates.
    pub fn rtc_view_matrices(&self, origin: &RtcOrigin) -> [Matrix4<f64>; MAX_VIEW_MATRICES] {
        let shift = Matrix4::new_translation(&Vector3::new(origin.x, origin.y, origin.z));
        let main = self.view_matrix * shift;
        let mut out = [main; MAX_VIEW_MATRICES];
        for (slot, extra) in out[1..].iter_mut().zip(&self.extra_view_matrices) {
            *slot = extra * shift;
        }
        out
    }
}

/// Half-space clip: fragments on the `dir` side of `pos` are discarded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionPlane {
    pub pos: [f64; 3],
    pub dir: [f32; 3],
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// World-space direction the light travels
    pub dir: [f32; 3],
    pub color: [f32; 3],
    pub intensity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lighting {
    /// RGB and intensity
    pub ambient: [f32; 4],
    pub directional: Vec<DirectionalLight>,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: [1.0, 1.0, 1.0, 0.4],
            directional: vec![DirectionalLight {
                dir: [-0.5, -1.0, -0.3],
                color: [1.0, 1.0, 1.0],
                intensity: 0.8,
            }],
        }
    }
}

/// Colors of the highlight, selection, x-ray and edge passes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewMaterials {
    pub highlight: [f32; 4],
    pub selected: [f32; 4],
    pub xray: [f32; 4],
    pub edges: [f32; 4],
}

impl Default for ViewMaterials {
    fn default() -> Self {
        Self {
            highlight: [1.0, 1.0, 0.0, 0.5],
            selected: [0.0, 1.0, 0.0, 0.5],
            xray: [0.6, 0.6, 0.6, 0.1],
            edges: [0.2, 0.2, 0.2, 1.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct View {
    camera: Camera,
    section_planes: Vec<SectionPlane>,
    lighting: Lighting,
    materials: ViewMaterials,
    log_depth: bool,
    quality: RenderQuality,
    canvas_size: (u32, u32),
    point_size: f32,
    clear_color: [f32; 4],
    needs_render: bool,
    needs_rebuild: bool,
}

impl View {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            camera: Camera::default(),
            section_planes: Vec::new(),
            lighting: Lighting::default(),
            materials: ViewMaterials::default(),
            log_depth: false,
            quality: RenderQuality::Fast,
            canvas_size: (width, height),
            point_size: 2.0,
            clear_color: [1.0, 1.0, 1.0, 1.0],
            needs_render: true,
            needs_rebuild: true,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn section_planes(&self) -> &[SectionPlane] {
        &self.section_planes
    }

    pub fn lighting(&self) -> &Lighting {
        &self.lighting
    }

    pub fn materials(&self) -> &ViewMaterials {
        &self.materials
    }

    pub fn log_depth(&self) -> bool {
        self.log_depth
    }

    pub fn quality(&self) -> RenderQuality {
        self.quality
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.canvas_size
    }

    pub fn point_size(&self) -> f32 {
        self.point_size
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn needs_render(&self) -> bool {
        self.needs_render
    }

    /// Shader-affecting state changed since programs were last validated
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
        self.needs_render = true;
    }

    pub fn set_section_planes(&mut self, planes: Vec<SectionPlane>) {
        if planes.len() != self.section_planes.len() {
            self.needs_rebuild = true;
        }
        self.section_planes = planes;
        self.needs_render = true;
    }

    pub fn set_lighting(&mut self, lighting: Lighting) {
        if lighting.directional.len() != self.lighting.directional.len() {
            self.needs_rebuild = true;
        }
        self.lighting = lighting;
        self.needs_render = true;
    }

    pub fn set_materials(&mut self, materials: ViewMaterials) {
        self.materials = materials;
        self.needs_render = true;
    }

    pub fn set_log_depth(&mut self, log_depth: bool) {
        if log_depth != self.log_depth {
            self.log_depth = log_depth;
            self.needs_rebuild = true;
            self.needs_render = true;
        }
    }

    pub fn set_quality(&mut self, quality: RenderQuality) {
        if quality != self.quality {
            self.quality = quality;
            self.needs_render = true;
        }
    }

    pub fn set_canvas_size(&mut self, width: u32, height: u32) {
        if (width, height) != self.canvas_size {
            self.canvas_size = (width, height);
            self.needs_render = true;
        }
    }

    pub fn set_point_size(&mut self, point_size: f32) {
        self.point_size = point_size;
        self.needs_render = true;
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
        self.needs_render = true;
    }

    pub fn mark_needs_render(&mut self) {
        self.needs_render = true;
    }

    pub(crate) fn frame_rendered(&mut self) {
        self.needs_render = false;
    }

    pub(crate) fn programs_rebuilt(&mut self) {
        self.needs_rebuild = false;
    }

    /// Config programs for this view are compiled against
    pub fn shader_config(&self) -> SceneShaderConfig {
        SceneShaderConfig {
            num_section_planes: self.section_planes.len(),
            num_directional_lights: self.lighting.directional.len(),
            log_depth: self.log_depth,
        }
    }
}

/// Fixed number of view slots; released slots are reused lowest first.
#[derive(Debug, Clone)]
pub struct ViewRegistry {
    slots: Vec<Option<View>>,
}

impl ViewRegistry {
    pub fn with_capacity(max_views: usize) -> Self {
        Self {
            slots: vec![None; max_views],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Place a view in the lowest free slot.
    pub fn register(&mut self, view: View) -> Result<usize> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::ViewSlotsExhausted {
                max: self.slots.len(),
            })?;
        self.slots[slot] = Some(view);
        Ok(slot)
    }

    pub fn release(&mut self, slot: usize) -> Result<View> {
        self.slots
            .get_mut(slot)
            .and_then(Option::take)
            .ok_or(Error::UnknownView(slot))
    }

    pub fn get(&self, slot: usize) -> Option<&View> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut View> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.get(slot).is_some()
    }

    /// Registered slots, ascending
    pub fn active_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
            .collect()
    }
}
