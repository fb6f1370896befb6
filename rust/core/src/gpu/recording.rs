// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Headless backend that records GPU traffic

use super::{
    DrawCall, DrawMode, DrawState, FrameTarget, GpuBackend, ProgramHandle, TexelSlice,
    TextureDesc, TextureHandle, TextureRegion, Uniform,
};
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use std::cell::RefCell;

/// One texture upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    pub texture: TextureHandle,
    pub label: &'static str,
    /// `None` for the initial full upload
    pub region: Option<TextureRegion>,
}

/// One draw call
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: ProgramHandle,
    pub program_label: String,
    pub mode: DrawMode,
    pub vertex_count: u32,
    pub state: DrawState,
    /// Value of the `uRenderPass` uniform, when set
    pub render_pass: Option<u32>,
}

#[derive(Debug, Default)]
struct RecorderState {
    next_handle: u32,
    textures: FxHashMap<TextureHandle, TextureDesc>,
    programs: FxHashMap<ProgramHandle, String>,
    uploads: Vec<UploadRecord>,
    draws: Vec<DrawRecord>,
    frames: Vec<FrameTarget>,
    failing_programs: Vec<String>,
    failing_textures: Vec<&'static str>,
    pick_pixel: [u8; 4],
}

/// [`GpuBackend`] that keeps no GPU state, only a log of what was asked.
///
/// Texture uploads are bounds-checked against the texture size so layout
/// bugs surface as errors in tests.
#[derive(Debug, Default)]
pub struct RecordingGpu {
    state: RefCell<RecorderState>,
}

impl RecordingGpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Textures created and not yet deleted
    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    /// Programs compiled and not yet deleted
    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc> {
        self.state.borrow().textures.get(&texture).copied()
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.state.borrow().uploads.clone()
    }

    /// Sub-region uploads to textures with the given label
    pub fn region_uploads(&self, label: &str) -> usize {
        self.state
            .borrow()
            .uploads
            .iter()
            .filter(|u| u.label == label && u.region.is_some())
            .count()
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state.borrow().draws.clone()
    }

    pub fn frames(&self) -> Vec<FrameTarget> {
        self.state.borrow().frames.clone()
    }

    /// Forget recorded uploads, draws and frames; live handles are kept.
    pub fn clear_log(&self) {
        let mut state = self.state.borrow_mut();
        state.uploads.clear();
        state.draws.clear();
        state.frames.clear();
    }

    /// Make every later compile whose label contains `needle` fail.
    pub fn fail_programs_containing(&self, needle: &str) {
        self.state.borrow_mut().failing_programs.push(needle.to_string());
    }

    /// Make every later texture creation with this label fail.
    pub fn fail_textures_labelled(&self, label: &'static str) {
        self.state.borrow_mut().failing_textures.push(label);
    }

    /// Stop failing compiles and texture creations.
    pub fn clear_failures(&self) {
        let mut state = self.state.borrow_mut();
        state.failing_programs.clear();
        state.failing_textures.clear();
    }

    /// Pixel returned by the next pick read-back.
    pub fn set_pick_pixel(&self, rgba: [u8; 4]) {
        self.state.borrow_mut().pick_pixel = rgba;
    }

    fn next_handle(state: &mut RecorderState) -> u32 {
        state.next_handle += 1;
        state.next_handle
    }
}

impl GpuBackend for RecordingGpu {
    fn create_texture(&self, desc: &TextureDesc, data: TexelSlice<'_>) -> Result<TextureHandle> {
        let expected = desc.width as usize * desc.height as usize * desc.format.channels();
        if data.len() != expected {
            return Err(Error::Gpu(format!(
                "texture '{}': {} components for a {}x{} texture",
                desc.label,
                data.len(),
                desc.width,
                desc.height
            )));
        }
        let mut state = self.state.borrow_mut();
        if state.failing_textures.contains(&desc.label) {
            return Err(Error::Gpu(format!("texture '{}': out of memory", desc.label)));
        }
        let handle = TextureHandle(Self::next_handle(&mut state));
        state.textures.insert(handle, *desc);
        state.uploads.push(UploadRecord {
            texture: handle,
            label: desc.label,
            region: None,
        });
        Ok(handle)
    }

    fn update_texture(
        &self,
        texture: TextureHandle,
        desc: &TextureDesc,
        region: TextureRegion,
        data: TexelSlice<'_>,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let Some(actual) = state.textures.get(&texture) else {
            return Err(Error::Gpu(format!("texture '{}' is not live", desc.label)));
        };
        if region.x + region.width > actual.width || region.y + region.height > actual.height {
            return Err(Error::Gpu(format!(
                "texture '{}': region {:?} outside {}x{}",
                desc.label, region, actual.width, actual.height
            )));
        }
        if data.len() != region.texel_count() * desc.format.channels() {
            return Err(Error::Gpu(format!(
                "texture '{}': {} components for region {:?}",
                desc.label,
                data.len(),
                region
            )));
        }
        state.uploads.push(UploadRecord {
            texture,
            label: desc.label,
            region: Some(region),
        });
        Ok(())
    }

    fn delete_texture(&self, texture: TextureHandle) {
        self.state.borrow_mut().textures.remove(&texture);
    }

    fn compile_program(
        &self,
        label: &str,
        vertex: &str,
        fragment: &str,
    ) -> std::result::Result<ProgramHandle, Vec<String>> {
        let mut state = self.state.borrow_mut();
        if state.failing_programs.iter().any(|n| label.contains(n.as_str())) {
            return Err(vec![format!("ERROR: 0:1: '{}' : forced compile failure", label)]);
        }
        if !vertex.starts_with("#version 300 es") || !fragment.starts_with("#version 300 es") {
            return Err(vec!["ERROR: missing '#version 300 es'".to_string()]);
        }
        let handle = ProgramHandle(Self::next_handle(&mut state));
        state.programs.insert(handle, label.to_string());
        Ok(handle)
    }

    fn delete_program(&self, program: ProgramHandle) {
        self.state.borrow_mut().programs.remove(&program);
    }

    fn begin_frame(&self, target: FrameTarget) {
        self.state.borrow_mut().frames.push(target);
    }

    fn draw(&self, call: &DrawCall<'_>) {
        let mut state = self.state.borrow_mut();
        let program_label = state.programs.get(&call.program).cloned().unwrap_or_default();
        let render_pass = call.uniforms.iter().find_map(|(name, value)| match value {
            Uniform::UInt(v) if *name == "uRenderPass" => Some(*v),
            _ => None,
        });
        state.draws.push(DrawRecord {
            program: call.program,
            program_label,
            mode: call.mode,
            vertex_count: call.vertex_count,
            state: call.state,
            render_pass,
        });
    }

    fn read_pick_pixel(&self) -> [u8; 4] {
        self.state.borrow().pick_pixel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::TexelFormat;

    fn desc() -> TextureDesc {
        TextureDesc {
            label: "test",
            format: TexelFormat::RGBA8UI,
            width: 4,
            height: 2,
        }
    }

    #[test]
    fn test_create_and_delete_tracks_handles() {
        let gpu = RecordingGpu::new();
        let handle = gpu.create_texture(&desc(), TexelSlice::U8(&[0; 32])).unwrap();
        assert_eq!(gpu.live_textures(), 1);
        gpu.delete_texture(handle);
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn test_create_rejects_wrong_size() {
        let gpu = RecordingGpu::new();
        assert!(gpu.create_texture(&desc(), TexelSlice::U8(&[0; 31])).is_err());
    }

    #[test]
    fn test_region_upload_bounds_checked() {
        let gpu = RecordingGpu::new();
        let handle = gpu.create_texture(&desc(), TexelSlice::U8(&[0; 32])).unwrap();
        let inside = TextureRegion {
            x: 1,
            y: 1,
            width: 2,
            height: 1,
        };
        gpu.update_texture(handle, &desc(), inside, TexelSlice::U8(&[0; 8]))
            .unwrap();
        let outside = TextureRegion { y: 2, ..inside };
        assert!(gpu
            .update_texture(handle, &desc(), outside, TexelSlice::U8(&[0; 8]))
            .is_err());
        assert_eq!(gpu.region_uploads("test"), 1);
    }

    #[test]
    fn test_forced_compile_failure() {
        let gpu = RecordingGpu::new();
        gpu.fail_programs_containing("edges");
        let src = "#version 300 es\nvoid main() {}";
        assert!(gpu.compile_program("triangles-edges-fast", src, src).is_err());
        assert!(gpu.compile_program("triangles-color-fast", src, src).is_ok());
        assert_eq!(gpu.live_programs(), 1);
    }
}
