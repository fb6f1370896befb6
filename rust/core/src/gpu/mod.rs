// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GPU backend seam
//!
//! Layers and renderers talk to the GPU only through [`GpuBackend`]. The
//! wasm crate implements it on WebGL2; [`RecordingGpu`] is a headless
//! implementation that records calls for tests and tooling.
//!
//! Methods take `&self`: backends are shared as `Rc<dyn GpuBackend>` by
//! every layer and program cache, and keep their own interior state.

mod recording;

pub use recording::{DrawRecord, RecordingGpu, UploadRecord};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u32);

/// Integer or float texel layout of a data texture.
///
/// Names follow the GL sized internal formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    R8UI,
    RG8UI,
    RGB8UI,
    RGBA8UI,
    R16UI,
    RG16UI,
    RGB16UI,
    R32UI,
    RG32UI,
    RGB32UI,
    RGBA32UI,
    RGBA32F,
}

/// Component type of a texel format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexelComponent {
    U8,
    U16,
    U32,
    F32,
}

impl TexelFormat {
    /// Components per texel
    pub fn channels(self) -> usize {
        match self {
            TexelFormat::R8UI | TexelFormat::R16UI | TexelFormat::R32UI => 1,
            TexelFormat::RG8UI | TexelFormat::RG16UI | TexelFormat::RG32UI => 2,
            TexelFormat::RGB8UI | TexelFormat::RGB16UI | TexelFormat::RGB32UI => 3,
            TexelFormat::RGBA8UI | TexelFormat::RGBA32UI | TexelFormat::RGBA32F => 4,
        }
    }

    pub fn component(self) -> TexelComponent {
        match self {
            TexelFormat::R8UI | TexelFormat::RG8UI | TexelFormat::RGB8UI | TexelFormat::RGBA8UI => {
                TexelComponent::U8
            }
            TexelFormat::R16UI | TexelFormat::RG16UI | TexelFormat::RGB16UI => TexelComponent::U16,
            TexelFormat::R32UI
            | TexelFormat::RG32UI
            | TexelFormat::RGB32UI
            | TexelFormat::RGBA32UI => TexelComponent::U32,
            TexelFormat::RGBA32F => TexelComponent::F32,
        }
    }

    /// Integer format holding `channels` components of an index width
    pub fn for_indices(bits: u32, channels: usize) -> TexelFormat {
        match (bits, channels) {
            (8, 1) => TexelFormat::R8UI,
            (8, 2) => TexelFormat::RG8UI,
            (8, _) => TexelFormat::RGB8UI,
            (16, 1) => TexelFormat::R16UI,
            (16, 2) => TexelFormat::RG16UI,
            (16, _) => TexelFormat::RGB16UI,
            (_, 1) => TexelFormat::R32UI,
            (_, 2) => TexelFormat::RG32UI,
            _ => TexelFormat::RGB32UI,
        }
    }
}

/// Size and format of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub format: TexelFormat,
    pub width: u32,
    pub height: u32,
}

/// Rectangle of texels, in texel units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TextureRegion {
    /// Smallest upload rectangle covering linear texels `first..=last`.
    ///
    /// Within one row the region is exact; across rows it spans full rows.
    pub fn covering(first: usize, last: usize, row_width: u32) -> Self {
        let w = row_width as usize;
        let (first_row, last_row) = (first / w, last / w);
        if first_row == last_row {
            TextureRegion {
                x: (first % w) as u32,
                y: first_row as u32,
                width: (last - first + 1) as u32,
                height: 1,
            }
        } else {
            TextureRegion {
                x: 0,
                y: first_row as u32,
                width: row_width,
                height: (last_row - first_row + 1) as u32,
            }
        }
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Borrowed texel components
#[derive(Debug, Clone, Copy)]
pub enum TexelSlice<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
    U32(&'a [u32]),
    F32(&'a [f32]),
}

impl TexelSlice<'_> {
    /// Number of components
    pub fn len(&self) -> usize {
        match self {
            TexelSlice::U8(s) => s.len(),
            TexelSlice::U16(s) => s.len(),
            TexelSlice::U32(s) => s.len(),
            TexelSlice::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawMode {
    Triangles,
    Lines,
    Points,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Uniform {
    Int(i32),
    UInt(u32),
    Float(f32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([f32; 16]),
    /// Flattened array of 4x4 matrices
    Mat4Array(Vec<f32>),
    /// Flattened array of vec3
    Vec3Array(Vec<f32>),
    /// Flattened array of vec4
    Vec4Array(Vec<f32>),
    BoolArray(Vec<bool>),
}

/// Fixed-function state for one draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawState {
    pub blend: bool,
    pub depth_write: bool,
    pub cull_back_faces: bool,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            blend: false,
            depth_write: true,
            cull_back_faces: false,
        }
    }
}

/// One non-indexed draw; vertex shaders pull everything from textures
#[derive(Debug, Clone)]
pub struct DrawCall<'a> {
    pub program: ProgramHandle,
    pub mode: DrawMode,
    pub vertex_count: u32,
    pub state: DrawState,
    /// Sampler uniform name and texture, bound to consecutive units
    pub textures: &'a [(&'static str, TextureHandle)],
    pub uniforms: &'a [(&'static str, Uniform)],
}

/// Where a frame is drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameTarget {
    /// Visible canvas of the given size, cleared to a color
    Canvas {
        width: u32,
        height: u32,
        clear_color: [f32; 4],
    },
    /// One-pixel pick target aimed at canvas pixel (x, y)
    Pick { x: u32, y: u32 },
}

/// Everything layers and renderers need from a GPU.
pub trait GpuBackend {
    /// Allocate a texture and upload its full contents.
    fn create_texture(&self, desc: &TextureDesc, data: TexelSlice<'_>) -> Result<TextureHandle>;

    /// Upload a sub-rectangle. `data` holds exactly `region`'s texels.
    fn update_texture(
        &self,
        texture: TextureHandle,
        desc: &TextureDesc,
        region: TextureRegion,
        data: TexelSlice<'_>,
    ) -> Result<()>;

    fn delete_texture(&self, texture: TextureHandle);

    /// Compile and link a program; on failure, return the info logs.
    fn compile_program(
        &self,
        label: &str,
        vertex: &str,
        fragment: &str,
    ) -> std::result::Result<ProgramHandle, Vec<String>>;

    fn delete_program(&self, program: ProgramHandle);

    /// Bind and clear a frame target.
    fn begin_frame(&self, target: FrameTarget);

    fn draw(&self, call: &DrawCall<'_>);

    /// Read back the pixel of the last pick frame.
    fn read_pick_pixel(&self) -> [u8; 4];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_within_row() {
        let region = TextureRegion::covering(5, 9, 16);
        assert_eq!(
            region,
            TextureRegion {
                x: 5,
                y: 0,
                width: 5,
                height: 1
            }
        );
    }

    #[test]
    fn test_region_across_rows_spans_full_rows() {
        let region = TextureRegion::covering(14, 33, 16);
        assert_eq!(
            region,
            TextureRegion {
                x: 0,
                y: 0,
                width: 16,
                height: 3
            }
        );
        assert_eq!(region.texel_count(), 48);
    }

    #[test]
    fn test_index_formats() {
        assert_eq!(TexelFormat::for_indices(8, 3), TexelFormat::RGB8UI);
        assert_eq!(TexelFormat::for_indices(16, 2), TexelFormat::RG16UI);
        assert_eq!(TexelFormat::for_indices(32, 1), TexelFormat::R32UI);
        assert_eq!(TexelFormat::RGB16UI.component(), TexelComponent::U16);
    }
}
