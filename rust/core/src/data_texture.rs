// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data textures: typed arrays laid out as fixed-width 2D textures
//!
//! Each texture keeps a CPU mirror of its contents, padded to whole rows.
//! Writes go to the mirror and widen a dirty texel range; `flush` uploads
//! the smallest rectangle covering that range in a single call.

use crate::gpu::{
    GpuBackend, TexelComponent, TexelFormat, TexelSlice, TextureDesc, TextureHandle,
    TextureRegion,
};
use crate::{Error, Result};

/// Owned texel components
#[derive(Debug, Clone, PartialEq)]
pub enum TexelData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl TexelData {
    pub fn zeroed(component: TexelComponent, len: usize) -> Self {
        match component {
            TexelComponent::U8 => TexelData::U8(vec![0; len]),
            TexelComponent::U16 => TexelData::U16(vec![0; len]),
            TexelComponent::U32 => TexelData::U32(vec![0; len]),
            TexelComponent::F32 => TexelData::F32(vec![0.0; len]),
        }
    }

    pub fn component(&self) -> TexelComponent {
        match self {
            TexelData::U8(_) => TexelComponent::U8,
            TexelData::U16(_) => TexelComponent::U16,
            TexelData::U32(_) => TexelComponent::U32,
            TexelData::F32(_) => TexelComponent::F32,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resize(&mut self, len: usize) {
        match self {
            TexelData::U8(v) => v.resize(len, 0),
            TexelData::U16(v) => v.resize(len, 0),
            TexelData::U32(v) => v.resize(len, 0),
            TexelData::F32(v) => v.resize(len, 0.0),
        }
    }

    pub fn as_slice(&self) -> TexelSlice<'_> {
        match self {
            TexelData::U8(v) => TexelSlice::U8(v),
            TexelData::U16(v) => TexelSlice::U16(v),
            TexelData::U32(v) => TexelSlice::U32(v),
            TexelData::F32(v) => TexelSlice::F32(v),
        }
    }

    fn slice(&self, range: std::ops::Range<usize>) -> TexelSlice<'_> {
        match self {
            TexelData::U8(v) => TexelSlice::U8(&v[range]),
            TexelData::U16(v) => TexelSlice::U16(&v[range]),
            TexelData::U32(v) => TexelSlice::U32(&v[range]),
            TexelData::F32(v) => TexelSlice::F32(&v[range]),
        }
    }
}

/// Component types a data texture can be written with
pub trait Texel: Copy {
    fn components(data: &TexelData) -> Option<&[Self]>;
    fn components_mut(data: &mut TexelData) -> Option<&mut Vec<Self>>;
}

macro_rules! impl_texel {
    ($ty:ty, $variant:ident) => {
        impl Texel for $ty {
            fn components(data: &TexelData) -> Option<&[Self]> {
                match data {
                    TexelData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn components_mut(data: &mut TexelData) -> Option<&mut Vec<Self>> {
                match data {
                    TexelData::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_texel!(u8, U8);
impl_texel!(u16, U16);
impl_texel!(u32, U32);
impl_texel!(f32, F32);

/// A GPU texture used as a random-access array
#[derive(Debug)]
pub struct DataTexture {
    desc: TextureDesc,
    data: TexelData,
    handle: Option<TextureHandle>,
    /// Inclusive texel range written since the last upload
    dirty: Option<(usize, usize)>,
}

impl DataTexture {
    /// Lay out `data` in rows of `width` texels.
    ///
    /// Fails with [`Error::EmptyDataTexture`] when there is nothing to store.
    pub fn new(
        label: &'static str,
        format: TexelFormat,
        mut data: TexelData,
        width: u32,
    ) -> Result<Self> {
        if data.component() != format.component() {
            return Err(Error::TexelMismatch {
                label,
                reason: format!("{:?} data for {:?}", data.component(), format),
            });
        }
        let channels = format.channels();
        if data.len() % channels != 0 {
            return Err(Error::TexelMismatch {
                label,
                reason: format!("{} components is not a multiple of {}", data.len(), channels),
            });
        }
        let texels = data.len() / channels;
        let height = texels.div_ceil(width as usize);
        if height == 0 {
            return Err(Error::EmptyDataTexture { label });
        }
        data.resize(height * width as usize * channels);
        Ok(Self {
            desc: TextureDesc {
                label,
                format,
                width,
                height: height as u32,
            },
            data,
            handle: None,
            dirty: None,
        })
    }

    /// Zero-filled texture of at least `texels` texels.
    pub fn zeroed(
        label: &'static str,
        format: TexelFormat,
        texels: usize,
        width: u32,
    ) -> Result<Self> {
        let data = TexelData::zeroed(format.component(), texels * format.channels());
        Self::new(label, format, data, width)
    }

    pub fn label(&self) -> &'static str {
        self.desc.label
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    /// Texels addressable, including row padding
    pub fn capacity(&self) -> usize {
        self.desc.width as usize * self.desc.height as usize
    }

    pub fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// Components of one texel
    pub fn texel<T: Texel>(&self, index: usize) -> Option<&[T]> {
        let channels = self.desc.format.channels();
        T::components(&self.data)?.get(index * channels..(index + 1) * channels)
    }

    /// Overwrite texels starting at `first`; `values` covers whole texels.
    ///
    /// Returns false and leaves the range clean when nothing changed.
    pub fn write<T: Texel + PartialEq>(&mut self, first: usize, values: &[T]) -> Result<bool> {
        let label = self.desc.label;
        let channels = self.desc.format.channels();
        if values.is_empty() || values.len() % channels != 0 {
            return Err(Error::TexelMismatch {
                label,
                reason: format!("write of {} components", values.len()),
            });
        }
        let count = values.len() / channels;
        if first + count > self.capacity() {
            return Err(Error::TexelMismatch {
                label,
                reason: format!("texels {}..{} outside {}", first, first + count, self.capacity()),
            });
        }
        let Some(components) = T::components_mut(&mut self.data) else {
            return Err(Error::TexelMismatch {
                label,
                reason: "component type differs from texture format".to_string(),
            });
        };
        let target = &mut components[first * channels..(first + count) * channels];
        if target == values {
            return Ok(false);
        }
        target.copy_from_slice(values);
        let last = first + count - 1;
        self.dirty = Some(match self.dirty {
            Some((a, b)) => (a.min(first), b.max(last)),
            None => (first, last),
        });
        Ok(true)
    }

    /// Create the GPU texture from the mirror.
    pub fn upload(&mut self, gpu: &dyn GpuBackend) -> Result<()> {
        if let Some(old) = self.handle.take() {
            gpu.delete_texture(old);
        }
        self.handle = Some(gpu.create_texture(&self.desc, self.data.as_slice())?);
        self.dirty = None;
        Ok(())
    }

    /// Upload the dirty range, if any. Returns whether an upload happened.
    ///
    /// Before the first `upload` the dirty range is kept.
    pub fn flush(&mut self, gpu: &dyn GpuBackend) -> Result<bool> {
        let (Some(handle), Some((first, last))) = (self.handle, self.dirty) else {
            return Ok(false);
        };
        let region = TextureRegion::covering(first, last, self.desc.width);
        let channels = self.desc.format.channels();
        let start = (region.y as usize * self.desc.width as usize + region.x as usize) * channels;
        let end = start + region.texel_count() * channels;
        gpu.update_texture(handle, &self.desc, region, self.data.slice(start..end))?;
        self.dirty = None;
        Ok(true)
    }

    /// Release the GPU texture. Safe to call repeatedly.
    pub fn destroy(&mut self, gpu: &dyn GpuBackend) {
        if let Some(handle) = self.handle.take() {
            gpu.delete_texture(handle);
        }
        self.dirty = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::RecordingGpu;

    #[test]
    fn test_rows_padded_to_width() {
        let texture =
            DataTexture::new("t", TexelFormat::RGB16UI, TexelData::U16(vec![1; 3 * 5]), 4)
                .unwrap();
        assert_eq!(texture.height(), 2);
        assert_eq!(texture.capacity(), 8);
        assert_eq!(texture.texel::<u16>(4), Some(&[1u16, 1, 1][..]));
        assert_eq!(texture.texel::<u16>(5), Some(&[0u16, 0, 0][..]));
    }

    #[test]
    fn test_empty_texture_rejected() {
        let err = DataTexture::new("t", TexelFormat::R8UI, TexelData::U8(vec![]), 4).unwrap_err();
        assert!(matches!(err, Error::EmptyDataTexture { label: "t" }));
    }

    #[test]
    fn test_format_mismatch_rejected() {
        let err =
            DataTexture::new("t", TexelFormat::RGBA32F, TexelData::U8(vec![0; 4]), 4).unwrap_err();
        assert!(matches!(err, Error::TexelMismatch { .. }));
    }

    #[test]
    fn test_writes_coalesce_into_one_upload() {
        let gpu = RecordingGpu::new();
        let mut texture = DataTexture::zeroed("flags", TexelFormat::RGBA8UI, 64, 16).unwrap();
        texture.upload(&gpu).unwrap();

        assert!(texture.write(3, &[1u8, 2, 3, 4]).unwrap());
        assert!(texture.write(40, &[5u8, 6, 7, 8]).unwrap());
        assert!(texture.flush(&gpu).unwrap());
        assert!(!texture.flush(&gpu).unwrap());

        let regions: Vec<_> = gpu.uploads().into_iter().filter_map(|u| u.region).collect();
        assert_eq!(
            regions,
            vec![TextureRegion {
                x: 0,
                y: 0,
                width: 16,
                height: 3
            }]
        );
    }

    #[test]
    fn test_unchanged_write_stays_clean() {
        let mut texture = DataTexture::zeroed("t", TexelFormat::R32UI, 4, 4).unwrap();
        assert!(!texture.write(1, &[0u32]).unwrap());
        assert!(!texture.is_dirty());
    }

    #[test]
    fn test_write_out_of_range() {
        let mut texture = DataTexture::zeroed("t", TexelFormat::R32UI, 4, 4).unwrap();
        assert!(texture.write(4, &[1u32]).is_err());
        assert!(texture.write(0, &[1.0f32]).is_err());
    }

    #[test]
    fn test_destroy_releases_handle() {
        let gpu = RecordingGpu::new();
        let mut texture = DataTexture::zeroed("t", TexelFormat::R8UI, 4, 4).unwrap();
        texture.upload(&gpu).unwrap();
        assert_eq!(gpu.live_textures(), 1);
        texture.destroy(&gpu);
        texture.destroy(&gpu);
        assert_eq!(gpu.live_textures(), 0);
        assert!(texture.handle().is_none());
    }
}
