// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Texture layout of a built layer
//!
//! | texture          | format    | texels per           | contents                              |
//! |------------------|-----------|----------------------|---------------------------------------|
//! | positions        | RGB16UI   | vertex               | quantized x, y, z                     |
//! | slot info        | RGBA32UI  | slot                 | vertex base, mesh, decode, view index |
//! | decode matrices  | RGBA32F   | 4 per geometry       | column-major 4x4                      |
//! | mesh matrices    | RGBA32F   | 4 per mesh           | column-major 4x4                      |
//! | mesh material    | RGBA8UI   | mesh                 | metallic, roughness                   |
//! | indices          | R/RG/RGB  | primitive, per width | bucket-local indices                  |
//! | primitive→slot   | R16UI     | primitive, per width | slot of the primitive                 |
//! | mesh flags       | RGBA8UI   | 2 per mesh, per view | color+opacity, pass texel             |
//! | mesh offsets     | RGBA32F   | mesh, per view       | world offset                          |

use crate::data_texture::{DataTexture, TexelData};
use crate::flags::MeshState;
use crate::gpu::{GpuBackend, TexelFormat};
use crate::Result;
use nalgebra::Matrix4;
use strata_geometry::IndexWidth;

/// Flattened column-major f32 matrix
pub(crate) fn matrix_texels(matrix: &Matrix4<f64>) -> [f32; 16] {
    let mut out = [0f32; 16];
    for (dst, src) in out.iter_mut().zip(matrix.as_slice()) {
        *dst = *src as f32;
    }
    out
}

/// Index and primitive→slot textures of one width class
#[derive(Debug)]
pub(crate) struct IndexTextures {
    pub indices: DataTexture,
    pub prim_to_slot: DataTexture,
    pub num_primitives: u32,
}

impl IndexTextures {
    fn new(
        width: IndexWidth,
        channels: usize,
        indices: &[u32],
        prim_to_slot: &[u16],
        row: u32,
    ) -> Result<Self> {
        let format = TexelFormat::for_indices(width.bits(), channels);
        let data = match width {
            IndexWidth::U8 => TexelData::U8(indices.iter().map(|&i| i as u8).collect()),
            IndexWidth::U16 => TexelData::U16(indices.iter().map(|&i| i as u16).collect()),
            IndexWidth::U32 => TexelData::U32(indices.to_vec()),
        };
        let label = match (channels, width) {
            (2, IndexWidth::U8) => "edge_indices_8",
            (2, IndexWidth::U16) => "edge_indices_16",
            (2, IndexWidth::U32) => "edge_indices_32",
            (_, IndexWidth::U8) => "indices_8",
            (_, IndexWidth::U16) => "indices_16",
            (_, IndexWidth::U32) => "indices_32",
        };
        Ok(Self {
            indices: DataTexture::new(label, format, data, row)?,
            prim_to_slot: DataTexture::new(
                "prim_to_slot",
                TexelFormat::R16UI,
                TexelData::U16(prim_to_slot.to_vec()),
                row,
            )?,
            num_primitives: prim_to_slot.len() as u32,
        })
    }

    fn for_each_mut(&mut self, mut f: impl FnMut(&mut DataTexture)) {
        f(&mut self.indices);
        f(&mut self.prim_to_slot);
    }
}

/// CPU buffers of one width class, filled while meshes are added
#[derive(Debug, Default)]
pub(crate) struct IndexClass {
    pub indices: Vec<u32>,
    pub prim_to_slot: Vec<u16>,
}

impl IndexClass {
    pub fn len(&self) -> usize {
        self.prim_to_slot.len()
    }
}

/// Shared (view independent) textures of a built layer
#[derive(Debug)]
pub(crate) struct LayerTextures {
    pub positions: DataTexture,
    pub slot_info: DataTexture,
    pub decode_matrices: DataTexture,
    pub mesh_matrices: DataTexture,
    pub mesh_material: DataTexture,
    pub primitives: [Option<IndexTextures>; 3],
    pub edges: [Option<IndexTextures>; 3],
}

/// Inputs for [`LayerTextures::build`]
pub(crate) struct LayerBuffers<'a> {
    pub positions: &'a [u16],
    pub slot_info: Vec<u32>,
    pub decode_matrices: Vec<f32>,
    pub mesh_matrices: Vec<f32>,
    pub mesh_material: Vec<u8>,
    pub primitives: &'a [IndexClass; 3],
    pub edges: &'a [IndexClass; 3],
    pub vertices_per_primitive: usize,
}

impl LayerTextures {
    /// Lay out and upload every shared texture. Nothing stays allocated on
    /// the GPU if any upload fails.
    pub fn build(buffers: LayerBuffers<'_>, row: u32, gpu: &dyn GpuBackend) -> Result<Self> {
        type Classes = [Option<IndexTextures>; 3];
        let class = |classes: &[IndexClass; 3], channels: usize| -> Result<Classes> {
            let mut out: Classes = [None, None, None];
            for width in IndexWidth::ALL {
                let c = &classes[width.slot()];
                if c.len() > 0 {
                    let textures =
                        IndexTextures::new(width, channels, &c.indices, &c.prim_to_slot, row)?;
                    out[width.slot()] = Some(textures);
                }
            }
            Ok(out)
        };

        let mut textures = Self {
            positions: DataTexture::new(
                "positions",
                TexelFormat::RGB16UI,
                TexelData::U16(buffers.positions.to_vec()),
                row,
            )?,
            slot_info: DataTexture::new(
                "slot_info",
                TexelFormat::RGBA32UI,
                TexelData::U32(buffers.slot_info),
                row,
            )?,
            decode_matrices: DataTexture::new(
                "decode_matrices",
                TexelFormat::RGBA32F,
                TexelData::F32(buffers.decode_matrices),
                row,
            )?,
            mesh_matrices: DataTexture::new(
                "mesh_matrices",
                TexelFormat::RGBA32F,
                TexelData::F32(buffers.mesh_matrices),
                row,
            )?,
            mesh_material: DataTexture::new(
                "mesh_material",
                TexelFormat::RGBA8UI,
                TexelData::U8(buffers.mesh_material),
                row,
            )?,
            primitives: class(buffers.primitives, buffers.vertices_per_primitive)?,
            edges: class(buffers.edges, 2)?,
        };

        let mut result = Ok(());
        textures.for_each_mut(|t| {
            if result.is_ok() {
                result = t.upload(gpu);
            }
        });
        if let Err(err) = result {
            textures.destroy(gpu);
            return Err(err);
        }
        Ok(textures)
    }

    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut DataTexture)) {
        f(&mut self.positions);
        f(&mut self.slot_info);
        f(&mut self.decode_matrices);
        f(&mut self.mesh_matrices);
        f(&mut self.mesh_material);
        for class in self.primitives.iter_mut().chain(self.edges.iter_mut()).flatten() {
            class.for_each_mut(&mut f);
        }
    }

    /// Upload pending writes; returns the number of uploads issued.
    pub fn flush(&mut self, gpu: &dyn GpuBackend) -> Result<usize> {
        let mut uploads = 0;
        let mut result = Ok(());
        self.for_each_mut(|t| {
            if result.is_ok() {
                match t.flush(gpu) {
                    Ok(true) => uploads += 1,
                    Ok(false) => {}
                    Err(err) => result = Err(err),
                }
            }
        });
        result.map(|_| uploads)
    }

    pub fn destroy(&mut self, gpu: &dyn GpuBackend) {
        self.for_each_mut(|t| t.destroy(gpu));
    }
}

/// Per-view textures of a built layer
#[derive(Debug)]
pub(crate) struct ViewTextures {
    pub flags: DataTexture,
    pub offsets: DataTexture,
}

impl ViewTextures {
    pub fn build(
        states: &[MeshState],
        colors: &[[u8; 4]],
        offsets: &[[f32; 3]],
        row: u32,
        gpu: &dyn GpuBackend,
    ) -> Result<Self> {
        let mut flags = Vec::with_capacity(states.len() * 8);
        for (state, color) in states.iter().zip(colors) {
            flags.extend_from_slice(color);
            flags.extend_from_slice(&state.pass_texel());
        }
        let offsets = offsets
            .iter()
            .flat_map(|o| [o[0], o[1], o[2], 0.0])
            .collect::<Vec<f32>>();

        let mut textures = Self {
            flags: DataTexture::new("mesh_flags", TexelFormat::RGBA8UI, TexelData::U8(flags), row)?,
            offsets: DataTexture::new(
                "mesh_offsets",
                TexelFormat::RGBA32F,
                TexelData::F32(offsets),
                row,
            )?,
        };
        if let Err(err) = textures
            .flags
            .upload(gpu)
            .and_then(|_| textures.offsets.upload(gpu))
        {
            textures.destroy(gpu);
            return Err(err);
        }
        Ok(textures)
    }

    pub fn flush(&mut self, gpu: &dyn GpuBackend) -> Result<usize> {
        let flags = self.flags.flush(gpu)?;
        let offsets = self.offsets.flush(gpu)?;
        Ok(usize::from(flags) + usize::from(offsets))
    }

    pub fn destroy(&mut self, gpu: &dyn GpuBackend) {
        self.flags.destroy(gpu);
        self.offsets.destroy(gpu);
    }
}
