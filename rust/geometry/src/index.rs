// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Index bit-width selection and width-typed index storage

use crate::{GeometryError, Result};

/// Bit width of the indices stored for one geometry bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexWidth {
    U8,
    U16,
    U32,
}

impl IndexWidth {
    /// All widths, narrowest first
    pub const ALL: [IndexWidth; 3] = [IndexWidth::U8, IndexWidth::U16, IndexWidth::U32];

    /// Smallest width whose address space strictly exceeds the vertex count.
    ///
    /// A bucket of exactly 256 vertices therefore gets 16-bit indices.
    #[inline]
    pub fn for_vertex_count(num_vertices: usize) -> Self {
        if num_vertices < (1 << 8) {
            IndexWidth::U8
        } else if num_vertices < (1 << 16) {
            IndexWidth::U16
        } else {
            IndexWidth::U32
        }
    }

    /// Number of bits per index
    #[inline]
    pub fn bits(self) -> u32 {
        match self {
            IndexWidth::U8 => 8,
            IndexWidth::U16 => 16,
            IndexWidth::U32 => 32,
        }
    }

    /// Largest vertex count a bucket of this width may hold
    #[inline]
    pub fn max_vertices(self) -> usize {
        match self {
            IndexWidth::U8 => (1 << 8) - 1,
            IndexWidth::U16 => (1 << 16) - 1,
            IndexWidth::U32 => u32::MAX as usize,
        }
    }

    /// Position of this width in per-width tables
    #[inline]
    pub fn slot(self) -> usize {
        match self {
            IndexWidth::U8 => 0,
            IndexWidth::U16 => 1,
            IndexWidth::U32 => 2,
        }
    }
}

/// Indices stored at the width chosen for their bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    /// Narrow 32-bit indices to `width`, failing if any index does not fit.
    pub fn from_u32(indices: &[u32], width: IndexWidth) -> Result<Self> {
        let limit = match width {
            IndexWidth::U8 => u8::MAX as u32,
            IndexWidth::U16 => u16::MAX as u32,
            IndexWidth::U32 => u32::MAX,
        };
        if let Some(&bad) = indices.iter().find(|&&i| i > limit) {
            return Err(GeometryError::IndexOutOfRange {
                index: bad,
                num_vertices: limit as usize + 1,
            });
        }
        Ok(match width {
            IndexWidth::U8 => IndexBuffer::U8(indices.iter().map(|&i| i as u8).collect()),
            IndexWidth::U16 => IndexBuffer::U16(indices.iter().map(|&i| i as u16).collect()),
            IndexWidth::U32 => IndexBuffer::U32(indices.to_vec()),
        })
    }

    #[inline]
    pub fn width(&self) -> IndexWidth {
        match self {
            IndexBuffer::U8(_) => IndexWidth::U8,
            IndexBuffer::U16(_) => IndexWidth::U16,
            IndexBuffer::U32(_) => IndexWidth::U32,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U8(v) => v.len(),
            IndexBuffer::U16(v) => v.len(),
            IndexBuffer::U32(v) => v.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index at position `i`, widened to u32
    #[inline]
    pub fn get(&self, i: usize) -> u32 {
        match self {
            IndexBuffer::U8(v) => v[i] as u32,
            IndexBuffer::U16(v) => v[i] as u32,
            IndexBuffer::U32(v) => v[i],
        }
    }

    /// Iterate indices widened to u32
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// Largest index, if any
    pub fn max_index(&self) -> Option<u32> {
        self.iter().max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_boundaries() {
        assert_eq!(IndexWidth::for_vertex_count(1), IndexWidth::U8);
        assert_eq!(IndexWidth::for_vertex_count(255), IndexWidth::U8);
        assert_eq!(IndexWidth::for_vertex_count(256), IndexWidth::U16);
        assert_eq!(IndexWidth::for_vertex_count(65_535), IndexWidth::U16);
        assert_eq!(IndexWidth::for_vertex_count(65_536), IndexWidth::U32);
    }

    #[test]
    fn test_narrowing_rejects_wide_index() {
        let err = IndexBuffer::from_u32(&[0, 1, 300], IndexWidth::U8).unwrap_err();
        assert!(matches!(err, GeometryError::IndexOutOfRange { index: 300, .. }));

        let ok = IndexBuffer::from_u32(&[0, 1, 300], IndexWidth::U16).unwrap();
        assert_eq!(ok.width(), IndexWidth::U16);
        assert_eq!(ok.get(2), 300);
        assert_eq!(ok.max_index(), Some(300));
    }
}
