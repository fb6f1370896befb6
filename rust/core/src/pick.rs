// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pick color encoding
//!
//! Red and green carry the mesh index, blue and alpha the layer's pick id.
//! Pick id 0 is reserved for the cleared background.

/// RGBA8 pick color for a mesh of a layer
pub fn encode_pick_color(layer_pick_id: u16, mesh_index: u16) -> [u8; 4] {
    let [m0, m1] = mesh_index.to_le_bytes();
    let [l0, l1] = layer_pick_id.to_le_bytes();
    [m0, m1, l0, l1]
}

/// Layer pick id and mesh index, or `None` for background
pub fn decode_pick_color(rgba: [u8; 4]) -> Option<(u16, u16)> {
    let layer = u16::from_le_bytes([rgba[2], rgba[3]]);
    if layer == 0 {
        return None;
    }
    Some((layer, u16::from_le_bytes([rgba[0], rgba[1]])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_index_survives_pick_color() {
        for (layer, mesh) in [(1u16, 0u16), (2, 255), (300, 256), (u16::MAX, u16::MAX)] {
            assert_eq!(decode_pick_color(encode_pick_color(layer, mesh)), Some((layer, mesh)));
        }
    }

    #[test]
    fn test_background_decodes_to_none() {
        assert_eq!(decode_pick_color([0, 0, 0, 0]), None);
        assert_eq!(decode_pick_color([12, 0, 0, 0]), None);
    }
}
