// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Viewer configuration.
//!
//! Loaded from JSON (or a JS object in the wasm facade); every field has a
//! default, so `{}` is a valid configuration.

use crate::layer::LayerCapacity;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Data texture row width in texels.
pub const DEFAULT_TEXTURE_WIDTH: u32 = 4096;
/// Tallest data texture a layer may allocate.
pub const DEFAULT_MAX_TEXTURE_HEIGHT: u32 = 2048;
/// Slot and mesh ids are stored in 16-bit texels and pick colors.
pub const MAX_MESH_SLOTS: usize = 1 << 16;

/// Configuration shared by every model and view of a viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StrataConfig {
    /// Data texture width in texels.
    pub texture_width: u32,
    /// Maximum data texture height in rows.
    pub max_texture_height: u32,
    /// Maximum bucket slots (one per placed geometry bucket) per layer.
    pub max_mesh_slots: usize,
    /// Number of view slots; per-object state arrays are sized to this.
    pub max_views: usize,
    /// Largest bucket produced when splitting uncompressed geometry.
    pub max_bucket_vertices: usize,
    /// Crease angle for generated edges, in degrees.
    pub edge_threshold: f64,
    /// RTC tile size in metres.
    pub rtc_cell_size: f64,
    /// Override for the per-layer vertex budget.
    pub max_vertices_per_layer: Option<usize>,
    /// Override for the per-layer, per-index-width primitive budget.
    pub max_primitives_per_layer: Option<usize>,
    /// Override for the per-layer mesh budget.
    pub max_meshes_per_layer: Option<usize>,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            texture_width: DEFAULT_TEXTURE_WIDTH,
            max_texture_height: DEFAULT_MAX_TEXTURE_HEIGHT,
            max_mesh_slots: MAX_MESH_SLOTS,
            max_views: 4,
            max_bucket_vertices: (1 << 16) - 1,
            edge_threshold: strata_geometry::DEFAULT_EDGE_THRESHOLD,
            rtc_cell_size: strata_geometry::DEFAULT_RTC_CELL_SIZE,
            max_vertices_per_layer: None,
            max_primitives_per_layer: None,
            max_meshes_per_layer: None,
        }
    }
}

impl StrataConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: StrataConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the layer layout depends on.
    pub fn validate(&self) -> Result<()> {
        if self.texture_width == 0 || self.texture_width % 4 != 0 {
            // Matrix records are 4 texels and must not straddle rows
            return Err(Error::Config(format!(
                "textureWidth must be a positive multiple of 4, got {}",
                self.texture_width
            )));
        }
        if self.max_texture_height == 0 {
            return Err(Error::Config("maxTextureHeight must be positive".to_string()));
        }
        if self.max_mesh_slots == 0 || self.max_mesh_slots > MAX_MESH_SLOTS {
            return Err(Error::Config(format!(
                "maxMeshSlots must be within 1..={}, got {}",
                MAX_MESH_SLOTS, self.max_mesh_slots
            )));
        }
        if self.max_views == 0 || self.max_views > 32 {
            return Err(Error::Config(format!(
                "maxViews must be within 1..=32, got {}",
                self.max_views
            )));
        }
        if self.max_bucket_vertices < 3 {
            return Err(Error::Config("maxBucketVertices must be at least 3".to_string()));
        }
        if self.rtc_cell_size <= 0.0 {
            return Err(Error::Config("rtcCellSize must be positive".to_string()));
        }
        Ok(())
    }

    /// Texels available in one maximum-size data texture.
    #[inline]
    pub fn texels_per_texture(&self) -> usize {
        self.texture_width as usize * self.max_texture_height as usize
    }

    /// Per-layer budgets derived from the texture limits and overrides.
    pub fn layer_capacity(&self) -> LayerCapacity {
        let texels = self.texels_per_texture();
        let cap = |limit: usize, over: Option<usize>| over.map_or(limit, |o| o.min(limit));
        LayerCapacity {
            max_vertices: cap(texels, self.max_vertices_per_layer),
            max_primitives: cap(texels, self.max_primitives_per_layer),
            max_slots: self.max_mesh_slots.min(texels),
            // Four matrix texels per mesh, and 16-bit mesh ids in pick colors
            max_meshes: cap((texels / 4).min(MAX_MESH_SLOTS), self.max_meshes_per_layer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = StrataConfig::from_json("{}").unwrap();
        assert_eq!(config, StrataConfig::default());
    }

    #[test]
    fn test_camel_case_overrides() {
        let config =
            StrataConfig::from_json(r#"{"maxViews": 2, "maxVerticesPerLayer": 100}"#).unwrap();
        assert_eq!(config.max_views, 2);
        assert_eq!(config.layer_capacity().max_vertices, 100);
    }

    #[test]
    fn test_rejects_unaligned_texture_width() {
        let err = StrataConfig::from_json(r#"{"textureWidth": 1001}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_capacity_clamped_to_texture_size() {
        let config = StrataConfig {
            texture_width: 8,
            max_texture_height: 2,
            max_vertices_per_layer: Some(1000),
            ..Default::default()
        };
        let capacity = config.layer_capacity();
        assert_eq!(capacity.max_vertices, 16);
        assert_eq!(capacity.max_meshes, 4);
    }
}
