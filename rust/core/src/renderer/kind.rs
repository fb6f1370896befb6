// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Program identities and the scene state programs are compiled against

use crate::flags::RenderPass;
use serde::{Deserialize, Serialize};
use std::fmt;
use strata_geometry::PrimitiveType;

/// Primitive family a program assembles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveClass {
    Triangles,
    Lines,
    Points,
}

impl PrimitiveClass {
    pub fn vertices_per_primitive(self) -> usize {
        match self {
            PrimitiveClass::Triangles => 3,
            PrimitiveClass::Lines => 2,
            PrimitiveClass::Points => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveClass::Triangles => "triangles",
            PrimitiveClass::Lines => "lines",
            PrimitiveClass::Points => "points",
        }
    }
}

impl From<PrimitiveType> for PrimitiveClass {
    fn from(primitive: PrimitiveType) -> Self {
        match primitive {
            PrimitiveType::Lines => PrimitiveClass::Lines,
            PrimitiveType::Points => PrimitiveClass::Points,
            _ => PrimitiveClass::Triangles,
        }
    }
}

/// Family of render passes sharing one program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramPass {
    Color,
    Silhouette,
    Edges,
    Pick,
}

impl ProgramPass {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgramPass::Color => "color",
            ProgramPass::Silhouette => "silhouette",
            ProgramPass::Edges => "edges",
            ProgramPass::Pick => "pick",
        }
    }
}

impl From<RenderPass> for ProgramPass {
    fn from(pass: RenderPass) -> Self {
        match pass {
            RenderPass::Pick => ProgramPass::Pick,
            p if p.is_edges() => ProgramPass::Edges,
            p if p.is_silhouette() => ProgramPass::Silhouette,
            _ => ProgramPass::Color,
        }
    }
}

/// Shading model of color passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderQuality {
    /// Headlight lambert
    #[default]
    Fast,
    /// Directional lights with metallic/roughness
    High,
}

/// Which program a layer needs for a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererKind {
    pub primitive: PrimitiveClass,
    pub pass: ProgramPass,
    pub quality: RenderQuality,
}

impl RendererKind {
    /// Quality only distinguishes triangle color programs; every other kind
    /// is normalized to `Fast`.
    pub fn new(primitive: PrimitiveClass, pass: ProgramPass, quality: RenderQuality) -> Self {
        let quality = match (primitive, pass) {
            (PrimitiveClass::Triangles, ProgramPass::Color) => quality,
            _ => RenderQuality::Fast,
        };
        Self {
            primitive,
            pass,
            quality,
        }
    }

    /// Program for drawing a layer of `primitive` in `pass`, if any.
    ///
    /// Only triangle layers carry edges.
    pub fn for_layer(
        primitive: PrimitiveType,
        pass: RenderPass,
        quality: RenderQuality,
    ) -> Option<Self> {
        if pass == RenderPass::NotRendered || (pass.is_edges() && !primitive.is_triangles()) {
            return None;
        }
        Some(Self::new(primitive.into(), pass.into(), quality))
    }

    /// Stable name, e.g. `triangles-color-fast`
    pub fn label(&self) -> String {
        let quality = match self.quality {
            RenderQuality::Fast => "fast",
            RenderQuality::High => "high",
        };
        format!("{}-{}-{}", self.primitive.as_str(), self.pass.as_str(), quality)
    }
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// View state baked into shader source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SceneShaderConfig {
    pub num_section_planes: usize,
    pub num_directional_lights: usize,
    pub log_depth: bool,
}

impl SceneShaderConfig {
    /// Programs compiled under equal hashes are interchangeable.
    pub fn hash(&self) -> String {
        format!(
            "sp{};dl{};ld{}",
            self.num_section_planes,
            self.num_directional_lights,
            u8::from(self.log_depth)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_normalized_outside_triangle_color() {
        use PrimitiveClass::Triangles;
        let edges = RendererKind::new(Triangles, ProgramPass::Edges, RenderQuality::High);
        assert_eq!(edges.quality, RenderQuality::Fast);
        let color = RendererKind::new(Triangles, ProgramPass::Color, RenderQuality::High);
        assert_eq!(color.label(), "triangles-color-high");
    }

    #[test]
    fn test_no_edge_programs_for_points() {
        let fast = RenderQuality::Fast;
        assert!(RendererKind::for_layer(PrimitiveType::Points, RenderPass::EdgesSelected, fast).is_none());
        let kind =
            RendererKind::for_layer(PrimitiveType::Solid, RenderPass::SilhouetteXRayed, fast).unwrap();
        assert_eq!(kind.pass, ProgramPass::Silhouette);
        assert_eq!(kind.primitive, PrimitiveClass::Triangles);
    }

    #[test]
    fn test_hash_tracks_config() {
        let a = SceneShaderConfig::default();
        let b = SceneShaderConfig {
            num_section_planes: 1,
            ..a
        };
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), "sp0;dl0;ld0");
    }
}
