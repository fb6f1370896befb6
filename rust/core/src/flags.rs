// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-mesh render state and its classification into render passes.

use std::fmt;

bitflags::bitflags! {
    /// Boolean render state of an object in one view.
    ///
    /// Objects push the whole mask down to their meshes whenever one bit
    /// changes; layers never see individual booleans.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderFlags: u16 {
        const VISIBLE = 1 << 0;
        const CULLED = 1 << 1;
        const PICKABLE = 1 << 2;
        const CLIPPABLE = 1 << 3;
        const COLLIDABLE = 1 << 4;
        const EDGES = 1 << 5;
        const XRAYED = 1 << 6;
        const HIGHLIGHTED = 1 << 7;
        const SELECTED = 1 << 8;
    }
}

impl RenderFlags {
    /// State of a newly created object
    pub const INITIAL: RenderFlags = RenderFlags::VISIBLE
        .union(RenderFlags::PICKABLE)
        .union(RenderFlags::CLIPPABLE)
        .union(RenderFlags::COLLIDABLE);

    /// Flag names in declaration order, for diagnostics
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        self.iter_names().map(|(name, _)| name)
    }
}

impl Default for RenderFlags {
    fn default() -> Self {
        RenderFlags::empty()
    }
}

/// Shader pass a mesh takes part in. Stored in the mesh flags texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum RenderPass {
    NotRendered = 0,
    ColorOpaque = 1,
    ColorTransparent = 2,
    SilhouetteHighlighted = 3,
    SilhouetteSelected = 4,
    SilhouetteXRayed = 5,
    EdgesColorOpaque = 6,
    EdgesColorTransparent = 7,
    EdgesHighlighted = 8,
    EdgesSelected = 9,
    EdgesXRayed = 10,
    Pick = 11,
}

impl RenderPass {
    /// Order passes are drawn in within a frame
    pub const FRAME_ORDER: [RenderPass; 10] = [
        RenderPass::ColorOpaque,
        RenderPass::EdgesColorOpaque,
        RenderPass::ColorTransparent,
        RenderPass::EdgesColorTransparent,
        RenderPass::SilhouetteXRayed,
        RenderPass::EdgesXRayed,
        RenderPass::SilhouetteHighlighted,
        RenderPass::EdgesHighlighted,
        RenderPass::SilhouetteSelected,
        RenderPass::EdgesSelected,
    ];

    #[inline]
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn is_edges(self) -> bool {
        matches!(
            self,
            RenderPass::EdgesColorOpaque
                | RenderPass::EdgesColorTransparent
                | RenderPass::EdgesHighlighted
                | RenderPass::EdgesSelected
                | RenderPass::EdgesXRayed
        )
    }

    pub fn is_silhouette(self) -> bool {
        matches!(
            self,
            RenderPass::SilhouetteHighlighted
                | RenderPass::SilhouetteSelected
                | RenderPass::SilhouetteXRayed
        )
    }

    /// Passes blended over what is already drawn
    pub fn is_blended(self) -> bool {
        matches!(
            self,
            RenderPass::ColorTransparent
                | RenderPass::EdgesColorTransparent
                | RenderPass::SilhouetteXRayed
                | RenderPass::EdgesXRayed
        )
    }
}

impl fmt::Display for RenderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a layer knows about one mesh in one view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshState {
    pub flags: RenderFlags,
    pub transparent: bool,
}

impl MeshState {
    pub fn new(flags: RenderFlags, transparent: bool) -> Self {
        Self { flags, transparent }
    }

    #[inline]
    fn drawable(&self) -> bool {
        self.flags.contains(RenderFlags::VISIBLE) && !self.flags.contains(RenderFlags::CULLED)
    }

    pub fn color_pass(&self) -> RenderPass {
        let f = self.flags;
        let xray_only = f.contains(RenderFlags::XRAYED)
            && !f.intersects(RenderFlags::SELECTED | RenderFlags::HIGHLIGHTED);
        if !self.drawable() || xray_only {
            RenderPass::NotRendered
        } else if self.transparent {
            RenderPass::ColorTransparent
        } else {
            RenderPass::ColorOpaque
        }
    }

    pub fn silhouette_pass(&self) -> RenderPass {
        let f = self.flags;
        if !self.drawable() {
            RenderPass::NotRendered
        } else if f.contains(RenderFlags::SELECTED) {
            RenderPass::SilhouetteSelected
        } else if f.contains(RenderFlags::HIGHLIGHTED) {
            RenderPass::SilhouetteHighlighted
        } else if f.contains(RenderFlags::XRAYED) {
            RenderPass::SilhouetteXRayed
        } else {
            RenderPass::NotRendered
        }
    }

    pub fn edges_pass(&self) -> RenderPass {
        let f = self.flags;
        if !self.drawable() {
            RenderPass::NotRendered
        } else if f.contains(RenderFlags::SELECTED) {
            RenderPass::EdgesSelected
        } else if f.contains(RenderFlags::HIGHLIGHTED) {
            RenderPass::EdgesHighlighted
        } else if f.contains(RenderFlags::XRAYED) {
            RenderPass::EdgesXRayed
        } else if f.contains(RenderFlags::EDGES) {
            if self.transparent {
                RenderPass::EdgesColorTransparent
            } else {
                RenderPass::EdgesColorOpaque
            }
        } else {
            RenderPass::NotRendered
        }
    }

    pub fn pick_pass(&self) -> RenderPass {
        if self.drawable() && self.flags.contains(RenderFlags::PICKABLE) {
            RenderPass::Pick
        } else {
            RenderPass::NotRendered
        }
    }

    /// Second flags texel: color pass (low nibble) with the clippable bit
    /// above it, then silhouette, edges and pick passes.
    pub fn pass_texel(&self) -> [u8; 4] {
        let clippable = u8::from(self.flags.contains(RenderFlags::CLIPPABLE)) << 4;
        [
            self.color_pass().value() | clippable,
            self.silhouette_pass().value(),
            self.edges_pass().value(),
            self.pick_pass().value(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(flags: RenderFlags) -> MeshState {
        MeshState::new(flags, false)
    }

    #[test]
    fn test_initial_state_is_opaque_and_pickable() {
        let s = state(RenderFlags::INITIAL);
        assert_eq!(s.color_pass(), RenderPass::ColorOpaque);
        assert_eq!(s.pick_pass(), RenderPass::Pick);
        assert_eq!(s.silhouette_pass(), RenderPass::NotRendered);
        assert_eq!(s.pass_texel(), [1 | 0x10, 0, 0, 11]);
    }

    #[test]
    fn test_hidden_mesh_renders_nothing() {
        let s = state(RenderFlags::PICKABLE | RenderFlags::SELECTED);
        assert_eq!(s.pass_texel(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_xrayed_skips_color_unless_selected() {
        let xrayed = state(RenderFlags::VISIBLE | RenderFlags::XRAYED);
        assert_eq!(xrayed.color_pass(), RenderPass::NotRendered);
        assert_eq!(xrayed.silhouette_pass(), RenderPass::SilhouetteXRayed);

        let selected = state(RenderFlags::VISIBLE | RenderFlags::XRAYED | RenderFlags::SELECTED);
        assert_eq!(selected.color_pass(), RenderPass::ColorOpaque);
        assert_eq!(selected.silhouette_pass(), RenderPass::SilhouetteSelected);
        assert_eq!(selected.edges_pass(), RenderPass::EdgesSelected);
    }

    #[test]
    fn test_transparent_edges() {
        let s = MeshState::new(RenderFlags::VISIBLE | RenderFlags::EDGES, true);
        assert_eq!(s.color_pass(), RenderPass::ColorTransparent);
        assert_eq!(s.edges_pass(), RenderPass::EdgesColorTransparent);
    }

    #[test]
    fn test_culled_is_not_pickable() {
        let s = state(RenderFlags::INITIAL | RenderFlags::CULLED);
        assert_eq!(s.pick_pass(), RenderPass::NotRendered);
    }
}
