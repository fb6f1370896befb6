// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Aggregate mesh counters used to skip whole passes

use crate::flags::{MeshState, RenderFlags, RenderPass};

/// How many meshes of a layer are in each state, for one view.
///
/// Counters only move through [`MeshCounts::reclassify`], which compares the
/// old and new state of a single mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshCounts {
    pub num_meshes: u32,
    pub num_visible: u32,
    pub num_transparent: u32,
    pub num_edges: u32,
    pub num_xrayed: u32,
    pub num_selected: u32,
    pub num_highlighted: u32,
    pub num_clippable: u32,
    pub num_pickable: u32,
    pub num_culled: u32,
}

#[inline]
fn bump(counter: &mut u32, was: bool, now: bool) {
    match (was, now) {
        (false, true) => *counter += 1,
        (true, false) => *counter = counter.saturating_sub(1),
        _ => {}
    }
}

impl MeshCounts {
    /// Count a new mesh entering in `state`
    pub fn add_mesh(&mut self, state: &MeshState) {
        self.num_meshes += 1;
        self.reclassify(&MeshState::default(), state);
    }

    /// Move one mesh from `old` to `new`
    pub fn reclassify(&mut self, old: &MeshState, new: &MeshState) {
        let (a, b) = (old.flags, new.flags);
        let flag = |f: RenderFlags| (a.contains(f), b.contains(f));
        for (counter, f) in [
            (&mut self.num_visible, RenderFlags::VISIBLE),
            (&mut self.num_edges, RenderFlags::EDGES),
            (&mut self.num_xrayed, RenderFlags::XRAYED),
            (&mut self.num_selected, RenderFlags::SELECTED),
            (&mut self.num_highlighted, RenderFlags::HIGHLIGHTED),
            (&mut self.num_clippable, RenderFlags::CLIPPABLE),
            (&mut self.num_pickable, RenderFlags::PICKABLE),
            (&mut self.num_culled, RenderFlags::CULLED),
        ] {
            let (was, now) = flag(f);
            bump(counter, was, now);
        }
        bump(&mut self.num_transparent, old.transparent, new.transparent);
    }

    /// Whether any mesh could take part in `pass`
    pub fn has_work(&self, pass: RenderPass) -> bool {
        if self.num_visible == 0 || self.num_culled >= self.num_meshes {
            return false;
        }
        let all_xray_only = self.num_xrayed >= self.num_meshes
            && self.num_selected == 0
            && self.num_highlighted == 0;
        match pass {
            RenderPass::NotRendered => false,
            RenderPass::ColorOpaque => !all_xray_only && self.num_transparent < self.num_meshes,
            RenderPass::ColorTransparent => !all_xray_only && self.num_transparent > 0,
            RenderPass::EdgesColorOpaque => {
                self.num_edges > 0 && self.num_transparent < self.num_meshes
            }
            RenderPass::EdgesColorTransparent => self.num_edges > 0 && self.num_transparent > 0,
            RenderPass::SilhouetteXRayed | RenderPass::EdgesXRayed => self.num_xrayed > 0,
            RenderPass::SilhouetteHighlighted | RenderPass::EdgesHighlighted => {
                self.num_highlighted > 0
            }
            RenderPass::SilhouetteSelected | RenderPass::EdgesSelected => self.num_selected > 0,
            RenderPass::Pick => self.num_pickable > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reclassify_moves_single_counters() {
        let mut counts = MeshCounts::default();
        let initial = MeshState::new(RenderFlags::INITIAL, false);
        counts.add_mesh(&initial);
        counts.add_mesh(&initial);
        assert_eq!(counts.num_visible, 2);
        assert_eq!(counts.num_pickable, 2);

        let selected = MeshState::new(RenderFlags::INITIAL | RenderFlags::SELECTED, true);
        counts.reclassify(&initial, &selected);
        assert_eq!(counts.num_selected, 1);
        assert_eq!(counts.num_transparent, 1);
        assert_eq!(counts.num_visible, 2);

        counts.reclassify(&selected, &initial);
        assert_eq!(counts.num_selected, 0);
        assert_eq!(counts.num_transparent, 0);
    }

    #[test]
    fn test_same_state_is_noop() {
        let mut counts = MeshCounts::default();
        let s = MeshState::new(RenderFlags::INITIAL | RenderFlags::EDGES, false);
        counts.add_mesh(&s);
        let before = counts;
        counts.reclassify(&s, &s);
        assert_eq!(counts, before);
    }

    #[test]
    fn test_passes_skipped_without_work() {
        let mut counts = MeshCounts::default();
        counts.add_mesh(&MeshState::new(RenderFlags::INITIAL, false));
        assert!(counts.has_work(RenderPass::ColorOpaque));
        assert!(!counts.has_work(RenderPass::ColorTransparent));
        assert!(!counts.has_work(RenderPass::SilhouetteSelected));
        assert!(counts.has_work(RenderPass::Pick));

        let hidden = MeshCounts {
            num_meshes: 1,
            ..Default::default()
        };
        assert!(!hidden.has_work(RenderPass::ColorOpaque));
    }
}
