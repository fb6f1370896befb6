// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scene objects and their per-view state

use crate::flags::RenderFlags;
use smallvec::SmallVec;
use strata_geometry::Aabb;

/// State of one object in one view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectViewState {
    pub flags: RenderFlags,
    /// Replaces the base color of every mesh when set
    pub colorize: Option<[u8; 3]>,
    /// Replaces the base opacity of every mesh when set
    pub opacity: Option<u8>,
    pub offset: [f32; 3],
}

impl Default for ObjectViewState {
    fn default() -> Self {
        Self {
            flags: RenderFlags::INITIAL,
            colorize: None,
            opacity: None,
            offset: [0.0; 3],
        }
    }
}

impl ObjectViewState {
    /// Color texel of a mesh whose base color is `color` and `opacity`
    pub fn mesh_rgba(&self, color: [u8; 3], opacity: u8) -> [u8; 4] {
        let [r, g, b] = self.colorize.unwrap_or(color);
        [r, g, b, self.opacity.unwrap_or(opacity)]
    }

    /// Whether a mesh of base `opacity` draws in the transparent pass
    pub fn is_transparent(&self, opacity: u8) -> bool {
        self.opacity.unwrap_or(opacity) < u8::MAX
    }
}

/// A semantic unit, such as a building element, made of one or more meshes
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub(crate) id: String,
    /// Indices into the model's meshes
    pub(crate) meshes: SmallVec<[usize; 2]>,
    pub(crate) aabb: Aabb,
    pub(crate) view_layer: Option<String>,
    /// Indexed by view slot
    pub(crate) views: Vec<Option<ObjectViewState>>,
}

impl SceneObject {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn view_layer(&self) -> Option<&str> {
        self.view_layer.as_deref()
    }

    pub fn num_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn view_state(&self, view: usize) -> Option<&ObjectViewState> {
        self.views.get(view).and_then(Option::as_ref)
    }

    pub fn flags(&self, view: usize) -> Option<RenderFlags> {
        self.view_state(view).map(|s| s.flags)
    }

    pub(crate) fn add_view(&mut self, slot: usize) {
        if self.views.len() <= slot {
            self.views.resize_with(slot + 1, || None);
        }
        self.views[slot].get_or_insert_with(ObjectViewState::default);
    }

    pub(crate) fn remove_view(&mut self, slot: usize) {
        if let Some(state) = self.views.get_mut(slot) {
            *state = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colorize_and_opacity_override_base() {
        let mut state = ObjectViewState::default();
        assert_eq!(state.mesh_rgba([10, 20, 30], 255), [10, 20, 30, 255]);
        assert!(!state.is_transparent(255));

        state.colorize = Some([1, 2, 3]);
        state.opacity = Some(128);
        assert_eq!(state.mesh_rgba([10, 20, 30], 255), [1, 2, 3, 128]);
        assert!(state.is_transparent(255));
    }

    #[test]
    fn test_view_slots_grow_on_demand() {
        let mut object = SceneObject {
            id: "wall".into(),
            meshes: SmallVec::new(),
            aabb: Aabb::empty(),
            view_layer: None,
            views: Vec::new(),
        };
        object.add_view(2);
        assert!(object.view_state(0).is_none());
        assert_eq!(object.flags(2), Some(RenderFlags::INITIAL));
        object.remove_view(2);
        assert!(object.flags(2).is_none());
    }
}
