// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-view program cache

use super::{RendererKind, RendererProgram, SceneShaderConfig};
use crate::gpu::GpuBackend;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Lifecycle of a [`RendererCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing compiled yet
    Uncompiled,
    /// Programs match the view's shader config
    Valid,
    /// The view's shader config changed; programs are stale
    Invalid,
    /// The view went away; every program was deleted
    Destroyed,
}

/// Programs of one view, compiled on first use.
///
/// Invalidation is lazy: when the view's shader config hash changes, stale
/// programs are deleted and each kind recompiles the next time it is asked
/// for.
pub struct RendererCache {
    gpu: Rc<dyn GpuBackend>,
    state: CacheState,
    hash: Option<String>,
    programs: FxHashMap<RendererKind, RendererProgram>,
}

impl std::fmt::Debug for RendererCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererCache")
            .field("state", &self.state)
            .field("hash", &self.hash)
            .field("programs", &self.programs.len())
            .finish()
    }
}

impl RendererCache {
    pub fn new(gpu: Rc<dyn GpuBackend>) -> Self {
        Self {
            gpu,
            state: CacheState::Uncompiled,
            hash: None,
            programs: FxHashMap::default(),
        }
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// Programs currently held, including ones that failed to compile
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn get(&self, kind: &RendererKind) -> Option<&RendererProgram> {
        self.programs.get(kind)
    }

    /// Whether the held programs were compiled for `config`
    pub fn is_valid(&self, config: &SceneShaderConfig) -> bool {
        self.state == CacheState::Valid && self.hash.as_deref() == Some(config.hash().as_str())
    }

    /// Mark programs stale after the view's shader config changed.
    pub fn invalidate(&mut self) {
        if self.state == CacheState::Valid {
            self.state = CacheState::Invalid;
        }
    }

    /// Adopt the view's current config, deleting programs compiled under
    /// another hash.
    pub fn on_view_compiled(&mut self, config: &SceneShaderConfig) {
        if self.is_valid(config) {
            return;
        }
        let hash = config.hash();
        let gpu = Rc::clone(&self.gpu);
        let before = self.programs.len();
        self.programs.retain(|_, program| {
            if program.hash() == hash {
                true
            } else {
                program.destroy(&*gpu);
                false
            }
        });
        tracing::debug!(
            hash = %hash,
            dropped = before - self.programs.len(),
            "renderer cache revalidated"
        );
        self.hash = Some(hash);
        self.state = CacheState::Valid;
    }

    /// Program for `kind`, compiling it under `config` when missing or stale.
    pub fn get_or_compile(
        &mut self,
        kind: RendererKind,
        config: &SceneShaderConfig,
    ) -> &RendererProgram {
        if !self.is_valid(config) {
            self.on_view_compiled(config);
        }
        let gpu = Rc::clone(&self.gpu);
        self.programs
            .entry(kind)
            .or_insert_with(|| RendererProgram::compile(&*gpu, kind, config))
    }

    /// Delete every program.
    pub fn on_view_destroyed(&mut self) {
        for program in self.programs.values_mut() {
            program.destroy(&*self.gpu);
        }
        self.programs.clear();
        self.hash = None;
        self.state = CacheState::Destroyed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::RecordingGpu;
    use crate::renderer::{PrimitiveClass, ProgramPass, RenderQuality};

    fn color() -> RendererKind {
        RendererKind::new(PrimitiveClass::Triangles, ProgramPass::Color, RenderQuality::Fast)
    }

    #[test]
    fn test_programs_compiled_once() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut cache = RendererCache::new(gpu.clone());
        let config = SceneShaderConfig::default();
        assert_eq!(cache.state(), CacheState::Uncompiled);

        let first = cache.get_or_compile(color(), &config).handle();
        let second = cache.get_or_compile(color(), &config).handle();
        assert_eq!(first, second);
        assert_eq!(gpu.live_programs(), 1);
        assert_eq!(cache.state(), CacheState::Valid);
    }

    #[test]
    fn test_hash_change_recompiles_lazily() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut cache = RendererCache::new(gpu.clone());
        let config = SceneShaderConfig::default();
        let old = cache.get_or_compile(color(), &config).handle();

        let clipped = SceneShaderConfig {
            num_section_planes: 1,
            ..config
        };
        cache.invalidate();
        assert_eq!(cache.state(), CacheState::Invalid);
        cache.on_view_compiled(&clipped);
        assert!(cache.is_empty());
        assert_eq!(gpu.live_programs(), 0);

        let new = cache.get_or_compile(color(), &clipped);
        assert_ne!(new.handle(), old);
        assert_eq!(new.hash(), clipped.hash());
        assert!(cache.is_valid(&clipped));
        assert!(!cache.is_valid(&config));
    }

    #[test]
    fn test_compile_failure_recorded() {
        let gpu = Rc::new(RecordingGpu::new());
        gpu.fail_programs_containing("silhouette");
        let mut cache = RendererCache::new(gpu.clone());
        let kind = RendererKind::new(
            PrimitiveClass::Triangles,
            ProgramPass::Silhouette,
            RenderQuality::Fast,
        );
        let program = cache.get_or_compile(kind, &SceneShaderConfig::default());
        assert!(!program.is_usable());
        assert!(!program.errors().is_empty());
    }

    #[test]
    fn test_destroy_releases_programs() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut cache = RendererCache::new(gpu.clone());
        cache.get_or_compile(color(), &SceneShaderConfig::default());
        cache.on_view_destroyed();
        assert_eq!(gpu.live_programs(), 0);
        assert_eq!(cache.state(), CacheState::Destroyed);
    }
}
