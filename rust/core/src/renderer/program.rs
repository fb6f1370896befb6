// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::shaders::{compose, fragments_for, ShaderStage};
use super::{RendererKind, SceneShaderConfig};
use crate::gpu::{GpuBackend, ProgramHandle};

/// A compiled shader program for one [`RendererKind`].
///
/// Compile failures are kept on the program: the pass it serves is skipped
/// and the rest of the frame still renders.
#[derive(Debug)]
pub struct RendererProgram {
    kind: RendererKind,
    hash: String,
    handle: Option<ProgramHandle>,
    errors: Vec<String>,
}

impl RendererProgram {
    pub fn compile(gpu: &dyn GpuBackend, kind: RendererKind, config: &SceneShaderConfig) -> Self {
        let label = kind.label();
        let vertex = Self::build_vertex_shader(&kind, config);
        let fragment = Self::build_fragment_shader(&kind, config);
        let (handle, errors) = match gpu.compile_program(&label, &vertex, &fragment) {
            Ok(handle) => (Some(handle), Vec::new()),
            Err(errors) => {
                tracing::warn!(
                    program = %label,
                    errors = ?errors,
                    "shader program failed to compile"
                );
                (None, errors)
            }
        };
        Self {
            kind,
            hash: config.hash(),
            handle,
            errors,
        }
    }

    pub fn build_vertex_shader(kind: &RendererKind, config: &SceneShaderConfig) -> String {
        let fragments = fragments_for(kind, config, ShaderStage::Vertex);
        compose(ShaderStage::Vertex, &fragments, kind, config)
    }

    pub fn build_fragment_shader(kind: &RendererKind, config: &SceneShaderConfig) -> String {
        let fragments = fragments_for(kind, config, ShaderStage::Fragment);
        compose(ShaderStage::Fragment, &fragments, kind, config)
    }

    pub fn kind(&self) -> RendererKind {
        self.kind
    }

    /// Scene config hash this program was compiled under
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// `None` when compilation failed or the program was destroyed
    pub fn handle(&self) -> Option<ProgramHandle> {
        self.handle
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn is_usable(&self) -> bool {
        self.handle.is_some()
    }

    pub fn destroy(&mut self, gpu: &dyn GpuBackend) {
        if let Some(handle) = self.handle.take() {
            gpu.delete_program(handle);
        }
    }
}
