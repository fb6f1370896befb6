// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! WebGL2 implementation of the GPU backend
//!
//! Data textures are immutable-storage integer (or float) textures sampled
//! with `texelFetch`, so filtering is NEAREST and wrapping is clamped.
//! Draws carry no vertex attributes; an empty vertex array object stays
//! bound for the lifetime of the backend.

use std::cell::RefCell;

use rustc_hash::FxHashMap;
use strata_core::gpu::{
    DrawCall, DrawMode, DrawState, FrameTarget, GpuBackend, ProgramHandle, TexelFormat,
    TexelSlice, TextureDesc, TextureHandle, TextureRegion, Uniform,
};
use strata_core::{Error, Result};
use wasm_bindgen::JsValue;
use web_sys::{
    WebGl2RenderingContext as Gl, WebGlFramebuffer, WebGlProgram, WebGlRenderbuffer,
    WebGlShader, WebGlTexture, WebGlUniformLocation, WebGlVertexArrayObject,
};

use crate::utils;

/// (internal format, format, type) for a texel format
fn gl_format(format: TexelFormat) -> (u32, u32, u32) {
    match format {
        TexelFormat::R8UI => (Gl::R8UI, Gl::RED_INTEGER, Gl::UNSIGNED_BYTE),
        TexelFormat::RG8UI => (Gl::RG8UI, Gl::RG_INTEGER, Gl::UNSIGNED_BYTE),
        TexelFormat::RGB8UI => (Gl::RGB8UI, Gl::RGB_INTEGER, Gl::UNSIGNED_BYTE),
        TexelFormat::RGBA8UI => (Gl::RGBA8UI, Gl::RGBA_INTEGER, Gl::UNSIGNED_BYTE),
        TexelFormat::R16UI => (Gl::R16UI, Gl::RED_INTEGER, Gl::UNSIGNED_SHORT),
        TexelFormat::RG16UI => (Gl::RG16UI, Gl::RG_INTEGER, Gl::UNSIGNED_SHORT),
        TexelFormat::RGB16UI => (Gl::RGB16UI, Gl::RGB_INTEGER, Gl::UNSIGNED_SHORT),
        TexelFormat::R32UI => (Gl::R32UI, Gl::RED_INTEGER, Gl::UNSIGNED_INT),
        TexelFormat::RG32UI => (Gl::RG32UI, Gl::RG_INTEGER, Gl::UNSIGNED_INT),
        TexelFormat::RGB32UI => (Gl::RGB32UI, Gl::RGB_INTEGER, Gl::UNSIGNED_INT),
        TexelFormat::RGBA32UI => (Gl::RGBA32UI, Gl::RGBA_INTEGER, Gl::UNSIGNED_INT),
        TexelFormat::RGBA32F => (Gl::RGBA32F, Gl::RGBA, Gl::FLOAT),
    }
}

/// Copy texel components into a JS typed array of the matching type
fn typed_array(data: TexelSlice<'_>) -> js_sys::Object {
    match data {
        TexelSlice::U8(s) => js_sys::Uint8Array::from(s).into(),
        TexelSlice::U16(s) => js_sys::Uint16Array::from(s).into(),
        TexelSlice::U32(s) => js_sys::Uint32Array::from(s).into(),
        TexelSlice::F32(s) => js_sys::Float32Array::from(s).into(),
    }
}

fn gl_error(what: &str, err: JsValue) -> Error {
    Error::Gpu(format!("{what}: {err:?}"))
}

struct GlProgram {
    program: WebGlProgram,
    label: String,
    uniforms: FxHashMap<&'static str, Option<WebGlUniformLocation>>,
}

/// Off-screen color + depth target for picking, sized to the drawing buffer
struct PickTarget {
    framebuffer: WebGlFramebuffer,
    color: WebGlRenderbuffer,
    depth: WebGlRenderbuffer,
    width: i32,
    height: i32,
}

#[derive(Default)]
struct State {
    next_id: u32,
    textures: FxHashMap<u32, WebGlTexture>,
    programs: FxHashMap<u32, GlProgram>,
    pick: Option<PickTarget>,
    /// GL window coordinates of the last pick frame
    pick_pixel: (i32, i32),
}

impl State {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// GPU backend over a WebGL2 context
pub struct WebGl2Backend {
    gl: Gl,
    state: RefCell<State>,
    vao: Option<WebGlVertexArrayObject>,
}

impl WebGl2Backend {
    pub fn new(gl: Gl) -> Self {
        let vao = gl.create_vertex_array();
        gl.bind_vertex_array(vao.as_ref());
        gl.pixel_storei(Gl::UNPACK_ALIGNMENT, 1);
        gl.pixel_storei(Gl::PACK_ALIGNMENT, 1);
        Self {
            gl,
            state: RefCell::new(State::default()),
            vao,
        }
    }

    pub fn context(&self) -> &Gl {
        &self.gl
    }

    fn upload(
        &self,
        texture: &WebGlTexture,
        desc: &TextureDesc,
        region: TextureRegion,
        data: TexelSlice<'_>,
    ) -> Result<()> {
        let expected = region.texel_count() * desc.format.channels();
        if data.len() != expected {
            return Err(Error::TexelMismatch {
                label: desc.label,
                reason: format!("{} components for a {expected}-component region", data.len()),
            });
        }
        let (_, format, ty) = gl_format(desc.format);
        let pixels = typed_array(data);
        self.gl.bind_texture(Gl::TEXTURE_2D, Some(texture));
        self.gl
            .tex_sub_image_2d_with_i32_and_i32_and_u32_and_type_and_opt_array_buffer_view(
                Gl::TEXTURE_2D,
                0,
                region.x as i32,
                region.y as i32,
                region.width as i32,
                region.height as i32,
                format,
                ty,
                Some(&pixels),
            )
            .map_err(|e| gl_error(desc.label, e))
    }

    fn compile_shader(&self, kind: u32, source: &str) -> std::result::Result<WebGlShader, String> {
        let shader = self
            .gl
            .create_shader(kind)
            .ok_or_else(|| "unable to create shader".to_string())?;
        self.gl.shader_source(&shader, source);
        self.gl.compile_shader(&shader);
        let ok = self
            .gl
            .get_shader_parameter(&shader, Gl::COMPILE_STATUS)
            .as_bool()
            .unwrap_or(false);
        if ok {
            Ok(shader)
        } else {
            let log = self.gl.get_shader_info_log(&shader).unwrap_or_default();
            self.gl.delete_shader(Some(&shader));
            Err(log)
        }
    }

    /// Make sure the pick target matches the drawing buffer
    fn pick_target(&self, state: &mut State) -> Option<(i32, i32)> {
        let width = self.gl.drawing_buffer_width().max(1);
        let height = self.gl.drawing_buffer_height().max(1);
        if let Some(target) = &state.pick {
            if target.width == width && target.height == height {
                self.gl
                    .bind_framebuffer(Gl::FRAMEBUFFER, Some(&target.framebuffer));
                return Some((width, height));
            }
        }
        if let Some(old) = state.pick.take() {
            self.gl.delete_framebuffer(Some(&old.framebuffer));
            self.gl.delete_renderbuffer(Some(&old.color));
            self.gl.delete_renderbuffer(Some(&old.depth));
        }

        let framebuffer = self.gl.create_framebuffer()?;
        let color = self.gl.create_renderbuffer()?;
        let depth = self.gl.create_renderbuffer()?;
        self.gl.bind_framebuffer(Gl::FRAMEBUFFER, Some(&framebuffer));
        for (buffer, format, attachment) in [
            (&color, Gl::RGBA8, Gl::COLOR_ATTACHMENT0),
            (&depth, Gl::DEPTH_COMPONENT24, Gl::DEPTH_ATTACHMENT),
        ] {
            self.gl.bind_renderbuffer(Gl::RENDERBUFFER, Some(buffer));
            self.gl
                .renderbuffer_storage(Gl::RENDERBUFFER, format, width, height);
            self.gl.framebuffer_renderbuffer(
                Gl::FRAMEBUFFER,
                attachment,
                Gl::RENDERBUFFER,
                Some(buffer),
            );
        }
        self.gl.bind_renderbuffer(Gl::RENDERBUFFER, None);
        state.pick = Some(PickTarget {
            framebuffer,
            color,
            depth,
            width,
            height,
        });
        Some((width, height))
    }

    fn apply_state(&self, state: DrawState) {
        let gl = &self.gl;
        if state.blend {
            gl.enable(Gl::BLEND);
            gl.blend_func(Gl::SRC_ALPHA, Gl::ONE_MINUS_SRC_ALPHA);
        } else {
            gl.disable(Gl::BLEND);
        }
        gl.depth_mask(state.depth_write);
        if state.cull_back_faces {
            gl.enable(Gl::CULL_FACE);
            gl.cull_face(Gl::BACK);
        } else {
            gl.disable(Gl::CULL_FACE);
        }
    }

    fn set_uniform(&self, location: Option<&WebGlUniformLocation>, value: &Uniform) {
        let gl = &self.gl;
        match value {
            Uniform::Int(v) => gl.uniform1i(location, *v),
            Uniform::UInt(v) => gl.uniform1ui(location, *v),
            Uniform::Float(v) => gl.uniform1f(location, *v),
            Uniform::Bool(v) => gl.uniform1i(location, i32::from(*v)),
            Uniform::Vec2(v) => gl.uniform2fv_with_f32_array(location, v),
            Uniform::Vec3(v) => gl.uniform3fv_with_f32_array(location, v),
            Uniform::Vec4(v) => gl.uniform4fv_with_f32_array(location, v),
            Uniform::Mat4(m) => gl.uniform_matrix4fv_with_f32_array(location, false, m),
            Uniform::Mat4Array(m) => gl.uniform_matrix4fv_with_f32_array(location, false, m),
            Uniform::Vec3Array(v) => gl.uniform3fv_with_f32_array(location, v),
            Uniform::Vec4Array(v) => gl.uniform4fv_with_f32_array(location, v),
            Uniform::BoolArray(v) => {
                let ints: Vec<i32> = v.iter().map(|&b| i32::from(b)).collect();
                gl.uniform1iv_with_i32_array(location, &ints);
            }
        }
    }
}

impl GpuBackend for WebGl2Backend {
    fn create_texture(&self, desc: &TextureDesc, data: TexelSlice<'_>) -> Result<TextureHandle> {
        let texture = self
            .gl
            .create_texture()
            .ok_or_else(|| Error::Gpu(format!("{}: unable to create texture", desc.label)))?;
        let (internal, _, _) = gl_format(desc.format);
        self.gl.bind_texture(Gl::TEXTURE_2D, Some(&texture));
        self.gl.tex_storage_2d(
            Gl::TEXTURE_2D,
            1,
            internal,
            desc.width as i32,
            desc.height as i32,
        );
        for (pname, param) in [
            (Gl::TEXTURE_MIN_FILTER, Gl::NEAREST),
            (Gl::TEXTURE_MAG_FILTER, Gl::NEAREST),
            (Gl::TEXTURE_WRAP_S, Gl::CLAMP_TO_EDGE),
            (Gl::TEXTURE_WRAP_T, Gl::CLAMP_TO_EDGE),
        ] {
            self.gl.tex_parameteri(Gl::TEXTURE_2D, pname, param as i32);
        }
        let full = TextureRegion {
            x: 0,
            y: 0,
            width: desc.width,
            height: desc.height,
        };
        if let Err(err) = self.upload(&texture, desc, full, data) {
            self.gl.delete_texture(Some(&texture));
            return Err(err);
        }

        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.textures.insert(id, texture);
        Ok(TextureHandle(id))
    }

    fn update_texture(
        &self,
        texture: TextureHandle,
        desc: &TextureDesc,
        region: TextureRegion,
        data: TexelSlice<'_>,
    ) -> Result<()> {
        let state = self.state.borrow();
        let gl_texture = state
            .textures
            .get(&texture.0)
            .ok_or_else(|| Error::Gpu(format!("{}: texture {} is gone", desc.label, texture.0)))?;
        self.upload(gl_texture, desc, region, data)
    }

    fn delete_texture(&self, texture: TextureHandle) {
        if let Some(gl_texture) = self.state.borrow_mut().textures.remove(&texture.0) {
            self.gl.delete_texture(Some(&gl_texture));
        }
    }

    fn compile_program(
        &self,
        label: &str,
        vertex: &str,
        fragment: &str,
    ) -> std::result::Result<ProgramHandle, Vec<String>> {
        let vs = self
            .compile_shader(Gl::VERTEX_SHADER, vertex)
            .map_err(|log| vec![format!("{label}: vertex shader: {log}")])?;
        let fs = match self.compile_shader(Gl::FRAGMENT_SHADER, fragment) {
            Ok(fs) => fs,
            Err(log) => {
                self.gl.delete_shader(Some(&vs));
                return Err(vec![format!("{label}: fragment shader: {log}")]);
            }
        };

        let program = self.gl.create_program().ok_or_else(|| {
            vec![format!("{label}: unable to create program")]
        })?;
        self.gl.attach_shader(&program, &vs);
        self.gl.attach_shader(&program, &fs);
        self.gl.link_program(&program);
        self.gl.delete_shader(Some(&vs));
        self.gl.delete_shader(Some(&fs));

        let linked = self
            .gl
            .get_program_parameter(&program, Gl::LINK_STATUS)
            .as_bool()
            .unwrap_or(false);
        if !linked {
            let log = self.gl.get_program_info_log(&program).unwrap_or_default();
            self.gl.delete_program(Some(&program));
            return Err(vec![format!("{label}: link: {log}")]);
        }

        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.programs.insert(
            id,
            GlProgram {
                program,
                label: label.to_string(),
                uniforms: FxHashMap::default(),
            },
        );
        Ok(ProgramHandle(id))
    }

    fn delete_program(&self, program: ProgramHandle) {
        if let Some(gl_program) = self.state.borrow_mut().programs.remove(&program.0) {
            self.gl.delete_program(Some(&gl_program.program));
        }
    }

    fn begin_frame(&self, target: FrameTarget) {
        let gl = &self.gl;
        match target {
            FrameTarget::Canvas {
                width,
                height,
                clear_color: [r, g, b, a],
            } => {
                gl.bind_framebuffer(Gl::FRAMEBUFFER, None);
                gl.disable(Gl::SCISSOR_TEST);
                gl.viewport(0, 0, width as i32, height as i32);
                gl.clear_color(r, g, b, a);
            }
            FrameTarget::Pick { x, y } => {
                let mut state = self.state.borrow_mut();
                let Some((width, height)) = self.pick_target(&mut state) else {
                    utils::warn("unable to create pick framebuffer");
                    return;
                };
                let px = (x as i32).clamp(0, width - 1);
                let py = (height - 1 - y as i32).clamp(0, height - 1);
                state.pick_pixel = (px, py);
                gl.viewport(0, 0, width, height);
                gl.enable(Gl::SCISSOR_TEST);
                gl.scissor(px, py, 1, 1);
                gl.clear_color(0.0, 0.0, 0.0, 0.0);
            }
        }
        gl.enable(Gl::DEPTH_TEST);
        gl.depth_func(Gl::LEQUAL);
        gl.depth_mask(true);
        gl.clear(Gl::COLOR_BUFFER_BIT | Gl::DEPTH_BUFFER_BIT);
    }

    fn draw(&self, call: &DrawCall<'_>) {
        let mut state = self.state.borrow_mut();
        let State {
            textures, programs, ..
        } = &mut *state;
        let Some(GlProgram {
            program,
            label,
            uniforms,
        }) = programs.get_mut(&call.program.0)
        else {
            utils::warn(&format!("draw with unknown program {}", call.program.0));
            return;
        };
        let program: &WebGlProgram = program;
        let gl = &self.gl;
        gl.use_program(Some(program));
        let mut location = |name: &'static str| {
            uniforms
                .entry(name)
                .or_insert_with(|| gl.get_uniform_location(program, name))
                .clone()
        };

        for (unit, &(name, handle)) in call.textures.iter().enumerate() {
            let Some(texture) = textures.get(&handle.0) else {
                utils::warn(&format!("{label}: sampler {name} has no texture"));
                return;
            };
            gl.active_texture(Gl::TEXTURE0 + unit as u32);
            gl.bind_texture(Gl::TEXTURE_2D, Some(texture));
            gl.uniform1i(location(name).as_ref(), unit as i32);
        }
        for (name, value) in call.uniforms {
            // Optimized-out uniforms have no location
            if let Some(loc) = location(*name) {
                self.set_uniform(Some(&loc), value);
            }
        }

        self.apply_state(call.state);
        let mode = match call.mode {
            DrawMode::Triangles => Gl::TRIANGLES,
            DrawMode::Lines => Gl::LINES,
            DrawMode::Points => Gl::POINTS,
        };
        gl.draw_arrays(mode, 0, call.vertex_count as i32);
    }

    fn read_pick_pixel(&self) -> [u8; 4] {
        let (x, y) = self.state.borrow().pick_pixel;
        let mut pixel = [0u8; 4];
        if let Err(err) = self.gl.read_pixels_with_opt_u8_array(
            x,
            y,
            1,
            1,
            Gl::RGBA,
            Gl::UNSIGNED_BYTE,
            Some(&mut pixel),
        ) {
            utils::warn(&format!("pick readback failed: {err:?}"));
            pixel = [0; 4];
        }
        self.gl.bind_framebuffer(Gl::FRAMEBUFFER, None);
        self.gl.disable(Gl::SCISSOR_TEST);
        pixel
    }
}

impl Drop for WebGl2Backend {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for (_, texture) in state.textures.drain() {
            self.gl.delete_texture(Some(&texture));
        }
        for (_, program) in state.programs.drain() {
            self.gl.delete_program(Some(&program.program));
        }
        if let Some(pick) = state.pick.take() {
            self.gl.delete_framebuffer(Some(&pick.framebuffer));
            self.gl.delete_renderbuffer(Some(&pick.color));
            self.gl.delete_renderbuffer(Some(&pick.depth));
        }
        self.gl.delete_vertex_array(self.vao.as_ref());
        utils::debug("WebGL2 backend released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_formats_are_integer() {
        for format in [TexelFormat::R8UI, TexelFormat::RG16UI, TexelFormat::RGB32UI] {
            let (_, gl_fmt, _) = gl_format(format);
            assert!(matches!(
                gl_fmt,
                Gl::RED_INTEGER | Gl::RG_INTEGER | Gl::RGB_INTEGER
            ));
        }
        assert_eq!(
            gl_format(TexelFormat::RGBA32F),
            (Gl::RGBA32F, Gl::RGBA, Gl::FLOAT)
        );
    }
}
