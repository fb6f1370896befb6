// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Frame and pick loops over the layers of a view

use super::{RendererCache, RendererKind};
use crate::flags::RenderPass;
use crate::gpu::{FrameTarget, GpuBackend, Uniform};
use crate::layer::Layer;
use crate::pick::decode_pick_color;
use crate::view::View;
use nalgebra::{Matrix4, Vector3};

/// Counters for one rendered frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    /// Passes that issued at least one draw
    pub passes: u32,
    pub layers: u32,
    /// Layer passes skipped because their program failed to compile
    pub skipped_programs: u32,
}

fn mat4_f32(m: &Matrix4<f64>) -> [f32; 16] {
    let mut out = [0f32; 16];
    for (dst, src) in out.iter_mut().zip(m.iter()) {
        *dst = *src as f32;
    }
    out
}

/// Uniforms shared by every pass of one layer
fn layer_uniforms(view: &View, layer: &Layer) -> Vec<(&'static str, Uniform)> {
    let origin = layer.origin();
    let camera = view.camera();
    let view_matrices = camera
        .rtc_view_matrices(&origin)
        .iter()
        .flat_map(mat4_f32)
        .collect();
    let lighting = view.lighting();

    let mut uniforms = vec![
        ("uViewMatrices", Uniform::Mat4Array(view_matrices)),
        ("uProjMatrix", Uniform::Mat4(mat4_f32(&camera.proj_matrix))),
        ("uPointSize", Uniform::Float(view.point_size())),
        ("uLightAmbient", Uniform::Vec4(lighting.ambient)),
    ];

    let planes = view.section_planes();
    if !planes.is_empty() {
        uniforms.push((
            "uSectionPlaneActive",
            Uniform::BoolArray(planes.iter().map(|p| p.active).collect()),
        ));
        uniforms.push((
            "uSectionPlanePos",
            Uniform::Vec3Array(
                planes
                    .iter()
                    .flat_map(|p| {
                        [
                            (p.pos[0] - origin.x) as f32,
                            (p.pos[1] - origin.y) as f32,
                            (p.pos[2] - origin.z) as f32,
                        ]
                    })
                    .collect(),
            ),
        ));
        uniforms.push((
            "uSectionPlaneDir",
            Uniform::Vec3Array(planes.iter().flat_map(|p| p.dir).collect()),
        ));
    }

    if !lighting.directional.is_empty() {
        let rotation = camera.view_matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let mut dirs = Vec::with_capacity(lighting.directional.len() * 3);
        let mut colors = Vec::with_capacity(lighting.directional.len() * 4);
        for light in &lighting.directional {
            let world = Vector3::new(light.dir[0] as f64, light.dir[1] as f64, light.dir[2] as f64);
            let dir = (rotation * world).try_normalize(f64::EPSILON).unwrap_or(world);
            dirs.extend([dir.x as f32, dir.y as f32, dir.z as f32]);
            colors.extend([light.color[0], light.color[1], light.color[2], light.intensity]);
        }
        uniforms.push(("uLightDir", Uniform::Vec3Array(dirs)));
        uniforms.push(("uLightColor", Uniform::Vec4Array(colors)));
    }

    if view.log_depth() {
        let fc = 2.0 / (camera.far + 1.0).log2();
        uniforms.push(("uLogDepthBufFC", Uniform::Float(fc as f32)));
    }
    uniforms
}

/// Color uniform of silhouette and edge passes
fn pass_uniform(view: &View, pass: RenderPass) -> Option<(&'static str, Uniform)> {
    let m = view.materials();
    let (name, color) = match pass {
        RenderPass::SilhouetteHighlighted => ("uSilhouetteColor", m.highlight),
        RenderPass::SilhouetteSelected => ("uSilhouetteColor", m.selected),
        RenderPass::SilhouetteXRayed => ("uSilhouetteColor", m.xray),
        RenderPass::EdgesHighlighted => ("uEdgeColor", m.highlight),
        RenderPass::EdgesSelected => ("uEdgeColor", m.selected),
        RenderPass::EdgesXRayed => ("uEdgeColor", m.xray),
        RenderPass::EdgesColorOpaque | RenderPass::EdgesColorTransparent => ("uEdgeColor", m.edges),
        _ => return None,
    };
    Some((name, Uniform::Vec4(color)))
}

/// Draw one frame of `view` over `layers`, pass by pass.
pub fn render_view<'a>(
    gpu: &dyn GpuBackend,
    slot: usize,
    view: &View,
    cache: &mut RendererCache,
    layers: impl IntoIterator<Item = &'a Layer>,
) -> FrameStats {
    let layers: Vec<&Layer> = layers
        .into_iter()
        .filter(|l| l.is_built() && !l.is_empty())
        .collect();
    let (width, height) = view.canvas_size();
    gpu.begin_frame(FrameTarget::Canvas {
        width,
        height,
        clear_color: view.clear_color(),
    });

    let config = view.shader_config();
    let base: Vec<_> = layers.iter().map(|l| layer_uniforms(view, l)).collect();
    let mut stats = FrameStats {
        layers: layers.len() as u32,
        ..Default::default()
    };

    for pass in RenderPass::FRAME_ORDER {
        let mut draws = 0;
        for (layer, uniforms) in layers.iter().zip(&base) {
            if !layer.has_work(slot, pass) {
                continue;
            }
            let Some(kind) = RendererKind::for_layer(layer.primitive(), pass, view.quality()) else {
                continue;
            };
            let program = cache.get_or_compile(kind, &config);
            if !program.is_usable() {
                stats.skipped_programs += 1;
                continue;
            }
            match pass_uniform(view, pass) {
                Some(extra) => {
                    let mut all = uniforms.clone();
                    all.push(extra);
                    draws += layer.draw(slot, pass, program, &all);
                }
                None => draws += layer.draw(slot, pass, program, uniforms),
            }
        }
        if draws > 0 {
            stats.passes += 1;
        }
        stats.draw_calls += draws;
    }
    tracing::trace!(
        view = slot,
        draw_calls = stats.draw_calls,
        passes = stats.passes,
        "frame rendered"
    );
    stats
}

/// Draw the pick pass around canvas pixel (x, y) and decode the result.
///
/// `layers` pairs each layer with the non-zero id its pick color carries.
/// Returns that id and the mesh index under the pixel.
pub fn pick_view(
    gpu: &dyn GpuBackend,
    slot: usize,
    view: &View,
    cache: &mut RendererCache,
    layers: &[(u16, &Layer)],
    x: u32,
    y: u32,
) -> Option<(u16, u16)> {
    gpu.begin_frame(FrameTarget::Pick { x, y });
    let config = view.shader_config();
    for &(pick_id, layer) in layers {
        if !layer.has_work(slot, RenderPass::Pick) {
            continue;
        }
        let quality = view.quality();
        let Some(kind) = RendererKind::for_layer(layer.primitive(), RenderPass::Pick, quality) else {
            continue;
        };
        let program = cache.get_or_compile(kind, &config);
        if !program.is_usable() {
            continue;
        }
        let mut uniforms = layer_uniforms(view, layer);
        uniforms.push(("uPickLayerId", Uniform::UInt(u32::from(pick_id))));
        layer.draw(slot, RenderPass::Pick, program, &uniforms);
    }
    decode_pick_color(gpu.read_pick_pixel())
}
