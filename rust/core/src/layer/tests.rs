// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::test_support::{mesh_params, strip_geometry};
use super::*;
use crate::flags::{RenderFlags, RenderPass};
use crate::gpu::RecordingGpu;
use crate::renderer::{
    PrimitiveClass, ProgramPass, RenderQuality, RendererKind, RendererProgram, SceneShaderConfig,
};

fn capacity(max_vertices: usize) -> LayerCapacity {
    LayerCapacity {
        max_vertices,
        max_primitives: 10_000,
        max_slots: 1_000,
        max_meshes: 1_000,
    }
}

fn layer(gpu: &Rc<RecordingGpu>, max_vertices: usize) -> Layer {
    Layer::new(
        0,
        PrimitiveType::Triangles,
        RtcOrigin::default(),
        capacity(max_vertices),
        16,
        gpu.clone(),
        &[0],
    )
}

fn add(layer: &mut Layer, geometry: &Arc<CompressedGeometry>) -> u32 {
    if !layer.has_geometry(geometry.id()) {
        layer
            .create_geometry_compressed(Arc::clone(geometry))
            .unwrap();
    }
    layer.create_mesh(&mesh_params(geometry.id())).unwrap()
}

fn visible() -> RenderFlags {
    RenderFlags::INITIAL
}

#[test]
fn test_vertex_count_is_sum_of_geometries() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = layer(&gpu, 1000);
    let a = strip_geometry("a", 10);
    let b = strip_geometry("b", 20);
    add(&mut layer, &a);
    add(&mut layer, &a);
    add(&mut layer, &b);
    assert_eq!(layer.num_vertices(), 30);
    assert_eq!(layer.num_meshes(), 3);
    assert_eq!(layer.num_slots(), 3);
    assert_eq!(layer.num_primitives(IndexWidth::U8), 8 + 8 + 18);
}

#[test]
fn test_instances_share_vertex_base() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = layer(&gpu, 1000);
    let a = strip_geometry("a", 10);
    let first = add(&mut layer, &a);
    let second = add(&mut layer, &a);
    let slot_a = layer.mesh_slots(first).unwrap().start;
    let slot_b = layer.mesh_slots(second).unwrap().start;
    let info_a = layer.slot_info(slot_a).unwrap();
    let info_b = layer.slot_info(slot_b).unwrap();
    assert_eq!(info_a[0], info_b[0]);
    assert_eq!([info_a[1], info_b[1]], [first, second]);
}

#[test]
fn test_can_create_mesh_respects_vertex_budget() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = layer(&gpu, 100);
    let a = strip_geometry("a", 60);
    let b = strip_geometry("b", 60);
    assert!(layer.can_create_mesh(&a));
    add(&mut layer, &a);
    // Another instance needs no new vertices
    assert!(layer.can_create_mesh(&a));
    assert!(!layer.can_create_mesh(&b));
    assert!(matches!(
        layer.create_geometry_compressed(b),
        Err(Error::CapacityExceeded { .. })
    ));
}

#[test]
fn test_mesh_budget() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = Layer::new(
        0,
        PrimitiveType::Triangles,
        RtcOrigin::default(),
        LayerCapacity {
            max_meshes: 2,
            ..capacity(1000)
        },
        16,
        gpu.clone(),
        &[0],
    );
    let a = strip_geometry("a", 10);
    add(&mut layer, &a);
    add(&mut layer, &a);
    assert!(!layer.can_create_mesh(&a));
    assert!(matches!(
        layer.create_mesh(&mesh_params("a")),
        Err(Error::CapacityExceeded { .. })
    ));
}

#[test]
fn test_primitive_mismatch_rejected() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = Layer::new(
        0,
        PrimitiveType::Lines,
        RtcOrigin::default(),
        capacity(1000),
        16,
        gpu.clone(),
        &[0],
    );
    let a = strip_geometry("a", 10);
    assert!(!layer.can_create_mesh(&a));
    assert!(matches!(
        layer.create_geometry_compressed(a),
        Err(Error::PrimitiveMismatch { .. })
    ));
}

#[test]
fn test_build_uploads_and_locks() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = layer(&gpu, 1000);
    let a = strip_geometry("a", 10);
    add(&mut layer, &a);
    layer.build().unwrap();

    // positions, slot info, decode, matrices, material, 8-bit indices and
    // their map, 8-bit edges and their map, flags and offsets of view 0
    assert_eq!(gpu.live_textures(), 11);
    assert!(layer.is_built());
    assert!(matches!(
        layer.create_mesh(&mesh_params("a")),
        Err(Error::AlreadyBuilt { .. })
    ));
    assert!(matches!(layer.build(), Err(Error::AlreadyBuilt { .. })));
}

#[test]
fn test_failed_build_leaves_layer_building() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = layer(&gpu, 1000);
    let a = strip_geometry("a", 10);
    add(&mut layer, &a);

    gpu.fail_textures_labelled("mesh_offsets");
    assert!(matches!(layer.build(), Err(Error::Gpu(_))));
    assert!(!layer.is_built());
    assert!(!layer.has_work(0, RenderPass::ColorOpaque));
    assert_eq!(gpu.live_textures(), 0);
    // A retry hits the same failure rather than reporting success
    assert!(layer.build().is_err());
    assert!(!layer.is_built());

    gpu.clear_failures();
    layer.build().unwrap();
    assert!(layer.is_built());
    assert_eq!(gpu.live_textures(), 11);
}

#[test]
fn test_empty_layer_builds_without_textures() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = layer(&gpu, 1000);
    layer.build().unwrap();
    assert!(layer.is_empty());
    assert_eq!(gpu.live_textures(), 0);
}

#[test]
fn test_setters_before_build_touch_mirror_only() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = layer(&gpu, 1000);
    let a = strip_geometry("a", 10);
    let mesh = add(&mut layer, &a);
    layer.set_mesh_visible(0, mesh, visible(), false).unwrap();
    assert!(gpu.uploads().is_empty());
    assert_eq!(layer.mesh_counts(0).unwrap().num_visible, 1);

    layer.build().unwrap();
    let [_, passes] = layer.mesh_flags_texels(0, mesh).unwrap();
    assert_eq!(passes[0] & 15, RenderPass::ColorOpaque.value());
}

#[test]
fn test_setter_is_idempotent() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = layer(&gpu, 1000);
    let a = strip_geometry("a", 10);
    let mesh = add(&mut layer, &a);
    layer.build().unwrap();

    let selected = visible() | RenderFlags::SELECTED;
    assert!(layer.set_mesh_selected(0, mesh, selected, false).unwrap());
    let counts = *layer.mesh_counts(0).unwrap();
    let uploads = gpu.region_uploads("mesh_flags");
    assert!(!layer.set_mesh_selected(0, mesh, selected, false).unwrap());
    assert_eq!(*layer.mesh_counts(0).unwrap(), counts);
    assert_eq!(gpu.region_uploads("mesh_flags"), uploads);
    assert_eq!(counts.num_selected, 1);
}

#[test]
fn test_deferred_flags_upload_once() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = layer(&gpu, 10_000);
    let a = strip_geometry("a", 10);
    let meshes: Vec<u32> = (0..50).map(|_| add(&mut layer, &a)).collect();
    layer.build().unwrap();
    gpu.clear_log();

    layer.begin_deferred_flags();
    for &mesh in &meshes {
        layer
            .set_mesh_selected(0, mesh, visible() | RenderFlags::SELECTED, false)
            .unwrap();
    }
    assert!(gpu.uploads().is_empty());
    assert_eq!(layer.commit_deferred_flags().unwrap(), 1);
    assert_eq!(gpu.region_uploads("mesh_flags"), 1);
    assert_eq!(layer.mesh_counts(0).unwrap().num_selected, 50);
}

#[test]
fn test_invalid_mesh_index() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = layer(&gpu, 1000);
    let a = strip_geometry("a", 10);
    add(&mut layer, &a);
    assert!(matches!(
        layer.set_mesh_visible(0, 1, visible(), false),
        Err(Error::InvalidMeshIndex { index: 1, len: 1 })
    ));
    assert!(matches!(
        layer.set_mesh_visible(3, 0, visible(), false),
        Err(Error::UnknownView(3))
    ));
}

#[test]
fn test_views_are_isolated() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = Layer::new(
        0,
        PrimitiveType::Triangles,
        RtcOrigin::default(),
        capacity(1000),
        16,
        gpu.clone(),
        &[0, 1],
    );
    let a = strip_geometry("a", 10);
    let mesh = add(&mut layer, &a);
    layer.set_mesh_visible(0, mesh, visible(), false).unwrap();
    layer.set_mesh_visible(1, mesh, visible(), false).unwrap();
    layer.build().unwrap();

    layer
        .set_mesh_selected(0, mesh, visible() | RenderFlags::SELECTED, false)
        .unwrap();
    assert_eq!(layer.mesh_counts(0).unwrap().num_selected, 1);
    assert_eq!(layer.mesh_counts(1).unwrap().num_selected, 0);
    assert_eq!(
        layer.mesh_flags_texels(1, mesh).unwrap()[1][1],
        RenderPass::NotRendered.value()
    );
}

#[test]
fn test_view_registered_after_build() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = layer(&gpu, 1000);
    let a = strip_geometry("a", 10);
    let mesh = add(&mut layer, &a);
    layer.build().unwrap();
    let before = gpu.live_textures();

    layer.register_view(2).unwrap();
    assert_eq!(gpu.live_textures(), before + 2);
    assert_eq!(layer.mesh_state(2, mesh), Some(MeshState::default()));
    layer.release_view(2);
    assert_eq!(gpu.live_textures(), before);
    assert!(layer.mesh_counts(2).is_none());
}

#[test]
fn test_view_matrix_index_rewrites_slots() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = layer(&gpu, 1000);
    let a = strip_geometry("a", 10);
    let mesh = add(&mut layer, &a);
    layer.build().unwrap();
    gpu.clear_log();

    layer.set_mesh_view_matrix_index(mesh, 2).unwrap();
    let slot = layer.mesh_slots(mesh).unwrap().start;
    assert_eq!(layer.slot_info(slot).unwrap()[3], 2);
    assert_eq!(gpu.region_uploads("slot_info"), 1);
}

#[test]
fn test_draw_and_destroy() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = layer(&gpu, 1000);
    let a = strip_geometry("a", 10);
    let mesh = add(&mut layer, &a);
    layer.set_mesh_visible(0, mesh, visible(), false).unwrap();
    layer.build().unwrap();

    let kind = RendererKind::new(
        PrimitiveClass::Triangles,
        ProgramPass::Color,
        RenderQuality::Fast,
    );
    let program = RendererProgram::compile(&*gpu, kind, &SceneShaderConfig::default());
    assert_eq!(layer.draw(0, RenderPass::ColorOpaque, &program, &[]), 1);
    assert_eq!(layer.draw(0, RenderPass::ColorTransparent, &program, &[]), 0);

    let draws = gpu.draws();
    assert_eq!(draws[0].vertex_count, 8 * 3);
    assert_eq!(draws[0].render_pass, Some(1));

    layer.destroy();
    assert_eq!(gpu.live_textures(), 0);
    assert_eq!(layer.draw(0, RenderPass::ColorOpaque, &program, &[]), 0);
    assert!(matches!(
        layer.set_mesh_visible(0, mesh, visible(), false),
        Err(Error::Destroyed { .. })
    ));
    assert!(!layer.can_pick_triangle());
}

#[test]
fn test_index_width_classes_drawn_separately() {
    let gpu = Rc::new(RecordingGpu::new());
    let mut layer = layer(&gpu, 10_000);
    let small = strip_geometry("small", 10);
    let wide = strip_geometry("wide", 256);
    assert_eq!(wide.buckets()[0].index_width(), IndexWidth::U16);
    let a = add(&mut layer, &small);
    let b = add(&mut layer, &wide);
    layer.set_mesh_visible(0, a, visible(), false).unwrap();
    layer.set_mesh_visible(0, b, visible(), false).unwrap();
    layer.build().unwrap();

    let kind = RendererKind::new(
        PrimitiveClass::Triangles,
        ProgramPass::Color,
        RenderQuality::Fast,
    );
    let program = RendererProgram::compile(&*gpu, kind, &SceneShaderConfig::default());
    assert_eq!(layer.draw(0, RenderPass::ColorOpaque, &program, &[]), 2);
}
