// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end scenarios against the headless recording backend.

use std::rc::Rc;
use strata_core::{
    encode_pick_color, Error, GpuBackend, MeshParams, ModelKey, ObjectParams, RecordingGpu,
    RenderFlags, RenderPass, StrataConfig, Viewer,
};
use strata_geometry::{GeometrySource, IndexWidth, PrimitiveType};

/// Triangle strip over `n` distinct vertices
fn strip(n: usize) -> (Vec<f64>, Vec<u32>) {
    let positions = (0..n)
        .flat_map(|i| [i as f64 * 0.1, (i % 2) as f64, 0.0])
        .collect();
    let indices = (0..n as u32 - 2).flat_map(|i| [i, i + 1, i + 2]).collect();
    (positions, indices)
}

fn setup(config: StrataConfig) -> (Rc<RecordingGpu>, Viewer, usize) {
    let gpu = Rc::new(RecordingGpu::new());
    let backend: Rc<dyn GpuBackend> = gpu.clone();
    let mut viewer = Viewer::new(backend, config).unwrap();
    let view = viewer.create_view(640, 480).unwrap();
    (gpu, viewer, view)
}

/// Add geometries of the given vertex counts and one single-mesh object per
/// entry of `objects`, naming the geometry index each instances.
fn populate(viewer: &mut Viewer, id: &str, geometries: &[usize], objects: &[usize]) -> ModelKey {
    let key = viewer.create_model(id).unwrap();
    let model = viewer.model_mut(key).unwrap();
    for (g, &n) in geometries.iter().enumerate() {
        let (positions, indices) = strip(n);
        model
            .create_geometry(
                &format!("g{g}"),
                PrimitiveType::Triangles,
                &GeometrySource {
                    positions: &positions,
                    indices: &indices,
                    ..Default::default()
                },
            )
            .unwrap();
    }
    for (i, &g) in objects.iter().enumerate() {
        let mesh_id = format!("m{i}");
        let object_id = format!("o{i}");
        let geometry_id = format!("g{g}");
        model
            .create_mesh(&MeshParams::new(&mesh_id, &geometry_id))
            .unwrap();
        model
            .create_object(&ObjectParams {
                id: &object_id,
                mesh_ids: &[&mesh_id],
                view_layer: None,
            })
            .unwrap();
    }
    model.build().unwrap();
    key
}

fn small_layers() -> StrataConfig {
    StrataConfig {
        max_vertices_per_layer: Some(100),
        texture_width: 64,
        ..Default::default()
    }
}

#[test]
fn test_second_bucket_overflowing_a_layer_opens_another() {
    let (_gpu, mut viewer, view) = setup(small_layers());
    let key = populate(&mut viewer, "site", &[60, 60], &[0, 1]);

    let model = viewer.model(key).unwrap();
    assert_eq!(model.num_layers(), 2);
    for layer in model.layers() {
        assert!(!layer.is_empty());
        assert!(layer.num_vertices() <= 100);
        assert_eq!(layer.mesh_counts(view).unwrap().num_meshes, 1);
    }
}

#[test]
fn test_picked_pixel_resolves_to_object() {
    let (gpu, mut viewer, view) = setup(StrataConfig::default());
    populate(&mut viewer, "site", &[12], &[0, 0, 0]);
    viewer.render(view).unwrap();

    gpu.set_pick_pixel(encode_pick_color(1, 2));
    let hit = viewer.pick(view, 10, 10).unwrap().unwrap();
    assert_eq!(hit.model_id, "site");
    assert_eq!(hit.object_id.as_deref(), Some("o2"));
    assert_eq!(hit.mesh_id, "m2");

    gpu.set_pick_pixel([0, 0, 0, 0]);
    assert!(viewer.pick(view, 10, 10).unwrap().is_none());
}

#[test]
fn test_bucket_of_256_vertices_uses_16_bit_indices() {
    let (gpu, mut viewer, _view) = setup(StrataConfig::default());
    let key = populate(&mut viewer, "site", &[256], &[0]);

    let geometry = viewer.model(key).unwrap().geometry("g0").unwrap();
    assert_eq!(geometry.index_widths().collect::<Vec<_>>(), vec![IndexWidth::U16]);
    let labels: Vec<_> = gpu.uploads().iter().map(|u| u.label).collect();
    assert!(labels.contains(&"indices_16"));
    assert!(!labels.contains(&"indices_8"));
}

#[test]
fn test_highlight_in_one_view_leaves_the_other_alone() {
    let (gpu, mut viewer, first) = setup(StrataConfig::default());
    let second = viewer.create_view(640, 480).unwrap();
    let key = populate(&mut viewer, "site", &[12], &[0]);
    viewer.render_all().unwrap();

    viewer.set_objects_highlighted(first, &["o0"], true).unwrap();
    let object = viewer.model(key).unwrap().object("o0").unwrap();
    assert!(object.flags(first).unwrap().contains(RenderFlags::HIGHLIGHTED));
    assert_eq!(object.flags(second), Some(RenderFlags::INITIAL));

    gpu.clear_log();
    assert!(viewer.render(second).unwrap().is_none());
    viewer.render(first).unwrap();
    let highlighted = RenderPass::SilhouetteHighlighted.value() as u32;
    assert!(gpu
        .draws()
        .iter()
        .any(|d| d.render_pass == Some(highlighted)));
}

#[test]
fn test_deferred_selection_uploads_flags_once() {
    let (gpu, mut viewer, view) = setup(StrataConfig::default());
    let objects = vec![0; 50];
    populate(&mut viewer, "site", &[12], &objects);
    let ids: Vec<String> = (0..50).map(|i| format!("o{i}")).collect();
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();

    gpu.clear_log();
    let changed = viewer.set_objects_selected(view, &ids, true).unwrap();
    assert_eq!(changed, 50);
    assert_eq!(gpu.region_uploads("mesh_flags"), 1);

    // Repeating the same state writes nothing
    gpu.clear_log();
    assert_eq!(viewer.set_objects_selected(view, &ids, true).unwrap(), 0);
    assert!(gpu.uploads().is_empty());
}

#[test]
fn test_destroying_a_model_releases_every_layer() {
    let (gpu, mut viewer, view) = setup(small_layers());
    let key = populate(&mut viewer, "site", &[60, 60], &[0, 0, 1]);
    assert_eq!(viewer.model(key).unwrap().num_layers(), 2);
    viewer.render(view).unwrap();
    assert!(gpu.live_textures() > 0);

    viewer.destroy_model(key).unwrap();
    assert_eq!(gpu.live_textures(), 0);
    assert!(viewer.model(key).is_none());

    gpu.clear_log();
    let stats = viewer.render(view).unwrap().unwrap();
    assert_eq!(stats.draw_calls, 0);
    assert_eq!(stats.layers, 0);
    assert!(gpu.draws().is_empty());
    assert!(matches!(
        viewer.destroy_model(key),
        Err(Error::UnknownModel(_))
    ));
}

#[test]
fn test_log_depth_change_recompiles_programs() {
    let (gpu, mut viewer, view) = setup(StrataConfig::default());
    populate(&mut viewer, "site", &[12], &[0]);
    viewer.render(view).unwrap();
    let programs = gpu.live_programs();
    assert!(programs > 0);

    viewer.set_log_depth(view, true).unwrap();
    viewer.render(view).unwrap();
    let cache = viewer.renderer_cache(view).unwrap();
    assert_eq!(cache.hash(), Some("sp0;dl1;ld1"));
    assert_eq!(gpu.live_programs(), cache.len());
}

#[test]
fn test_failed_program_skips_only_its_pass() {
    let (gpu, mut viewer, view) = setup(StrataConfig::default());
    gpu.fail_programs_containing("silhouette");
    populate(&mut viewer, "site", &[12], &[0]);
    viewer.set_objects_selected(view, &["o0"], true).unwrap();

    let stats = viewer.render(view).unwrap().unwrap();
    assert!(stats.skipped_programs >= 1);
    assert!(stats.draw_calls >= 1);
    let opaque = RenderPass::ColorOpaque.value() as u32;
    assert!(gpu.draws().iter().any(|d| d.render_pass == Some(opaque)));
}

#[test]
fn test_released_view_slot_is_reused_with_fresh_state() {
    let (_gpu, mut viewer, first) = setup(StrataConfig::default());
    let key = populate(&mut viewer, "site", &[12], &[0]);
    viewer.set_objects_selected(first, &["o0"], true).unwrap();

    viewer.destroy_view(first).unwrap();
    assert!(viewer.renderer_cache(first).is_none());
    let reused = viewer.create_view(320, 240).unwrap();
    assert_eq!(reused, first);

    let model = viewer.model(key).unwrap();
    assert_eq!(model.object("o0").unwrap().flags(reused), Some(RenderFlags::INITIAL));
    let counts = model.layers()[0].mesh_counts(reused).unwrap();
    assert_eq!(counts.num_selected, 0);
    assert_eq!(counts.num_visible, 1);
}

#[test]
fn test_view_slots_are_bounded() {
    let config = StrataConfig {
        max_views: 2,
        ..Default::default()
    };
    let (_gpu, mut viewer, _view) = setup(config);
    viewer.create_view(10, 10).unwrap();
    assert!(matches!(
        viewer.create_view(10, 10),
        Err(Error::ViewSlotsExhausted { max: 2 })
    ));
}
