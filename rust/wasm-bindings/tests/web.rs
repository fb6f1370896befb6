// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Browser tests, run with `wasm-pack test --headless --chrome`.

#![cfg(target_arch = "wasm32")]

use strata_wasm::StrataViewer;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_test::*;
use web_sys::HtmlCanvasElement;

wasm_bindgen_test_configure!(run_in_browser);

fn canvas() -> HtmlCanvasElement {
    let document = web_sys::window().unwrap().document().unwrap();
    let canvas = document
        .create_element("canvas")
        .unwrap()
        .dyn_into::<HtmlCanvasElement>()
        .unwrap();
    canvas.set_width(64);
    canvas.set_height(64);
    canvas
}

fn quad_model(viewer: &mut StrataViewer) {
    viewer.create_model("site").unwrap();
    viewer
        .create_geometry(
            "site",
            "quad",
            "triangles",
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            vec![0, 1, 2, 0, 2, 3],
            None,
        )
        .unwrap();
    let params = js_sys::Object::new();
    js_sys::Reflect::set(&params, &"id".into(), &"m0".into()).unwrap();
    js_sys::Reflect::set(&params, &"geometryId".into(), &"quad".into()).unwrap();
    viewer.create_mesh("site", params.into()).unwrap();
    viewer
        .create_object("site", "o0", vec!["m0".to_string()], None)
        .unwrap();
    viewer.build_model("site").unwrap();
}

#[wasm_bindgen_test]
fn test_renders_and_skips_clean_frames() {
    let mut viewer = StrataViewer::new(canvas(), JsValue::UNDEFINED).unwrap();
    let view = viewer.create_view(64, 64).unwrap();
    quad_model(&mut viewer);

    assert!(viewer.render(view).unwrap());
    assert!(!viewer.render(view).unwrap());
    assert_eq!(
        viewer
            .set_objects_selected(view, vec!["o0".to_string()], true)
            .unwrap(),
        1
    );
    assert!(viewer.render(view).unwrap());
}

#[wasm_bindgen_test]
fn test_unknown_model_is_an_error() {
    let mut viewer = StrataViewer::new(canvas(), JsValue::UNDEFINED).unwrap();
    assert!(viewer.build_model("missing").is_err());
}
