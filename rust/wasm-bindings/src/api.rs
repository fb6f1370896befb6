// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JavaScript API for Strata
//!
//! `StrataViewer` owns a WebGL2 backend and a viewer. Models, meshes and
//! objects are addressed by their string ids; views by the slot number
//! returned from `createView`.

use std::rc::Rc;

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use strata_core::{
    Camera, GpuBackend, MeshParams, ModelKey, ObjectParams, RenderQuality, SectionPlane,
    StrataConfig, Viewer,
};
use strata_geometry::{GeometrySource, PrimitiveType, RtcOrigin};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{HtmlCanvasElement, WebGl2RenderingContext};

use crate::utils::{self, to_js_error};
use crate::webgl::WebGl2Backend;

/// Mesh description accepted by `createMesh`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeshParamsJs {
    id: String,
    geometry_id: String,
    /// Column-major 4x4
    #[serde(default)]
    matrix: Option<Vec<f64>>,
    #[serde(default)]
    origin: Option<[f64; 3]>,
    #[serde(default)]
    color: Option<[f32; 3]>,
    #[serde(default)]
    opacity: Option<f32>,
    #[serde(default)]
    metallic: Option<f32>,
    #[serde(default)]
    roughness: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct SectionPlaneJs {
    pos: [f64; 3],
    dir: [f32; 3],
    #[serde(default = "active_default")]
    active: bool,
}

fn active_default() -> bool {
    true
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PickResultJs {
    model_id: String,
    object_id: Option<String>,
    mesh_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameStatsJs {
    view: usize,
    draw_calls: u32,
    passes: u32,
    layers: u32,
    skipped_programs: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelStatsJs {
    layers: usize,
    built_layers: usize,
    meshes: usize,
    objects: usize,
    vertices: usize,
}

fn matrix_from_js(values: &[f64], what: &str) -> Result<Matrix4<f64>, JsValue> {
    if values.len() != 16 {
        return Err(JsValue::from_str(&format!(
            "{what}: expected 16 values, got {}",
            values.len()
        )));
    }
    Ok(Matrix4::from_column_slice(values))
}

fn to_value<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Layered WebGL2 viewer exposed to JavaScript
#[wasm_bindgen]
pub struct StrataViewer {
    viewer: Viewer,
}

impl StrataViewer {
    fn key(&self, model_id: &str) -> Result<ModelKey, JsValue> {
        self.viewer
            .model_key(model_id)
            .ok_or_else(|| to_js_error(strata_core::Error::UnknownModel(model_id.to_string())))
    }

    fn with_model<T>(
        &mut self,
        model_id: &str,
        f: impl FnOnce(&mut strata_core::SceneModel) -> strata_core::Result<T>,
    ) -> Result<T, JsValue> {
        let key = self.key(model_id)?;
        let model = self
            .viewer
            .model_mut(key)
            .ok_or_else(|| to_js_error(strata_core::Error::UnknownModel(model_id.to_string())))?;
        f(model).map_err(to_js_error)
    }
}

fn id_refs(ids: &[String]) -> Vec<&str> {
    ids.iter().map(String::as_str).collect()
}

#[wasm_bindgen]
impl StrataViewer {
    /// Create a viewer drawing into `canvas`.
    ///
    /// `config` is an optional object with `StrataConfig` fields in
    /// camelCase; missing fields take their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(canvas: HtmlCanvasElement, config: JsValue) -> Result<StrataViewer, JsValue> {
        utils::set_panic_hook();
        let config: StrataConfig = if config.is_undefined() || config.is_null() {
            StrataConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)
                .map_err(|e| JsValue::from_str(&format!("invalid config: {e}")))?
        };
        let gl = canvas
            .get_context("webgl2")?
            .ok_or_else(|| JsValue::from_str("WebGL2 is not available"))?
            .dyn_into::<WebGl2RenderingContext>()?;
        let backend: Rc<dyn GpuBackend> = Rc::new(WebGl2Backend::new(gl));
        let viewer = Viewer::new(backend, config).map_err(to_js_error)?;
        utils::debug(&format!(
            "viewer created ({}x{} canvas, {} view slots)",
            canvas.width(),
            canvas.height(),
            viewer.config().max_views
        ));
        Ok(StrataViewer { viewer })
    }

    // ---- views ----

    #[wasm_bindgen(js_name = createView)]
    pub fn create_view(&mut self, width: u32, height: u32) -> Result<usize, JsValue> {
        self.viewer.create_view(width, height).map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = destroyView)]
    pub fn destroy_view(&mut self, view: usize) -> Result<(), JsValue> {
        self.viewer.destroy_view(view).map_err(to_js_error)
    }

    /// Set camera matrices (column-major Float64Arrays of 16 values)
    #[wasm_bindgen(js_name = setCamera)]
    pub fn set_camera(
        &mut self,
        view: usize,
        view_matrix: Vec<f64>,
        proj_matrix: Vec<f64>,
        far: f64,
    ) -> Result<(), JsValue> {
        let camera = Camera {
            view_matrix: matrix_from_js(&view_matrix, "view matrix")?,
            proj_matrix: matrix_from_js(&proj_matrix, "projection matrix")?,
            far,
            ..Default::default()
        };
        self.viewer
            .set_view_camera(view, camera)
            .map_err(to_js_error)
    }

    /// Replace the section planes: `[{ pos: [x,y,z], dir: [x,y,z], active }]`
    #[wasm_bindgen(js_name = setSectionPlanes)]
    pub fn set_section_planes(&mut self, view: usize, planes: JsValue) -> Result<(), JsValue> {
        let planes: Vec<SectionPlaneJs> = serde_wasm_bindgen::from_value(planes)
            .map_err(|e| JsValue::from_str(&format!("invalid section planes: {e}")))?;
        let planes = planes
            .into_iter()
            .map(|p| SectionPlane {
                pos: p.pos,
                dir: p.dir,
                active: p.active,
            })
            .collect();
        self.viewer
            .set_section_planes(view, planes)
            .map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = setLogDepth)]
    pub fn set_log_depth(&mut self, view: usize, enabled: bool) -> Result<(), JsValue> {
        self.viewer.set_log_depth(view, enabled).map_err(to_js_error)
    }

    /// "fast" or "high"
    #[wasm_bindgen(js_name = setQuality)]
    pub fn set_quality(&mut self, view: usize, quality: &str) -> Result<(), JsValue> {
        let quality = match quality {
            "fast" => RenderQuality::Fast,
            "high" => RenderQuality::High,
            other => return Err(JsValue::from_str(&format!("unknown quality: {other}"))),
        };
        self.viewer.set_quality(view, quality).map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = setCanvasSize)]
    pub fn set_canvas_size(&mut self, view: usize, width: u32, height: u32) -> Result<(), JsValue> {
        self.viewer
            .set_canvas_size(view, width, height)
            .map_err(to_js_error)
    }

    // ---- models ----

    #[wasm_bindgen(js_name = createModel)]
    pub fn create_model(&mut self, model_id: &str) -> Result<(), JsValue> {
        self.viewer
            .create_model(model_id)
            .map(|_| ())
            .map_err(to_js_error)
    }

    /// Add geometry from world-unit positions and primitive indices.
    ///
    /// `primitive` is one of "triangles", "solid", "surface", "lines" or
    /// "points".
    #[wasm_bindgen(js_name = createGeometry)]
    pub fn create_geometry(
        &mut self,
        model_id: &str,
        geometry_id: &str,
        primitive: &str,
        positions: Vec<f64>,
        indices: Vec<u32>,
        edge_indices: Option<Vec<u32>>,
    ) -> Result<(), JsValue> {
        let primitive = PrimitiveType::from_name(primitive)
            .ok_or_else(|| JsValue::from_str(&format!("unknown primitive: {primitive}")))?;
        let source = GeometrySource {
            positions: &positions,
            indices: &indices,
            edge_indices: edge_indices.as_deref(),
            colors: None,
        };
        self.with_model(model_id, |m| {
            m.create_geometry(geometry_id, primitive, &source)
        })
    }

    /// Add a mesh: `{ id, geometryId, matrix?, origin?, color?, opacity?,
    /// metallic?, roughness? }`
    #[wasm_bindgen(js_name = createMesh)]
    pub fn create_mesh(&mut self, model_id: &str, params: JsValue) -> Result<(), JsValue> {
        let js: MeshParamsJs = serde_wasm_bindgen::from_value(params)
            .map_err(|e| JsValue::from_str(&format!("invalid mesh params: {e}")))?;
        let mut params = MeshParams::new(&js.id, &js.geometry_id);
        if let Some(matrix) = &js.matrix {
            params.matrix = matrix_from_js(matrix, "mesh matrix")?;
        }
        params.origin = js.origin.map(|[x, y, z]| RtcOrigin::new(x, y, z));
        if let Some(color) = js.color {
            params.color = color;
        }
        if let Some(opacity) = js.opacity {
            params.opacity = opacity;
        }
        if let Some(metallic) = js.metallic {
            params.metallic = metallic;
        }
        if let Some(roughness) = js.roughness {
            params.roughness = roughness;
        }
        self.with_model(model_id, |m| m.create_mesh(&params).map(|_| ()))
    }

    #[wasm_bindgen(js_name = createObject)]
    pub fn create_object(
        &mut self,
        model_id: &str,
        object_id: &str,
        mesh_ids: Vec<String>,
        view_layer: Option<String>,
    ) -> Result<(), JsValue> {
        let mesh_ids = id_refs(&mesh_ids);
        let params = ObjectParams {
            id: object_id,
            mesh_ids: &mesh_ids,
            view_layer: view_layer.as_deref(),
        };
        self.with_model(model_id, |m| m.create_object(&params).map(|_| ()))
    }

    /// Freeze the model and upload its layers
    #[wasm_bindgen(js_name = buildModel)]
    pub fn build_model(&mut self, model_id: &str) -> Result<(), JsValue> {
        self.with_model(model_id, |m| m.build())?;
        utils::debug(&format!("model '{model_id}' built"));
        Ok(())
    }

    #[wasm_bindgen(js_name = destroyModel)]
    pub fn destroy_model(&mut self, model_id: &str) -> Result<(), JsValue> {
        let key = self.key(model_id)?;
        self.viewer.destroy_model(key).map_err(to_js_error)
    }

    /// `{ layers, builtLayers, meshes, objects, vertices }`
    #[wasm_bindgen(js_name = modelStats)]
    pub fn model_stats(&self, model_id: &str) -> Result<JsValue, JsValue> {
        let key = self.key(model_id)?;
        let model = self
            .viewer
            .model(key)
            .ok_or_else(|| JsValue::from_str(&format!("unknown model: {model_id}")))?;
        let stats = model.stats();
        to_value(&ModelStatsJs {
            layers: stats.layers,
            built_layers: stats.built_layers,
            meshes: stats.meshes,
            objects: model.num_objects(),
            vertices: stats.vertices,
        })
    }

    // ---- object state ----
    //
    // Each setter applies to the given view and returns the number of
    // objects whose state changed.

    #[wasm_bindgen(js_name = setObjectsVisible)]
    pub fn set_objects_visible(
        &mut self,
        view: usize,
        ids: Vec<String>,
        visible: bool,
    ) -> Result<usize, JsValue> {
        self.viewer
            .set_objects_visible(view, &id_refs(&ids), visible)
            .map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = setObjectsPickable)]
    pub fn set_objects_pickable(
        &mut self,
        view: usize,
        ids: Vec<String>,
        pickable: bool,
    ) -> Result<usize, JsValue> {
        self.viewer
            .set_objects_pickable(view, &id_refs(&ids), pickable)
            .map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = setObjectsSelected)]
    pub fn set_objects_selected(
        &mut self,
        view: usize,
        ids: Vec<String>,
        selected: bool,
    ) -> Result<usize, JsValue> {
        self.viewer
            .set_objects_selected(view, &id_refs(&ids), selected)
            .map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = setObjectsHighlighted)]
    pub fn set_objects_highlighted(
        &mut self,
        view: usize,
        ids: Vec<String>,
        highlighted: bool,
    ) -> Result<usize, JsValue> {
        self.viewer
            .set_objects_highlighted(view, &id_refs(&ids), highlighted)
            .map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = setObjectsXrayed)]
    pub fn set_objects_xrayed(
        &mut self,
        view: usize,
        ids: Vec<String>,
        xrayed: bool,
    ) -> Result<usize, JsValue> {
        self.viewer
            .set_objects_xrayed(view, &id_refs(&ids), xrayed)
            .map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = setObjectsEdges)]
    pub fn set_objects_edges(
        &mut self,
        view: usize,
        ids: Vec<String>,
        edges: bool,
    ) -> Result<usize, JsValue> {
        self.viewer
            .set_objects_edges(view, &id_refs(&ids), edges)
            .map_err(to_js_error)
    }

    /// `rgb` is `[r, g, b]` in 0..1, or omitted to restore mesh colors
    #[wasm_bindgen(js_name = setObjectsColorized)]
    pub fn set_objects_colorized(
        &mut self,
        view: usize,
        ids: Vec<String>,
        rgb: Option<Vec<f32>>,
    ) -> Result<usize, JsValue> {
        let rgb = match rgb.as_deref() {
            None => None,
            Some(&[r, g, b]) => Some([r, g, b]),
            Some(other) => {
                return Err(JsValue::from_str(&format!(
                    "colorize expects 3 components, got {}",
                    other.len()
                )))
            }
        };
        self.viewer
            .set_objects_colorized(view, &id_refs(&ids), rgb)
            .map_err(to_js_error)
    }

    /// Opacity in 0..1, or omitted to restore mesh opacity
    #[wasm_bindgen(js_name = setObjectsOpacity)]
    pub fn set_objects_opacity(
        &mut self,
        view: usize,
        ids: Vec<String>,
        opacity: Option<f32>,
    ) -> Result<usize, JsValue> {
        self.viewer
            .set_objects_opacity(view, &id_refs(&ids), opacity)
            .map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = setObjectsOffset)]
    pub fn set_objects_offset(
        &mut self,
        view: usize,
        ids: Vec<String>,
        x: f32,
        y: f32,
        z: f32,
    ) -> Result<usize, JsValue> {
        self.viewer
            .set_objects_offset(view, &id_refs(&ids), [x, y, z])
            .map_err(to_js_error)
    }

    // ---- frames ----

    /// Draw the view if it changed; returns whether a frame was drawn
    pub fn render(&mut self, view: usize) -> Result<bool, JsValue> {
        let stats = self.viewer.render(view).map_err(to_js_error)?;
        if let Some(stats) = &stats {
            if stats.skipped_programs > 0 {
                utils::warn(&format!(
                    "view {view}: {} layer passes skipped (program errors)",
                    stats.skipped_programs
                ));
            }
        }
        Ok(stats.is_some())
    }

    /// Draw every dirty view; returns an array of per-view frame stats
    #[wasm_bindgen(js_name = renderAll)]
    pub fn render_all(&mut self) -> Result<JsValue, JsValue> {
        let frames: Vec<FrameStatsJs> = self
            .viewer
            .render_all()
            .map_err(to_js_error)?
            .into_iter()
            .map(|(view, s)| FrameStatsJs {
                view,
                draw_calls: s.draw_calls,
                passes: s.passes,
                layers: s.layers,
                skipped_programs: s.skipped_programs,
            })
            .collect();
        to_value(&frames)
    }

    /// Object under canvas pixel (x, y): `{ modelId, objectId, meshId }`
    /// or `null` for background
    pub fn pick(&mut self, view: usize, x: u32, y: u32) -> Result<JsValue, JsValue> {
        match self.viewer.pick(view, x, y).map_err(to_js_error)? {
            Some(hit) => to_value(&PickResultJs {
                model_id: hit.model_id,
                object_id: hit.object_id,
                mesh_id: hit.mesh_id,
            }),
            None => Ok(JsValue::NULL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_is_column_major() {
        let mut values = [0.0; 16];
        values[0] = 1.0;
        values[5] = 1.0;
        values[10] = 1.0;
        values[15] = 1.0;
        values[12] = 7.0;
        let m = matrix_from_js(&values, "m").unwrap();
        assert_eq!(m[(0, 3)], 7.0);
    }
}
