// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GLSL ES 3.00 sources assembled from named fragments
//!
//! Each fragment contributes declarations and a piece of `main()`. Composed
//! sources mark every piece with `// --- <name>` so driver errors can be
//! traced back to a fragment.

use super::{PrimitiveClass, ProgramPass, RenderQuality, RendererKind, SceneShaderConfig};
use std::fmt::Write;

/// Number of entries in the `uViewMatrices` uniform array
pub const MAX_VIEW_MATRICES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderFragment {
    Preamble,
    DataTextures,
    PrimitiveFetch,
    PassFilter,
    PositionDecode,
    ViewTransform,
    PointSize,
    SectionPlanes,
    LogDepth,
    FastShading,
    QualityShading,
    SilhouetteColor,
    EdgeColor,
    PickColor,
}

impl ShaderFragment {
    pub fn name(self) -> &'static str {
        match self {
            ShaderFragment::Preamble => "preamble",
            ShaderFragment::DataTextures => "data_textures",
            ShaderFragment::PrimitiveFetch => "primitive_fetch",
            ShaderFragment::PassFilter => "pass_filter",
            ShaderFragment::PositionDecode => "position_decode",
            ShaderFragment::ViewTransform => "view_transform",
            ShaderFragment::PointSize => "point_size",
            ShaderFragment::SectionPlanes => "section_planes",
            ShaderFragment::LogDepth => "log_depth",
            ShaderFragment::FastShading => "fast_shading",
            ShaderFragment::QualityShading => "quality_shading",
            ShaderFragment::SilhouetteColor => "silhouette_color",
            ShaderFragment::EdgeColor => "edge_color",
            ShaderFragment::PickColor => "pick_color",
        }
    }
}

/// Fragments making up one stage of a program
pub fn fragments_for(
    kind: &RendererKind,
    config: &SceneShaderConfig,
    stage: ShaderStage,
) -> Vec<ShaderFragment> {
    use ShaderFragment::*;
    let mut out = vec![Preamble];
    match stage {
        ShaderStage::Vertex => {
            out.extend([DataTextures, PrimitiveFetch, PassFilter, PositionDecode, ViewTransform]);
            if kind.primitive == PrimitiveClass::Points {
                out.push(PointSize);
            }
            if config.num_section_planes > 0 {
                out.push(SectionPlanes);
            }
            if config.log_depth {
                out.push(LogDepth);
            }
            match kind.pass {
                ProgramPass::Color if kind.quality == RenderQuality::High => {
                    out.push(QualityShading)
                }
                ProgramPass::Color => out.push(FastShading),
                ProgramPass::Pick => out.push(PickColor),
                ProgramPass::Silhouette | ProgramPass::Edges => {}
            }
        }
        ShaderStage::Fragment => {
            if config.num_section_planes > 0 {
                out.push(SectionPlanes);
            }
            out.push(match (kind.pass, kind.quality) {
                (ProgramPass::Color, RenderQuality::High) => QualityShading,
                (ProgramPass::Color, RenderQuality::Fast) => FastShading,
                (ProgramPass::Silhouette, _) => SilhouetteColor,
                (ProgramPass::Edges, _) => EdgeColor,
                (ProgramPass::Pick, _) => PickColor,
            });
            if config.log_depth {
                out.push(LogDepth);
            }
        }
    }
    out
}

/// Assemble a stage's source from its fragments.
pub fn compose(
    stage: ShaderStage,
    fragments: &[ShaderFragment],
    kind: &RendererKind,
    config: &SceneShaderConfig,
) -> String {
    let mut src = String::from("#version 300 es\n");
    let parts: Vec<(ShaderFragment, String, String)> = fragments
        .iter()
        .map(|&f| {
            let (decl, body) = emit(f, stage, kind, config);
            (f, decl, body)
        })
        .collect();

    for (fragment, decl, _) in &parts {
        if !decl.is_empty() {
            let _ = writeln!(src, "// --- {}\n{}", fragment.name(), decl.trim_end());
        }
    }
    src.push_str("void main() {\n");
    for (fragment, _, body) in &parts {
        if !body.is_empty() {
            let _ = writeln!(src, "    // --- {}", fragment.name());
            for line in body.trim_end().lines() {
                let _ = writeln!(src, "    {}", line);
            }
        }
    }
    src.push_str("}\n");
    src
}

fn emit(
    fragment: ShaderFragment,
    stage: ShaderStage,
    kind: &RendererKind,
    config: &SceneShaderConfig,
) -> (String, String) {
    use ShaderStage::{Fragment, Vertex};
    let s = |decl: &str, body: &str| (decl.to_string(), body.to_string());
    match (fragment, stage) {
        (ShaderFragment::Preamble, Vertex) => s(
            "precision highp float;\nprecision highp int;\nprecision highp usampler2D;\nprecision highp sampler2D;\n",
            "",
        ),
        (ShaderFragment::Preamble, Fragment) => s(
            "precision highp float;\nprecision highp int;\nout vec4 outColor;\n",
            "",
        ),
        (ShaderFragment::DataTextures, Vertex) => s(DATA_TEXTURES, ""),
        (ShaderFragment::PrimitiveFetch, Vertex) => {
            (String::new(), primitive_fetch(kind.primitive))
        }
        (ShaderFragment::PassFilter, Vertex) => (String::new(), pass_filter(kind.pass)),
        (ShaderFragment::PositionDecode, Vertex) => s("", POSITION_DECODE),
        (ShaderFragment::ViewTransform, Vertex) => (
            format!(
                "uniform mat4 uViewMatrices[{}];\nuniform mat4 uProjMatrix;\n",
                MAX_VIEW_MATRICES
            ),
            format!(
                "vec4 viewPosition = uViewMatrices[min(int(slotInfo.a), {})] * worldPosition;\n\
                 vec4 clipPosition = uProjMatrix * viewPosition;\n\
                 gl_Position = clipPosition;\n",
                MAX_VIEW_MATRICES - 1
            ),
        ),
        (ShaderFragment::PointSize, Vertex) => {
            s("uniform float uPointSize;\n", "gl_PointSize = uPointSize;\n")
        }
        (ShaderFragment::SectionPlanes, Vertex) => s(
            "out vec4 vWorldPosition;\nflat out uint vClippable;\n",
            "vWorldPosition = worldPosition;\nvClippable = (passes.r >> 4) & 1u;\n",
        ),
        (ShaderFragment::SectionPlanes, Fragment) => {
            section_planes_fragment(config.num_section_planes)
        }
        (ShaderFragment::LogDepth, Vertex) => {
            s("out float vFragDepth;\n", "vFragDepth = 1.0 + clipPosition.w;\n")
        }
        (ShaderFragment::LogDepth, Fragment) => s(
            "uniform float uLogDepthBufFC;\nin float vFragDepth;\n",
            "gl_FragDepth = log2(vFragDepth) * uLogDepthBufFC * 0.5;\n",
        ),
        (ShaderFragment::FastShading | ShaderFragment::QualityShading, Vertex) => {
            let mut decl = String::from("flat out vec4 vColor;\nout vec3 vViewPosition;\n");
            let mut body = String::from(
                "vColor = vec4(texelFetch(uMeshFlags, texelCoord(meshIndex * 2), 0)) / 255.0;\n\
                 vViewPosition = viewPosition.xyz;\n",
            );
            if kind.quality == RenderQuality::High {
                decl.push_str("flat out vec2 vMaterial;\n");
                body.push_str(
                    "vMaterial = vec2(texelFetch(uMeshMaterial, texelCoord(meshIndex), 0).rg) / 255.0;\n",
                );
            }
            (decl, body)
        }
        (ShaderFragment::FastShading, Fragment) => fast_shading(kind.primitive),
        (ShaderFragment::QualityShading, Fragment) => {
            quality_shading(config.num_directional_lights)
        }
        (ShaderFragment::SilhouetteColor, Fragment) => {
            s("uniform vec4 uSilhouetteColor;\n", "outColor = uSilhouetteColor;\n")
        }
        (ShaderFragment::EdgeColor, Fragment) => {
            s("uniform vec4 uEdgeColor;\n", "outColor = uEdgeColor;\n")
        }
        (ShaderFragment::PickColor, Vertex) => s(
            "uniform uint uPickLayerId;\nflat out vec4 vPickColor;\n",
            "uint pickMesh = uint(meshIndex);\n\
             vPickColor = vec4(\n    \
                 float(pickMesh & 255u), float((pickMesh >> 8) & 255u),\n    \
                 float(uPickLayerId & 255u), float((uPickLayerId >> 8) & 255u)) / 255.0;\n",
        ),
        (ShaderFragment::PickColor, Fragment) => {
            s("flat in vec4 vPickColor;\n", "outColor = vPickColor;\n")
        }
        _ => (String::new(), String::new()),
    }
}

const DATA_TEXTURES: &str = "\
uniform usampler2D uPositions;
uniform usampler2D uIndices;
uniform usampler2D uPrimToSlot;
uniform usampler2D uSlotInfo;
uniform sampler2D uDecodeMatrices;
uniform sampler2D uMeshMatrices;
uniform usampler2D uMeshMaterial;
uniform usampler2D uMeshFlags;
uniform sampler2D uMeshOffsets;
uniform int uTexWidth;
uniform uint uRenderPass;

ivec2 texelCoord(int index) {
    return ivec2(index % uTexWidth, index / uTexWidth);
}

mat4 fetchMatrix(sampler2D tex, int index) {
    int base = index * 4;
    return mat4(
        texelFetch(tex, texelCoord(base), 0),
        texelFetch(tex, texelCoord(base + 1), 0),
        texelFetch(tex, texelCoord(base + 2), 0),
        texelFetch(tex, texelCoord(base + 3), 0));
}
";

const POSITION_DECODE: &str = "\
int vertexIndex = int(slotInfo.r + local);
vec3 quantized = vec3(texelFetch(uPositions, texelCoord(vertexIndex), 0).rgb);
mat4 decodeMatrix = fetchMatrix(uDecodeMatrices, int(slotInfo.b));
mat4 meshMatrix = fetchMatrix(uMeshMatrices, meshIndex);
vec4 worldPosition = meshMatrix * (decodeMatrix * vec4(quantized, 1.0));
worldPosition.xyz += texelFetch(uMeshOffsets, texelCoord(meshIndex), 0).xyz;
";

fn primitive_fetch(primitive: PrimitiveClass) -> String {
    let per = primitive.vertices_per_primitive();
    let corner = match per {
        1 => "uint local = prim.r;",
        2 => "uint local = corner == 0 ? prim.r : prim.g;",
        _ => "uint local = corner == 0 ? prim.r : (corner == 1 ? prim.g : prim.b);",
    };
    format!(
        "int primIndex = gl_VertexID / {per};\n\
         int corner = gl_VertexID % {per};\n\
         int slot = int(texelFetch(uPrimToSlot, texelCoord(primIndex), 0).r);\n\
         uvec4 slotInfo = texelFetch(uSlotInfo, texelCoord(slot), 0);\n\
         int meshIndex = int(slotInfo.g);\n\
         uvec4 prim = texelFetch(uIndices, texelCoord(primIndex), 0);\n\
         {corner}\n"
    )
}

fn pass_filter(pass: ProgramPass) -> String {
    let component = match pass {
        ProgramPass::Color => "(passes.r & 15u)",
        ProgramPass::Silhouette => "passes.g",
        ProgramPass::Edges => "passes.b",
        ProgramPass::Pick => "passes.a",
    };
    format!(
        "uvec4 passes = texelFetch(uMeshFlags, texelCoord(meshIndex * 2 + 1), 0);\n\
         if ({component} != uRenderPass) {{\n    \
             gl_Position = vec4(3.0, 3.0, 3.0, 1.0);\n    \
             return;\n\
         }}\n"
    )
}

fn section_planes_fragment(count: usize) -> (String, String) {
    let mut decl = String::from("in vec4 vWorldPosition;\nflat in uint vClippable;\n");
    let _ = writeln!(decl, "uniform bool uSectionPlaneActive[{count}];");
    let _ = writeln!(decl, "uniform vec3 uSectionPlanePos[{count}];");
    let _ = writeln!(decl, "uniform vec3 uSectionPlaneDir[{count}];");

    let mut body = String::from("if (vClippable == 1u) {\n    float dist = 0.0;\n");
    for i in 0..count {
        let _ = writeln!(
            body,
            "    if (uSectionPlaneActive[{i}]) {{\n        \
                 dist += clamp(dot(-uSectionPlaneDir[{i}], vWorldPosition.xyz - uSectionPlanePos[{i}]), 0.0, 1000.0);\n    \
             }}"
        );
    }
    body.push_str("    if (dist > 0.0) {\n        discard;\n    }\n}\n");
    (decl, body)
}

fn fast_shading(primitive: PrimitiveClass) -> (String, String) {
    let decl = "flat in vec4 vColor;\nin vec3 vViewPosition;\nuniform vec4 uLightAmbient;\n".to_string();
    let body = match primitive {
        PrimitiveClass::Triangles => "\
vec3 normal = normalize(cross(dFdx(vViewPosition), dFdy(vViewPosition)));
float lambert = max(dot(normal, vec3(0.0, 0.0, 1.0)), 0.0);
vec3 ambient = uLightAmbient.rgb * uLightAmbient.a;
outColor = vec4(vColor.rgb * (ambient + lambert * 0.7), vColor.a);
",
        PrimitiveClass::Lines | PrimitiveClass::Points => "outColor = vColor;\n",
    };
    (decl, body.to_string())
}

fn quality_shading(lights: usize) -> (String, String) {
    let mut decl = String::from(
        "flat in vec4 vColor;\nin vec3 vViewPosition;\nflat in vec2 vMaterial;\nuniform vec4 uLightAmbient;\n",
    );
    if lights > 0 {
        let _ = writeln!(decl, "uniform vec3 uLightDir[{lights}];");
        let _ = writeln!(decl, "uniform vec4 uLightColor[{lights}];");
    }
    let mut body = String::from(
        "\
vec3 normal = normalize(cross(dFdx(vViewPosition), dFdy(vViewPosition)));
vec3 viewDir = normalize(-vViewPosition);
float metallic = vMaterial.x;
float roughness = max(vMaterial.y, 0.04);
float shininess = max(2.0 / (roughness * roughness) - 2.0, 1.0);
vec3 diffuseColor = vColor.rgb * (1.0 - metallic);
vec3 specularColor = mix(vec3(0.04), vColor.rgb, metallic);
vec3 light = uLightAmbient.rgb * uLightAmbient.a * vColor.rgb;
",
    );
    for i in 0..lights {
        let _ = write!(
            body,
            "{{\n    \
                 vec3 l = normalize(-uLightDir[{i}]);\n    \
                 float nDotL = max(dot(normal, l), 0.0);\n    \
                 vec3 h = normalize(l + viewDir);\n    \
                 float spec = pow(max(dot(normal, h), 0.0), shininess) * nDotL;\n    \
                 light += uLightColor[{i}].rgb * uLightColor[{i}].a * (diffuseColor * nDotL + specularColor * spec);\n\
             }}\n"
        );
    }
    body.push_str("outColor = vec4(light, vColor.a);\n");
    (decl, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(primitive: PrimitiveClass, pass: ProgramPass, quality: RenderQuality) -> RendererKind {
        RendererKind::new(primitive, pass, quality)
    }

    fn build(kind: &RendererKind, config: &SceneShaderConfig, stage: ShaderStage) -> String {
        compose(stage, &fragments_for(kind, config, stage), kind, config)
    }

    #[test]
    fn test_version_first_and_markers_present() {
        let k = kind(PrimitiveClass::Triangles, ProgramPass::Color, RenderQuality::Fast);
        let config = SceneShaderConfig::default();
        let vs = build(&k, &config, ShaderStage::Vertex);
        assert!(vs.starts_with("#version 300 es\n"));
        assert!(vs.contains("// --- data_textures"));
        assert!(vs.contains("    // --- pass_filter"));
        assert!(vs.contains("gl_VertexID / 3"));
        assert!(vs.contains("(passes.r & 15u) != uRenderPass"));
        let fs = build(&k, &config, ShaderStage::Fragment);
        assert!(fs.contains("// --- fast_shading"));
        assert!(!fs.contains("section_planes"));
    }

    #[test]
    fn test_section_planes_unrolled() {
        let k = kind(PrimitiveClass::Lines, ProgramPass::Edges, RenderQuality::Fast);
        let config = SceneShaderConfig {
            num_section_planes: 2,
            ..Default::default()
        };
        let fs = build(&k, &config, ShaderStage::Fragment);
        assert!(fs.contains("uniform vec3 uSectionPlanePos[2];"));
        assert!(fs.contains("uSectionPlaneActive[1]"));
        assert!(fs.contains("discard;"));
        let vs = build(&k, &config, ShaderStage::Vertex);
        assert!(vs.contains("flat out uint vClippable;"));
        assert!(vs.contains("gl_VertexID / 2"));
    }

    #[test]
    fn test_quality_shading_declares_lights() {
        let k = kind(PrimitiveClass::Triangles, ProgramPass::Color, RenderQuality::High);
        let config = SceneShaderConfig {
            num_directional_lights: 2,
            log_depth: true,
            ..Default::default()
        };
        let fs = build(&k, &config, ShaderStage::Fragment);
        assert!(fs.contains("uniform vec3 uLightDir[2];"));
        assert!(fs.contains("uLightColor[1]"));
        assert!(fs.contains("gl_FragDepth"));
        let vs = build(&k, &config, ShaderStage::Vertex);
        assert!(vs.contains("flat out vec2 vMaterial;"));
        assert!(vs.contains("vFragDepth = 1.0 + clipPosition.w;"));
    }

    #[test]
    fn test_pick_program_encodes_ids() {
        let k = kind(PrimitiveClass::Points, ProgramPass::Pick, RenderQuality::Fast);
        let config = SceneShaderConfig::default();
        let vs = build(&k, &config, ShaderStage::Vertex);
        assert!(vs.contains("uniform uint uPickLayerId;"));
        assert!(vs.contains("gl_PointSize = uPointSize;"));
        assert!(vs.contains("passes.a != uRenderPass"));
    }
}
