use std::{env, fs, path::PathBuf};

// Per-vertex data lives in the uniform buffer and is indexed by
// gl_VertexIndex, so the pipeline has no vertex input bindings.
const CUBE_VERT: &str = r#"
#version 450
layout(std140, binding = 0) uniform buf {
    mat4 mvp;
    vec4 position[12 * 3];
    vec4 attr[12 * 3];
} ubuf;

layout(location = 0) out vec4 texcoord;
layout(location = 1) out vec3 frag_pos;

void main() {
    texcoord = ubuf.attr[gl_VertexIndex];
    gl_Position = ubuf.mvp * ubuf.position[gl_VertexIndex];
    frag_pos = gl_Position.xyz;
}
"#;

// Flat shading from screen-space derivatives; no normals in the mesh.
const CUBE_FRAG: &str = r#"
#version 450
layout(binding = 1) uniform sampler2D tex;

layout(location = 0) in vec4 texcoord;
layout(location = 1) in vec3 frag_pos;
layout(location = 0) out vec4 out_color;

const vec3 light_dir = vec3(0.424, 0.566, 0.707);

void main() {
    vec3 dx = dFdx(frag_pos);
    vec3 dy = dFdy(frag_pos);
    vec3 normal = normalize(cross(dx, dy));
    float light = max(0.0, dot(light_dir, normal));
    out_color = light * texture(tex, texcoord.xy);
}
"#;

const SOLID_FRAG: &str = r#"
#version 450
layout(location = 0) in vec4 texcoord;
layout(location = 1) in vec3 frag_pos;
layout(location = 0) out vec4 out_color;

const vec3 light_dir = vec3(0.424, 0.566, 0.707);

void main() {
    vec3 dx = dFdx(frag_pos);
    vec3 dy = dFdy(frag_pos);
    vec3 normal = normalize(cross(dx, dy));
    float light = max(0.0, dot(light_dir, normal));
    out_color = vec4(vec3(0.2) + light * vec3(texcoord.xy, 0.8), 1.0);
}
"#;

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let shaders = [
        ("cube.vert", shaderc::ShaderKind::Vertex, CUBE_VERT),
        ("cube.frag", shaderc::ShaderKind::Fragment, CUBE_FRAG),
        ("solid.frag", shaderc::ShaderKind::Fragment, SOLID_FRAG),
    ];
    for (name, kind, src) in shaders {
        let spv = comp
            .compile_into_spirv(src, kind, name, "main", Some(&opts))
            .unwrap();
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8()).unwrap();
    }

    println!("cargo:rerun-if-changed=build.rs");
}
