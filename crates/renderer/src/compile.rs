use wgpu::naga;

use crate::types::{CompileError, ShaderStage};

/// Validated GLSL, kept together with the stage it was compiled for.
#[derive(Debug)]
pub struct ValidatedShader {
    pub stage: ShaderStage,
    pub module: naga::Module,
    pub info: naga::valid::ModuleInfo,
}

/// Parses and validates GLSL through naga's frontend.
///
/// On failure the diagnostic is naga's rendered report against `source`, so
/// line/column context survives all the way to the status channel.
pub fn compile_glsl(stage: ShaderStage, source: &str) -> Result<ValidatedShader, CompileError> {
    let naga_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };

    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(naga_stage);
    let module = frontend
        .parse(&options, source)
        .map_err(|errors| CompileError::new(stage, errors.emit_to_string(source)))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(&module)
        .map_err(|error| CompileError::new(stage, error.emit_to_string(source)))?;

    tracing::debug!(
        %stage,
        entry_points = module.entry_points.len(),
        "validated shader"
    );

    Ok(ValidatedShader {
        stage,
        module,
        info,
    })
}

/// Full-surface quad vertex shader.
///
/// `v_pos` carries clip-space corners, `v_texcoord` the matching UVs which are
/// forwarded to the fragment stage as `texcoord` at location 0.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_pos;
layout(location = 1) in vec2 v_texcoord;
layout(location = 0) out vec2 texcoord;

void main() {
    gl_Position = vec4(v_pos, 0.0, 1.0);
    texcoord = v_texcoord;
}
";

/// Starting fragment shader for a new project.
pub const DEFAULT_FRAGMENT_GLSL: &str = r"#version 450
layout(location = 0) in vec2 texcoord;
layout(location = 0) out vec4 fragColor;

void main() {
    fragColor = vec4(texcoord, 0.5, 1.0);
}
";
