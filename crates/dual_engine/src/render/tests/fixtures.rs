//! Shaders and reflections shared by the cross-module tests

use std::sync::Arc;

use crate::render::backend::{GpuProgramType, RenderBackendKind};
use crate::render::gpu::{
    FixedReflectionCompiler, GpuParamDataDesc, GpuParamDataType, GpuParamDesc, GpuParamObjectDesc,
    GpuParamObjectType, GpuProgram, GpuProgramDesc,
};
use crate::render::shader::{Pass, Shader, ShaderDataParamDesc, ShaderDesc, ShaderObjectParamDesc, Technique};

/// Fragment reflection with a shareable `PerMaterial` block and an albedo texture
pub fn per_material(params: Vec<GpuParamDataDesc>) -> GpuParamDesc {
    GpuParamDesc::new()
        .with_block("PerMaterial", 0, true, params)
        .with_object(GpuParamObjectDesc::new("gAlbedo", GpuParamObjectType::Texture2D, 0))
}

pub fn tint_reflection() -> GpuParamDesc {
    per_material(vec![
        GpuParamDataDesc::new("tintColor", GpuParamDataType::Float4, 1),
        GpuParamDataDesc::new("gloss", GpuParamDataType::Float1, 1),
    ])
}

/// Vulkan technique with one fragment-only pass per reflection, compiled up front
pub fn precompiled_technique(reflections: Vec<GpuParamDesc>) -> Arc<Technique> {
    let passes = reflections
        .into_iter()
        .enumerate()
        .map(|(i, reflection)| {
            let program = GpuProgram::precompiled(
                GpuProgramDesc::new(format!("fs{i}"), GpuProgramType::Fragment),
                reflection,
            );
            Pass::new().with_program(program)
        })
        .collect();
    Technique::new("main", RenderBackendKind::Vulkan, passes)
}

/// Vulkan technique whose single program compiles on the core thread
pub fn deferred_technique(reflection: GpuParamDesc) -> Arc<Technique> {
    let program = GpuProgram::new(
        GpuProgramDesc::new("fs", GpuProgramType::Fragment).with_source("void main() {}"),
        Arc::new(FixedReflectionCompiler::new(reflection)),
    );
    Technique::new("main", RenderBackendKind::Vulkan, vec![Pass::new().with_program(program)])
}

pub fn tint_desc() -> ShaderDesc {
    let mut desc = ShaderDesc::new();
    desc.add_data_param(ShaderDataParamDesc::new("tint", "tintColor", GpuParamDataType::Color))
        .add_data_param_with_default(ShaderDataParamDesc::new("gloss", "gloss", GpuParamDataType::Float1), 0.5f32)
        .add_object_param(ShaderObjectParamDesc::new("albedo", ["gAlbedo"], GpuParamObjectType::Texture2D));
    desc
}

pub fn tint_shader(passes: usize) -> Arc<Shader> {
    let reflections = (0..passes).map(|_| tint_reflection()).collect();
    Shader::new("tinted", tint_desc(), vec![precompiled_technique(reflections)])
}
