//! Material demo
//!
//! Builds a tinted shader whose fragment program is compiled on the core
//! thread, drives a material through a few frames and a shader hot swap, and
//! logs what the core thread ends up uploading.

use std::sync::Arc;

use dual_engine::prelude::*;
use dual_engine::render::gpu::FixedReflectionCompiler;

fn tinted_shader(name: &str, extra_gloss: bool) -> Arc<Shader> {
    let mut params = vec![GpuParamDataDesc::new("tintColor", GpuParamDataType::Float4, 1)];
    if extra_gloss {
        params.push(GpuParamDataDesc::new("gloss", GpuParamDataType::Float1, 1));
    }
    let reflection = GpuParamDesc::new().with_block("PerMaterial", 0, true, params);

    let program = GpuProgram::new(
        GpuProgramDesc::new(format!("{name}_fs"), GpuProgramType::Fragment),
        Arc::new(FixedReflectionCompiler::new(reflection)),
    );
    let technique = Technique::new(
        "forward",
        RenderBackendKind::Vulkan,
        vec![Pass::new().with_program(program)],
    );

    let mut desc = ShaderDesc::new();
    desc.add_data_param(ShaderDataParamDesc::new("tint", "tintColor", GpuParamDataType::Color));
    if extra_gloss {
        desc.add_data_param_with_default(
            ShaderDataParamDesc::new("gloss", "gloss", GpuParamDataType::Float1),
            0.5f32,
        );
    }
    Shader::new(name, desc, vec![technique])
}

fn log_uploaded_tint(material: &Material) {
    let core = material.core();
    let uploaded = core.flush_param_blocks();
    let tint = core
        .pass_parameters(0)
        .and_then(|pass| pass.get(GpuProgramType::Fragment).cloned())
        .and_then(|params| params.hardware_bytes("tintColor", 0));
    log::info!("Core uploaded {} block(s); tint bytes: {:?}", uploaded, tint);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::new().with_log_level("info");
    let mut engine = Engine::new(config)?;

    let mut material = Material::new(engine.backend()).with_name("demo");
    material.set_shader(Some(tinted_shader("flat", false)))?;
    log::info!("Material state before load: {:?}", material.init_state());

    engine.initialize_material(&mut material)?;
    material.set_param("tint", Color::RED, 0)?;

    engine.sync(&material)?;
    engine.end_frame()?;
    engine.flush()?;
    log_uploaded_tint(&material);

    // Hot swap keeps the tint and picks up the new shader's defaults
    let glossy = tinted_shader("glossy", true);
    engine.load_shader(&glossy)?;
    material.set_shader(Some(glossy))?;
    log::info!(
        "After swap: tint {:?}, gloss {}",
        material.get_param_value::<Color>("tint", 0)?,
        material.get_param_value::<f32>("gloss", 0)?
    );

    let copy = material.try_clone()?.with_name("demo copy");
    copy.set_param("tint", Color::BLUE, 0)?;
    log::info!(
        "Clone tint {:?}, original tint {:?}",
        copy.get_param_value::<Color>("tint", 0)?,
        material.get_param_value::<Color>("tint", 0)?
    );

    engine.sync(&material)?;
    engine.sync(&copy)?;
    engine.end_frame()?;
    engine.flush()?;
    log_uploaded_tint(&material);

    engine.shutdown()?;
    Ok(())
}
