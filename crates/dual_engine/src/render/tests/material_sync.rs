//! Materials pushed through the core thread end to end

use std::sync::Arc;

use approx::assert_relative_eq;

use super::fixtures::{deferred_technique, tint_desc, tint_reflection, tint_shader};
use crate::core::EngineConfig;
use crate::foundation::math::Color;
use crate::render::backend::{GpuProgramType, RenderBackendKind};
use crate::render::core_object::CoreObject;
use crate::render::gpu::{Texture, TextureDesc};
use crate::render::resources::materials::{Material, MaterialError};
use crate::render::shader::Shader;
use crate::Engine;

fn engine() -> Engine {
    Engine::new(EngineConfig::default().with_log_level("warn")).unwrap()
}

fn submit(engine: &mut Engine, material: &Material) {
    engine.sync(material).unwrap();
    engine.end_frame().unwrap();
    engine.flush().unwrap();
}

fn hardware_tint(material: &Material) -> Vec<u8> {
    let core = material.core();
    core.flush_param_blocks();
    let pass = core.pass_parameters(0).unwrap();
    pass.get(GpuProgramType::Fragment)
        .unwrap()
        .hardware_bytes("tintColor", 0)
        .unwrap()
}

#[test]
fn test_tint_reaches_hardware_buffer() {
    let mut engine = engine();
    let mut material = Material::with_shader(RenderBackendKind::Vulkan, tint_shader(1)).unwrap();
    assert!(engine.initialize_material(&mut material).unwrap());

    material.set_param("tint", Color::RED, 0).unwrap();
    submit(&mut engine, &material);

    let core = material.core();
    assert!(!core.is_stub());
    assert_eq!(core.flush_param_blocks(), 1);
    let pass = core.pass_parameters(0).unwrap();
    let fragment = pass.get(GpuProgramType::Fragment).unwrap();
    assert_eq!(
        fragment.hardware_bytes("tintColor", 0).unwrap(),
        bytemuck::bytes_of(&Color::RED)
    );
    assert_eq!(
        fragment.hardware_bytes("gloss", 0).unwrap(),
        bytemuck::bytes_of(&0.5f32)
    );

    engine.shutdown().unwrap();
}

#[test]
fn test_core_mirrors_sim_material() {
    let mut engine = engine();
    let material = Material::with_shader(RenderBackendKind::Vulkan, tint_shader(2)).unwrap();
    submit(&mut engine, &material);

    let core = material.core();
    assert_eq!(&core.valid_params(), material.valid_params());
    assert_eq!(&core.valid_shareable_param_blocks(), material.valid_shareable_param_blocks());
    assert_eq!(core.num_passes(), 2);
    assert_eq!(core.technique().unwrap().name(), "main");
    assert!(Arc::ptr_eq(
        &core.shader().unwrap(),
        &material.shader().unwrap().core()
    ));

    for index in 0..2 {
        let sim = material.pass_parameters(index).unwrap().get(GpuProgramType::Fragment).unwrap();
        let core_pass = core.pass_parameters(index).unwrap();
        assert!(Arc::ptr_eq(core_pass.get(GpuProgramType::Fragment).unwrap(), &sim.core()));
    }
    assert!(core.pass_parameters(2).is_none());
}

#[test]
fn test_resync_releases_previous_core_state() {
    let mut engine = engine();
    let material = Material::with_shader(RenderBackendKind::Vulkan, tint_shader(1)).unwrap();
    submit(&mut engine, &material);

    let core = material.core();
    let first_pass = core.pass_parameters(0).unwrap();
    let gpu_core = first_pass.get(GpuProgramType::Fragment).unwrap().clone();

    material.core_state().mark_core_dirty();
    submit(&mut engine, &material);

    let second_pass = core.pass_parameters(0).unwrap();
    assert!(!Arc::ptr_eq(&first_pass, &second_pass));
    assert_eq!(Arc::strong_count(&first_pass), 1);
    drop(first_pass);
    // Sim-side parameter set, the live pass record and this test
    assert_eq!(Arc::strong_count(&gpu_core), 3);

    let frame = engine.frame_allocator();
    assert_eq!(frame.block_count(), 0);
    assert_eq!(frame.allocated_bytes(), 0);
    assert!(frame.free_block_count() >= 1);
}

#[test]
fn test_core_is_stub_until_shader_loads() {
    let mut engine = engine();
    let shader = Shader::new("deferred", tint_desc(), vec![deferred_technique(tint_reflection())]);
    let mut material = Material::with_shader(RenderBackendKind::Vulkan, shader.clone()).unwrap();
    assert!(!material.is_initialized());
    assert!(matches!(
        material.get_param::<f32>("gloss"),
        Err(MaterialError::ShaderNotLoaded { .. })
    ));

    submit(&mut engine, &material);
    let core = material.core();
    assert!(core.is_stub());
    assert_eq!(core.num_passes(), 0);
    assert!(core.shader().is_some());

    // The shader went along as a dependency and compiled on the core thread
    assert!(shader.is_loaded());
    assert!(material.try_initialize().unwrap());
    submit(&mut engine, &material);
    assert!(!core.is_stub());
    assert_eq!(core.num_passes(), 1);
}

#[test]
fn test_engine_loads_shader_before_initializing() {
    let mut engine = engine();
    let shader = Shader::new("deferred", tint_desc(), vec![deferred_technique(tint_reflection())]);
    let mut material = Material::with_shader(RenderBackendKind::Vulkan, shader).unwrap();

    assert!(engine.initialize_material(&mut material).unwrap());
    assert_relative_eq!(material.get_param_value::<f32>("gloss", 0).unwrap(), 0.5);
}

#[test]
fn test_texture_binding_reaches_core() {
    let mut engine = engine();
    let material = Material::with_shader(RenderBackendKind::Vulkan, tint_shader(1)).unwrap();
    let texture = Texture::new(TextureDesc::new_2d("albedo", 4, 4));
    material.set_texture("albedo", Some(texture.clone())).unwrap();
    submit(&mut engine, &material);

    let pass = material.core().pass_parameters(0).unwrap();
    let bound = pass.get(GpuProgramType::Fragment).unwrap().texture(0).unwrap();
    assert!(Arc::ptr_eq(&bound, &texture.core()));
}

#[test]
fn test_clone_syncs_independently() {
    let mut engine = engine();
    let material = Material::with_shader(RenderBackendKind::Vulkan, tint_shader(1)).unwrap();
    material.set_param("tint", Color::RED, 0).unwrap();

    let copy = material.try_clone().unwrap();
    copy.set_param("tint", Color::BLUE, 0).unwrap();
    submit(&mut engine, &material);
    submit(&mut engine, &copy);

    assert!(!Arc::ptr_eq(&material.core(), &copy.core()));
    assert_eq!(hardware_tint(&material), bytemuck::bytes_of(&Color::RED));
    assert_eq!(hardware_tint(&copy), bytemuck::bytes_of(&Color::BLUE));
}
