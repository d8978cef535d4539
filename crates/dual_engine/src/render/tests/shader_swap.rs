//! Parameter values surviving a shader change

use std::sync::Arc;

use approx::assert_relative_eq;

use super::fixtures::{per_material, precompiled_technique, tint_shader};
use crate::foundation::math::Color;
use crate::render::backend::{GpuProgramType, RenderBackendKind};
use crate::render::gpu::{
    GpuParamBlockBuffer, GpuParamBlockUsage, GpuParamDataDesc, GpuParamDataType, GpuParamDesc,
    GpuParamObjectType, Texture, TextureDesc,
};
use crate::render::resources::materials::{Material, MaterialInitState};
use crate::render::shader::{Shader, ShaderDataParamDesc, ShaderDesc, ShaderObjectParamDesc};

struct Layout {
    weights: u32,
    gloss: GpuParamDataType,
    light_bytes: u32,
}

fn layout_shader(name: &str, layout: &Layout) -> Arc<Shader> {
    let mut desc = ShaderDesc::new();
    desc.add_data_param(ShaderDataParamDesc::new("tint", "tintColor", GpuParamDataType::Color))
        .add_data_param(
            ShaderDataParamDesc::new("weights", "weights", GpuParamDataType::Float1).with_array_size(layout.weights),
        )
        .add_data_param(ShaderDataParamDesc::new("gloss", "gloss", layout.gloss))
        .add_data_param(ShaderDataParamDesc::new_struct("light", "light", layout.light_bytes))
        .add_object_param(ShaderObjectParamDesc::new("albedo", ["gAlbedo"], GpuParamObjectType::Texture2D));

    let reflection = per_material(vec![
        GpuParamDataDesc::new("tintColor", GpuParamDataType::Float4, 1),
        GpuParamDataDesc::new("weights", GpuParamDataType::Float1, layout.weights),
        GpuParamDataDesc::new("gloss", layout.gloss, 1),
        GpuParamDataDesc::new_struct("light", layout.light_bytes / 4, 1),
    ]);
    Shader::new(name, desc, vec![precompiled_technique(vec![reflection])])
}

fn shared_block_shader(name: &str) -> Arc<Shader> {
    let reflection = GpuParamDesc::new().with_block(
        "PerFrame",
        1,
        true,
        vec![GpuParamDataDesc::new("time", GpuParamDataType::Float1, 1)],
    );
    let mut desc = ShaderDesc::new();
    desc.add_data_param(ShaderDataParamDesc::new("time", "time", GpuParamDataType::Float1))
        .set_param_block_attribs("PerFrame", true, GpuParamBlockUsage::Dynamic, None);
    Shader::new(name, desc, vec![precompiled_technique(vec![reflection])])
}

#[test]
fn test_values_carried_across_shader_change() {
    let before = layout_shader(
        "before",
        &Layout {
            weights: 4,
            gloss: GpuParamDataType::Float1,
            light_bytes: 16,
        },
    );
    let after = layout_shader(
        "after",
        &Layout {
            weights: 2,
            gloss: GpuParamDataType::Int1,
            light_bytes: 32,
        },
    );

    let mut material = Material::with_shader(RenderBackendKind::Vulkan, before).unwrap();
    let texture = Texture::new(TextureDesc::new_2d("albedo", 8, 8));
    material.set_param("tint", Color::RED, 0).unwrap();
    for (index, weight) in [1.0f32, 2.0, 3.0, 4.0].into_iter().enumerate() {
        material.set_param("weights", weight, index as u32).unwrap();
    }
    material.set_param("gloss", 0.75f32, 0).unwrap();
    material.get_struct_param("light").unwrap().set(&[7; 16], 0).unwrap();
    material.set_texture("albedo", Some(texture.clone())).unwrap();

    assert!(material.set_shader(Some(after)).unwrap());

    assert_eq!(material.get_param_value::<Color>("tint", 0).unwrap(), Color::RED);
    // The array shrank to two elements
    let weights = material.get_param::<f32>("weights").unwrap();
    assert_relative_eq!(weights.get_at(0).unwrap(), 1.0);
    assert_relative_eq!(weights.get_at(1).unwrap(), 2.0);
    assert!(weights.get_at(2).is_err());
    // Type and struct size changed; both start from zero
    assert_eq!(material.get_param_value::<i32>("gloss", 0).unwrap(), 0);
    assert_eq!(material.get_struct_param("light").unwrap().get(0).unwrap(), vec![0; 32]);
    assert!(Arc::ptr_eq(&material.texture("albedo").unwrap().unwrap(), &texture));
}

#[test]
fn test_clearing_shader_keeps_values_for_next_one() {
    let mut material = Material::with_shader(RenderBackendKind::Vulkan, tint_shader(1)).unwrap();
    material.set_param("tint", Color::BLUE, 0).unwrap();

    assert!(!material.set_shader(None).unwrap());
    assert_eq!(material.init_state(), MaterialInitState::NoShader);
    assert!(material.get_param::<Color>("tint").is_err());

    assert!(material.set_shader(Some(tint_shader(1))).unwrap());
    assert_eq!(material.get_param_value::<Color>("tint", 0).unwrap(), Color::BLUE);
    assert_relative_eq!(material.get_param_value::<f32>("gloss", 0).unwrap(), 0.5);
}

#[test]
fn test_external_block_buffer_survives_shader_change() {
    let mut material = Material::with_shader(RenderBackendKind::Vulkan, shared_block_shader("first")).unwrap();
    assert!(material.param_block_buffer("PerFrame").is_none());

    let frame_buffer = GpuParamBlockBuffer::new(16, GpuParamBlockUsage::Dynamic);
    material.set_param_block_buffer("PerFrame", frame_buffer.clone()).unwrap();
    material.set_param("time", 2.5f32, 0).unwrap();

    assert!(material.set_shader(Some(shared_block_shader("second"))).unwrap());
    assert!(Arc::ptr_eq(&material.param_block_buffer("PerFrame").unwrap(), &frame_buffer));

    let params = material.pass_parameters(0).unwrap().get(GpuProgramType::Fragment).unwrap().clone();
    assert!(Arc::ptr_eq(&params.param_block_buffer("PerFrame").unwrap(), &frame_buffer));
    assert_relative_eq!(material.get_param_value::<f32>("time", 0).unwrap(), 2.5);
}

#[test]
fn test_owned_block_dropped_when_new_shader_shares_it() {
    // The first shader lets the material own the block
    let mut material = Material::with_shader(
        RenderBackendKind::Vulkan,
        layout_shader(
            "owned",
            &Layout {
                weights: 1,
                gloss: GpuParamDataType::Float1,
                light_bytes: 4,
            },
        ),
    )
    .unwrap();
    let owned = material.param_block_buffer("PerMaterial").unwrap();
    material.set_param("tint", Color::GREEN, 0).unwrap();

    // The second one grows the block and expects it from outside
    let reflection = per_material(vec![
        GpuParamDataDesc::new("tintColor", GpuParamDataType::Float4, 1),
        GpuParamDataDesc::new("rim", GpuParamDataType::Float4, 1),
    ]);
    let mut desc = ShaderDesc::new();
    desc.add_data_param(ShaderDataParamDesc::new("tint", "tintColor", GpuParamDataType::Color))
        .set_param_block_attribs("PerMaterial", true, GpuParamBlockUsage::Static, None);
    let shared = Shader::new("shared", desc, vec![precompiled_technique(vec![reflection])]);

    assert!(material.set_shader(Some(shared)).unwrap());
    assert_eq!(material.init_state(), MaterialInitState::Initialized);
    assert!(material.param_block_buffer("PerMaterial").is_none());
    let params = material.pass_parameters(0).unwrap().get(GpuProgramType::Fragment).unwrap().clone();
    assert!(params.param_block_buffer("PerMaterial").is_none());

    let external = GpuParamBlockBuffer::new(32, GpuParamBlockUsage::Static);
    material.set_param_block_buffer("PerMaterial", external.clone()).unwrap();
    assert!(!Arc::ptr_eq(&external, &owned));
    assert!(Arc::ptr_eq(&params.param_block_buffer("PerMaterial").unwrap(), &external));
}

#[test]
fn test_undersized_external_buffer_is_not_rebound() {
    let mut material = Material::with_shader(RenderBackendKind::Vulkan, shared_block_shader("small")).unwrap();
    material
        .set_param_block_buffer("PerFrame", GpuParamBlockBuffer::new(16, GpuParamBlockUsage::Dynamic))
        .unwrap();

    let reflection = GpuParamDesc::new().with_block(
        "PerFrame",
        1,
        true,
        vec![
            GpuParamDataDesc::new("time", GpuParamDataType::Float1, 1),
            GpuParamDataDesc::new("wind", GpuParamDataType::Float4, 2),
        ],
    );
    let mut desc = ShaderDesc::new();
    desc.add_data_param(ShaderDataParamDesc::new("time", "time", GpuParamDataType::Float1))
        .set_param_block_attribs("PerFrame", true, GpuParamBlockUsage::Dynamic, None);
    let larger = Shader::new("large", desc, vec![precompiled_technique(vec![reflection])]);

    assert!(material.set_shader(Some(larger)).unwrap());
    assert!(material.param_block_buffer("PerFrame").is_none());
}
