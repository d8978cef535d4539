//! Parameter resolution
//!
//! Decides which shader-declared parameters a material can actually expose
//! given the reflection of every program in a technique, and what block
//! storage is needed to back them. Everything here is a pure function of its
//! inputs; the only side effect is warning about mismatches.
//!
//! Reflections are passed in pass order, and within a pass in stage order, so
//! "first" always means the same program on every run.

use std::collections::{BTreeMap, BTreeSet};

use crate::render::gpu::{
    GpuObjectCategory, GpuParamBlockDesc, GpuParamBlockUsage, GpuParamDataDesc, GpuParamDesc,
    GpuParamObjectDesc,
};
use crate::render::shader::{ShaderDesc, ShaderObjectParamDesc, ShaderParamBlockDesc};

/// Storage decision for one valid shareable block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBlockData {
    /// Block name
    pub name: String,
    /// Usage hint for a created buffer
    pub usage: GpuParamBlockUsage,
    /// Size in bytes
    pub size: usize,
    /// Whether the material creates the buffer itself
    pub create: bool,
}

/// Combined output of a resolution run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedParameters {
    /// Shader parameter name to GPU variable name
    pub valid_params: BTreeMap<String, String>,
    /// Blocks that can be backed by one buffer across every program
    pub valid_shareable_param_blocks: BTreeSet<String>,
    /// GPU variable name to the block holding it
    pub param_to_block: BTreeMap<String, String>,
    /// Storage decisions for the valid shareable blocks
    pub block_data: Vec<ShaderBlockData>,
}

/// Run the whole resolution for `param_descs` against `shader`
pub fn resolve_parameters(param_descs: &[&GpuParamDesc], shader: &ShaderDesc) -> ResolvedParameters {
    let valid_shareable_param_blocks = determine_valid_shareable_param_blocks(param_descs);
    let block_data =
        determine_shader_block_data(&valid_shareable_param_blocks, param_descs, shader.param_blocks());

    ResolvedParameters {
        valid_params: determine_param_mappings(param_descs, shader),
        param_to_block: determine_parameter_to_block_mapping(param_descs),
        valid_shareable_param_blocks,
        block_data,
    }
}

/// Data parameters every declaring program agrees on.
///
/// Agreement ignores buffer offsets. A name is recorded on first sight and
/// removed for good on the first conflicting sighting.
pub fn determine_valid_data_parameters(param_descs: &[&GpuParamDesc]) -> BTreeMap<String, GpuParamDataDesc> {
    let mut valid = BTreeMap::new();
    let mut invalid = BTreeSet::new();

    for desc in param_descs {
        for (name, param) in &desc.params {
            if invalid.contains(name) {
                continue;
            }
            let agrees = valid
                .get(name)
                .map(|first: &GpuParamDataDesc| param.matches(first, true));
            match agrees {
                None => {
                    valid.insert(name.clone(), param.clone());
                }
                Some(false) => {
                    log::warn!(
                        "Found two parameters with the same name but different contents: {}",
                        name
                    );
                    valid.remove(name);
                    invalid.insert(name.clone());
                }
                Some(true) => {}
            }
        }
    }

    valid
}

/// Every object binding of every program, in order. Object bindings are
/// independent bind points and are neither deduplicated nor checked.
pub fn determine_valid_object_parameters<'a>(param_descs: &[&'a GpuParamDesc]) -> Vec<&'a GpuParamObjectDesc> {
    param_descs
        .iter()
        .copied()
        .flat_map(|desc| {
            desc.samplers
                .values()
                .chain(desc.textures.values())
                .chain(desc.load_store_textures.values())
                .chain(desc.buffers.values())
        })
        .collect()
}

/// Shareable blocks whose contents agree across every program declaring them
pub fn determine_valid_shareable_param_blocks(param_descs: &[&GpuParamDesc]) -> BTreeSet<String> {
    struct Sighting<'a> {
        desc: &'a GpuParamDesc,
        block: &'a GpuParamBlockDesc,
        valid: bool,
    }

    let mut sightings: BTreeMap<&str, Sighting<'_>> = BTreeMap::new();
    for desc in param_descs {
        for (name, block) in &desc.param_blocks {
            if !block.is_shareable {
                continue;
            }
            match sightings.get_mut(name.as_str()) {
                None => {
                    sightings.insert(
                        name.as_str(),
                        Sighting {
                            desc,
                            block,
                            valid: true,
                        },
                    );
                }
                Some(first) if first.valid => {
                    if !blocks_agree(first.desc, first.block, desc, block) {
                        log::warn!(
                            "Found two param blocks with the same name but different contents: {}",
                            name
                        );
                        first.valid = false;
                    }
                }
                Some(_) => {}
            }
        }
    }

    sightings
        .into_iter()
        .filter(|(_, sighting)| sighting.valid)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Whether two programs' versions of a block hold equal parameters
fn blocks_agree(
    a_desc: &GpuParamDesc,
    a_block: &GpuParamBlockDesc,
    b_desc: &GpuParamDesc,
    b_block: &GpuParamBlockDesc,
) -> bool {
    if a_block.name != b_block.name {
        return false;
    }

    let a_params: Vec<_> = a_desc.params_in_block(a_block.slot).collect();
    let b_params: Vec<_> = b_desc.params_in_block(b_block.slot).collect();
    a_params.len() == b_params.len()
        && b_params.iter().all(|b_param| {
            a_params
                .iter()
                .any(|a_param| a_param.name == b_param.name && a_param.matches(b_param, true))
        })
}

/// GPU variable name to the name of the block storing it, taken from the
/// first program declaring the variable
pub fn determine_parameter_to_block_mapping(param_descs: &[&GpuParamDesc]) -> BTreeMap<String, String> {
    let mut mapping = BTreeMap::new();
    for desc in param_descs {
        for (name, param) in &desc.params {
            if mapping.contains_key(name) {
                continue;
            }
            if let Some(block) = desc.block_by_slot(param.param_block_slot) {
                mapping.insert(name.clone(), block.name.clone());
            }
        }
    }
    mapping
}

/// Shader parameter name to the GPU variable it binds to.
///
/// Data parameters bind to their declared GPU variable when it is valid, the
/// types are compatible and the array sizes agree. Object parameters bind to
/// the first candidate GPU variable whose name and type match a binding.
pub fn determine_param_mappings(param_descs: &[&GpuParamDesc], shader: &ShaderDesc) -> BTreeMap<String, String> {
    let valid_data = determine_valid_data_parameters(param_descs);
    let valid_objects = determine_valid_object_parameters(param_descs);
    let mut mappings = BTreeMap::new();

    for (name, shader_param) in shader.data_params() {
        let Some(gpu_param) = valid_data.get(&shader_param.gpu_variable_name) else {
            continue;
        };
        if !shader_param.ty.binds_to(gpu_param.ty) {
            log::warn!(
                "Ignoring shader parameter \"{}\". Type doesn't match the one defined in the GPU program. Shader defined type: {:?} - GPU program defined type: {:?}",
                name,
                shader_param.ty,
                gpu_param.ty
            );
            continue;
        }
        if shader_param.array_size != gpu_param.array_size {
            log::warn!(
                "Ignoring shader parameter \"{}\". Array size doesn't match the one defined in the GPU program. Shader defined array size: {} - GPU program defined array size: {}",
                name,
                shader_param.array_size,
                gpu_param.array_size
            );
            continue;
        }
        mappings.insert(name.clone(), shader_param.gpu_variable_name.clone());
    }

    let object_tables = [
        shader.texture_params(),
        shader.load_store_texture_params(),
        shader.buffer_params(),
        shader.sampler_params(),
    ];
    for table in object_tables {
        for (name, shader_param) in table {
            if let Some(gpu_name) = first_matching_object(shader_param, &valid_objects) {
                mappings.insert(name.clone(), gpu_name.to_string());
            }
        }
    }

    mappings
}

fn first_matching_object<'a>(
    shader_param: &'a ShaderObjectParamDesc,
    valid_objects: &[&GpuParamObjectDesc],
) -> Option<&'a str> {
    shader_param
        .gpu_variable_names
        .iter()
        .find(|candidate| {
            valid_objects
                .iter()
                .any(|object| object.name == **candidate && object.ty == shader_param.ty)
        })
        .map(String::as_str)
}

/// Size, usage and ownership of every valid shareable block.
///
/// A block is created by the material unless the shader marks it shared or
/// gives it a renderer semantic. Its size comes from the first program
/// declaring it shareable.
pub fn determine_shader_block_data(
    valid_blocks: &BTreeSet<String>,
    param_descs: &[&GpuParamDesc],
    shader_blocks: &BTreeMap<String, ShaderParamBlockDesc>,
) -> Vec<ShaderBlockData> {
    valid_blocks
        .iter()
        .map(|name| {
            let size = param_descs
                .iter()
                .find_map(|desc| desc.param_blocks.get(name).filter(|block| block.is_shareable))
                .map_or(0, GpuParamBlockDesc::size_bytes);

            let (usage, create) = match shader_blocks.get(name) {
                Some(attribs) => {
                    let renderer_owned = attribs
                        .renderer_semantic
                        .as_deref()
                        .is_some_and(|semantic| !semantic.is_empty());
                    (attribs.usage, !attribs.shared && !renderer_owned)
                }
                None => (GpuParamBlockUsage::default(), true),
            };

            ShaderBlockData {
                name: name.clone(),
                usage,
                size,
                create,
            }
        })
        .collect()
}

/// Category of the shader object table a parameter name is declared in
pub fn object_category(shader: &ShaderDesc, name: &str) -> Option<GpuObjectCategory> {
    if shader.texture_params().contains_key(name) {
        Some(GpuObjectCategory::Texture)
    } else if shader.load_store_texture_params().contains_key(name) {
        Some(GpuObjectCategory::LoadStoreTexture)
    } else if shader.buffer_params().contains_key(name) {
        Some(GpuObjectCategory::Buffer)
    } else if shader.sampler_params().contains_key(name) {
        Some(GpuObjectCategory::Sampler)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::gpu::{GpuParamDataType, GpuParamObjectType};
    use crate::render::shader::ShaderDataParamDesc;

    fn float_block(block: &str, slot: u32, params: &[(&str, GpuParamDataType, u32)]) -> GpuParamDesc {
        GpuParamDesc::new().with_block(
            block,
            slot,
            true,
            params
                .iter()
                .map(|(name, ty, array)| GpuParamDataDesc::new(*name, *ty, *array))
                .collect(),
        )
    }

    #[test]
    fn test_conflicting_data_param_removed_for_good() {
        let a = float_block("B", 0, &[("x", GpuParamDataType::Float4, 1)]);
        let b = float_block("B", 0, &[("x", GpuParamDataType::Float3, 1)]);
        let c = a.clone();

        let valid = determine_valid_data_parameters(&[&a, &b, &c]);
        assert!(!valid.contains_key("x"));

        let agree = determine_valid_data_parameters(&[&a, &c]);
        assert!(agree.contains_key("x"));
    }

    #[test]
    fn test_data_agreement_ignores_offsets() {
        let a = float_block("B", 0, &[("x", GpuParamDataType::Float4, 1)]);
        let b = float_block(
            "B",
            0,
            &[("pad", GpuParamDataType::Float4, 1), ("x", GpuParamDataType::Float4, 1)],
        );
        assert_ne!(a.params["x"].cpu_mem_offset, b.params["x"].cpu_mem_offset);

        let valid = determine_valid_data_parameters(&[&a, &b]);
        assert!(valid.contains_key("x"));
        assert!(valid.contains_key("pad"));
    }

    #[test]
    fn test_object_params_concatenated() {
        let a = GpuParamDesc::new()
            .with_object(GpuParamObjectDesc::new("tex", GpuParamObjectType::Texture2D, 0));
        let b = a.clone();
        assert_eq!(determine_valid_object_parameters(&[&a, &b]).len(), 2);
    }

    #[test]
    fn test_shareable_block_rules() {
        let a = float_block("PerMaterial", 0, &[("x", GpuParamDataType::Float4, 1)]);
        let same = float_block("PerMaterial", 3, &[("x", GpuParamDataType::Float4, 1)]);
        let different = float_block("PerMaterial", 0, &[("x", GpuParamDataType::Float2, 1)]);
        let extra = float_block(
            "PerMaterial",
            0,
            &[("x", GpuParamDataType::Float4, 1), ("y", GpuParamDataType::Float1, 1)],
        );
        let private = GpuParamDesc::new().with_block(
            "PerObject",
            1,
            false,
            vec![GpuParamDataDesc::new("w", GpuParamDataType::Matrix4x4, 1)],
        );

        assert!(determine_valid_shareable_param_blocks(&[&a, &same]).contains("PerMaterial"));
        assert!(determine_valid_shareable_param_blocks(&[&a, &different]).is_empty());
        assert!(determine_valid_shareable_param_blocks(&[&a, &extra]).is_empty());
        // Invalid once, invalid for good
        assert!(determine_valid_shareable_param_blocks(&[&a, &different, &same]).is_empty());
        assert!(determine_valid_shareable_param_blocks(&[&private]).is_empty());
    }

    #[test]
    fn test_parameter_to_block_mapping() {
        let a = float_block("PerMaterial", 0, &[("x", GpuParamDataType::Float4, 1)]);
        let b = float_block("PerFrame", 1, &[("t", GpuParamDataType::Float1, 1)]);
        let mapping = determine_parameter_to_block_mapping(&[&a, &b]);
        assert_eq!(mapping["x"], "PerMaterial");
        assert_eq!(mapping["t"], "PerFrame");
    }

    #[test]
    fn test_param_mappings() {
        let gpu = float_block(
            "PerMaterial",
            0,
            &[
                ("tintColor", GpuParamDataType::Float4, 1),
                ("gloss", GpuParamDataType::Float1, 1),
                ("weights", GpuParamDataType::Float1, 4),
            ],
        )
        .with_object(GpuParamObjectDesc::new("albedoTex", GpuParamObjectType::Texture2D, 0))
        .with_object(GpuParamObjectDesc::new("cubeTex", GpuParamObjectType::TextureCube, 1));

        let mut shader = ShaderDesc::new();
        shader
            .add_data_param(ShaderDataParamDesc::new("tint", "tintColor", GpuParamDataType::Color))
            .add_data_param(ShaderDataParamDesc::new("gloss", "gloss", GpuParamDataType::Int1))
            .add_data_param(
                ShaderDataParamDesc::new("weights", "weights", GpuParamDataType::Float1).with_array_size(2),
            )
            .add_data_param(ShaderDataParamDesc::new("absent", "nothing", GpuParamDataType::Float1))
            .add_object_param(ShaderObjectParamDesc::new(
                "albedo",
                ["missing", "albedoTex"],
                GpuParamObjectType::Texture2D,
            ))
            .add_object_param(ShaderObjectParamDesc::new(
                "env",
                ["cubeTex"],
                GpuParamObjectType::Texture2D,
            ));

        let mappings = determine_param_mappings(&[&gpu], &shader);
        assert_eq!(mappings.get("tint").map(String::as_str), Some("tintColor"));
        assert_eq!(mappings.get("albedo").map(String::as_str), Some("albedoTex"));
        assert!(!mappings.contains_key("gloss"));
        assert!(!mappings.contains_key("weights"));
        assert!(!mappings.contains_key("absent"));
        assert!(!mappings.contains_key("env"));
        assert_eq!(mappings.len(), 2);
    }

    #[test]
    fn test_float4_never_binds_to_other_types() {
        let gpu = float_block("B", 0, &[("v", GpuParamDataType::Float3, 1)]);
        let mut shader = ShaderDesc::new();
        shader.add_data_param(ShaderDataParamDesc::new("v", "v", GpuParamDataType::Color));
        assert!(determine_param_mappings(&[&gpu], &shader).is_empty());
    }

    #[test]
    fn test_shader_block_data() {
        let a = float_block("PerMaterial", 0, &[("x", GpuParamDataType::Float4, 1)]);
        let b = float_block("PerCamera", 1, &[("view", GpuParamDataType::Matrix4x4, 1)]);
        let c = float_block("Lights", 2, &[("count", GpuParamDataType::Int1, 1)]);
        let descs = [&a, &b, &c];

        let mut shader = ShaderDesc::new();
        shader
            .set_param_block_attribs("PerMaterial", false, GpuParamBlockUsage::Dynamic, None)
            .set_param_block_attribs("PerCamera", false, GpuParamBlockUsage::Static, Some("Camera".into()))
            .set_param_block_attribs("Lights", true, GpuParamBlockUsage::Static, None);

        let valid = determine_valid_shareable_param_blocks(&descs);
        let data = determine_shader_block_data(&valid, &descs, shader.param_blocks());
        let by_name: BTreeMap<_, _> = data.iter().map(|d| (d.name.as_str(), d)).collect();

        assert!(by_name["PerMaterial"].create);
        assert_eq!(by_name["PerMaterial"].usage, GpuParamBlockUsage::Dynamic);
        assert_eq!(by_name["PerMaterial"].size, 16);
        assert!(!by_name["PerCamera"].create);
        assert_eq!(by_name["PerCamera"].size, 64);
        assert!(!by_name["Lights"].create);
    }

    #[test]
    fn test_block_sized_from_shareable_declaration() {
        let private = GpuParamDesc::new().with_block(
            "PerMaterial",
            0,
            false,
            vec![GpuParamDataDesc::new("x", GpuParamDataType::Float4, 5)],
        );
        let shared = float_block("PerMaterial", 0, &[("x", GpuParamDataType::Float4, 1)]);
        let descs = [&private, &shared];

        let valid = determine_valid_shareable_param_blocks(&descs);
        assert!(valid.contains("PerMaterial"));
        let data = determine_shader_block_data(&valid, &descs, &BTreeMap::new());
        assert_eq!(data[0].size, 16);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let a = float_block("PerMaterial", 0, &[("tintColor", GpuParamDataType::Float4, 1)]);
        let b = float_block(
            "PerMaterial",
            0,
            &[("tintColor", GpuParamDataType::Float4, 1), ("extra", GpuParamDataType::Float1, 1)],
        );
        let mut shader = ShaderDesc::new();
        shader.add_data_param(ShaderDataParamDesc::new("tint", "tintColor", GpuParamDataType::Color));

        let first = resolve_parameters(&[&a, &b], &shader);
        let second = resolve_parameters(&[&a, &b], &shader);
        assert_eq!(first, second);
    }
}
