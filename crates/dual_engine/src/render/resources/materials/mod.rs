//! Materials and parameter resolution

pub mod error;
pub mod material;
pub mod material_core;
pub mod material_param;
pub mod material_params;
pub mod pass_parameters;
pub mod resolution;

pub use error::{MaterialError, MaterialResult};
pub use material::{Material, MaterialInitState};
pub use material_core::MaterialCore;
pub use material_param::{
    MaterialBufferParam, MaterialDataParam, MaterialLoadStoreTextureParam, MaterialSamplerParam,
    MaterialStructParam, MaterialTextureParam,
};
pub use material_params::{
    MaterialParamValue, MaterialParams, ResourceTable, SerializedMaterialParams, SerializedParamValue,
};
pub use pass_parameters::{PassParameters, PassParametersCore};
pub use resolution::{
    determine_param_mappings, determine_parameter_to_block_mapping, determine_shader_block_data,
    determine_valid_data_parameters, determine_valid_object_parameters,
    determine_valid_shareable_param_blocks, resolve_parameters, ResolvedParameters, ShaderBlockData,
};
