//! GPU parameter layer
//!
//! Program reflection, parameter block layout, block buffers, per-program
//! parameter sets and the resources they bind.

pub mod block_layout;
pub mod error;
pub mod param_block_buffer;
pub mod param_desc;
pub mod param_value;
pub mod params;
pub mod program;
pub mod resources;

pub use block_layout::generate_param_block_desc;
pub use error::{GpuError, GpuResult};
pub use param_block_buffer::{GpuParamBlockBuffer, GpuParamBlockBufferCore, GpuParamBlockUsage};
pub(crate) use param_block_buffer::ParamBlockRecord;
pub use param_desc::{
    GpuObjectCategory, GpuParamBlockDesc, GpuParamDataDesc, GpuParamDataType, GpuParamDesc,
    GpuParamObjectDesc, GpuParamObjectType, SlotCounts,
};
pub use param_value::{value_type_compatible, GpuParamValue};
pub use params::{
    GpuBufferParam, GpuDataParam, GpuLoadStoreTextureParam, GpuParams, GpuParamsCore,
    GpuSamplerParam, GpuStructParam, GpuTextureParam,
};
pub use program::{
    FixedReflectionCompiler, GpuProgram, GpuProgramCore, GpuProgramDesc, ProgramCompiler,
};
pub use resources::{
    AddressMode, FilterMode, GpuBuffer, GpuBufferCore, GpuBufferDesc, GpuBufferKind, SamplerState,
    SamplerStateCore, SamplerStateDesc, Texture, TextureCore, TextureDesc, TextureFormat,
};
