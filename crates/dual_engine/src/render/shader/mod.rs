//! Shaders, techniques and passes

pub mod shader;
pub mod shader_desc;
pub mod technique;

pub use shader::{Shader, ShaderCore};
pub use shader_desc::{ShaderDataParamDesc, ShaderDesc, ShaderObjectParamDesc, ShaderParamBlockDesc};
pub use technique::{Pass, PassCore, Technique, TechniqueCore};
