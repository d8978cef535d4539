//! Rendering data plane
//!
//! - **backend**: render API and pipeline stage identifiers
//! - **core_object**: sim/core dual objects and their synchronization
//! - **gpu**: program reflection, parameter blocks and parameter sets
//! - **shader**: shader declarations, techniques and passes
//! - **resources**: materials built on top of all of the above

pub mod backend;
pub mod core_object;
pub mod gpu;
pub mod resources;
pub mod shader;

#[cfg(test)]
mod tests;

pub use backend::{GpuProgramType, RenderBackendKind};
pub use core_object::{CoreObject, CoreObjectCore, CoreObjectManager, CoreThread};
pub use resources::materials::{Material, MaterialCore};
pub use shader::{Pass, Shader, ShaderDesc, Technique};
