//! # Dual Engine
//!
//! The material and GPU parameter core of a renderer split across two
//! threads. Game code mutates materials, shaders and parameter sets on the
//! sim thread; the core thread owns read-only counterparts that are brought
//! up to date once per frame from versioned sync payloads.
//!
//! ## Features
//!
//! - **Frame Allocator**: per-frame scratch memory that travels with a sync batch
//! - **Parameter Resolution**: shader declarations checked against program reflection
//! - **Block Layout**: 16-byte row packing for constant/uniform buffers
//! - **Dual Objects**: dependency-ordered sim-to-core synchronization
//! - **Materials**: typed parameter handles, hot-swappable shaders, cloning
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dual_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut engine = Engine::new(EngineConfig::default())?;
//!
//!     let reflection = GpuParamDesc::new().with_block(
//!         "PerMaterial",
//!         0,
//!         true,
//!         vec![GpuParamDataDesc::new("tintColor", GpuParamDataType::Float4, 1)],
//!     );
//!     let program = GpuProgram::precompiled(
//!         GpuProgramDesc::new("tint_fs", GpuProgramType::Fragment),
//!         reflection,
//!     );
//!     let technique = Technique::new(
//!         "main",
//!         RenderBackendKind::Vulkan,
//!         vec![Pass::new().with_program(program)],
//!     );
//!     let mut desc = ShaderDesc::new();
//!     desc.add_data_param(ShaderDataParamDesc::new("tint", "tintColor", GpuParamDataType::Color));
//!     let shader = Shader::new("tinted", desc, vec![technique]);
//!
//!     let mut material = Material::new(engine.backend());
//!     material.set_shader(Some(shader))?;
//!     engine.initialize_material(&mut material)?;
//!     material.get_param::<Color>("tint")?.set(Color::RED)?;
//!
//!     engine.sync(&material)?;
//!     engine.end_frame()?;
//!     engine.shutdown()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::module_inception,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation
)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

mod engine;

pub use engine::{Engine, EngineError};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::{Config, EngineConfig, FrameAllocatorConfig, RendererConfig},
        foundation::{
            math::{Color, Mat3, Mat4, Vec2, Vec3, Vec4},
            memory::FrameAllocator,
        },
        render::{
            backend::{GpuProgramType, RenderBackendKind},
            core_object::{CoreObject, CoreObjectCore},
            gpu::{
                GpuBuffer, GpuParamBlockBuffer, GpuParamBlockUsage, GpuParamDataDesc,
                GpuParamDataType, GpuParamDesc, GpuParamObjectDesc, GpuParamObjectType,
                GpuProgram, GpuProgramDesc, SamplerState, Texture,
            },
            resources::materials::{Material, MaterialCore, MaterialError, MaterialParams},
            shader::{Pass, Shader, ShaderDataParamDesc, ShaderDesc, ShaderObjectParamDesc, Technique},
        },
        Engine, EngineError,
    };
}
