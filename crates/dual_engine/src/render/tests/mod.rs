//! Cross-module tests for materials, shaders and the sync pipeline

mod fixtures;
mod material_sync;
mod shader_swap;
