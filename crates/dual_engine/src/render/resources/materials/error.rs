//! Material error types

use thiserror::Error;

use crate::render::backend::RenderBackendKind;
use crate::render::core_object::SyncError;
use crate::render::gpu::{GpuError, GpuParamDataType};

/// Errors raised by materials
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaterialError {
    /// Parameter access on a material without a shader
    #[error("Material has no shader assigned")]
    NoShader,

    /// The shader cannot run on the active backend
    #[error("Shader '{shader}' has no technique supported by the {backend} backend")]
    NoSupportedTechnique {
        /// Shader name
        shader: String,
        /// Active backend
        backend: RenderBackendKind,
    },

    /// The shader's programs have not finished compiling
    #[error("Shader '{shader}' is not loaded yet")]
    ShaderNotLoaded {
        /// Shader name
        shader: String,
    },

    /// Pass index past the end
    #[error("Pass index {index} out of range, material has {num_passes} pass(es)")]
    PassIndexOutOfRange {
        /// Requested index
        index: usize,
        /// Pass count
        num_passes: usize,
    },

    /// Value type does not match the shader declaration
    #[error("Parameter '{name}' is declared as {declared:?}, not {requested:?}")]
    TypeMismatch {
        /// Parameter name
        name: String,
        /// Declared type
        declared: GpuParamDataType,
        /// Requested type
        requested: GpuParamDataType,
    },

    /// A clone snapshot could not be encoded
    #[error("Failed to encode material snapshot: {0}")]
    Encode(String),

    /// A clone snapshot could not be decoded
    #[error("Failed to decode material snapshot: {0}")]
    Decode(String),

    /// A snapshot refers to a resource that is not in its resource table
    #[error("Material snapshot refers to missing {kind} #{index}")]
    MissingResource {
        /// Resource kind
        kind: &'static str,
        /// Table index
        index: u32,
    },

    /// GPU parameter error
    #[error("GPU parameter error: {0}")]
    Gpu(#[from] GpuError),

    /// Sync error
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Result type for material operations
pub type MaterialResult<T> = Result<T, MaterialError>;
