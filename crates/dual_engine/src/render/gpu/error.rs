//! GPU parameter error types

use thiserror::Error;

use super::param_desc::GpuParamDataType;

/// Errors raised by parameter sets, block buffers and programs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// No data parameter with this name
    #[error("Unknown GPU parameter '{name}'")]
    UnknownParam {
        /// Parameter name
        name: String,
    },

    /// No parameter block with this name
    #[error("Unknown parameter block '{name}'")]
    UnknownBlock {
        /// Block name
        name: String,
    },

    /// No object binding with this name in the requested table
    #[error("Unknown {table} binding '{name}'")]
    UnknownObject {
        /// Binding table searched
        table: &'static str,
        /// Binding name
        name: String,
    },

    /// Value type cannot be bound to the parameter
    #[error("Parameter '{name}' is {actual:?}, cannot bind a {requested:?} value")]
    TypeMismatch {
        /// Parameter name
        name: String,
        /// Reflected type
        actual: GpuParamDataType,
        /// Type of the value
        requested: GpuParamDataType,
    },

    /// Value does not fit into one element
    #[error("Parameter '{name}' elements are {element_size} byte(s), got {actual}")]
    SizeMismatch {
        /// Parameter name
        name: String,
        /// Element size in bytes
        element_size: usize,
        /// Value size in bytes
        actual: usize,
    },

    /// Array index past the end
    #[error("Index {index} out of bounds for parameter '{name}' with {array_size} element(s)")]
    IndexOutOfBounds {
        /// Parameter name
        name: String,
        /// Requested index
        index: u32,
        /// Array length
        array_size: u32,
    },

    /// The block holding the parameter has no buffer bound
    #[error("Parameter '{name}' lives in block slot {slot}, which has no buffer bound")]
    NoBlockBound {
        /// Parameter name
        name: String,
        /// Block slot
        slot: u32,
    },

    /// A block buffer is smaller than the block it is bound to
    #[error("Buffer of {actual} byte(s) is too small for block '{name}' ({required} bytes)")]
    BlockTooSmall {
        /// Block name
        name: String,
        /// Block size in bytes
        required: usize,
        /// Buffer size in bytes
        actual: usize,
    },

    /// Byte range outside a block buffer
    #[error("Write of {len} byte(s) at offset {offset} exceeds block buffer of {size} bytes")]
    OutOfRange {
        /// Byte offset
        offset: usize,
        /// Byte length
        len: usize,
        /// Buffer size
        size: usize,
    },

    /// A program failed to compile on the core thread
    #[error("GPU program '{program}' failed to compile: {reason}")]
    CompileFailed {
        /// Program name
        program: String,
        /// Compiler message
        reason: String,
    },
}

/// Result type for GPU parameter operations
pub type GpuResult<T> = Result<T, GpuError>;
