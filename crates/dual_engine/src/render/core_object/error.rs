//! Sync protocol errors

use thiserror::Error;

use super::sync_data::SyncKind;
use crate::foundation::memory::FrameAllocError;

/// Errors raised while producing or consuming sync payloads
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Frame allocator failure
    #[error("Frame allocator error: {0}")]
    Frame(#[from] FrameAllocError),

    /// Record header does not start with the expected magic
    #[error("Sync record has a bad magic number")]
    BadMagic,

    /// Record was written by an incompatible encoder
    #[error("Unsupported sync record version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version this build understands
        expected: u8,
        /// Version in the header
        found: u8,
    },

    /// Record belongs to another object kind
    #[error("Sync record kind mismatch: expected {expected}, found tag {found}")]
    KindMismatch {
        /// Kind the reader expected
        expected: SyncKind,
        /// Raw kind tag in the header
        found: u8,
    },

    /// Field count in the header differs from the reader's layout
    #[error("Sync record for {kind} has {found} field(s), expected {expected}")]
    FieldCountMismatch {
        /// Record kind
        kind: SyncKind,
        /// Fields the reader knows
        expected: u8,
        /// Fields in the header
        found: u8,
    },

    /// A field tag appeared out of order
    #[error("Sync record field '{field}' out of order: expected tag {expected}, found {found}")]
    FieldOutOfOrder {
        /// Field being read
        field: &'static str,
        /// Expected tag
        expected: u8,
        /// Tag in the payload
        found: u8,
    },

    /// Payload ended early
    #[error("Sync record truncated: needed {needed} byte(s), {remaining} remaining")]
    Truncated {
        /// Bytes required
        needed: usize,
        /// Bytes left
        remaining: usize,
    },

    /// Payload has bytes past the last field
    #[error("Sync record has {remaining} trailing byte(s)")]
    TrailingBytes {
        /// Unread bytes
        remaining: usize,
    },

    /// A string field is not valid UTF-8
    #[error("Sync record contains invalid UTF-8")]
    InvalidUtf8,

    /// Encoder wrote a different amount than it sized
    #[error("Sync record size mismatch: sized {expected} byte(s), wrote {written}")]
    SizeMismatch {
        /// Size computed up front
        expected: usize,
        /// Bytes actually written
        written: usize,
    },

    /// A record was requested from a payload that has none
    #[error("{kind} sync data carries no record")]
    MissingPayload {
        /// Payload kind
        kind: SyncKind,
    },

    /// Sync data was routed to the wrong core object
    #[error("Sync data of kind {found} delivered to a {expected} core object")]
    WrongTarget {
        /// Kind the core object accepts
        expected: SyncKind,
        /// Kind of the payload
        found: SyncKind,
    },

    /// The next reference has another type than requested
    #[error("Expected a {expected} reference, found {found}")]
    RefKindMismatch {
        /// Requested reference kind
        expected: &'static str,
        /// Actual reference kind
        found: &'static str,
    },

    /// No references left
    #[error("Expected a {expected} reference, none left")]
    MissingRef {
        /// Requested reference kind
        expected: &'static str,
    },

    /// The consumer did not take every reference
    #[error("{kind} sync data left {remaining} reference(s) unconsumed")]
    UnconsumedRefs {
        /// Payload kind
        kind: SyncKind,
        /// References left
        remaining: usize,
    },

    /// Payload size does not match the receiving object
    #[error("{kind} payload is {found} byte(s), expected {expected}")]
    PayloadSize {
        /// Payload kind
        kind: SyncKind,
        /// Size the core object holds
        expected: usize,
        /// Size received
        found: usize,
    },

    /// The core thread is gone
    #[error("Core thread disconnected")]
    Disconnected,
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
