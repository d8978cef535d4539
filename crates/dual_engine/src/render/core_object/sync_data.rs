//! Sim to core sync payloads
//!
//! A [`CoreSyncData`] carries two things from a sim object to its core
//! counterpart:
//!
//! - an optional plain-data record living in the frame allocator
//! - an ordered queue of [`CoreRef`]s, shared references to other core
//!   objects that keep them alive while the payload is in flight
//!
//! References are move-only. The core side takes them out one by one in the
//! order they were pushed and [`finish`](CoreSyncData::finish) verifies that
//! nothing was left behind. A payload dropped without being consumed simply
//! releases every reference it still holds.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::{SyncError, SyncResult};
use super::record::{decode_record, encode_record, SyncRecord};
use crate::foundation::memory::{FrameAllocator, FrameData, FrameHandle};
use crate::render::gpu::{
    GpuBufferCore, GpuParamBlockBufferCore, GpuParamsCore, SamplerStateCore, TextureCore,
};
use crate::render::resources::materials::PassParametersCore;
use crate::render::shader::{ShaderCore, TechniqueCore};

/// Kind of object a payload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SyncKind {
    /// Material
    Material = 1,
    /// Per-program parameter set
    GpuParams = 2,
    /// Parameter block buffer
    ParamBlock = 3,
    /// GPU program
    GpuProgram = 4,
    /// Shader
    Shader = 5,
    /// Technique
    Technique = 6,
    /// Texture
    Texture = 7,
    /// Sampler state
    Sampler = 8,
    /// Generic GPU buffer
    Buffer = 9,
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Shared reference to a core object, carried inside a payload
#[derive(Clone)]
pub enum CoreRef {
    /// Possibly absent shader
    Shader(Option<Arc<ShaderCore>>),
    /// Possibly absent technique
    Technique(Option<Arc<TechniqueCore>>),
    /// Per-pass parameter sets
    PassParameters(Arc<PassParametersCore>),
    /// Possibly unbound parameter set
    GpuParams(Option<Arc<GpuParamsCore>>),
    /// Possibly unbound parameter block buffer
    ParamBlock(Option<Arc<GpuParamBlockBufferCore>>),
    /// Possibly unbound texture
    Texture(Option<Arc<TextureCore>>),
    /// Possibly unbound sampler state
    Sampler(Option<Arc<SamplerStateCore>>),
    /// Possibly unbound buffer
    Buffer(Option<Arc<GpuBufferCore>>),
}

impl CoreRef {
    /// Name of the reference kind, for diagnostics
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Shader(_) => "shader",
            Self::Technique(_) => "technique",
            Self::PassParameters(_) => "pass parameters",
            Self::GpuParams(_) => "GPU params",
            Self::ParamBlock(_) => "param block",
            Self::Texture(_) => "texture",
            Self::Sampler(_) => "sampler",
            Self::Buffer(_) => "buffer",
        }
    }
}

impl std::fmt::Debug for CoreRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CoreRef({})", self.kind_name())
    }
}

/// One sync payload
#[derive(Debug)]
pub struct CoreSyncData {
    kind: SyncKind,
    record: Option<FrameHandle>,
    refs: VecDeque<CoreRef>,
}

macro_rules! take_ref {
    ($(#[$meta:meta])* $fn_name:ident, $variant:ident, $out:ty, $label:literal) => {
        $(#[$meta])*
        pub fn $fn_name(&mut self) -> SyncResult<$out> {
            match self.refs.pop_front() {
                Some(CoreRef::$variant(value)) => Ok(value),
                Some(other) => {
                    let found = other.kind_name();
                    self.refs.push_front(other);
                    Err(SyncError::RefKindMismatch {
                        expected: $label,
                        found,
                    })
                }
                None => Err(SyncError::MissingRef { expected: $label }),
            }
        }
    };
}

impl CoreSyncData {
    /// Payload with no plain data
    pub fn new(kind: SyncKind) -> Self {
        Self {
            kind,
            record: None,
            refs: VecDeque::new(),
        }
    }

    /// Payload whose plain data is `record`, encoded into `frame`
    pub fn with_record<R: SyncRecord>(frame: &mut FrameAllocator, record: &R) -> SyncResult<Self> {
        let handle = encode_record(frame, record)?;
        Ok(Self {
            kind: R::KIND,
            record: Some(handle),
            refs: VecDeque::new(),
        })
    }

    /// Append a reference
    pub fn push_ref(&mut self, core_ref: CoreRef) {
        self.refs.push_back(core_ref);
    }

    /// Payload kind
    pub const fn kind(&self) -> SyncKind {
        self.kind
    }

    /// Handle of the plain-data record, if any
    pub const fn record_handle(&self) -> Option<FrameHandle> {
        self.record
    }

    /// References not yet taken
    pub fn remaining_refs(&self) -> usize {
        self.refs.len()
    }

    /// Fail unless this payload is of `kind`
    pub fn expect_kind(&self, kind: SyncKind) -> SyncResult<()> {
        if self.kind != kind {
            return Err(SyncError::WrongTarget {
                expected: kind,
                found: self.kind,
            });
        }
        Ok(())
    }

    /// Decode the plain-data record from the frame it was written into
    pub fn read_record<R: SyncRecord>(&self, frame: &FrameData) -> SyncResult<R> {
        let handle = self
            .record
            .ok_or(SyncError::MissingPayload { kind: self.kind })?;
        decode_record(frame.bytes(handle)?)
    }

    take_ref!(
        /// Take the next reference as a shader
        take_shader, Shader, Option<Arc<ShaderCore>>, "shader"
    );
    take_ref!(
        /// Take the next reference as a technique
        take_technique, Technique, Option<Arc<TechniqueCore>>, "technique"
    );
    take_ref!(
        /// Take the next reference as pass parameters
        take_pass_parameters, PassParameters, Arc<PassParametersCore>, "pass parameters"
    );
    take_ref!(
        /// Take the next reference as a parameter set
        take_gpu_params, GpuParams, Option<Arc<GpuParamsCore>>, "GPU params"
    );
    take_ref!(
        /// Take the next reference as a parameter block buffer
        take_param_block, ParamBlock, Option<Arc<GpuParamBlockBufferCore>>, "param block"
    );
    take_ref!(
        /// Take the next reference as a texture
        take_texture, Texture, Option<Arc<TextureCore>>, "texture"
    );
    take_ref!(
        /// Take the next reference as a sampler state
        take_sampler, Sampler, Option<Arc<SamplerStateCore>>, "sampler"
    );
    take_ref!(
        /// Take the next reference as a buffer
        take_buffer, Buffer, Option<Arc<GpuBufferCore>>, "buffer"
    );

    /// Finish consuming the payload; every reference must have been taken
    pub fn finish(self) -> SyncResult<()> {
        if self.refs.is_empty() {
            Ok(())
        } else {
            Err(SyncError::UnconsumedRefs {
                kind: self.kind,
                remaining: self.refs.len(),
            })
        }
    }
}
