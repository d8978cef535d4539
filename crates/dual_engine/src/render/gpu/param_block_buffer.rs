//! Parameter block buffers
//!
//! A block buffer is the CPU copy of one constant/uniform buffer. The sim side
//! owns the authoritative bytes; every write marks the buffer core-dirty and
//! the next sync ships a full copy. The core side keeps the last received
//! bytes and pushes them into its hardware buffer on
//! [`flush_to_gpu`](GpuParamBlockBufferCore::flush_to_gpu).

use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::error::{GpuError, GpuResult};
use crate::foundation::memory::{FrameAllocator, FrameData};
use crate::render::core_object::record::sync_record;
use crate::render::core_object::{
    CoreObject, CoreObjectCore, CoreObjectCoreState, CoreObjectState, CoreSyncData, SyncError,
    SyncKind, SyncResult,
};

/// How often a block's contents are expected to change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GpuParamBlockUsage {
    /// Written rarely
    #[default]
    Static,
    /// Written most frames
    Dynamic,
}

sync_record! {
    /// Full contents of a block buffer
    #[derive(Debug)]
    pub(crate) struct ParamBlockRecord: SyncKind::ParamBlock {
        data: Vec<u8>,
    }
}

/// Sim-side block buffer
pub struct GpuParamBlockBuffer {
    state: CoreObjectState,
    usage: GpuParamBlockUsage,
    data: Mutex<Vec<u8>>,
    core: OnceLock<Arc<GpuParamBlockBufferCore>>,
}

impl GpuParamBlockBuffer {
    /// Zero-filled buffer of `size` bytes
    pub fn new(size: usize, usage: GpuParamBlockUsage) -> Arc<Self> {
        Arc::new(Self {
            state: CoreObjectState::new(),
            usage,
            data: Mutex::new(vec![0; size]),
            core: OnceLock::new(),
        })
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.data.lock().len()
    }

    /// Usage hint
    pub const fn usage(&self) -> GpuParamBlockUsage {
        self.usage
    }

    /// Copy `bytes` in at `offset`
    pub fn write(&self, offset: usize, bytes: &[u8]) -> GpuResult<()> {
        let mut data = self.data.lock();
        let size = data.len();
        let target = data
            .get_mut(offset..offset + bytes.len())
            .ok_or(GpuError::OutOfRange {
                offset,
                len: bytes.len(),
                size,
            })?;
        target.copy_from_slice(bytes);
        self.state.mark_core_dirty();
        Ok(())
    }

    /// Copy `len` bytes out starting at `offset`
    pub fn read(&self, offset: usize, len: usize) -> GpuResult<Vec<u8>> {
        let data = self.data.lock();
        data.get(offset..offset + len)
            .map(<[u8]>::to_vec)
            .ok_or(GpuError::OutOfRange {
                offset,
                len,
                size: data.len(),
            })
    }

    /// Reset the whole buffer to zero
    pub fn zero_out(&self) {
        self.data.lock().fill(0);
        self.state.mark_core_dirty();
    }

    /// Copy of the full contents
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// Core-thread counterpart
    pub fn core(&self) -> Arc<GpuParamBlockBufferCore> {
        self.core
            .get_or_init(|| {
                Arc::new(GpuParamBlockBufferCore::new(
                    self.state.id(),
                    self.size(),
                    self.usage,
                ))
            })
            .clone()
    }
}

impl std::fmt::Debug for GpuParamBlockBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuParamBlockBuffer")
            .field("id", &self.state.id())
            .field("size", &self.size())
            .field("usage", &self.usage)
            .finish()
    }
}

impl CoreObject for GpuParamBlockBuffer {
    fn core_state(&self) -> &CoreObjectState {
        &self.state
    }

    fn core_object(&self) -> Arc<dyn CoreObjectCore> {
        self.core()
    }

    fn sync_to_core(&self, frame: &mut FrameAllocator) -> SyncResult<CoreSyncData> {
        let record = ParamBlockRecord {
            data: self.snapshot(),
        };
        CoreSyncData::with_record(frame, &record)
    }
}

struct BlockCoreData {
    cached: Vec<u8>,
    hardware: Vec<u8>,
    dirty: bool,
}

/// Core-side block buffer
pub struct GpuParamBlockBufferCore {
    state: CoreObjectCoreState,
    usage: GpuParamBlockUsage,
    size: usize,
    data: RwLock<BlockCoreData>,
}

impl GpuParamBlockBufferCore {
    fn new(id: crate::render::core_object::CoreObjectId, size: usize, usage: GpuParamBlockUsage) -> Self {
        Self {
            state: CoreObjectCoreState::new(id),
            usage,
            size,
            data: RwLock::new(BlockCoreData {
                cached: vec![0; size],
                hardware: vec![0; size],
                dirty: false,
            }),
        }
    }

    /// Size in bytes
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Usage hint
    pub const fn usage(&self) -> GpuParamBlockUsage {
        self.usage
    }

    /// Last contents received from the sim thread
    pub fn cached_data(&self) -> Vec<u8> {
        self.data.read().cached.clone()
    }

    /// Contents of the hardware buffer
    pub fn hardware_data(&self) -> Vec<u8> {
        self.data.read().hardware.clone()
    }

    /// Whether received contents have not been flushed yet
    pub fn is_dirty(&self) -> bool {
        self.data.read().dirty
    }

    /// Push received contents into the hardware buffer. Returns whether
    /// anything was uploaded.
    pub fn flush_to_gpu(&self) -> bool {
        let mut data = self.data.write();
        if !data.dirty {
            return false;
        }
        let BlockCoreData {
            cached, hardware, ..
        } = &mut *data;
        hardware.copy_from_slice(cached);
        data.dirty = false;
        true
    }
}

impl CoreObjectCore for GpuParamBlockBufferCore {
    fn core_state(&self) -> &CoreObjectCoreState {
        &self.state
    }

    fn sync_to_core(&self, data: CoreSyncData, frame: &FrameData) -> SyncResult<()> {
        data.expect_kind(SyncKind::ParamBlock)?;
        let record: ParamBlockRecord = data.read_record(frame)?;
        data.finish()?;

        if record.data.len() != self.size {
            return Err(SyncError::PayloadSize {
                kind: SyncKind::ParamBlock,
                expected: self.size,
                found: record.data.len(),
            });
        }

        let mut core_data = self.data.write();
        core_data.cached = record.data;
        core_data.dirty = true;
        Ok(())
    }
}
