//! Sim/core dual-object model
//!
//! Every renderable resource exists twice: a sim-thread object the game
//! mutates freely and a core-thread counterpart the renderer reads. Changes
//! flow one way, sim to core, as [`CoreSyncData`] payloads collected into
//! dependency-ordered batches by the [`CoreObjectManager`] and applied by the
//! [`CoreThread`].

pub mod core_thread;
pub mod error;
pub mod manager;
pub mod record;
pub mod state;
pub mod sync_data;

use std::sync::Arc;

pub use core_thread::{process_batch, BatchReport, CoreCommand, CoreThread};
pub use error::{SyncError, SyncResult};
pub use manager::{CoreObjectManager, SyncBatch, SyncMessage};
pub use record::{SyncField, SyncRecord};
pub use state::{CoreDirtyFlags, CoreObjectCoreState, CoreObjectId, CoreObjectState};
pub use sync_data::{CoreRef, CoreSyncData, SyncKind};

use crate::foundation::memory::{FrameAllocator, FrameData};

/// Sim-thread half of a dual object
pub trait CoreObject: Send + Sync {
    /// Synchronization state
    fn core_state(&self) -> &CoreObjectState;

    /// Core-thread counterpart, created on first request
    fn core_object(&self) -> Arc<dyn CoreObjectCore>;

    /// Serialize core-visible state. Plain data goes into `frame`; references
    /// to other core objects go into the payload's reference queue.
    fn sync_to_core(&self, frame: &mut FrameAllocator) -> SyncResult<CoreSyncData>;

    /// Objects whose core counterparts must be up to date before this one's
    fn core_dependencies(&self) -> Vec<Arc<dyn CoreObject>> {
        Vec::new()
    }
}

/// Core-thread half of a dual object
pub trait CoreObjectCore: Send + Sync {
    /// Core-side state
    fn core_state(&self) -> &CoreObjectCoreState;

    /// One-time setup on the core thread, before the first payload
    fn initialize(&self) {}

    /// Apply a payload produced by the sim object's
    /// [`CoreObject::sync_to_core`]
    fn sync_to_core(&self, data: CoreSyncData, frame: &FrameData) -> SyncResult<()>;
}
