//! Per-object synchronization state
//!
//! Every sim-thread object that has a core-thread counterpart carries a
//! [`CoreObjectState`]: a process-unique id and three independent dirty axes.
//!
//! ```text
//! Uninitialized ──first sync──► Initialized(clean) ──mark_core_dirty──► Dirty
//!                                      ▲                                 │
//!                                      └──────────── sync ───────────────┘
//! ```
//!
//! The flags are atomics so that sim objects shared through `Arc` can be
//! marked from any handle without extra locking.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Independent dirty axes of a core object
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CoreDirtyFlags: u32 {
        /// Core-visible state changed; the object must be serialized again
        const CORE = 1 << 0;
        /// The set of objects this one depends on changed
        const DEPENDENCIES = 1 << 1;
        /// The set of resources this object listens to changed
        const LISTENER_RESOURCES = 1 << 2;
    }
}

/// Process-unique identifier shared by a sim object and its core counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreObjectId(u64);

impl CoreObjectId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CoreObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sim-side synchronization state
#[derive(Debug)]
pub struct CoreObjectState {
    id: CoreObjectId,
    flags: AtomicU32,
    core_created: AtomicBool,
}

impl CoreObjectState {
    /// Fresh state: every axis dirty, core counterpart not handed over yet
    pub fn new() -> Self {
        Self {
            id: CoreObjectId::next(),
            flags: AtomicU32::new(CoreDirtyFlags::all().bits()),
            core_created: AtomicBool::new(false),
        }
    }

    /// Object id
    pub const fn id(&self) -> CoreObjectId {
        self.id
    }

    /// Current dirty flags
    pub fn dirty_flags(&self) -> CoreDirtyFlags {
        CoreDirtyFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    /// Mark core-visible state as changed
    pub fn mark_core_dirty(&self) {
        self.set(CoreDirtyFlags::CORE);
    }

    /// Mark the dependency list as changed
    pub fn mark_dependencies_dirty(&self) {
        self.set(CoreDirtyFlags::DEPENDENCIES);
    }

    /// Mark the listened-to resource list as changed
    pub fn mark_listener_resources_dirty(&self) {
        self.set(CoreDirtyFlags::LISTENER_RESOURCES);
    }

    /// Whether the object must be serialized again
    pub fn is_core_dirty(&self) -> bool {
        self.dirty_flags().contains(CoreDirtyFlags::CORE)
    }

    /// Whether the dependency list must be re-queried
    pub fn are_dependencies_dirty(&self) -> bool {
        self.dirty_flags().contains(CoreDirtyFlags::DEPENDENCIES)
    }

    /// Whether the listened-to resources must be re-queried
    pub fn are_listener_resources_dirty(&self) -> bool {
        self.dirty_flags().contains(CoreDirtyFlags::LISTENER_RESOURCES)
    }

    /// Clear `flag`, returning whether it was set
    pub fn take(&self, flag: CoreDirtyFlags) -> bool {
        let previous = self.flags.fetch_and(!flag.bits(), Ordering::AcqRel);
        CoreDirtyFlags::from_bits_truncate(previous).intersects(flag)
    }

    /// Whether the core counterpart has been handed to the core thread
    pub fn is_core_created(&self) -> bool {
        self.core_created.load(Ordering::Acquire)
    }

    /// Record that the core counterpart is being handed over. Returns `true`
    /// only for the first call.
    pub(crate) fn mark_core_created(&self) -> bool {
        !self.core_created.swap(true, Ordering::AcqRel)
    }

    fn set(&self, flag: CoreDirtyFlags) {
        self.flags.fetch_or(flag.bits(), Ordering::AcqRel);
    }
}

impl Default for CoreObjectState {
    fn default() -> Self {
        Self::new()
    }
}

/// Core-side state of a counterpart object
#[derive(Debug)]
pub struct CoreObjectCoreState {
    id: CoreObjectId,
    initialized: AtomicBool,
}

impl CoreObjectCoreState {
    /// State for the counterpart of the sim object with `id`
    pub const fn new(id: CoreObjectId) -> Self {
        Self {
            id,
            initialized: AtomicBool::new(false),
        }
    }

    /// Id shared with the sim object
    pub const fn id(&self) -> CoreObjectId {
        self.id
    }

    /// Whether the core thread has initialized this object
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Returns `true` only for the first call
    pub(crate) fn mark_initialized(&self) -> bool {
        !self.initialized.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_fully_dirty() {
        let state = CoreObjectState::new();
        assert!(state.is_core_dirty());
        assert!(state.are_dependencies_dirty());
        assert!(state.are_listener_resources_dirty());
        assert!(!state.is_core_created());
    }

    #[test]
    fn test_axes_are_independent() {
        let state = CoreObjectState::new();
        assert!(state.take(CoreDirtyFlags::CORE));
        assert!(!state.is_core_dirty());
        assert!(state.are_dependencies_dirty());

        assert!(!state.take(CoreDirtyFlags::CORE));
        state.mark_core_dirty();
        assert!(state.is_core_dirty());

        assert!(state.take(CoreDirtyFlags::LISTENER_RESOURCES));
        assert!(state.are_dependencies_dirty());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = CoreObjectState::new();
        let b = CoreObjectState::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_created_and_initialized_only_once() {
        let state = CoreObjectState::new();
        assert!(state.mark_core_created());
        assert!(!state.mark_core_created());

        let core = CoreObjectCoreState::new(state.id());
        assert!(core.mark_initialized());
        assert!(!core.mark_initialized());
        assert!(core.is_initialized());
    }
}
