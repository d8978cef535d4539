//! Dependency-ordered collection of sync payloads
//!
//! The manager walks an object's dependencies depth-first, serializes every
//! object that is new or core-dirty, and queues the payloads so that a
//! dependency is always applied before the objects referring to it. The queue
//! is handed off together with the frame that holds its plain data.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Weak};

use super::error::SyncResult;
use super::state::{CoreDirtyFlags, CoreObjectId};
use super::sync_data::CoreSyncData;
use super::{CoreObject, CoreObjectCore};
use crate::foundation::memory::{FrameAllocator, FrameData};

/// A payload addressed to its core object
pub struct SyncMessage {
    /// Receiving core object
    pub target: Arc<dyn CoreObjectCore>,
    /// Payload
    pub data: CoreSyncData,
    /// Whether the target must be initialized before the payload is applied
    pub initialize: bool,
}

impl std::fmt::Debug for SyncMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncMessage")
            .field("target", &self.target.core_state().id())
            .field("kind", &self.data.kind())
            .field("initialize", &self.initialize)
            .finish()
    }
}

/// Payloads of one frame plus the frame data they point into
#[derive(Debug)]
pub struct SyncBatch {
    /// Frame holding the payloads' plain data
    pub frame: FrameData,
    /// Payloads in application order
    pub messages: Vec<SyncMessage>,
}

impl SyncBatch {
    /// Number of payloads
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the batch carries no payloads
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

type DependencyList = Vec<(CoreObjectId, Weak<dyn CoreObject>)>;

/// Sim-side sync coordinator
#[derive(Default)]
pub struct CoreObjectManager {
    dependencies: HashMap<CoreObjectId, DependencyList>,
    dependants: HashMap<CoreObjectId, BTreeSet<CoreObjectId>>,
    pending: Vec<SyncMessage>,
}

impl CoreObjectManager {
    /// Empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue payloads for `object` and everything it depends on.
    ///
    /// Returns the number of payloads queued. On error the failing object
    /// stays dirty and is retried by the next call.
    pub fn sync(&mut self, object: &dyn CoreObject, frame: &mut FrameAllocator) -> SyncResult<usize> {
        let before = self.pending.len();
        let mut visited = HashSet::new();
        self.sync_recursive(object, frame, &mut visited)?;
        Ok(self.pending.len() - before)
    }

    /// Hand off everything queued so far together with the current frame
    pub fn take_batch(&mut self, frame: &mut FrameAllocator) -> SyncBatch {
        SyncBatch {
            frame: frame.take_frame(),
            messages: std::mem::take(&mut self.pending),
        }
    }

    /// Payloads queued but not yet handed off
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Ids `id` depended on at its last dependency refresh
    pub fn dependencies_of(&self, id: CoreObjectId) -> Vec<CoreObjectId> {
        self.dependencies
            .get(&id)
            .map(|list| list.iter().map(|(dep, _)| *dep).collect())
            .unwrap_or_default()
    }

    /// Ids of objects currently depending on `id`
    pub fn dependants_of(&self, id: CoreObjectId) -> Vec<CoreObjectId> {
        self.dependants
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop every record of `id`, e.g. once the object is destroyed
    pub fn forget(&mut self, id: CoreObjectId) {
        self.unlink(id);
        self.dependants.remove(&id);
    }

    fn sync_recursive(
        &mut self,
        object: &dyn CoreObject,
        frame: &mut FrameAllocator,
        visited: &mut HashSet<CoreObjectId>,
    ) -> SyncResult<()> {
        let state = object.core_state();
        if !visited.insert(state.id()) {
            return Ok(());
        }

        for dependency in self.refresh_dependencies(object) {
            self.sync_recursive(dependency.as_ref(), frame, visited)?;
        }

        let initialize = !state.is_core_created();
        let dirty = state.take(CoreDirtyFlags::CORE);
        if !initialize && !dirty {
            return Ok(());
        }

        let data = match object.sync_to_core(frame) {
            Ok(data) => data,
            Err(err) => {
                state.mark_core_dirty();
                return Err(err);
            }
        };
        if initialize {
            state.mark_core_created();
        }

        log::trace!(
            "Queued {} sync data for core object {} (initialize: {})",
            data.kind(),
            state.id(),
            initialize
        );
        self.pending.push(SyncMessage {
            target: object.core_object(),
            data,
            initialize,
        });
        Ok(())
    }

    /// Dependencies of `object`, re-queried only when its dependency list is
    /// dirty or a cached dependency has been dropped.
    fn refresh_dependencies(&mut self, object: &dyn CoreObject) -> Vec<Arc<dyn CoreObject>> {
        let state = object.core_state();
        let id = state.id();

        if !state.take(CoreDirtyFlags::DEPENDENCIES) {
            if let Some(cached) = self.dependencies.get(&id) {
                let alive: Option<Vec<_>> = cached.iter().map(|(_, weak)| weak.upgrade()).collect();
                if let Some(alive) = alive {
                    return alive;
                }
            }
        }

        let dependencies = object.core_dependencies();
        self.unlink(id);
        let list = dependencies
            .iter()
            .map(|dependency| {
                let dep_id = dependency.core_state().id();
                self.dependants.entry(dep_id).or_default().insert(id);
                (dep_id, Arc::downgrade(dependency))
            })
            .collect();
        self.dependencies.insert(id, list);
        dependencies
    }

    fn unlink(&mut self, id: CoreObjectId) {
        let Some(old) = self.dependencies.remove(&id) else {
            return;
        };
        for (dep_id, _) in old {
            if let Some(set) = self.dependants.get_mut(&dep_id) {
                set.remove(&id);
                if set.is_empty() {
                    self.dependants.remove(&dep_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use parking_lot::Mutex;

    use super::*;
    use crate::render::core_object::{CoreObjectCoreState, CoreObjectState, SyncKind};

    /// Minimal dual object recording the order payloads are produced in
    struct Node {
        name: &'static str,
        state: CoreObjectState,
        deps: Mutex<Vec<Arc<Node>>>,
        log: Arc<Mutex<Vec<&'static str>>>,
        core: OnceLock<Arc<NodeCore>>,
    }

    struct NodeCore {
        state: CoreObjectCoreState,
    }

    impl CoreObjectCore for NodeCore {
        fn core_state(&self) -> &CoreObjectCoreState {
            &self.state
        }

        fn sync_to_core(&self, data: CoreSyncData, _frame: &FrameData) -> SyncResult<()> {
            data.finish()
        }
    }

    impl Node {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                state: CoreObjectState::new(),
                deps: Mutex::new(Vec::new()),
                log: log.clone(),
                core: OnceLock::new(),
            })
        }

        fn depend_on(&self, other: &Arc<Node>) {
            self.deps.lock().push(other.clone());
            self.state.mark_dependencies_dirty();
        }
    }

    impl CoreObject for Node {
        fn core_state(&self) -> &CoreObjectState {
            &self.state
        }

        fn core_object(&self) -> Arc<dyn CoreObjectCore> {
            self.core
                .get_or_init(|| {
                    Arc::new(NodeCore {
                        state: CoreObjectCoreState::new(self.state.id()),
                    })
                })
                .clone()
        }

        fn sync_to_core(&self, _frame: &mut FrameAllocator) -> SyncResult<CoreSyncData> {
            self.log.lock().push(self.name);
            Ok(CoreSyncData::new(SyncKind::Texture))
        }

        fn core_dependencies(&self) -> Vec<Arc<dyn CoreObject>> {
            self.deps
                .lock()
                .iter()
                .map(|dep| dep.clone() as Arc<dyn CoreObject>)
                .collect()
        }
    }

    #[test]
    fn test_dependencies_sync_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let leaf = Node::new("leaf", &log);
        let mid = Node::new("mid", &log);
        let root = Node::new("root", &log);
        mid.depend_on(&leaf);
        root.depend_on(&mid);
        root.depend_on(&leaf);

        let mut manager = CoreObjectManager::new();
        let mut frame = FrameAllocator::default();
        assert_eq!(manager.sync(root.as_ref(), &mut frame).unwrap(), 3);
        assert_eq!(*log.lock(), vec!["leaf", "mid", "root"]);

        let batch = manager.take_batch(&mut frame);
        assert_eq!(batch.len(), 3);
        assert!(batch.messages.iter().all(|m| m.initialize));
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_clean_objects_are_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let leaf = Node::new("leaf", &log);
        let root = Node::new("root", &log);
        root.depend_on(&leaf);

        let mut manager = CoreObjectManager::new();
        let mut frame = FrameAllocator::default();
        manager.sync(root.as_ref(), &mut frame).unwrap();
        log.lock().clear();

        assert_eq!(manager.sync(root.as_ref(), &mut frame).unwrap(), 0);

        leaf.state.mark_core_dirty();
        assert_eq!(manager.sync(root.as_ref(), &mut frame).unwrap(), 1);
        assert_eq!(*log.lock(), vec!["leaf"]);

        let batch = manager.take_batch(&mut frame);
        assert!(batch.messages.iter().all(|m| !m.initialize));
    }

    #[test]
    fn test_dependants_tracked_and_refreshed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = Node::new("a", &log);
        let b = Node::new("b", &log);
        let root = Node::new("root", &log);
        root.depend_on(&a);

        let mut manager = CoreObjectManager::new();
        let mut frame = FrameAllocator::default();
        manager.sync(root.as_ref(), &mut frame).unwrap();
        assert_eq!(manager.dependants_of(a.state.id()), vec![root.state.id()]);

        root.deps.lock().clear();
        root.depend_on(&b);
        manager.sync(root.as_ref(), &mut frame).unwrap();

        assert!(manager.dependants_of(a.state.id()).is_empty());
        assert_eq!(manager.dependants_of(b.state.id()), vec![root.state.id()]);
        assert_eq!(manager.dependencies_of(root.state.id()), vec![b.state.id()]);

        manager.forget(root.state.id());
        assert!(manager.dependants_of(b.state.id()).is_empty());
    }

    #[test]
    fn test_shared_dependency_visited_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = Node::new("shared", &log);
        let left = Node::new("left", &log);
        let right = Node::new("right", &log);
        let root = Node::new("root", &log);
        left.depend_on(&shared);
        right.depend_on(&shared);
        root.depend_on(&left);
        root.depend_on(&right);

        let mut manager = CoreObjectManager::new();
        let mut frame = FrameAllocator::default();
        manager.sync(root.as_ref(), &mut frame).unwrap();
        assert_eq!(*log.lock(), vec!["shared", "left", "right", "root"]);
    }
}
