//! Core-thread material

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;

use super::material::MaterialSyncRecord;
use super::pass_parameters::PassParametersCore;
use crate::foundation::memory::FrameData;
use crate::render::backend::RenderBackendKind;
use crate::render::core_object::{
    CoreObjectCore, CoreObjectCoreState, CoreObjectId, CoreSyncData, SyncKind, SyncResult,
};
use crate::render::shader::{ShaderCore, TechniqueCore};

#[derive(Default)]
struct MaterialCoreData {
    shader: Option<Arc<ShaderCore>>,
    technique: Option<Arc<TechniqueCore>>,
    valid_params: BTreeMap<String, String>,
    valid_shareable_param_blocks: BTreeSet<String>,
    pass_params: Vec<Arc<PassParametersCore>>,
}

/// Core-side material.
///
/// Until the sim material has built its bindings this is a stub: it may know
/// its shader but has no technique and no passes. Renderers must check
/// [`technique`](Self::technique) before drawing with it.
pub struct MaterialCore {
    state: CoreObjectCoreState,
    backend: RenderBackendKind,
    data: RwLock<MaterialCoreData>,
}

impl MaterialCore {
    pub(crate) fn new(id: CoreObjectId, backend: RenderBackendKind) -> Self {
        Self {
            state: CoreObjectCoreState::new(id),
            backend,
            data: RwLock::new(MaterialCoreData::default()),
        }
    }

    /// Backend the sim material resolved its technique for
    pub const fn backend(&self) -> RenderBackendKind {
        self.backend
    }

    /// Shader counterpart
    pub fn shader(&self) -> Option<Arc<ShaderCore>> {
        self.data.read().shader.clone()
    }

    /// Technique counterpart, `None` while this is a stub
    pub fn technique(&self) -> Option<Arc<TechniqueCore>> {
        self.data.read().technique.clone()
    }

    /// Whether the material has no usable technique yet
    pub fn is_stub(&self) -> bool {
        self.data.read().technique.is_none()
    }

    /// Number of passes
    pub fn num_passes(&self) -> usize {
        self.data.read().pass_params.len()
    }

    /// Parameter sets of pass `index`
    pub fn pass_parameters(&self, index: usize) -> Option<Arc<PassParametersCore>> {
        self.data.read().pass_params.get(index).cloned()
    }

    /// Shader parameter name to GPU variable name
    pub fn valid_params(&self) -> BTreeMap<String, String> {
        self.data.read().valid_params.clone()
    }

    /// Blocks backed by one buffer across every program
    pub fn valid_shareable_param_blocks(&self) -> BTreeSet<String> {
        self.data.read().valid_shareable_param_blocks.clone()
    }

    /// Upload every dirty block buffer of every pass; returns how many were
    /// uploaded
    pub fn flush_param_blocks(&self) -> usize {
        let data = self.data.read();
        data.pass_params
            .iter()
            .flat_map(|pass| pass.iter())
            .map(|params| params.flush_param_blocks())
            .sum()
    }
}

impl std::fmt::Debug for MaterialCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read();
        f.debug_struct("MaterialCore")
            .field("id", &self.state.id())
            .field("shader", &data.shader.as_ref().map(|shader| shader.name().to_string()))
            .field("technique", &data.technique.as_ref().map(|t| t.name().to_string()))
            .field("passes", &data.pass_params.len())
            .finish()
    }
}

impl CoreObjectCore for MaterialCore {
    fn core_state(&self) -> &CoreObjectCoreState {
        &self.state
    }

    fn sync_to_core(&self, mut data: CoreSyncData, frame: &FrameData) -> SyncResult<()> {
        data.expect_kind(SyncKind::Material)?;
        let record: MaterialSyncRecord = data.read_record(frame)?;
        let pass_params = (0..record.num_passes)
            .map(|_| data.take_pass_parameters())
            .collect::<SyncResult<Vec<_>>>()?;
        let shader = data.take_shader()?;
        let technique = data.take_technique()?;
        data.finish()?;

        log::trace!(
            "Material core {} synced: {} pass(es), {} parameter(s)",
            self.state.id(),
            pass_params.len(),
            record.valid_params.len()
        );
        *self.data.write() = MaterialCoreData {
            shader,
            technique,
            valid_params: record.valid_params,
            valid_shareable_param_blocks: record.valid_shareable_param_blocks,
            pass_params,
        };
        Ok(())
    }
}
