//! Per-pass parameter sets

use std::sync::Arc;

use crate::render::backend::GpuProgramType;
use crate::render::gpu::{GpuParams, GpuParamsCore};

/// Parameter sets of one pass, one per program stage
#[derive(Debug, Clone, Default)]
pub struct PassParameters {
    params: [Option<Arc<GpuParams>>; GpuProgramType::COUNT],
}

impl PassParameters {
    /// Set for `stage`, if the pass has a program there
    pub fn get(&self, stage: GpuProgramType) -> Option<&Arc<GpuParams>> {
        self.params[stage.index()].as_ref()
    }

    /// Replace the set for `stage`
    pub fn set(&mut self, stage: GpuProgramType, params: Option<Arc<GpuParams>>) {
        self.params[stage.index()] = params;
    }

    /// Present sets in stage order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<GpuParams>> {
        self.params.iter().flatten()
    }

    /// Core-side mirror referencing the counterparts of every set
    pub fn to_core(&self) -> Arc<PassParametersCore> {
        let mut core = PassParametersCore::default();
        for (slot, params) in core.params.iter_mut().zip(&self.params) {
            *slot = params.as_ref().map(|params| params.core());
        }
        Arc::new(core)
    }
}

/// Core-thread view of [`PassParameters`]
#[derive(Default)]
pub struct PassParametersCore {
    params: [Option<Arc<GpuParamsCore>>; GpuProgramType::COUNT],
}

impl std::fmt::Debug for PassParametersCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stages: Vec<_> = GpuProgramType::ALL
            .iter()
            .filter(|stage| self.params[stage.index()].is_some())
            .collect();
        f.debug_struct("PassParametersCore").field("stages", &stages).finish()
    }
}

impl PassParametersCore {
    /// Set for `stage`
    pub fn get(&self, stage: GpuProgramType) -> Option<&Arc<GpuParamsCore>> {
        self.params[stage.index()].as_ref()
    }

    /// Present sets in stage order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<GpuParamsCore>> {
        self.params.iter().flatten()
    }
}
