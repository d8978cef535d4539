//! Techniques and passes
//!
//! A technique is one backend-specific way of rendering a shader: an ordered
//! list of passes, each a set of GPU programs indexed by pipeline stage.

use std::sync::{Arc, OnceLock};

use crate::foundation::memory::{FrameAllocator, FrameData};
use crate::render::backend::{GpuProgramType, RenderBackendKind};
use crate::render::core_object::{
    CoreObject, CoreObjectCore, CoreObjectCoreState, CoreObjectState, CoreSyncData, SyncKind,
    SyncResult,
};
use crate::render::gpu::{GpuProgram, GpuProgramCore};

/// One pipeline configuration
#[derive(Debug, Clone, Default)]
pub struct Pass {
    programs: [Option<Arc<GpuProgram>>; GpuProgramType::COUNT],
}

impl Pass {
    /// Pass without programs
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the program for its stage, replacing any previous one
    pub fn with_program(mut self, program: Arc<GpuProgram>) -> Self {
        let index = program.program_type().index();
        self.programs[index] = Some(program);
        self
    }

    /// Program bound to `stage`
    pub fn program(&self, stage: GpuProgramType) -> Option<&Arc<GpuProgram>> {
        self.programs[stage.index()].as_ref()
    }

    /// Bound programs in stage order
    pub fn programs(&self) -> impl Iterator<Item = &Arc<GpuProgram>> {
        self.programs.iter().flatten()
    }

    /// Whether every bound program has been compiled successfully
    pub fn is_loaded(&self) -> bool {
        self.programs().all(|program| program.param_desc().is_some())
    }
}

/// Core-side pass
#[derive(Default)]
pub struct PassCore {
    programs: [Option<Arc<GpuProgramCore>>; GpuProgramType::COUNT],
}

impl PassCore {
    /// Program bound to `stage`
    pub fn program(&self, stage: GpuProgramType) -> Option<&Arc<GpuProgramCore>> {
        self.programs[stage.index()].as_ref()
    }
}

/// Sim-side technique
pub struct Technique {
    name: String,
    backend: RenderBackendKind,
    passes: Vec<Pass>,
    state: CoreObjectState,
    core: OnceLock<Arc<TechniqueCore>>,
}

impl Technique {
    /// Technique for `backend` made of `passes`
    pub fn new(name: impl Into<String>, backend: RenderBackendKind, passes: Vec<Pass>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            backend,
            passes,
            state: CoreObjectState::new(),
            core: OnceLock::new(),
        })
    }

    /// Technique name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend this technique targets
    pub const fn backend(&self) -> RenderBackendKind {
        self.backend
    }

    /// Whether this technique can run on `backend`
    pub fn is_supported(&self, backend: RenderBackendKind) -> bool {
        self.backend == backend
    }

    /// Passes in execution order
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    /// Number of passes
    pub fn num_passes(&self) -> usize {
        self.passes.len()
    }

    /// Whether every pass has been compiled
    pub fn is_loaded(&self) -> bool {
        self.passes.iter().all(Pass::is_loaded)
    }

    /// Core-thread counterpart
    pub fn core(&self) -> Arc<TechniqueCore> {
        self.core
            .get_or_init(|| {
                let passes = self
                    .passes
                    .iter()
                    .map(|pass| PassCore {
                        programs: std::array::from_fn(|stage| {
                            pass.programs[stage].as_ref().map(|program| program.core())
                        }),
                    })
                    .collect();
                Arc::new(TechniqueCore {
                    state: CoreObjectCoreState::new(self.state.id()),
                    name: self.name.clone(),
                    backend: self.backend,
                    passes,
                })
            })
            .clone()
    }
}

impl std::fmt::Debug for Technique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Technique")
            .field("name", &self.name)
            .field("backend", &self.backend)
            .field("passes", &self.passes.len())
            .finish()
    }
}

impl CoreObject for Technique {
    fn core_state(&self) -> &CoreObjectState {
        &self.state
    }

    fn core_object(&self) -> Arc<dyn CoreObjectCore> {
        self.core()
    }

    fn sync_to_core(&self, _frame: &mut FrameAllocator) -> SyncResult<CoreSyncData> {
        Ok(CoreSyncData::new(SyncKind::Technique))
    }

    fn core_dependencies(&self) -> Vec<Arc<dyn CoreObject>> {
        self.passes
            .iter()
            .flat_map(|pass| pass.programs())
            .map(|program| program.clone() as Arc<dyn CoreObject>)
            .collect()
    }
}

/// Core-side technique
pub struct TechniqueCore {
    state: CoreObjectCoreState,
    name: String,
    backend: RenderBackendKind,
    passes: Vec<PassCore>,
}

impl TechniqueCore {
    /// Technique name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend this technique targets
    pub const fn backend(&self) -> RenderBackendKind {
        self.backend
    }

    /// Passes in execution order
    pub fn passes(&self) -> &[PassCore] {
        &self.passes
    }
}

impl CoreObjectCore for TechniqueCore {
    fn core_state(&self) -> &CoreObjectCoreState {
        &self.state
    }

    fn sync_to_core(&self, data: CoreSyncData, _frame: &FrameData) -> SyncResult<()> {
        data.expect_kind(SyncKind::Technique)?;
        data.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::gpu::{GpuParamDesc, GpuProgramDesc};

    fn program(stage: GpuProgramType) -> Arc<GpuProgram> {
        GpuProgram::precompiled(GpuProgramDesc::new("p", stage), GpuParamDesc::new())
    }

    #[test]
    fn test_pass_orders_programs_by_stage() {
        let pass = Pass::new()
            .with_program(program(GpuProgramType::Fragment))
            .with_program(program(GpuProgramType::Vertex));

        let stages: Vec<_> = pass.programs().map(|p| p.program_type()).collect();
        assert_eq!(stages, vec![GpuProgramType::Vertex, GpuProgramType::Fragment]);
        assert!(pass.program(GpuProgramType::Compute).is_none());
        assert!(pass.is_loaded());
    }

    #[test]
    fn test_technique_core_mirrors_programs() {
        let vertex = program(GpuProgramType::Vertex);
        let technique = Technique::new(
            "forward",
            RenderBackendKind::Vulkan,
            vec![Pass::new().with_program(vertex.clone())],
        );

        assert!(technique.is_supported(RenderBackendKind::Vulkan));
        assert!(!technique.is_supported(RenderBackendKind::D3D11));
        assert_eq!(technique.core_dependencies().len(), 1);

        let core = technique.core();
        let program_core = core.passes()[0].program(GpuProgramType::Vertex).unwrap();
        assert!(Arc::ptr_eq(program_core, &vertex.core()));
    }
}
