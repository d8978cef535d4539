//! GPU programs
//!
//! A program is compiled on the core thread when its core counterpart is
//! initialized. Its parameter reflection is published back to the sim thread,
//! which can poll for it or block until it arrives.

use std::sync::{Arc, OnceLock};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use super::error::{GpuError, GpuResult};
use super::param_desc::GpuParamDesc;
use super::params::GpuParams;
use crate::foundation::memory::{FrameAllocator, FrameData};
use crate::render::backend::GpuProgramType;
use crate::render::core_object::{
    CoreObject, CoreObjectCore, CoreObjectCoreState, CoreObjectState, CoreSyncData, SyncKind,
    SyncResult,
};

/// Program source and entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuProgramDesc {
    /// Debug name
    pub name: String,
    /// Pipeline stage
    pub program_type: GpuProgramType,
    /// Entry point function
    pub entry_point: String,
    /// Source code
    pub source: String,
}

impl GpuProgramDesc {
    /// Program with an empty source, `main` as entry point
    pub fn new(name: impl Into<String>, program_type: GpuProgramType) -> Self {
        Self {
            name: name.into(),
            program_type,
            entry_point: "main".to_string(),
            source: String::new(),
        }
    }

    /// Set the source code
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Backend hook that turns program source into parameter reflection
pub trait ProgramCompiler: Send + Sync {
    /// Compile `desc`, returning its reflection or a compiler message
    fn compile(&self, desc: &GpuProgramDesc) -> Result<GpuParamDesc, String>;
}

/// Compiler that returns a fixed reflection for every program
#[derive(Debug, Clone, Default)]
pub struct FixedReflectionCompiler {
    reflection: GpuParamDesc,
}

impl FixedReflectionCompiler {
    /// Compiler always reporting `reflection`
    pub fn new(reflection: GpuParamDesc) -> Self {
        Self { reflection }
    }
}

impl ProgramCompiler for FixedReflectionCompiler {
    fn compile(&self, _desc: &GpuProgramDesc) -> Result<GpuParamDesc, String> {
        Ok(self.reflection.clone())
    }
}

#[derive(Debug, Clone)]
enum ProgramStatus {
    Pending,
    Compiled(Arc<GpuParamDesc>),
    Failed(String),
}

/// Compilation result shared between both halves of a program
struct ProgramInit {
    status: Mutex<ProgramStatus>,
    ready: Condvar,
}

impl ProgramInit {
    fn new(status: ProgramStatus) -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(status),
            ready: Condvar::new(),
        })
    }

    fn publish(&self, status: ProgramStatus) {
        *self.status.lock() = status;
        self.ready.notify_all();
    }
}

/// Sim-side GPU program
pub struct GpuProgram {
    desc: GpuProgramDesc,
    state: CoreObjectState,
    init: Arc<ProgramInit>,
    compiler: Arc<dyn ProgramCompiler>,
    core: OnceLock<Arc<GpuProgramCore>>,
}

impl GpuProgram {
    /// Program compiled by `compiler` once the core thread initializes it
    pub fn new(desc: GpuProgramDesc, compiler: Arc<dyn ProgramCompiler>) -> Arc<Self> {
        Arc::new(Self {
            desc,
            state: CoreObjectState::new(),
            init: ProgramInit::new(ProgramStatus::Pending),
            compiler,
            core: OnceLock::new(),
        })
    }

    /// Program whose reflection is already known
    pub fn precompiled(desc: GpuProgramDesc, reflection: GpuParamDesc) -> Arc<Self> {
        let compiler = Arc::new(FixedReflectionCompiler::new(reflection.clone()));
        Arc::new(Self {
            desc,
            state: CoreObjectState::new(),
            init: ProgramInit::new(ProgramStatus::Compiled(Arc::new(reflection))),
            compiler,
            core: OnceLock::new(),
        })
    }

    /// Source and entry point
    pub fn desc(&self) -> &GpuProgramDesc {
        &self.desc
    }

    /// Pipeline stage
    pub fn program_type(&self) -> GpuProgramType {
        self.desc.program_type
    }

    /// Whether compilation finished, successfully or not
    pub fn is_core_initialized(&self) -> bool {
        !matches!(*self.init.status.lock(), ProgramStatus::Pending)
    }

    /// Reflection, if compilation succeeded. Never blocks.
    pub fn param_desc(&self) -> Option<Arc<GpuParamDesc>> {
        match &*self.init.status.lock() {
            ProgramStatus::Compiled(desc) => Some(desc.clone()),
            _ => None,
        }
    }

    /// Block until the core thread has compiled this program.
    ///
    /// The program must have been handed to the core thread, otherwise this
    /// waits forever.
    pub fn block_until_core_initialized(&self) -> GpuResult<Arc<GpuParamDesc>> {
        let mut status = self.init.status.lock();
        loop {
            let outcome = match &*status {
                ProgramStatus::Compiled(desc) => Some(Ok(desc.clone())),
                ProgramStatus::Failed(reason) => Some(Err(GpuError::CompileFailed {
                    program: self.desc.name.clone(),
                    reason: reason.clone(),
                })),
                ProgramStatus::Pending => None,
            };
            if let Some(result) = outcome {
                return result;
            }
            self.init.ready.wait(&mut status);
        }
    }

    /// A fresh parameter set laid out after this program's reflection
    pub fn create_parameters(&self) -> GpuResult<Arc<GpuParams>> {
        let desc = self.block_until_core_initialized()?;
        Ok(GpuParams::new(self.desc.program_type, desc))
    }

    /// Core-thread counterpart
    pub fn core(&self) -> Arc<GpuProgramCore> {
        self.core
            .get_or_init(|| {
                Arc::new(GpuProgramCore {
                    state: CoreObjectCoreState::new(self.state.id()),
                    desc: self.desc.clone(),
                    init: self.init.clone(),
                    compiler: self.compiler.clone(),
                })
            })
            .clone()
    }
}

impl std::fmt::Debug for GpuProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuProgram")
            .field("id", &self.state.id())
            .field("name", &self.desc.name)
            .field("type", &self.desc.program_type)
            .field("status", &*self.init.status.lock())
            .finish()
    }
}

impl CoreObject for GpuProgram {
    fn core_state(&self) -> &CoreObjectState {
        &self.state
    }

    fn core_object(&self) -> Arc<dyn CoreObjectCore> {
        self.core()
    }

    fn sync_to_core(&self, _frame: &mut FrameAllocator) -> SyncResult<CoreSyncData> {
        Ok(CoreSyncData::new(SyncKind::GpuProgram))
    }
}

/// Core-side GPU program
pub struct GpuProgramCore {
    state: CoreObjectCoreState,
    desc: GpuProgramDesc,
    init: Arc<ProgramInit>,
    compiler: Arc<dyn ProgramCompiler>,
}

impl GpuProgramCore {
    /// Source and entry point
    pub fn desc(&self) -> &GpuProgramDesc {
        &self.desc
    }

    /// Reflection, if compiled
    pub fn param_desc(&self) -> Option<Arc<GpuParamDesc>> {
        match &*self.init.status.lock() {
            ProgramStatus::Compiled(desc) => Some(desc.clone()),
            _ => None,
        }
    }
}

impl CoreObjectCore for GpuProgramCore {
    fn core_state(&self) -> &CoreObjectCoreState {
        &self.state
    }

    fn initialize(&self) {
        if !matches!(*self.init.status.lock(), ProgramStatus::Pending) {
            return;
        }

        let status = match self.compiler.compile(&self.desc) {
            Ok(reflection) => {
                log::debug!(
                    "Compiled {:?} program '{}': {} param(s), {} block(s)",
                    self.desc.program_type,
                    self.desc.name,
                    reflection.params.len(),
                    reflection.param_blocks.len()
                );
                ProgramStatus::Compiled(Arc::new(reflection))
            }
            Err(reason) => {
                log::error!("Failed to compile GPU program '{}': {}", self.desc.name, reason);
                ProgramStatus::Failed(reason)
            }
        };
        self.init.publish(status);
    }

    fn sync_to_core(&self, data: CoreSyncData, _frame: &FrameData) -> SyncResult<()> {
        data.expect_kind(SyncKind::GpuProgram)?;
        data.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::gpu::param_desc::{GpuParamDataDesc, GpuParamDataType};

    struct FailingCompiler;

    impl ProgramCompiler for FailingCompiler {
        fn compile(&self, _desc: &GpuProgramDesc) -> Result<GpuParamDesc, String> {
            Err("syntax error".to_string())
        }
    }

    fn reflection() -> GpuParamDesc {
        GpuParamDesc::new().with_block(
            "PerObject",
            0,
            false,
            vec![GpuParamDataDesc::new("gWorld", GpuParamDataType::Matrix4x4, 1)],
        )
    }

    #[test]
    fn test_precompiled_is_ready() {
        let program = GpuProgram::precompiled(
            GpuProgramDesc::new("vs", GpuProgramType::Vertex),
            reflection(),
        );
        assert!(program.is_core_initialized());
        let params = program.create_parameters().unwrap();
        assert_eq!(params.program_type(), GpuProgramType::Vertex);
        assert!(params.has_block("PerObject"));
    }

    #[test]
    fn test_reflection_published_by_core_initialize() {
        let program = GpuProgram::new(
            GpuProgramDesc::new("fs", GpuProgramType::Fragment),
            Arc::new(FixedReflectionCompiler::new(reflection())),
        );
        assert!(!program.is_core_initialized());
        assert!(program.param_desc().is_none());

        let core = program.core();
        let waiter = {
            let program = program.clone();
            std::thread::spawn(move || program.block_until_core_initialized())
        };
        core.initialize();

        let desc = waiter.join().unwrap().unwrap();
        assert!(desc.param_blocks.contains_key("PerObject"));
        assert!(core.param_desc().is_some());
    }

    #[test]
    fn test_compile_failure_reported() {
        let program = GpuProgram::new(
            GpuProgramDesc::new("broken", GpuProgramType::Compute),
            Arc::new(FailingCompiler),
        );
        program.core().initialize();

        assert!(program.is_core_initialized());
        assert!(matches!(
            program.block_until_core_initialized(),
            Err(GpuError::CompileFailed { .. })
        ));
        assert!(program.create_parameters().is_err());
    }
}
