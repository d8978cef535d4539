//! Shaders
//!
//! A shader bundles the user-facing parameter declarations with one or more
//! techniques, at most one of which is used for a given backend.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use super::shader_desc::{ShaderDataParamDesc, ShaderDesc, ShaderObjectParamDesc, ShaderParamBlockDesc};
use super::technique::{Technique, TechniqueCore};
use crate::foundation::memory::{FrameAllocator, FrameData};
use crate::render::backend::RenderBackendKind;
use crate::render::core_object::{
    CoreObject, CoreObjectCore, CoreObjectCoreState, CoreObjectState, CoreSyncData, SyncKind,
    SyncResult,
};
use crate::render::gpu::{GpuResult, SamplerState, Texture};

/// Sim-side shader
pub struct Shader {
    name: String,
    desc: ShaderDesc,
    techniques: Vec<Arc<Technique>>,
    state: CoreObjectState,
    core: OnceLock<Arc<ShaderCore>>,
}

impl Shader {
    /// Shader with parameter declarations `desc`, implemented by `techniques`
    /// in order of preference
    pub fn new(name: impl Into<String>, desc: ShaderDesc, techniques: Vec<Arc<Technique>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            desc,
            techniques,
            state: CoreObjectState::new(),
            core: OnceLock::new(),
        })
    }

    /// Shader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter declarations and defaults
    pub fn desc(&self) -> &ShaderDesc {
        &self.desc
    }

    /// All techniques
    pub fn techniques(&self) -> &[Arc<Technique>] {
        &self.techniques
    }

    /// First technique supporting `backend`
    pub fn best_technique(&self, backend: RenderBackendKind) -> Option<Arc<Technique>> {
        self.techniques
            .iter()
            .find(|technique| technique.is_supported(backend))
            .cloned()
    }

    /// Whether every program of every technique has been compiled. Never
    /// blocks.
    pub fn is_loaded(&self) -> bool {
        self.techniques.iter().all(|technique| technique.is_loaded())
    }

    /// Block until the core thread has compiled every program.
    ///
    /// The shader must already have been synced to the core thread.
    pub fn block_until_loaded(&self) -> GpuResult<()> {
        for technique in &self.techniques {
            for pass in technique.passes() {
                for program in pass.programs() {
                    program.block_until_core_initialized()?;
                }
            }
        }
        Ok(())
    }

    /// Declared data parameters
    pub fn data_params(&self) -> &BTreeMap<String, ShaderDataParamDesc> {
        self.desc.data_params()
    }

    /// Declared texture parameters
    pub fn texture_params(&self) -> &BTreeMap<String, ShaderObjectParamDesc> {
        self.desc.texture_params()
    }

    /// Declared buffer parameters
    pub fn buffer_params(&self) -> &BTreeMap<String, ShaderObjectParamDesc> {
        self.desc.buffer_params()
    }

    /// Declared sampler parameters
    pub fn sampler_params(&self) -> &BTreeMap<String, ShaderObjectParamDesc> {
        self.desc.sampler_params()
    }

    /// Declared block attributes
    pub fn param_blocks(&self) -> &BTreeMap<String, ShaderParamBlockDesc> {
        self.desc.param_blocks()
    }

    /// Default texture `idx`
    pub fn default_texture(&self, idx: usize) -> Option<&Arc<Texture>> {
        self.desc.default_texture(idx)
    }

    /// Default sampler state `idx`
    pub fn default_sampler(&self, idx: usize) -> Option<&Arc<SamplerState>> {
        self.desc.default_sampler(idx)
    }

    /// Core-thread counterpart
    pub fn core(&self) -> Arc<ShaderCore> {
        self.core
            .get_or_init(|| {
                Arc::new(ShaderCore {
                    state: CoreObjectCoreState::new(self.state.id()),
                    name: self.name.clone(),
                    techniques: self.techniques.iter().map(|t| t.core()).collect(),
                })
            })
            .clone()
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("name", &self.name)
            .field("techniques", &self.techniques)
            .finish()
    }
}

impl CoreObject for Shader {
    fn core_state(&self) -> &CoreObjectState {
        &self.state
    }

    fn core_object(&self) -> Arc<dyn CoreObjectCore> {
        self.core()
    }

    fn sync_to_core(&self, _frame: &mut FrameAllocator) -> SyncResult<CoreSyncData> {
        Ok(CoreSyncData::new(SyncKind::Shader))
    }

    fn core_dependencies(&self) -> Vec<Arc<dyn CoreObject>> {
        let techniques = self
            .techniques
            .iter()
            .map(|technique| technique.clone() as Arc<dyn CoreObject>);
        let textures = self
            .desc
            .texture_defaults()
            .iter()
            .map(|texture| texture.clone() as Arc<dyn CoreObject>);
        let samplers = self
            .desc
            .sampler_defaults()
            .iter()
            .map(|sampler| sampler.clone() as Arc<dyn CoreObject>);
        techniques.chain(textures).chain(samplers).collect()
    }
}

/// Core-side shader
pub struct ShaderCore {
    state: CoreObjectCoreState,
    name: String,
    techniques: Vec<Arc<TechniqueCore>>,
}

impl ShaderCore {
    /// Shader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First technique supporting `backend`
    pub fn best_technique(&self, backend: RenderBackendKind) -> Option<Arc<TechniqueCore>> {
        self.techniques
            .iter()
            .find(|technique| technique.backend() == backend)
            .cloned()
    }
}

impl CoreObjectCore for ShaderCore {
    fn core_state(&self) -> &CoreObjectCoreState {
        &self.state
    }

    fn sync_to_core(&self, data: CoreSyncData, _frame: &FrameData) -> SyncResult<()> {
        data.expect_kind(SyncKind::Shader)?;
        data.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::GpuProgramType;
    use crate::render::gpu::{
        FixedReflectionCompiler, GpuParamDesc, GpuParamObjectType, GpuProgram, GpuProgramDesc,
        TextureDesc,
    };
    use crate::render::shader::Pass;

    #[test]
    fn test_best_technique_by_backend() {
        let d3d = Technique::new("d3d", RenderBackendKind::D3D11, Vec::new());
        let vk = Technique::new("vk", RenderBackendKind::Vulkan, Vec::new());
        let shader = Shader::new("s", ShaderDesc::new(), vec![d3d, vk.clone()]);

        let best = shader.best_technique(RenderBackendKind::Vulkan).unwrap();
        assert!(Arc::ptr_eq(&best, &vk));
        assert_eq!(
            shader.core().best_technique(RenderBackendKind::D3D11).unwrap().name(),
            "d3d"
        );

        let only_d3d = Shader::new(
            "d",
            ShaderDesc::new(),
            vec![Technique::new("d3d", RenderBackendKind::D3D11, Vec::new())],
        );
        assert!(only_d3d.best_technique(RenderBackendKind::Vulkan).is_none());
    }

    #[test]
    fn test_loaded_once_programs_compile() {
        let program = GpuProgram::new(
            GpuProgramDesc::new("fs", GpuProgramType::Fragment),
            Arc::new(FixedReflectionCompiler::new(GpuParamDesc::new())),
        );
        let technique = Technique::new(
            "forward",
            RenderBackendKind::Vulkan,
            vec![Pass::new().with_program(program.clone())],
        );
        let shader = Shader::new("s", ShaderDesc::new(), vec![technique]);
        assert!(!shader.is_loaded());

        program.core().initialize();
        assert!(shader.is_loaded());
        shader.block_until_loaded().unwrap();
    }

    #[test]
    fn test_dependencies_include_defaults() {
        let mut desc = ShaderDesc::new();
        desc.add_texture_param_with_default(
            ShaderObjectParamDesc::new("albedo", ["gAlbedo"], GpuParamObjectType::Texture2D),
            Texture::new(TextureDesc::new_2d("white", 1, 1)),
        );
        let shader = Shader::new(
            "s",
            desc,
            vec![Technique::new("t", RenderBackendKind::Vulkan, Vec::new())],
        );
        assert_eq!(shader.core_dependencies().len(), 2);
    }
}
