//! Materials
//!
//! A [`Material`] pairs a [`Shader`] with concrete GPU parameter storage for
//! the shader's best technique on the active backend. Until the technique's
//! programs are compiled the material only knows its shader; once they are,
//! [`Material::try_initialize`] resolves the shader's parameters against the
//! programs' reflection, creates one [`GpuParams`] per program per pass and
//! binds block buffers to them.
//!
//! Parameter values survive shader changes: the current values are
//! snapshotted into a [`MaterialParams`] cache before the bindings are torn
//! down and replayed once the new bindings exist.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use super::error::{MaterialError, MaterialResult};
use super::material_core::MaterialCore;
use super::material_param::{
    MaterialBufferParam, MaterialDataParam, MaterialLoadStoreTextureParam, MaterialSamplerParam,
    MaterialStructParam, MaterialTextureParam,
};
use super::material_params::{MaterialParamValue, MaterialParams, ResourceTable, SerializedMaterialParams};
use super::pass_parameters::PassParameters;
use super::resolution::{resolve_parameters, ShaderBlockData};
use crate::foundation::memory::FrameAllocator;
use crate::render::backend::RenderBackendKind;
use crate::render::core_object::record::sync_record;
use crate::render::core_object::{
    CoreObject, CoreObjectCore, CoreObjectState, CoreRef, CoreSyncData, SyncKind, SyncResult,
};
use crate::render::gpu::{
    value_type_compatible, GpuBuffer, GpuParamBlockBuffer, GpuParamDataType, GpuParamDesc,
    GpuParamValue, GpuParams, GpuResult, SamplerState, Texture,
};
use crate::render::shader::{Shader, Technique};

sync_record! {
    /// Plain data of a material payload; pass parameters, shader and
    /// technique follow as references in that order
    #[derive(Debug)]
    pub(crate) struct MaterialSyncRecord: SyncKind::Material {
        pub(crate) valid_shareable_param_blocks: BTreeSet<String>,
        pub(crate) valid_params: BTreeMap<String, String>,
        pub(crate) num_passes: u32,
    }
}

/// Initialization progress of a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialInitState {
    /// No shader assigned
    NoShader,
    /// Shader assigned, bindings not built yet
    ShaderAssigned,
    /// Bindings built and defaults applied
    Initialized,
}

#[derive(Serialize, Deserialize)]
struct MaterialSnapshot {
    name: String,
    params: SerializedMaterialParams,
}

/// Sim-side material
pub struct Material {
    name: String,
    backend: RenderBackendKind,
    shader: Option<Arc<Shader>>,
    init_state: MaterialInitState,
    technique: Option<Arc<Technique>>,
    valid_params: BTreeMap<String, String>,
    valid_shareable_param_blocks: BTreeSet<String>,
    block_data: Vec<ShaderBlockData>,
    param_blocks: BTreeMap<String, Option<Arc<GpuParamBlockBuffer>>>,
    external_blocks: BTreeMap<String, Arc<GpuParamBlockBuffer>>,
    pass_params: Vec<PassParameters>,
    cached_params: Option<MaterialParams>,
    state: CoreObjectState,
    core: OnceLock<Arc<MaterialCore>>,
}

impl Material {
    /// Material without a shader, rendering with `backend`
    pub fn new(backend: RenderBackendKind) -> Self {
        Self {
            name: String::new(),
            backend,
            shader: None,
            init_state: MaterialInitState::NoShader,
            technique: None,
            valid_params: BTreeMap::new(),
            valid_shareable_param_blocks: BTreeSet::new(),
            block_data: Vec::new(),
            param_blocks: BTreeMap::new(),
            external_blocks: BTreeMap::new(),
            pass_params: Vec::new(),
            cached_params: None,
            state: CoreObjectState::new(),
            core: OnceLock::new(),
        }
    }

    /// Material using `shader`, initialized right away if the shader is loaded
    pub fn with_shader(backend: RenderBackendKind, shader: Arc<Shader>) -> MaterialResult<Self> {
        let mut material = Self::new(backend);
        material.set_shader(Some(shader))?;
        Ok(material)
    }

    /// Set the material's name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Material name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend the material resolves its technique for
    pub const fn backend(&self) -> RenderBackendKind {
        self.backend
    }

    /// Assigned shader
    pub fn shader(&self) -> Option<&Arc<Shader>> {
        self.shader.as_ref()
    }

    /// Technique the bindings were built for
    pub fn technique(&self) -> Option<&Arc<Technique>> {
        self.technique.as_ref()
    }

    /// Initialization progress
    pub const fn init_state(&self) -> MaterialInitState {
        self.init_state
    }

    /// Whether parameters can be accessed
    pub fn is_initialized(&self) -> bool {
        self.init_state == MaterialInitState::Initialized
    }

    /// Switch to `shader`, keeping the current parameter values.
    ///
    /// Values of parameters the new shader no longer declares, or declares
    /// with an incompatible type, are dropped. Arrays that shrank are
    /// truncated and structs whose size changed are dropped. Returns whether
    /// the material is initialized afterwards.
    pub fn set_shader(&mut self, shader: Option<Arc<Shader>>) -> MaterialResult<bool> {
        if self.is_initialized() {
            self.cached_params = Some(self.snapshot_params());
        }

        self.technique = None;
        self.valid_params.clear();
        self.valid_shareable_param_blocks.clear();
        self.block_data.clear();
        self.pass_params.clear();
        // Material-created buffers belong to the old shader's layout
        self.param_blocks.clear();

        self.init_state = match shader {
            Some(_) => MaterialInitState::ShaderAssigned,
            None => MaterialInitState::NoShader,
        };
        self.shader = shader;
        self.state.mark_core_dirty();
        self.state.mark_dependencies_dirty();

        if self.shader.is_none() {
            return Ok(false);
        }
        self.try_initialize()
    }

    /// Build the bindings if the best technique has finished compiling.
    ///
    /// Returns `Ok(false)` while it has not; never blocks.
    pub fn try_initialize(&mut self) -> MaterialResult<bool> {
        let shader = match self.init_state {
            MaterialInitState::Initialized => return Ok(true),
            MaterialInitState::NoShader => return Err(MaterialError::NoShader),
            MaterialInitState::ShaderAssigned => self.shader.clone().ok_or(MaterialError::NoShader)?,
        };
        let technique = shader
            .best_technique(self.backend)
            .ok_or_else(|| MaterialError::NoSupportedTechnique {
                shader: shader.name().to_string(),
                backend: self.backend,
            })?;
        if !technique.is_loaded() {
            log::debug!(
                "Material '{}' waiting for technique '{}' to load",
                self.name,
                technique.name()
            );
            return Ok(false);
        }

        let mut pass_params = Vec::with_capacity(technique.num_passes());
        for pass in technique.passes() {
            let mut params = PassParameters::default();
            for program in pass.programs() {
                params.set(program.program_type(), Some(program.create_parameters()?));
            }
            pass_params.push(params);
        }

        let param_descs: Vec<&GpuParamDesc> = pass_params
            .iter()
            .flat_map(PassParameters::iter)
            .map(|params| params.param_desc().as_ref())
            .collect();
        let resolved = resolve_parameters(&param_descs, shader.desc());

        let mut param_blocks = BTreeMap::new();
        for block in &resolved.block_data {
            let buffer = if block.create {
                Some(GpuParamBlockBuffer::new(block.size, block.usage))
            } else {
                self.external_block(&block.name, block.size)
            };
            param_blocks.insert(block.name.clone(), buffer);
        }

        for params in pass_params.iter().flat_map(PassParameters::iter) {
            for (name, block) in &params.param_desc().param_blocks {
                // A program declaring the block private gets its own buffer
                let shared = block.is_shareable && resolved.valid_shareable_param_blocks.contains(name);
                if shared {
                    if let Some(Some(buffer)) = param_blocks.get(name) {
                        if let Err(err) = params.set_param_block_buffer(name, buffer.clone()) {
                            log::warn!("Material '{}': block '{}' left unbound: {}", self.name, name, err);
                        }
                    }
                } else {
                    let usage = shader
                        .param_blocks()
                        .get(name)
                        .map(|attribs| attribs.usage)
                        .unwrap_or_default();
                    params.set_param_block_buffer(name, GpuParamBlockBuffer::new(block.size_bytes(), usage))?;
                }
            }
        }

        log::debug!(
            "Material '{}' initialized with technique '{}': {} pass(es), {} parameter(s), {} shareable block(s)",
            self.name,
            technique.name(),
            pass_params.len(),
            resolved.valid_params.len(),
            resolved.valid_shareable_param_blocks.len()
        );

        self.technique = Some(technique);
        self.valid_params = resolved.valid_params;
        self.valid_shareable_param_blocks = resolved.valid_shareable_param_blocks;
        self.block_data = resolved.block_data;
        self.param_blocks = param_blocks;
        self.pass_params = pass_params;
        self.init_state = MaterialInitState::Initialized;
        self.state.mark_core_dirty();
        self.state.mark_dependencies_dirty();

        self.apply_defaults(&shader);
        if let Some(cached) = self.cached_params.take() {
            self.apply_cached(&shader, &cached);
        }
        Ok(true)
    }

    /// Typed handle to data parameter `name`.
    ///
    /// A parameter no program reads yields an inert handle.
    pub fn get_param<T: GpuParamValue>(&self, name: &str) -> MaterialResult<MaterialDataParam<T>> {
        let shader = self.ensure_initialized()?;
        if let Some(desc) = shader.data_params().get(name) {
            if !value_type_compatible(desc.ty, T::DATA_TYPE) {
                return Err(MaterialError::TypeMismatch {
                    name: name.to_string(),
                    declared: desc.ty,
                    requested: T::DATA_TYPE,
                });
            }
        }
        let handles = self.bindings(name, |params, variable| {
            params.has_param(variable).then(|| params.data_param::<T>(variable))
        });
        Ok(MaterialDataParam::new(name, handles))
    }

    /// Raw byte handle to data parameter `name`
    pub fn get_struct_param(&self, name: &str) -> MaterialResult<MaterialStructParam> {
        self.ensure_initialized()?;
        let handles = self.bindings(name, |params, variable| {
            params.has_param(variable).then(|| params.struct_param(variable))
        });
        Ok(MaterialStructParam::new(name, handles))
    }

    /// Handle to texture parameter `name`
    pub fn get_texture_param(&self, name: &str) -> MaterialResult<MaterialTextureParam> {
        self.ensure_initialized()?;
        let handles = self.bindings(name, |params, variable| {
            params.has_texture(variable).then(|| params.texture_param(variable))
        });
        Ok(MaterialTextureParam::new(name, handles))
    }

    /// Handle to load-store texture parameter `name`
    pub fn get_load_store_texture_param(&self, name: &str) -> MaterialResult<MaterialLoadStoreTextureParam> {
        self.ensure_initialized()?;
        let handles = self.bindings(name, |params, variable| {
            params
                .has_load_store_texture(variable)
                .then(|| params.load_store_texture_param(variable))
        });
        Ok(MaterialLoadStoreTextureParam::new(name, handles))
    }

    /// Handle to buffer parameter `name`
    pub fn get_buffer_param(&self, name: &str) -> MaterialResult<MaterialBufferParam> {
        self.ensure_initialized()?;
        let handles = self.bindings(name, |params, variable| {
            params.has_buffer(variable).then(|| params.buffer_param(variable))
        });
        Ok(MaterialBufferParam::new(name, handles))
    }

    /// Handle to sampler parameter `name`
    pub fn get_sampler_param(&self, name: &str) -> MaterialResult<MaterialSamplerParam> {
        self.ensure_initialized()?;
        let handles = self.bindings(name, |params, variable| {
            params.has_sampler(variable).then(|| params.sampler_param(variable))
        });
        Ok(MaterialSamplerParam::new(name, handles))
    }

    /// Write element `index` of data parameter `name`
    pub fn set_param<T: GpuParamValue>(&self, name: &str, value: T, index: u32) -> MaterialResult<()> {
        self.get_param::<T>(name)?.set_at(value, index)?;
        Ok(())
    }

    /// Read element `index` of data parameter `name`
    pub fn get_param_value<T: GpuParamValue>(&self, name: &str, index: u32) -> MaterialResult<T> {
        Ok(self.get_param::<T>(name)?.get_at(index)?)
    }

    /// Bind `texture` to texture parameter `name`
    pub fn set_texture(&self, name: &str, texture: Option<Arc<Texture>>) -> MaterialResult<()> {
        self.get_texture_param(name)?.set(texture);
        Ok(())
    }

    /// Texture bound to parameter `name`
    pub fn texture(&self, name: &str) -> MaterialResult<Option<Arc<Texture>>> {
        Ok(self.get_texture_param(name)?.get())
    }

    /// Bind `texture` to load-store texture parameter `name`
    pub fn set_load_store_texture(&self, name: &str, texture: Option<Arc<Texture>>) -> MaterialResult<()> {
        self.get_load_store_texture_param(name)?.set(texture);
        Ok(())
    }

    /// Bind `buffer` to buffer parameter `name`
    pub fn set_buffer(&self, name: &str, buffer: Option<Arc<GpuBuffer>>) -> MaterialResult<()> {
        self.get_buffer_param(name)?.set(buffer);
        Ok(())
    }

    /// Bind `sampler` to sampler parameter `name`
    pub fn set_sampler(&self, name: &str, sampler: Option<Arc<SamplerState>>) -> MaterialResult<()> {
        self.get_sampler_param(name)?.set(sampler);
        Ok(())
    }

    /// Sampler state bound to parameter `name`
    pub fn sampler(&self, name: &str) -> MaterialResult<Option<Arc<SamplerState>>> {
        Ok(self.get_sampler_param(name)?.get())
    }

    /// Bind `buffer` as block `name` in every program that declares it.
    ///
    /// Does nothing but warn when `name` is not a valid shareable block.
    pub fn set_param_block_buffer(&mut self, name: &str, buffer: Arc<GpuParamBlockBuffer>) -> MaterialResult<()> {
        self.ensure_initialized()?;
        if !self.valid_shareable_param_blocks.contains(name) {
            log::warn!(
                "Material '{}': '{}' is not a valid shareable parameter block, ignoring buffer",
                self.name,
                name
            );
            return Ok(());
        }

        for params in self.gpu_params() {
            let shared = params
                .param_desc()
                .param_blocks
                .get(name)
                .is_some_and(|block| block.is_shareable);
            if shared {
                params.set_param_block_buffer(name, buffer.clone())?;
            }
        }
        self.param_blocks.insert(name.to_string(), Some(buffer.clone()));
        self.external_blocks.insert(name.to_string(), buffer);
        Ok(())
    }

    /// Externally supplied buffer for block `name`, if it still fits `size` bytes
    fn external_block(&self, name: &str, size: usize) -> Option<Arc<GpuParamBlockBuffer>> {
        let buffer = self.external_blocks.get(name)?;
        if buffer.size() < size {
            log::warn!(
                "Material '{}': external buffer for block '{}' holds {} bytes, shader needs {}",
                self.name,
                name,
                buffer.size(),
                size
            );
            return None;
        }
        Some(buffer.clone())
    }

    /// Buffer backing shareable block `name`
    pub fn param_block_buffer(&self, name: &str) -> Option<Arc<GpuParamBlockBuffer>> {
        self.param_blocks.get(name).cloned().flatten()
    }

    /// Number of passes of the current technique
    pub fn num_passes(&self) -> usize {
        self.pass_params.len()
    }

    /// Parameter sets of pass `index`
    pub fn pass_parameters(&self, index: usize) -> MaterialResult<&PassParameters> {
        self.ensure_initialized()?;
        self.pass_params
            .get(index)
            .ok_or(MaterialError::PassIndexOutOfRange {
                index,
                num_passes: self.pass_params.len(),
            })
    }

    /// Shader parameter name to GPU variable name, for every usable parameter
    pub fn valid_params(&self) -> &BTreeMap<String, String> {
        &self.valid_params
    }

    /// Blocks backed by one buffer across every program
    pub fn valid_shareable_param_blocks(&self) -> &BTreeSet<String> {
        &self.valid_shareable_param_blocks
    }

    /// Independent copy with the same shader and parameter values.
    ///
    /// Values go through a serialized snapshot so the copy shares no
    /// parameter storage with `self`. Resources (textures, buffers, samplers)
    /// and externally supplied block buffers are shared, not copied.
    pub fn try_clone(&self) -> MaterialResult<Material> {
        let params = if self.is_initialized() {
            self.snapshot_params()
        } else {
            self.cached_params.clone().unwrap_or_default()
        };

        let mut table = ResourceTable::default();
        let snapshot = MaterialSnapshot {
            name: self.name.clone(),
            params: params.to_serialized(&mut table),
        };
        let config = bincode::config::standard();
        let bytes = bincode::serde::encode_to_vec(&snapshot, config)
            .map_err(|err| MaterialError::Encode(err.to_string()))?;
        let (decoded, _): (MaterialSnapshot, usize) = bincode::serde::decode_from_slice(&bytes, config)
            .map_err(|err| MaterialError::Decode(err.to_string()))?;

        let mut clone = Material::new(self.backend).with_name(decoded.name);
        clone.cached_params = Some(MaterialParams::from_serialized(decoded.params, &table)?);
        clone.external_blocks = self.external_blocks.clone();
        clone.set_shader(self.shader.clone())?;
        Ok(clone)
    }

    /// Core-thread counterpart
    pub fn core(&self) -> Arc<MaterialCore> {
        self.core
            .get_or_init(|| Arc::new(MaterialCore::new(self.state.id(), self.backend)))
            .clone()
    }

    fn ensure_initialized(&self) -> MaterialResult<&Arc<Shader>> {
        let shader = self.shader.as_ref().ok_or(MaterialError::NoShader)?;
        match self.init_state {
            MaterialInitState::Initialized => Ok(shader),
            MaterialInitState::NoShader => Err(MaterialError::NoShader),
            MaterialInitState::ShaderAssigned if shader.best_technique(self.backend).is_none() => {
                Err(MaterialError::NoSupportedTechnique {
                    shader: shader.name().to_string(),
                    backend: self.backend,
                })
            }
            MaterialInitState::ShaderAssigned => Err(MaterialError::ShaderNotLoaded {
                shader: shader.name().to_string(),
            }),
        }
    }

    fn gpu_params(&self) -> impl Iterator<Item = &Arc<GpuParams>> {
        self.pass_params.iter().flat_map(PassParameters::iter)
    }

    /// Program-level handles of `name` from every program that binds it
    fn bindings<H>(
        &self,
        name: &str,
        make: impl Fn(&Arc<GpuParams>, &str) -> Option<GpuResult<H>>,
    ) -> Vec<H> {
        let Some(variable) = self.valid_params.get(name) else {
            log::warn!("Material '{}' has no valid parameter '{}'", self.name, name);
            return Vec::new();
        };
        self.gpu_params()
            .filter_map(|params| match make(params, variable.as_str())? {
                Ok(handle) => Some(handle),
                Err(err) => {
                    log::warn!("Material '{}': skipping binding of '{}': {}", self.name, name, err);
                    None
                }
            })
            .collect()
    }

    fn apply_defaults(&self, shader: &Shader) {
        for (name, desc) in shader.data_params() {
            let Some(offset) = desc.default_value_idx else {
                continue;
            };
            if !self.valid_params.contains_key(name) {
                continue;
            }
            let Ok(handle) = self.get_struct_param(name) else {
                continue;
            };
            let size = desc.element_size_bytes();
            for index in 0..desc.array_size {
                let Some(bytes) = shader.desc().default_value(offset + index as usize * size, size) else {
                    break;
                };
                if let Err(err) = handle.set(bytes, index) {
                    log::warn!("Material '{}': default of '{}' not applied: {}", self.name, name, err);
                    break;
                }
            }
        }

        for (name, desc) in shader.texture_params() {
            let default = desc.default_value_idx.and_then(|idx| shader.default_texture(idx));
            if let (Some(texture), true) = (default, self.valid_params.contains_key(name)) {
                if let Ok(handle) = self.get_texture_param(name) {
                    handle.set(Some(texture.clone()));
                }
            }
        }

        for (name, desc) in shader.sampler_params() {
            let default = desc.default_value_idx.and_then(|idx| shader.default_sampler(idx));
            if let (Some(sampler), true) = (default, self.valid_params.contains_key(name)) {
                if let Ok(handle) = self.get_sampler_param(name) {
                    handle.set(Some(sampler.clone()));
                }
            }
        }
    }

    /// Read back every usable parameter value
    fn snapshot_params(&self) -> MaterialParams {
        let mut snapshot = MaterialParams::new();
        let Some(shader) = &self.shader else {
            return snapshot;
        };

        for (name, desc) in shader.data_params() {
            let Some(handle) = self.get_struct_param(name).ok().filter(|h| !h.is_inert()) else {
                continue;
            };
            let element_size = desc.element_size_bytes();
            for index in 0..desc.array_size {
                match handle.get(index) {
                    Ok(bytes) => {
                        let len = bytes.len().min(element_size);
                        snapshot.set_raw(name, desc.ty, element_size, index, &bytes[..len]);
                    }
                    Err(err) => {
                        log::debug!("Material '{}': '{}' not snapshotted: {}", self.name, name, err);
                        break;
                    }
                }
            }
        }

        let valid = |name: &str| self.valid_params.contains_key(name);
        for name in shader.texture_params().keys().filter(|name| valid(name)) {
            if let Ok(handle) = self.get_texture_param(name) {
                snapshot.set_texture(name.clone(), handle.get());
            }
        }
        for name in shader.desc().load_store_texture_params().keys().filter(|name| valid(name)) {
            if let Ok(handle) = self.get_load_store_texture_param(name) {
                snapshot.set_load_store_texture(name.clone(), handle.get());
            }
        }
        for name in shader.buffer_params().keys().filter(|name| valid(name)) {
            if let Ok(handle) = self.get_buffer_param(name) {
                snapshot.set_buffer(name.clone(), handle.get());
            }
        }
        for name in shader.sampler_params().keys().filter(|name| valid(name)) {
            if let Ok(handle) = self.get_sampler_param(name) {
                snapshot.set_sampler(name.clone(), handle.get());
            }
        }
        snapshot
    }

    /// Write cached values onto the current bindings
    fn apply_cached(&self, shader: &Shader, cached: &MaterialParams) {
        for (name, value) in cached.iter() {
            if !self.valid_params.contains_key(name) {
                log::debug!("Material '{}': dropping cached value of '{}'", self.name, name);
                continue;
            }

            let applied = match value {
                MaterialParamValue::Data { ty, element_size, .. } => {
                    self.replay_data(shader, name, *ty, *element_size, value)
                }
                MaterialParamValue::Texture(texture) if shader.texture_params().contains_key(name) => {
                    self.set_texture(name, texture.clone()).is_ok()
                }
                MaterialParamValue::LoadStoreTexture(texture)
                    if shader.desc().load_store_texture_params().contains_key(name) =>
                {
                    self.set_load_store_texture(name, texture.clone()).is_ok()
                }
                MaterialParamValue::Buffer(buffer) if shader.buffer_params().contains_key(name) => {
                    self.set_buffer(name, buffer.clone()).is_ok()
                }
                MaterialParamValue::Sampler(sampler) if shader.sampler_params().contains_key(name) => {
                    self.set_sampler(name, sampler.clone()).is_ok()
                }
                _ => false,
            };
            if !applied {
                log::debug!("Material '{}': dropping cached value of '{}'", self.name, name);
            }
        }
    }

    fn replay_data(
        &self,
        shader: &Shader,
        name: &str,
        ty: GpuParamDataType,
        element_size: usize,
        value: &MaterialParamValue,
    ) -> bool {
        let Some(desc) = shader.data_params().get(name) else {
            return false;
        };
        if !value_type_compatible(desc.ty, ty) {
            return false;
        }
        if desc.ty == GpuParamDataType::Struct && desc.element_size_bytes() != element_size {
            return false;
        }
        let Ok(handle) = self.get_struct_param(name) else {
            return false;
        };

        let count = value.array_size().min(desc.array_size as usize);
        for index in 0..count {
            let Some(bytes) = value.element(index) else {
                break;
            };
            if let Err(err) = handle.set(bytes, index as u32) {
                log::warn!("Material '{}': cached value of '{}' not applied: {}", self.name, name, err);
                return false;
            }
        }
        true
    }
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("name", &self.name)
            .field("id", &self.state.id())
            .field("shader", &self.shader.as_ref().map(|shader| shader.name()))
            .field("init_state", &self.init_state)
            .field("passes", &self.pass_params.len())
            .finish()
    }
}

impl CoreObject for Material {
    fn core_state(&self) -> &CoreObjectState {
        &self.state
    }

    fn core_object(&self) -> Arc<dyn CoreObjectCore> {
        self.core()
    }

    fn sync_to_core(&self, frame: &mut FrameAllocator) -> SyncResult<CoreSyncData> {
        let record = MaterialSyncRecord {
            valid_shareable_param_blocks: self.valid_shareable_param_blocks.clone(),
            valid_params: self.valid_params.clone(),
            num_passes: self.pass_params.len() as u32,
        };

        let mut data = CoreSyncData::with_record(frame, &record)?;
        for pass in &self.pass_params {
            data.push_ref(CoreRef::PassParameters(pass.to_core()));
        }
        data.push_ref(CoreRef::Shader(self.shader.as_ref().map(|shader| shader.core())));
        data.push_ref(CoreRef::Technique(
            self.technique.as_ref().map(|technique| technique.core()),
        ));
        Ok(data)
    }

    fn core_dependencies(&self) -> Vec<Arc<dyn CoreObject>> {
        let shader = self
            .shader
            .iter()
            .map(|shader| shader.clone() as Arc<dyn CoreObject>);
        let params = self
            .gpu_params()
            .map(|params| params.clone() as Arc<dyn CoreObject>);
        shader.chain(params).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Color, Vec4};
    use crate::render::backend::GpuProgramType;
    use crate::render::gpu::{
        GpuParamDataDesc, GpuParamObjectDesc, GpuParamObjectType,
        GpuProgram, GpuProgramDesc, SamplerStateDesc, TextureDesc,
    };
    use crate::render::shader::{Pass, ShaderDataParamDesc, ShaderDesc, ShaderObjectParamDesc};

    fn fragment_reflection(block: &str, shareable: bool, params: Vec<GpuParamDataDesc>) -> GpuParamDesc {
        GpuParamDesc::new()
            .with_block(block, 0, shareable, params)
            .with_object(GpuParamObjectDesc::new("gAlbedo", GpuParamObjectType::Texture2D, 0))
    }

    fn technique(reflections: Vec<GpuParamDesc>) -> Arc<Technique> {
        let passes = reflections
            .into_iter()
            .enumerate()
            .map(|(i, reflection)| {
                let program = GpuProgram::precompiled(
                    GpuProgramDesc::new(format!("fs{i}"), GpuProgramType::Fragment),
                    reflection,
                );
                Pass::new().with_program(program)
            })
            .collect();
        Technique::new("main", RenderBackendKind::Vulkan, passes)
    }

    fn tint_shader(reflections: Vec<GpuParamDesc>) -> Arc<Shader> {
        let mut desc = ShaderDesc::new();
        desc.add_data_param(ShaderDataParamDesc::new("tint", "tintColor", GpuParamDataType::Color))
            .add_data_param_with_default(
                ShaderDataParamDesc::new("gloss", "gloss", GpuParamDataType::Float1),
                0.5f32,
            )
            .add_object_param(ShaderObjectParamDesc::new(
                "albedo",
                ["gAlbedo"],
                GpuParamObjectType::Texture2D,
            ));
        Shader::new("tinted", desc, vec![technique(reflections)])
    }

    fn per_material() -> GpuParamDesc {
        fragment_reflection(
            "PerMaterial",
            true,
            vec![
                GpuParamDataDesc::new("tintColor", GpuParamDataType::Float4, 1),
                GpuParamDataDesc::new("gloss", GpuParamDataType::Float1, 1),
            ],
        )
    }

    #[test]
    fn test_parameter_access_before_shader_fails() {
        let material = Material::new(RenderBackendKind::Vulkan);
        assert_eq!(material.get_param::<f32>("gloss").unwrap_err(), MaterialError::NoShader);
        assert!(matches!(
            material.pass_parameters(0),
            Err(MaterialError::NoShader)
        ));
    }

    #[test]
    fn test_unsupported_backend_fails() {
        let shader = tint_shader(vec![per_material()]);
        let err = Material::with_shader(RenderBackendKind::D3D11, shader).unwrap_err();
        assert!(matches!(err, MaterialError::NoSupportedTechnique { .. }));
    }

    #[test]
    fn test_initialization_resolves_and_creates_blocks() {
        let material = Material::with_shader(RenderBackendKind::Vulkan, tint_shader(vec![per_material()])).unwrap();

        assert!(material.is_initialized());
        assert_eq!(material.valid_params()["tint"], "tintColor");
        assert!(material.valid_shareable_param_blocks().contains("PerMaterial"));
        assert!(material.param_block_buffer("PerMaterial").is_some());
        assert_eq!(material.num_passes(), 1);
        assert_eq!(material.get_param_value::<f32>("gloss", 0).unwrap(), 0.5);
    }

    #[test]
    fn test_color_param_writes_float4() {
        let material = Material::with_shader(RenderBackendKind::Vulkan, tint_shader(vec![per_material()])).unwrap();
        let tint = material.get_param::<Color>("tint").unwrap();
        assert_eq!(tint.binding_count(), 1);
        tint.set(Color::RED).unwrap();

        assert_eq!(
            material.get_param_value::<Vec4>("tint", 0).unwrap(),
            Vec4::new(1.0, 0.0, 0.0, 1.0)
        );
        assert!(matches!(
            material.get_param::<f32>("tint"),
            Err(MaterialError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_param_is_inert() {
        let material = Material::with_shader(RenderBackendKind::Vulkan, tint_shader(vec![per_material()])).unwrap();
        let param = material.get_param::<f32>("missing").unwrap();
        assert!(param.is_inert());
        assert_eq!(param.get().unwrap(), 0.0);
    }

    #[test]
    fn test_shared_buffer_across_passes() {
        let material = Material::with_shader(
            RenderBackendKind::Vulkan,
            tint_shader(vec![per_material(), per_material()]),
        )
        .unwrap();
        let first = material.pass_parameters(0).unwrap().get(GpuProgramType::Fragment).unwrap();
        let second = material.pass_parameters(1).unwrap().get(GpuProgramType::Fragment).unwrap();
        assert!(Arc::ptr_eq(
            &first.param_block_buffer("PerMaterial").unwrap(),
            &second.param_block_buffer("PerMaterial").unwrap()
        ));
        assert_eq!(material.get_param::<Color>("tint").unwrap().binding_count(), 2);
        assert!(matches!(
            material.pass_parameters(2),
            Err(MaterialError::PassIndexOutOfRange { index: 2, num_passes: 2 })
        ));
    }

    #[test]
    fn test_non_shareable_block_gets_own_buffers() {
        let reflection = || {
            fragment_reflection(
                "PerObject",
                false,
                vec![GpuParamDataDesc::new("gloss", GpuParamDataType::Float1, 1)],
            )
        };
        let material =
            Material::with_shader(RenderBackendKind::Vulkan, tint_shader(vec![reflection(), reflection()])).unwrap();

        assert!(material.valid_shareable_param_blocks().is_empty());
        let first = material.pass_parameters(0).unwrap().get(GpuProgramType::Fragment).unwrap();
        let second = material.pass_parameters(1).unwrap().get(GpuProgramType::Fragment).unwrap();
        assert!(!Arc::ptr_eq(
            &first.param_block_buffer("PerObject").unwrap(),
            &second.param_block_buffer("PerObject").unwrap()
        ));
    }

    #[test]
    fn test_unknown_block_buffer_is_ignored() {
        let mut material =
            Material::with_shader(RenderBackendKind::Vulkan, tint_shader(vec![per_material()])).unwrap();
        let buffer = GpuParamBlockBuffer::new(64, Default::default());
        material.set_param_block_buffer("Nope", buffer.clone()).unwrap();
        assert!(material.param_block_buffer("Nope").is_none());

        material.set_param_block_buffer("PerMaterial", buffer.clone()).unwrap();
        assert!(Arc::ptr_eq(&material.param_block_buffer("PerMaterial").unwrap(), &buffer));
    }

    #[test]
    fn test_texture_default_and_binding() {
        let material = Material::with_shader(RenderBackendKind::Vulkan, tint_shader(vec![per_material()])).unwrap();
        assert!(material.texture("albedo").unwrap().is_none());

        let texture = Texture::new(TextureDesc::new_2d("brick", 8, 8));
        material.set_texture("albedo", Some(texture.clone())).unwrap();
        assert!(Arc::ptr_eq(&material.texture("albedo").unwrap().unwrap(), &texture));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = Material::with_shader(RenderBackendKind::Vulkan, tint_shader(vec![per_material()]))
            .unwrap()
            .with_name("brick");
        original.set_param("gloss", 0.75f32, 0).unwrap();

        let clone = original.try_clone().unwrap();
        assert_eq!(clone.name(), "brick");
        assert_eq!(clone.get_param_value::<f32>("gloss", 0).unwrap(), 0.75);

        clone.set_param("gloss", 0.1f32, 0).unwrap();
        assert_eq!(original.get_param_value::<f32>("gloss", 0).unwrap(), 0.75);
        assert!(!Arc::ptr_eq(
            &original.param_block_buffer("PerMaterial").unwrap(),
            &clone.param_block_buffer("PerMaterial").unwrap()
        ));
    }

    #[test]
    fn test_clone_rebinds_objects_independently() {
        let reflection = per_material().with_object(GpuParamObjectDesc::new(
            "gAlbedoSamp",
            GpuParamObjectType::Sampler2D,
            0,
        ));
        let mut desc = ShaderDesc::new();
        desc.add_data_param(ShaderDataParamDesc::new("tint", "tintColor", GpuParamDataType::Color))
            .add_object_param(ShaderObjectParamDesc::new(
                "albedo",
                ["gAlbedo"],
                GpuParamObjectType::Texture2D,
            ))
            .add_object_param(ShaderObjectParamDesc::new(
                "albedoSampler",
                ["gAlbedoSamp"],
                GpuParamObjectType::Sampler2D,
            ));
        let shader = Shader::new("sampled", desc, vec![technique(vec![reflection])]);

        let original = Material::with_shader(RenderBackendKind::Vulkan, shader).unwrap();
        let brick = Texture::new(TextureDesc::new_2d("brick", 4, 4));
        let linear = SamplerState::new(SamplerStateDesc::default());
        original.set_texture("albedo", Some(brick.clone())).unwrap();
        original.set_sampler("albedoSampler", Some(linear.clone())).unwrap();

        let clone = original.try_clone().unwrap();
        assert!(Arc::ptr_eq(&clone.texture("albedo").unwrap().unwrap(), &brick));
        assert!(Arc::ptr_eq(&clone.sampler("albedoSampler").unwrap().unwrap(), &linear));

        let moss = Texture::new(TextureDesc::new_2d("moss", 4, 4));
        let point = SamplerState::new(SamplerStateDesc::default());
        clone.set_texture("albedo", Some(moss.clone())).unwrap();
        clone.set_sampler("albedoSampler", Some(point.clone())).unwrap();

        assert!(Arc::ptr_eq(&original.texture("albedo").unwrap().unwrap(), &brick));
        assert!(Arc::ptr_eq(&original.sampler("albedoSampler").unwrap().unwrap(), &linear));
        assert!(Arc::ptr_eq(&clone.texture("albedo").unwrap().unwrap(), &moss));
        assert!(Arc::ptr_eq(&clone.sampler("albedoSampler").unwrap().unwrap(), &point));
    }
}
