//! Shader parameter declarations
//!
//! The shader is authoritative over what a material exposes: only parameters
//! declared here are ever surfaced, whatever the GPU programs reflect. Each
//! declaration names the GPU variable(s) it binds to and may point into the
//! shader's default value tables.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::render::gpu::{
    GpuObjectCategory, GpuParamBlockUsage, GpuParamDataType, GpuParamObjectType, GpuParamValue,
    SamplerState, Texture,
};

/// A user-facing data parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDataParamDesc {
    /// Name materials address the parameter by
    pub name: String,
    /// GPU variable the parameter binds to
    pub gpu_variable_name: String,
    /// Declared type
    pub ty: GpuParamDataType,
    /// Number of array elements
    pub array_size: u32,
    /// Element size in bytes; only meaningful for structs
    pub element_size: u32,
    /// Byte offset of the default value in the shader's data default table
    pub default_value_idx: Option<usize>,
    /// Set when the renderer, not the material, fills the parameter
    pub renderer_semantic: Option<String>,
}

impl ShaderDataParamDesc {
    /// Parameter of type `ty` bound to `gpu_variable_name`
    pub fn new(name: impl Into<String>, gpu_variable_name: impl Into<String>, ty: GpuParamDataType) -> Self {
        Self {
            name: name.into(),
            gpu_variable_name: gpu_variable_name.into(),
            ty,
            array_size: 1,
            element_size: ty.size_bytes(),
            default_value_idx: None,
            renderer_semantic: None,
        }
    }

    /// Struct parameter whose elements are `element_size` bytes
    pub fn new_struct(
        name: impl Into<String>,
        gpu_variable_name: impl Into<String>,
        element_size: u32,
    ) -> Self {
        Self {
            element_size,
            ..Self::new(name, gpu_variable_name, GpuParamDataType::Struct)
        }
    }

    /// Make this an array of `array_size` elements
    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size.max(1);
        self
    }

    /// Tag the parameter as renderer-owned
    pub fn with_renderer_semantic(mut self, semantic: impl Into<String>) -> Self {
        self.renderer_semantic = Some(semantic.into());
        self
    }

    /// Size of one element in bytes
    pub fn element_size_bytes(&self) -> usize {
        match self.ty.size_bytes() {
            0 => self.element_size as usize,
            size => size as usize,
        }
    }
}

/// A user-facing texture, buffer or sampler parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderObjectParamDesc {
    /// Name materials address the parameter by
    pub name: String,
    /// Candidate GPU variables, tried in order
    pub gpu_variable_names: Vec<String>,
    /// Declared object type
    pub ty: GpuParamObjectType,
    /// Index into the shader's texture or sampler default table
    pub default_value_idx: Option<usize>,
    /// Set when the renderer, not the material, binds the object
    pub renderer_semantic: Option<String>,
}

impl ShaderObjectParamDesc {
    /// Object parameter bound to the first matching name of
    /// `gpu_variable_names`
    pub fn new<I, S>(name: impl Into<String>, gpu_variable_names: I, ty: GpuParamObjectType) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            gpu_variable_names: gpu_variable_names.into_iter().map(Into::into).collect(),
            ty,
            default_value_idx: None,
            renderer_semantic: None,
        }
    }
}

/// Attributes of a parameter block
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderParamBlockDesc {
    /// Block name
    pub name: String,
    /// The buffer is shared between materials and supplied externally
    pub shared: bool,
    /// Update frequency hint for buffers the material creates
    pub usage: GpuParamBlockUsage,
    /// Set when a renderer subsystem owns the block's buffer
    pub renderer_semantic: Option<String>,
}

/// Everything a shader declares about its parameters
#[derive(Debug, Clone, Default)]
pub struct ShaderDesc {
    data_params: BTreeMap<String, ShaderDataParamDesc>,
    texture_params: BTreeMap<String, ShaderObjectParamDesc>,
    load_store_texture_params: BTreeMap<String, ShaderObjectParamDesc>,
    buffer_params: BTreeMap<String, ShaderObjectParamDesc>,
    sampler_params: BTreeMap<String, ShaderObjectParamDesc>,
    param_blocks: BTreeMap<String, ShaderParamBlockDesc>,
    data_defaults: Vec<u8>,
    texture_defaults: Vec<Arc<Texture>>,
    sampler_defaults: Vec<Arc<SamplerState>>,
}

impl ShaderDesc {
    /// No parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a data parameter
    pub fn add_data_param(&mut self, desc: ShaderDataParamDesc) -> &mut Self {
        if let Some(previous) = self.data_params.insert(desc.name.clone(), desc) {
            log::warn!("Data parameter '{}' declared twice; keeping the last", previous.name);
        }
        self
    }

    /// Declare a data parameter with a default value. Array parameters get the
    /// same default in every element.
    pub fn add_data_param_with_default<T: GpuParamValue>(
        &mut self,
        mut desc: ShaderDataParamDesc,
        default: T,
    ) -> &mut Self {
        let offset = self.data_defaults.len();
        for _ in 0..desc.array_size {
            let mut element = vec![0u8; desc.element_size_bytes()];
            let bytes = bytemuck::bytes_of(&default);
            let len = bytes.len().min(element.len());
            element[..len].copy_from_slice(&bytes[..len]);
            self.data_defaults.extend_from_slice(&element);
        }
        desc.default_value_idx = Some(offset);
        self.add_data_param(desc)
    }

    /// Declare an object parameter in the table matching its type
    pub fn add_object_param(&mut self, desc: ShaderObjectParamDesc) -> &mut Self {
        let table = match desc.ty.category() {
            GpuObjectCategory::Texture => &mut self.texture_params,
            GpuObjectCategory::LoadStoreTexture => &mut self.load_store_texture_params,
            GpuObjectCategory::Buffer => &mut self.buffer_params,
            GpuObjectCategory::Sampler => &mut self.sampler_params,
        };
        if let Some(previous) = table.insert(desc.name.clone(), desc) {
            log::warn!("Object parameter '{}' declared twice; keeping the last", previous.name);
        }
        self
    }

    /// Declare a texture parameter with a default texture
    pub fn add_texture_param_with_default(
        &mut self,
        mut desc: ShaderObjectParamDesc,
        default: Arc<Texture>,
    ) -> &mut Self {
        desc.default_value_idx = Some(self.texture_defaults.len());
        self.texture_defaults.push(default);
        self.add_object_param(desc)
    }

    /// Declare a sampler parameter with a default sampler state
    pub fn add_sampler_param_with_default(
        &mut self,
        mut desc: ShaderObjectParamDesc,
        default: Arc<SamplerState>,
    ) -> &mut Self {
        desc.default_value_idx = Some(self.sampler_defaults.len());
        self.sampler_defaults.push(default);
        self.add_object_param(desc)
    }

    /// Set the attributes of block `name`
    pub fn set_param_block_attribs(
        &mut self,
        name: impl Into<String>,
        shared: bool,
        usage: GpuParamBlockUsage,
        renderer_semantic: Option<String>,
    ) -> &mut Self {
        let name = name.into();
        self.param_blocks.insert(
            name.clone(),
            ShaderParamBlockDesc {
                name,
                shared,
                usage,
                renderer_semantic,
            },
        );
        self
    }

    /// Declared data parameters
    pub fn data_params(&self) -> &BTreeMap<String, ShaderDataParamDesc> {
        &self.data_params
    }

    /// Declared texture parameters
    pub fn texture_params(&self) -> &BTreeMap<String, ShaderObjectParamDesc> {
        &self.texture_params
    }

    /// Declared load-store texture parameters
    pub fn load_store_texture_params(&self) -> &BTreeMap<String, ShaderObjectParamDesc> {
        &self.load_store_texture_params
    }

    /// Declared buffer parameters
    pub fn buffer_params(&self) -> &BTreeMap<String, ShaderObjectParamDesc> {
        &self.buffer_params
    }

    /// Declared sampler parameters
    pub fn sampler_params(&self) -> &BTreeMap<String, ShaderObjectParamDesc> {
        &self.sampler_params
    }

    /// Declared block attributes
    pub fn param_blocks(&self) -> &BTreeMap<String, ShaderParamBlockDesc> {
        &self.param_blocks
    }

    /// `len` bytes of the data default table starting at `idx`
    pub fn default_value(&self, idx: usize, len: usize) -> Option<&[u8]> {
        self.data_defaults.get(idx..idx + len)
    }

    /// Default texture `idx`
    pub fn default_texture(&self, idx: usize) -> Option<&Arc<Texture>> {
        self.texture_defaults.get(idx)
    }

    /// Default sampler state `idx`
    pub fn default_sampler(&self, idx: usize) -> Option<&Arc<SamplerState>> {
        self.sampler_defaults.get(idx)
    }

    /// All default textures
    pub fn texture_defaults(&self) -> &[Arc<Texture>] {
        &self.texture_defaults
    }

    /// All default sampler states
    pub fn sampler_defaults(&self) -> &[Arc<SamplerState>] {
        &self.sampler_defaults
    }
}
