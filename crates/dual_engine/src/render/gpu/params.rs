//! Per-program parameter sets
//!
//! A [`GpuParams`] holds everything one GPU program reads at draw time: the
//! parameter block buffers backing its data parameters plus its texture,
//! load-store texture, buffer and sampler bindings, each table indexed by the
//! slots reported in the program's reflection.
//!
//! Typed handles ([`GpuDataParam`], [`GpuTextureParam`], ...) resolve a name
//! once and then read and write through the shared set.

use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use super::error::{GpuError, GpuResult};
use super::param_block_buffer::{GpuParamBlockBuffer, GpuParamBlockBufferCore};
use super::param_desc::{GpuParamDataDesc, GpuParamDesc, GpuParamObjectDesc};
use super::param_value::GpuParamValue;
use super::resources::{GpuBuffer, GpuBufferCore, SamplerState, SamplerStateCore, Texture, TextureCore};
use crate::foundation::memory::{FrameAllocator, FrameData};
use crate::render::backend::GpuProgramType;
use crate::render::core_object::record::sync_record;
use crate::render::core_object::{
    CoreObject, CoreObjectCore, CoreObjectCoreState, CoreObjectState, CoreRef, CoreSyncData,
    SyncKind, SyncResult,
};

sync_record! {
    /// Binding table sizes; the bindings themselves follow as references
    #[derive(Debug)]
    pub(crate) struct GpuParamsRecord: SyncKind::GpuParams {
        blocks: u32,
        textures: u32,
        load_store_textures: u32,
        buffers: u32,
        samplers: u32,
    }
}

struct Bindings {
    blocks: Vec<Option<Arc<GpuParamBlockBuffer>>>,
    textures: Vec<Option<Arc<Texture>>>,
    load_store_textures: Vec<Option<Arc<Texture>>>,
    buffers: Vec<Option<Arc<GpuBuffer>>>,
    samplers: Vec<Option<Arc<SamplerState>>>,
}

/// Sim-side parameter set of one GPU program
pub struct GpuParams {
    program_type: GpuProgramType,
    desc: Arc<GpuParamDesc>,
    state: CoreObjectState,
    bindings: RwLock<Bindings>,
    core: OnceLock<Arc<GpuParamsCore>>,
}

macro_rules! object_bindings {
    ($table:ident, $resource:ty, $set:ident, $get:ident, $has:ident, $label:literal) => {
        #[doc = concat!("Bind a ", $label, " to `slot`, or clear it")]
        pub fn $set(&self, slot: u32, value: Option<Arc<$resource>>) {
            {
                let mut bindings = self.bindings.write();
                match bindings.$table.get_mut(slot as usize) {
                    Some(entry) => *entry = value,
                    None => {
                        log::warn!("Ignoring {} binding to unused slot {}", $label, slot);
                        return;
                    }
                }
            }
            self.mark_bindings_changed();
        }

        #[doc = concat!("The ", $label, " bound to `slot`")]
        pub fn $get(&self, slot: u32) -> Option<Arc<$resource>> {
            self.bindings.read().$table.get(slot as usize).cloned().flatten()
        }

        #[doc = concat!("Whether the program reads a ", $label, " named `name`")]
        pub fn $has(&self, name: &str) -> bool {
            self.desc.$table.contains_key(name)
        }
    };
}

impl GpuParams {
    /// Empty parameter set sized after `desc`
    pub fn new(program_type: GpuProgramType, desc: Arc<GpuParamDesc>) -> Arc<Self> {
        let counts = desc.slot_counts();
        Arc::new(Self {
            program_type,
            desc,
            state: CoreObjectState::new(),
            bindings: RwLock::new(Bindings {
                blocks: vec![None; counts.blocks],
                textures: vec![None; counts.textures],
                load_store_textures: vec![None; counts.load_store_textures],
                buffers: vec![None; counts.buffers],
                samplers: vec![None; counts.samplers],
            }),
            core: OnceLock::new(),
        })
    }

    /// Stage of the owning program
    pub const fn program_type(&self) -> GpuProgramType {
        self.program_type
    }

    /// Reflection this set was built from
    pub fn param_desc(&self) -> &Arc<GpuParamDesc> {
        &self.desc
    }

    /// Whether the program reads a data parameter named `name`
    pub fn has_param(&self, name: &str) -> bool {
        self.desc.params.contains_key(name)
    }

    /// Whether the program declares a block named `name`
    pub fn has_block(&self, name: &str) -> bool {
        self.desc.param_blocks.contains_key(name)
    }

    object_bindings!(textures, Texture, set_texture, texture, has_texture, "texture");
    object_bindings!(
        load_store_textures,
        Texture,
        set_load_store_texture,
        load_store_texture,
        has_load_store_texture,
        "load-store texture"
    );
    object_bindings!(buffers, GpuBuffer, set_buffer, buffer, has_buffer, "buffer");
    object_bindings!(samplers, SamplerState, set_sampler, sampler, has_sampler, "sampler");

    /// Bind `buffer` as the storage of block `name`
    pub fn set_param_block_buffer(&self, name: &str, buffer: Arc<GpuParamBlockBuffer>) -> GpuResult<()> {
        let block = self
            .desc
            .param_blocks
            .get(name)
            .ok_or_else(|| GpuError::UnknownBlock {
                name: name.to_string(),
            })?;
        if buffer.size() < block.size_bytes() {
            return Err(GpuError::BlockTooSmall {
                name: name.to_string(),
                required: block.size_bytes(),
                actual: buffer.size(),
            });
        }

        self.bindings.write().blocks[block.slot as usize] = Some(buffer);
        self.mark_bindings_changed();
        Ok(())
    }

    /// Buffer bound to block `name`
    pub fn param_block_buffer(&self, name: &str) -> Option<Arc<GpuParamBlockBuffer>> {
        let slot = self.desc.param_blocks.get(name)?.slot;
        self.param_block_buffer_at(slot)
    }

    /// Buffer bound to block slot `slot`
    pub fn param_block_buffer_at(&self, slot: u32) -> Option<Arc<GpuParamBlockBuffer>> {
        self.bindings.read().blocks.get(slot as usize).cloned().flatten()
    }

    /// Typed handle to data parameter `name`
    pub fn data_param<T: GpuParamValue>(self: &Arc<Self>, name: &str) -> GpuResult<GpuDataParam<T>> {
        let desc = self.data_desc(name)?;
        if !T::DATA_TYPE.binds_to(desc.ty) {
            return Err(GpuError::TypeMismatch {
                name: name.to_string(),
                actual: desc.ty,
                requested: T::DATA_TYPE,
            });
        }
        if std::mem::size_of::<T>() > desc.element_size_bytes() {
            return Err(GpuError::SizeMismatch {
                name: name.to_string(),
                element_size: desc.element_size_bytes(),
                actual: std::mem::size_of::<T>(),
            });
        }
        Ok(GpuDataParam {
            params: self.clone(),
            desc: desc.clone(),
            _marker: PhantomData,
        })
    }

    /// Raw byte handle to data parameter `name`, typically a struct
    pub fn struct_param(self: &Arc<Self>, name: &str) -> GpuResult<GpuStructParam> {
        Ok(GpuStructParam {
            params: self.clone(),
            desc: self.data_desc(name)?.clone(),
        })
    }

    /// Handle to texture binding `name`
    pub fn texture_param(self: &Arc<Self>, name: &str) -> GpuResult<GpuTextureParam> {
        let desc = object_desc(&self.desc.textures, name, "texture")?;
        Ok(GpuTextureParam::new(self.clone(), desc))
    }

    /// Handle to load-store texture binding `name`
    pub fn load_store_texture_param(
        self: &Arc<Self>,
        name: &str,
    ) -> GpuResult<GpuLoadStoreTextureParam> {
        let desc = object_desc(&self.desc.load_store_textures, name, "load-store texture")?;
        Ok(GpuLoadStoreTextureParam::new(self.clone(), desc))
    }

    /// Handle to buffer binding `name`
    pub fn buffer_param(self: &Arc<Self>, name: &str) -> GpuResult<GpuBufferParam> {
        let desc = object_desc(&self.desc.buffers, name, "buffer")?;
        Ok(GpuBufferParam::new(self.clone(), desc))
    }

    /// Handle to sampler binding `name`
    pub fn sampler_param(self: &Arc<Self>, name: &str) -> GpuResult<GpuSamplerParam> {
        let desc = object_desc(&self.desc.samplers, name, "sampler")?;
        Ok(GpuSamplerParam::new(self.clone(), desc))
    }

    /// Core-thread counterpart
    pub fn core(&self) -> Arc<GpuParamsCore> {
        self.core
            .get_or_init(|| {
                Arc::new(GpuParamsCore {
                    state: CoreObjectCoreState::new(self.state.id()),
                    program_type: self.program_type,
                    desc: self.desc.clone(),
                    bindings: RwLock::new(CoreBindings::default()),
                })
            })
            .clone()
    }

    fn data_desc(&self, name: &str) -> GpuResult<&GpuParamDataDesc> {
        self.desc.params.get(name).ok_or_else(|| GpuError::UnknownParam {
            name: name.to_string(),
        })
    }

    fn mark_bindings_changed(&self) {
        self.state.mark_core_dirty();
        self.state.mark_dependencies_dirty();
    }

    fn element_location(
        &self,
        desc: &GpuParamDataDesc,
        index: u32,
    ) -> GpuResult<(Arc<GpuParamBlockBuffer>, usize)> {
        if index >= desc.array_size {
            return Err(GpuError::IndexOutOfBounds {
                name: desc.name.clone(),
                index,
                array_size: desc.array_size,
            });
        }
        let buffer = self
            .param_block_buffer_at(desc.param_block_slot)
            .ok_or_else(|| GpuError::NoBlockBound {
                name: desc.name.clone(),
                slot: desc.param_block_slot,
            })?;
        Ok((buffer, desc.cpu_byte_offset(index)))
    }

    /// Write one array element; shorter values are zero-padded
    fn write_element(&self, desc: &GpuParamDataDesc, index: u32, bytes: &[u8]) -> GpuResult<()> {
        let element_size = desc.element_size_bytes();
        if bytes.len() > element_size {
            return Err(GpuError::SizeMismatch {
                name: desc.name.clone(),
                element_size,
                actual: bytes.len(),
            });
        }
        let (buffer, offset) = self.element_location(desc, index)?;

        let mut element = vec![0; element_size];
        element[..bytes.len()].copy_from_slice(bytes);
        buffer.write(offset, &element)
    }

    fn read_element(&self, desc: &GpuParamDataDesc, index: u32) -> GpuResult<Vec<u8>> {
        let (buffer, offset) = self.element_location(desc, index)?;
        buffer.read(offset, desc.element_size_bytes())
    }
}

fn object_desc(
    table: &std::collections::BTreeMap<String, GpuParamObjectDesc>,
    name: &str,
    label: &'static str,
) -> GpuResult<GpuParamObjectDesc> {
    table.get(name).cloned().ok_or_else(|| GpuError::UnknownObject {
        table: label,
        name: name.to_string(),
    })
}

impl std::fmt::Debug for GpuParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuParams")
            .field("id", &self.state.id())
            .field("program_type", &self.program_type)
            .field("params", &self.desc.params.len())
            .field("blocks", &self.desc.param_blocks.len())
            .finish()
    }
}

impl CoreObject for GpuParams {
    fn core_state(&self) -> &CoreObjectState {
        &self.state
    }

    fn core_object(&self) -> Arc<dyn CoreObjectCore> {
        self.core()
    }

    fn sync_to_core(&self, frame: &mut FrameAllocator) -> SyncResult<CoreSyncData> {
        let bindings = self.bindings.read();
        let record = GpuParamsRecord {
            blocks: bindings.blocks.len() as u32,
            textures: bindings.textures.len() as u32,
            load_store_textures: bindings.load_store_textures.len() as u32,
            buffers: bindings.buffers.len() as u32,
            samplers: bindings.samplers.len() as u32,
        };

        let mut data = CoreSyncData::with_record(frame, &record)?;
        for block in &bindings.blocks {
            data.push_ref(CoreRef::ParamBlock(block.as_ref().map(|b| b.core())));
        }
        for texture in bindings.textures.iter().chain(&bindings.load_store_textures) {
            data.push_ref(CoreRef::Texture(texture.as_ref().map(|t| t.core())));
        }
        for buffer in &bindings.buffers {
            data.push_ref(CoreRef::Buffer(buffer.as_ref().map(|b| b.core())));
        }
        for sampler in &bindings.samplers {
            data.push_ref(CoreRef::Sampler(sampler.as_ref().map(|s| s.core())));
        }
        Ok(data)
    }

    fn core_dependencies(&self) -> Vec<Arc<dyn CoreObject>> {
        fn bound<T: CoreObject + 'static>(
            table: &[Option<Arc<T>>],
        ) -> impl Iterator<Item = Arc<dyn CoreObject>> + '_ {
            table
                .iter()
                .flatten()
                .map(|object| object.clone() as Arc<dyn CoreObject>)
        }

        let bindings = self.bindings.read();
        let dependencies = bound(&bindings.blocks)
            .chain(bound(&bindings.textures))
            .chain(bound(&bindings.load_store_textures))
            .chain(bound(&bindings.buffers))
            .chain(bound(&bindings.samplers))
            .collect();
        dependencies
    }
}

#[derive(Default)]
struct CoreBindings {
    blocks: Vec<Option<Arc<GpuParamBlockBufferCore>>>,
    textures: Vec<Option<Arc<TextureCore>>>,
    load_store_textures: Vec<Option<Arc<TextureCore>>>,
    buffers: Vec<Option<Arc<GpuBufferCore>>>,
    samplers: Vec<Option<Arc<SamplerStateCore>>>,
}

/// Core-side parameter set
pub struct GpuParamsCore {
    state: CoreObjectCoreState,
    program_type: GpuProgramType,
    desc: Arc<GpuParamDesc>,
    bindings: RwLock<CoreBindings>,
}

impl GpuParamsCore {
    /// Stage of the owning program
    pub const fn program_type(&self) -> GpuProgramType {
        self.program_type
    }

    /// Reflection this set was built from
    pub fn param_desc(&self) -> &Arc<GpuParamDesc> {
        &self.desc
    }

    /// Block buffer bound to `slot`
    pub fn param_block_buffer_at(&self, slot: u32) -> Option<Arc<GpuParamBlockBufferCore>> {
        self.bindings.read().blocks.get(slot as usize).cloned().flatten()
    }

    /// Block buffer bound to block `name`
    pub fn param_block_buffer(&self, name: &str) -> Option<Arc<GpuParamBlockBufferCore>> {
        let slot = self.desc.param_blocks.get(name)?.slot;
        self.param_block_buffer_at(slot)
    }

    /// Texture bound to `slot`
    pub fn texture(&self, slot: u32) -> Option<Arc<TextureCore>> {
        self.bindings.read().textures.get(slot as usize).cloned().flatten()
    }

    /// Load-store texture bound to `slot`
    pub fn load_store_texture(&self, slot: u32) -> Option<Arc<TextureCore>> {
        self.bindings
            .read()
            .load_store_textures
            .get(slot as usize)
            .cloned()
            .flatten()
    }

    /// Buffer bound to `slot`
    pub fn buffer(&self, slot: u32) -> Option<Arc<GpuBufferCore>> {
        self.bindings.read().buffers.get(slot as usize).cloned().flatten()
    }

    /// Sampler bound to `slot`
    pub fn sampler(&self, slot: u32) -> Option<Arc<SamplerStateCore>> {
        self.bindings.read().samplers.get(slot as usize).cloned().flatten()
    }

    /// Bytes of element `index` of data parameter `name` as currently held by
    /// the hardware buffer
    pub fn hardware_bytes(&self, name: &str, index: u32) -> Option<Vec<u8>> {
        let desc = self.desc.params.get(name)?;
        if index >= desc.array_size {
            return None;
        }
        let buffer = self.param_block_buffer_at(desc.param_block_slot)?;
        let offset = desc.cpu_byte_offset(index);
        buffer
            .hardware_data()
            .get(offset..offset + desc.element_size_bytes())
            .map(<[u8]>::to_vec)
    }

    /// Upload every bound block with pending contents. Returns the number of
    /// blocks uploaded.
    pub fn flush_param_blocks(&self) -> usize {
        self.bindings
            .read()
            .blocks
            .iter()
            .flatten()
            .filter(|block| block.flush_to_gpu())
            .count()
    }
}

impl CoreObjectCore for GpuParamsCore {
    fn core_state(&self) -> &CoreObjectCoreState {
        &self.state
    }

    fn sync_to_core(&self, mut data: CoreSyncData, frame: &FrameData) -> SyncResult<()> {
        data.expect_kind(SyncKind::GpuParams)?;
        let record: GpuParamsRecord = data.read_record(frame)?;

        let blocks = (0..record.blocks)
            .map(|_| data.take_param_block())
            .collect::<SyncResult<Vec<_>>>()?;
        let textures = (0..record.textures)
            .map(|_| data.take_texture())
            .collect::<SyncResult<Vec<_>>>()?;
        let load_store_textures = (0..record.load_store_textures)
            .map(|_| data.take_texture())
            .collect::<SyncResult<Vec<_>>>()?;
        let buffers = (0..record.buffers)
            .map(|_| data.take_buffer())
            .collect::<SyncResult<Vec<_>>>()?;
        let samplers = (0..record.samplers)
            .map(|_| data.take_sampler())
            .collect::<SyncResult<Vec<_>>>()?;
        data.finish()?;

        *self.bindings.write() = CoreBindings {
            blocks,
            textures,
            load_store_textures,
            buffers,
            samplers,
        };
        Ok(())
    }
}

/// Typed handle to a data parameter
pub struct GpuDataParam<T> {
    params: Arc<GpuParams>,
    desc: GpuParamDataDesc,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for GpuDataParam<T> {
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            desc: self.desc.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: GpuParamValue> GpuDataParam<T> {
    /// Write array element `index`
    pub fn set(&self, value: T, index: u32) -> GpuResult<()> {
        self.params
            .write_element(&self.desc, index, bytemuck::bytes_of(&value))
    }

    /// Read array element `index`
    pub fn get(&self, index: u32) -> GpuResult<T> {
        let bytes = self.params.read_element(&self.desc, index)?;
        Ok(bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<T>()]))
    }

    /// Reflected descriptor
    pub fn desc(&self) -> &GpuParamDataDesc {
        &self.desc
    }

    /// Owning parameter set
    pub fn params(&self) -> &Arc<GpuParams> {
        &self.params
    }
}

/// Raw byte handle to a data parameter
#[derive(Clone)]
pub struct GpuStructParam {
    params: Arc<GpuParams>,
    desc: GpuParamDataDesc,
}

impl GpuStructParam {
    /// Write array element `index`; shorter values are zero-padded
    pub fn set(&self, bytes: &[u8], index: u32) -> GpuResult<()> {
        self.params.write_element(&self.desc, index, bytes)
    }

    /// Read array element `index`
    pub fn get(&self, index: u32) -> GpuResult<Vec<u8>> {
        self.params.read_element(&self.desc, index)
    }

    /// Size of one element in bytes
    pub const fn element_size(&self) -> usize {
        self.desc.element_size_bytes()
    }

    /// Reflected descriptor
    pub fn desc(&self) -> &GpuParamDataDesc {
        &self.desc
    }
}

macro_rules! object_param {
    ($(#[$meta:meta])* $name:ident, $resource:ty, $set:ident, $get:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            params: Arc<GpuParams>,
            desc: GpuParamObjectDesc,
        }

        impl $name {
            fn new(params: Arc<GpuParams>, desc: GpuParamObjectDesc) -> Self {
                Self { params, desc }
            }

            /// Bind `value`, or clear the binding with `None`
            pub fn set(&self, value: Option<Arc<$resource>>) {
                self.params.$set(self.desc.slot, value);
            }

            /// Currently bound resource
            pub fn get(&self) -> Option<Arc<$resource>> {
                self.params.$get(self.desc.slot)
            }

            /// Reflected descriptor
            pub fn desc(&self) -> &GpuParamObjectDesc {
                &self.desc
            }
        }
    };
}

object_param!(
    /// Handle to a texture binding
    GpuTextureParam, Texture, set_texture, texture
);
object_param!(
    /// Handle to a load-store texture binding
    GpuLoadStoreTextureParam, Texture, set_load_store_texture, load_store_texture
);
object_param!(
    /// Handle to a buffer binding
    GpuBufferParam, GpuBuffer, set_buffer, buffer
);
object_param!(
    /// Handle to a sampler binding
    GpuSamplerParam, SamplerState, set_sampler, sampler
);
