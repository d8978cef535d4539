//! GPU program parameter descriptors
//!
//! Reflection data produced for every compiled GPU program: the data parameters
//! it reads, the parameter blocks backing them and the object bindings
//! (samplers, textures, buffers). All sizes and offsets are expressed in 32-bit
//! units, the granularity constant buffers are addressed in.
//!
//! Maps are ordered so every computation derived from a descriptor visits
//! parameters in the same order on every run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::block_layout::generate_param_block_desc;

/// Type of a GPU data parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GpuParamDataType {
    /// `float`
    Float1,
    /// `float2`
    Float2,
    /// `float3`
    Float3,
    /// `float4`
    Float4,
    /// `float2x2`
    Matrix2x2,
    /// `float3x3`
    Matrix3x3,
    /// `float4x4`
    Matrix4x4,
    /// `int`
    Int1,
    /// `int2`
    Int2,
    /// `int3`
    Int3,
    /// `int4`
    Int4,
    /// `bool`, stored as a 32-bit value
    Bool,
    /// Shader-side color; lives in a `float4` on the GPU
    Color,
    /// User defined structure, sized by its descriptor
    Struct,
    /// Anything reflection could not classify
    Unknown,
}

impl GpuParamDataType {
    /// Size of one element in bytes. Structs report zero; their size comes from
    /// the parameter descriptor.
    pub const fn size_bytes(self) -> u32 {
        match self {
            Self::Float1 | Self::Int1 | Self::Bool => 4,
            Self::Float2 | Self::Int2 => 8,
            Self::Float3 | Self::Int3 => 12,
            Self::Float4 | Self::Int4 | Self::Color | Self::Matrix2x2 => 16,
            Self::Matrix3x3 => 36,
            Self::Matrix4x4 => 64,
            Self::Struct | Self::Unknown => 0,
        }
    }

    /// Size of one element in 32-bit units
    pub const fn size_units(self) -> u32 {
        self.size_bytes() / 4
    }

    /// Whether a shader parameter of type `self` may be bound to a GPU variable
    /// reflected as `gpu`.
    ///
    /// Exact matches are always accepted. The only coercion is a shader `Color`
    /// onto a GPU `Float4`.
    pub fn binds_to(self, gpu: Self) -> bool {
        self == gpu || (self == Self::Color && gpu == Self::Float4)
    }
}

/// Type of a GPU object binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GpuParamObjectType {
    /// 1D sampler state
    Sampler1D,
    /// 2D sampler state
    Sampler2D,
    /// 3D sampler state
    Sampler3D,
    /// Cube sampler state
    SamplerCube,
    /// 1D texture
    Texture1D,
    /// 2D texture
    Texture2D,
    /// 3D texture
    Texture3D,
    /// Cube texture
    TextureCube,
    /// Multisampled 2D texture
    Texture2DMs,
    /// Read-write 1D texture
    RwTexture1D,
    /// Read-write 2D texture
    RwTexture2D,
    /// Read-write 3D texture
    RwTexture3D,
    /// Raw byte buffer
    ByteBuffer,
    /// Structured buffer
    StructuredBuffer,
    /// Read-write byte buffer
    RwByteBuffer,
    /// Read-write structured buffer
    RwStructuredBuffer,
}

/// Binding category of an object parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GpuObjectCategory {
    /// Sampler states
    Sampler,
    /// Sampled textures
    Texture,
    /// Read-write textures
    LoadStoreTexture,
    /// Buffers
    Buffer,
}

impl GpuParamObjectType {
    /// Which binding table this object type lives in
    pub const fn category(self) -> GpuObjectCategory {
        match self {
            Self::Sampler1D | Self::Sampler2D | Self::Sampler3D | Self::SamplerCube => {
                GpuObjectCategory::Sampler
            }
            Self::Texture1D
            | Self::Texture2D
            | Self::Texture3D
            | Self::TextureCube
            | Self::Texture2DMs => GpuObjectCategory::Texture,
            Self::RwTexture1D | Self::RwTexture2D | Self::RwTexture3D => {
                GpuObjectCategory::LoadStoreTexture
            }
            Self::ByteBuffer
            | Self::StructuredBuffer
            | Self::RwByteBuffer
            | Self::RwStructuredBuffer => GpuObjectCategory::Buffer,
        }
    }
}

/// Reflection data for one data parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuParamDataDesc {
    /// GPU variable name
    pub name: String,
    /// Parameter type
    pub ty: GpuParamDataType,
    /// Size of one element, in 32-bit units
    pub element_size: u32,
    /// Number of array elements (1 for non-arrays)
    pub array_size: u32,
    /// Distance between array elements, in 32-bit units
    pub array_element_stride: u32,
    /// Slot of the parameter block containing this parameter
    pub param_block_slot: u32,
    /// Descriptor set of the containing block
    pub param_block_set: u32,
    /// Offset inside the CPU copy of the block, in 32-bit units
    pub cpu_mem_offset: u32,
    /// Offset inside the GPU buffer, in 32-bit units
    pub gpu_mem_offset: u32,
}

impl GpuParamDataDesc {
    /// Create an unplaced parameter; layout fields are filled in by
    /// [`generate_param_block_desc`].
    pub fn new(name: impl Into<String>, ty: GpuParamDataType, array_size: u32) -> Self {
        Self {
            name: name.into(),
            ty,
            element_size: ty.size_units(),
            array_size: array_size.max(1),
            array_element_stride: ty.size_units(),
            param_block_slot: 0,
            param_block_set: 0,
            cpu_mem_offset: 0,
            gpu_mem_offset: 0,
        }
    }

    /// Create an unplaced struct parameter of `element_size` units
    pub fn new_struct(name: impl Into<String>, element_size: u32, array_size: u32) -> Self {
        Self {
            element_size,
            array_element_stride: element_size,
            ..Self::new(name, GpuParamDataType::Struct, array_size)
        }
    }

    /// Structural equality between two reflections of a parameter.
    ///
    /// Buffer offsets legitimately differ between programs, so callers comparing
    /// across programs pass `ignore_buffer_offsets = true`.
    pub fn matches(&self, other: &Self, ignore_buffer_offsets: bool) -> bool {
        let equal = self.array_size == other.array_size
            && self.element_size == other.element_size
            && self.ty == other.ty
            && self.array_element_stride == other.array_element_stride;

        if ignore_buffer_offsets {
            equal
        } else {
            equal
                && self.cpu_mem_offset == other.cpu_mem_offset
                && self.gpu_mem_offset == other.gpu_mem_offset
        }
    }

    /// Element size in bytes
    pub const fn element_size_bytes(&self) -> usize {
        self.element_size as usize * 4
    }

    /// Byte offset of array element `index` inside the CPU copy of the block
    pub const fn cpu_byte_offset(&self, index: u32) -> usize {
        (self.cpu_mem_offset as usize + index as usize * self.array_element_stride as usize) * 4
    }
}

/// Reflection data for one object binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuParamObjectDesc {
    /// GPU variable name
    pub name: String,
    /// Object type
    pub ty: GpuParamObjectType,
    /// Binding slot
    pub slot: u32,
    /// Descriptor set
    pub set: u32,
}

impl GpuParamObjectDesc {
    /// Create an object binding description
    pub fn new(name: impl Into<String>, ty: GpuParamObjectType, slot: u32) -> Self {
        Self {
            name: name.into(),
            ty,
            slot,
            set: 0,
        }
    }
}

/// Reflection data for one parameter block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuParamBlockDesc {
    /// Block name
    pub name: String,
    /// Binding slot
    pub slot: u32,
    /// Descriptor set
    pub set: u32,
    /// Size of the block, in 32-bit units
    pub block_size: u32,
    /// Whether the block's buffer may be shared between programs
    pub is_shareable: bool,
}

impl GpuParamBlockDesc {
    /// Block size in bytes
    pub const fn size_bytes(&self) -> usize {
        self.block_size as usize * 4
    }
}

/// Full reflection of one GPU program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuParamDesc {
    /// Data parameters by GPU variable name
    pub params: BTreeMap<String, GpuParamDataDesc>,
    /// Parameter blocks by name
    pub param_blocks: BTreeMap<String, GpuParamBlockDesc>,
    /// Sampler bindings by name
    pub samplers: BTreeMap<String, GpuParamObjectDesc>,
    /// Texture bindings by name
    pub textures: BTreeMap<String, GpuParamObjectDesc>,
    /// Read-write texture bindings by name
    pub load_store_textures: BTreeMap<String, GpuParamObjectDesc>,
    /// Buffer bindings by name
    pub buffers: BTreeMap<String, GpuParamObjectDesc>,
}

impl GpuParamDesc {
    /// Empty reflection
    pub fn new() -> Self {
        Self::default()
    }

    /// Lay out `params` into a new block at `slot` and add both the block and
    /// its parameters.
    pub fn with_block(
        mut self,
        name: impl Into<String>,
        slot: u32,
        is_shareable: bool,
        mut params: Vec<GpuParamDataDesc>,
    ) -> Self {
        let mut block = generate_param_block_desc(name, slot, &mut params);
        block.is_shareable = is_shareable;
        for param in params {
            self.params.insert(param.name.clone(), param);
        }
        self.param_blocks.insert(block.name.clone(), block);
        self
    }

    /// Add an object binding to the table matching its type
    pub fn with_object(mut self, object: GpuParamObjectDesc) -> Self {
        let table = match object.ty.category() {
            GpuObjectCategory::Sampler => &mut self.samplers,
            GpuObjectCategory::Texture => &mut self.textures,
            GpuObjectCategory::LoadStoreTexture => &mut self.load_store_textures,
            GpuObjectCategory::Buffer => &mut self.buffers,
        };
        table.insert(object.name.clone(), object);
        self
    }

    /// Block occupying `slot`, if any
    pub fn block_by_slot(&self, slot: u32) -> Option<&GpuParamBlockDesc> {
        self.param_blocks.values().find(|block| block.slot == slot)
    }

    /// Parameters whose storage lives in the block at `slot`
    pub fn params_in_block(&self, slot: u32) -> impl Iterator<Item = &GpuParamDataDesc> {
        self.params
            .values()
            .filter(move |param| param.param_block_slot == slot)
    }

    /// Highest used slot + 1 for each binding table: blocks, textures,
    /// load-store textures, buffers, samplers.
    pub fn slot_counts(&self) -> SlotCounts {
        fn count(slots: impl Iterator<Item = u32>) -> usize {
            slots.map(|slot| slot as usize + 1).max().unwrap_or(0)
        }

        SlotCounts {
            blocks: count(self.param_blocks.values().map(|b| b.slot)),
            textures: count(self.textures.values().map(|o| o.slot)),
            load_store_textures: count(self.load_store_textures.values().map(|o| o.slot)),
            buffers: count(self.buffers.values().map(|o| o.slot)),
            samplers: count(self.samplers.values().map(|o| o.slot)),
        }
    }
}

/// Number of binding slots per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounts {
    /// Parameter block slots
    pub blocks: usize,
    /// Texture slots
    pub textures: usize,
    /// Load-store texture slots
    pub load_store_textures: usize,
    /// Buffer slots
    pub buffers: usize,
    /// Sampler slots
    pub samplers: usize,
}
