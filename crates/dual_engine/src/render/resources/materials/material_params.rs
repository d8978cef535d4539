//! Program-independent parameter values
//!
//! [`MaterialParams`] holds material parameter values keyed by shader
//! parameter name, detached from any GPU program. A material snapshots into it
//! before its bindings are rebuilt (shader swap) and replays it afterwards;
//! cloning goes through its serialized form.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::{MaterialError, MaterialResult};
use crate::render::gpu::{value_type_compatible, GpuBuffer, GpuParamDataType, GpuParamValue, SamplerState, Texture};

/// One cached parameter value
#[derive(Debug, Clone)]
pub enum MaterialParamValue {
    /// Raw data elements of a declared type
    Data {
        /// Declared type
        ty: GpuParamDataType,
        /// Element size in bytes
        element_size: usize,
        /// Elements back to back
        data: Vec<u8>,
    },
    /// Texture binding
    Texture(Option<Arc<Texture>>),
    /// Load-store texture binding
    LoadStoreTexture(Option<Arc<Texture>>),
    /// Buffer binding
    Buffer(Option<Arc<GpuBuffer>>),
    /// Sampler binding
    Sampler(Option<Arc<SamplerState>>),
}

impl MaterialParamValue {
    /// Number of stored elements; object bindings count as one
    pub fn array_size(&self) -> usize {
        match self {
            Self::Data {
                element_size, data, ..
            } if *element_size > 0 => data.len() / element_size,
            Self::Data { .. } => 0,
            _ => 1,
        }
    }

    /// Bytes of element `index`
    pub fn element(&self, index: usize) -> Option<&[u8]> {
        match self {
            Self::Data {
                element_size, data, ..
            } => data.get(index * element_size..(index + 1) * element_size),
            _ => None,
        }
    }
}

/// Cached parameter values of a material
#[derive(Debug, Clone, Default)]
pub struct MaterialParams {
    params: BTreeMap<String, MaterialParamValue>,
}

macro_rules! object_value {
    ($set:ident, $get:ident, $variant:ident, $resource:ty) => {
        #[doc = concat!("Store a ", stringify!($variant), " binding")]
        pub fn $set(&mut self, name: impl Into<String>, value: Option<Arc<$resource>>) {
            self.params.insert(name.into(), MaterialParamValue::$variant(value));
        }

        #[doc = concat!("Stored ", stringify!($variant), " binding")]
        pub fn $get(&self, name: &str) -> Option<Arc<$resource>> {
            match self.params.get(name) {
                Some(MaterialParamValue::$variant(value)) => value.clone(),
                _ => None,
            }
        }
    };
}

impl MaterialParams {
    /// No values
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Stored value of `name`
    pub fn get(&self, name: &str) -> Option<&MaterialParamValue> {
        self.params.get(name)
    }

    /// All values by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MaterialParamValue)> {
        self.params.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Store `value` as `name`, replacing what was there
    pub fn insert(&mut self, name: impl Into<String>, value: MaterialParamValue) {
        self.params.insert(name.into(), value);
    }

    /// Forget `name`
    pub fn remove(&mut self, name: &str) -> Option<MaterialParamValue> {
        self.params.remove(name)
    }

    /// Store element `index` of data parameter `name`
    pub fn set_data<T: GpuParamValue>(&mut self, name: &str, value: T, index: u32) {
        self.set_raw(
            name,
            T::DATA_TYPE,
            std::mem::size_of::<T>(),
            index,
            bytemuck::bytes_of(&value),
        );
    }

    /// Element `index` of data parameter `name`, if stored with a compatible type
    pub fn data<T: GpuParamValue>(&self, name: &str, index: u32) -> Option<T> {
        let value = self.params.get(name)?;
        match value {
            MaterialParamValue::Data {
                ty, element_size, ..
            } if value_type_compatible(*ty, T::DATA_TYPE)
                && *element_size >= std::mem::size_of::<T>() =>
            {
                let element = value.element(index as usize)?;
                Some(bytemuck::pod_read_unaligned(&element[..std::mem::size_of::<T>()]))
            }
            _ => None,
        }
    }

    /// Store raw element `index` of a data parameter.
    ///
    /// A stored value with an incompatible type or element size is replaced.
    /// The array grows as needed; `bytes` longer than an element are cut.
    pub fn set_raw(
        &mut self,
        name: &str,
        ty: GpuParamDataType,
        element_size: usize,
        index: u32,
        bytes: &[u8],
    ) {
        let entry = self
            .params
            .entry(name.to_string())
            .or_insert_with(|| MaterialParamValue::Data {
                ty,
                element_size,
                data: Vec::new(),
            });

        let compatible = matches!(
            entry,
            MaterialParamValue::Data { ty: stored, element_size: stored_size, .. }
                if value_type_compatible(*stored, ty) && *stored_size == element_size
        );
        if !compatible {
            *entry = MaterialParamValue::Data {
                ty,
                element_size,
                data: Vec::new(),
            };
        }

        if let MaterialParamValue::Data { data, .. } = entry {
            let start = index as usize * element_size;
            if data.len() < start + element_size {
                data.resize(start + element_size, 0);
            }
            let len = bytes.len().min(element_size);
            data[start..start + len].copy_from_slice(&bytes[..len]);
        }
    }

    object_value!(set_texture, texture, Texture, Texture);
    object_value!(set_load_store_texture, load_store_texture, LoadStoreTexture, Texture);
    object_value!(set_buffer, buffer, Buffer, GpuBuffer);
    object_value!(set_sampler, sampler, Sampler, SamplerState);

    /// Serializable form; resources are replaced by indices into `table`
    pub fn to_serialized(&self, table: &mut ResourceTable) -> SerializedMaterialParams {
        let params = self
            .params
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    MaterialParamValue::Data {
                        ty,
                        element_size,
                        data,
                    } => SerializedParamValue::Data {
                        ty: *ty,
                        element_size: *element_size as u32,
                        data: data.clone(),
                    },
                    MaterialParamValue::Texture(texture) => {
                        SerializedParamValue::Texture(texture.as_ref().map(|t| table.push_texture(t)))
                    }
                    MaterialParamValue::LoadStoreTexture(texture) => {
                        SerializedParamValue::LoadStoreTexture(
                            texture.as_ref().map(|t| table.push_texture(t)),
                        )
                    }
                    MaterialParamValue::Buffer(buffer) => {
                        SerializedParamValue::Buffer(buffer.as_ref().map(|b| table.push_buffer(b)))
                    }
                    MaterialParamValue::Sampler(sampler) => {
                        SerializedParamValue::Sampler(sampler.as_ref().map(|s| table.push_sampler(s)))
                    }
                };
                (name.clone(), value)
            })
            .collect();
        SerializedMaterialParams { params }
    }

    /// Rebuild from a serialized form, resolving resources through `table`
    pub fn from_serialized(
        serialized: SerializedMaterialParams,
        table: &ResourceTable,
    ) -> MaterialResult<Self> {
        let params = serialized
            .params
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    SerializedParamValue::Data {
                        ty,
                        element_size,
                        data,
                    } => MaterialParamValue::Data {
                        ty,
                        element_size: element_size as usize,
                        data,
                    },
                    SerializedParamValue::Texture(index) => {
                        MaterialParamValue::Texture(resolve(index, &table.textures, "texture")?)
                    }
                    SerializedParamValue::LoadStoreTexture(index) => {
                        MaterialParamValue::LoadStoreTexture(resolve(index, &table.textures, "texture")?)
                    }
                    SerializedParamValue::Buffer(index) => {
                        MaterialParamValue::Buffer(resolve(index, &table.buffers, "buffer")?)
                    }
                    SerializedParamValue::Sampler(index) => {
                        MaterialParamValue::Sampler(resolve(index, &table.samplers, "sampler")?)
                    }
                };
                Ok((name, value))
            })
            .collect::<MaterialResult<_>>()?;
        Ok(Self { params })
    }
}

fn resolve<T>(index: Option<u32>, table: &[Arc<T>], kind: &'static str) -> MaterialResult<Option<Arc<T>>> {
    index
        .map(|index| {
            table
                .get(index as usize)
                .cloned()
                .ok_or(MaterialError::MissingResource { kind, index })
        })
        .transpose()
}

/// Resources referenced by a serialized snapshot
///
/// Shared resources are not serialized themselves; snapshots refer to them
/// by index and both copies keep pointing at the same objects.
#[derive(Debug, Default)]
pub struct ResourceTable {
    textures: Vec<Arc<Texture>>,
    buffers: Vec<Arc<GpuBuffer>>,
    samplers: Vec<Arc<SamplerState>>,
}

impl ResourceTable {
    /// Index of `texture`, adding it if new
    pub fn push_texture(&mut self, texture: &Arc<Texture>) -> u32 {
        push_unique(&mut self.textures, texture)
    }

    /// Index of `buffer`, adding it if new
    pub fn push_buffer(&mut self, buffer: &Arc<GpuBuffer>) -> u32 {
        push_unique(&mut self.buffers, buffer)
    }

    /// Index of `sampler`, adding it if new
    pub fn push_sampler(&mut self, sampler: &Arc<SamplerState>) -> u32 {
        push_unique(&mut self.samplers, sampler)
    }

    /// Number of distinct resources
    pub fn len(&self) -> usize {
        self.textures.len() + self.buffers.len() + self.samplers.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn push_unique<T>(table: &mut Vec<Arc<T>>, value: &Arc<T>) -> u32 {
    match table.iter().position(|existing| Arc::ptr_eq(existing, value)) {
        Some(index) => index as u32,
        None => {
            table.push(value.clone());
            (table.len() - 1) as u32
        }
    }
}

/// Serializable parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerializedParamValue {
    /// Raw data elements
    Data {
        /// Declared type
        ty: GpuParamDataType,
        /// Element size in bytes
        element_size: u32,
        /// Elements back to back
        data: Vec<u8>,
    },
    /// Texture table index
    Texture(Option<u32>),
    /// Texture table index of a load-store binding
    LoadStoreTexture(Option<u32>),
    /// Buffer table index
    Buffer(Option<u32>),
    /// Sampler table index
    Sampler(Option<u32>),
}

/// Serializable [`MaterialParams`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedMaterialParams {
    /// Values by name
    pub params: BTreeMap<String, SerializedParamValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Color, Vec4};
    use crate::render::gpu::TextureDesc;

    #[test]
    fn test_data_values_and_arrays() {
        let mut params = MaterialParams::new();
        params.set_data("tint", Color::RED, 0);
        params.set_data("weights", 1.0f32, 2);

        assert_eq!(params.data::<Color>("tint", 0), Some(Color::RED));
        assert_eq!(params.data::<Vec4>("tint", 0), Some(Vec4::new(1.0, 0.0, 0.0, 1.0)));
        assert_eq!(params.data::<f32>("tint", 0), None);

        let weights = params.get("weights").unwrap();
        assert_eq!(weights.array_size(), 3);
        assert_eq!(params.data::<f32>("weights", 0), Some(0.0));
        assert_eq!(params.data::<f32>("weights", 2), Some(1.0));
        assert_eq!(params.data::<f32>("weights", 3), None);
    }

    #[test]
    fn test_incompatible_write_replaces_entry() {
        let mut params = MaterialParams::new();
        params.set_data("x", 1.0f32, 1);
        params.set_data("x", 5i32, 0);
        assert_eq!(params.get("x").unwrap().array_size(), 1);
        assert_eq!(params.data::<i32>("x", 0), Some(5));
        assert_eq!(params.data::<f32>("x", 0), None);
    }

    #[test]
    fn test_serialized_form_shares_resources() {
        let texture = Texture::new(TextureDesc::new_2d("albedo", 4, 4));
        let mut params = MaterialParams::new();
        params.set_texture("albedo", Some(texture.clone()));
        params.set_texture("detail", Some(texture.clone()));
        params.set_sampler("samp", None);
        params.set_data("gloss", 0.25f32, 0);

        let mut table = ResourceTable::default();
        let serialized = params.to_serialized(&mut table);
        assert_eq!(table.len(), 1);

        let restored = MaterialParams::from_serialized(serialized, &table).unwrap();
        assert!(Arc::ptr_eq(&restored.texture("detail").unwrap(), &texture));
        assert!(restored.sampler("samp").is_none());
        assert_eq!(restored.data::<f32>("gloss", 0), Some(0.25));
    }

    #[test]
    fn test_missing_resource_reported() {
        let mut serialized = SerializedMaterialParams::default();
        serialized
            .params
            .insert("albedo".to_string(), SerializedParamValue::Texture(Some(3)));
        assert_eq!(
            MaterialParams::from_serialized(serialized, &ResourceTable::default()).unwrap_err(),
            MaterialError::MissingResource { kind: "texture", index: 3 }
        );
    }
}
