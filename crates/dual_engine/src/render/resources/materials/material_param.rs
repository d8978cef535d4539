//! Material parameter handles
//!
//! One shader parameter can be read by several programs across several
//! passes. A material handle gathers the program-level handle of every
//! program that reads it; writes fan out to all of them and reads come from
//! the first. A handle with no bindings is inert: writes do nothing and reads
//! return zeroes.

use std::sync::Arc;

use crate::render::gpu::{
    GpuBuffer, GpuBufferParam, GpuDataParam, GpuLoadStoreTextureParam, GpuParamValue, GpuResult,
    GpuSamplerParam, GpuStructParam, GpuTextureParam, SamplerState, Texture,
};

/// Typed handle to a material data parameter
#[derive(Clone)]
pub struct MaterialDataParam<T> {
    name: String,
    handles: Vec<GpuDataParam<T>>,
}

impl<T> std::fmt::Debug for MaterialDataParam<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterialDataParam")
            .field("name", &self.name)
            .field("bindings", &self.handles.len())
            .finish()
    }
}

impl<T: GpuParamValue> MaterialDataParam<T> {
    pub(crate) fn new(name: impl Into<String>, handles: Vec<GpuDataParam<T>>) -> Self {
        Self {
            name: name.into(),
            handles,
        }
    }

    /// Shader parameter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write the first element
    pub fn set(&self, value: T) -> GpuResult<()> {
        self.set_at(value, 0)
    }

    /// Write array element `index` in every bound program
    pub fn set_at(&self, value: T, index: u32) -> GpuResult<()> {
        for handle in &self.handles {
            handle.set(value, index)?;
        }
        Ok(())
    }

    /// Read the first element
    pub fn get(&self) -> GpuResult<T> {
        self.get_at(0)
    }

    /// Read array element `index`
    pub fn get_at(&self, index: u32) -> GpuResult<T> {
        match self.handles.first() {
            Some(handle) => handle.get(index),
            None => Ok(T::zeroed()),
        }
    }

    /// Whether no program reads this parameter
    pub fn is_inert(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of program-level bindings
    pub fn binding_count(&self) -> usize {
        self.handles.len()
    }
}

/// Raw byte handle to a material struct parameter
#[derive(Clone)]
pub struct MaterialStructParam {
    name: String,
    handles: Vec<GpuStructParam>,
}

impl std::fmt::Debug for MaterialStructParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterialStructParam")
            .field("name", &self.name)
            .field("bindings", &self.handles.len())
            .finish()
    }
}

impl MaterialStructParam {
    pub(crate) fn new(name: impl Into<String>, handles: Vec<GpuStructParam>) -> Self {
        Self {
            name: name.into(),
            handles,
        }
    }

    /// Shader parameter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write array element `index` in every bound program
    pub fn set(&self, bytes: &[u8], index: u32) -> GpuResult<()> {
        for handle in &self.handles {
            handle.set(bytes, index)?;
        }
        Ok(())
    }

    /// Read array element `index`; empty when inert
    pub fn get(&self, index: u32) -> GpuResult<Vec<u8>> {
        match self.handles.first() {
            Some(handle) => handle.get(index),
            None => Ok(Vec::new()),
        }
    }

    /// Element size in bytes as reflected, 0 when inert
    pub fn element_size(&self) -> usize {
        self.handles.first().map_or(0, GpuStructParam::element_size)
    }

    /// Whether no program reads this parameter
    pub fn is_inert(&self) -> bool {
        self.handles.is_empty()
    }
}

macro_rules! material_object_param {
    ($(#[$meta:meta])* $name:ident, $handle:ty, $resource:ty) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            name: String,
            handles: Vec<$handle>,
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("name", &self.name)
                    .field("bindings", &self.handles.len())
                    .finish()
            }
        }

        impl $name {
            pub(crate) fn new(name: impl Into<String>, handles: Vec<$handle>) -> Self {
                Self {
                    name: name.into(),
                    handles,
                }
            }

            /// Shader parameter name
            pub fn name(&self) -> &str {
                &self.name
            }

            /// Bind `value` in every program, or clear it with `None`
            pub fn set(&self, value: Option<Arc<$resource>>) {
                for handle in &self.handles {
                    handle.set(value.clone());
                }
            }

            /// Resource bound in the first program
            pub fn get(&self) -> Option<Arc<$resource>> {
                self.handles.first().and_then(|handle| handle.get())
            }

            /// Whether no program reads this parameter
            pub fn is_inert(&self) -> bool {
                self.handles.is_empty()
            }
        }
    };
}

material_object_param!(
    /// Handle to a material texture parameter
    MaterialTextureParam, GpuTextureParam, Texture
);
material_object_param!(
    /// Handle to a material load-store texture parameter
    MaterialLoadStoreTextureParam, GpuLoadStoreTextureParam, Texture
);
material_object_param!(
    /// Handle to a material buffer parameter
    MaterialBufferParam, GpuBufferParam, GpuBuffer
);
material_object_param!(
    /// Handle to a material sampler parameter
    MaterialSamplerParam, GpuSamplerParam, SamplerState
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;

    #[test]
    fn test_inert_handles() {
        let data = MaterialDataParam::<Vec4>::new("missing", Vec::new());
        assert!(data.is_inert());
        data.set(Vec4::new(1.0, 2.0, 3.0, 4.0)).unwrap();
        assert_eq!(data.get().unwrap(), Vec4::zeros());

        let texture = MaterialTextureParam::new("albedo", Vec::new());
        texture.set(None);
        assert!(texture.get().is_none());
        assert_eq!(MaterialStructParam::new("s", Vec::new()).element_size(), 0);
    }
}
