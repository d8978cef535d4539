//! Bindable GPU resources: textures, sampler states and buffers
//!
//! These carry only their creation descriptor across the thread boundary.
//! Pixel, sampler and buffer contents are the backend's concern.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::foundation::memory::{FrameAllocator, FrameData};
use crate::render::core_object::{
    CoreObject, CoreObjectCore, CoreObjectCoreState, CoreObjectState, CoreSyncData, SyncKind,
    SyncResult,
};

/// Texel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureFormat {
    /// 8-bit RGBA, sRGB encoded
    #[default]
    Rgba8Srgb,
    /// 8-bit RGBA, linear
    Rgba8Unorm,
    /// 16-bit float RGBA
    Rgba16Float,
    /// Single 32-bit float channel
    R32Float,
    /// 32-bit float depth
    Depth32Float,
}

/// Texture creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureDesc {
    /// Debug name
    pub name: String,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Depth in texels, 1 for 2D textures
    pub depth: u32,
    /// Mip level count
    pub mip_levels: u32,
    /// Texel format
    pub format: TextureFormat,
}

impl TextureDesc {
    /// Single-mip 2D texture in the default format
    pub fn new_2d(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            depth: 1,
            mip_levels: 1,
            format: TextureFormat::default(),
        }
    }

    /// Set the texel format
    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the mip level count
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }
}

/// Texture filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterMode {
    /// Nearest texel
    Point,
    /// Linear interpolation
    #[default]
    Linear,
    /// Anisotropic filtering
    Anisotropic,
}

/// Texture addressing outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddressMode {
    /// Repeat
    #[default]
    Wrap,
    /// Repeat mirrored
    Mirror,
    /// Clamp to edge
    Clamp,
}

/// Sampler state creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SamplerStateDesc {
    /// Minification/magnification filter
    pub filter: FilterMode,
    /// Addressing mode on all axes
    pub address_mode: AddressMode,
    /// Maximum anisotropy when filtering anisotropically
    pub max_anisotropy: u32,
}

/// Buffer element layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GpuBufferKind {
    /// Raw bytes
    #[default]
    Byte,
    /// Array of fixed-size elements
    Structured,
}

/// Buffer creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuBufferDesc {
    /// Debug name
    pub name: String,
    /// Element layout
    pub kind: GpuBufferKind,
    /// Number of elements
    pub element_count: u32,
    /// Size of one element in bytes
    pub element_size: u32,
    /// Whether shaders may write to the buffer
    pub random_write: bool,
}

impl GpuBufferDesc {
    /// Structured buffer of `element_count` elements of `element_size` bytes
    pub fn structured(name: impl Into<String>, element_count: u32, element_size: u32) -> Self {
        Self {
            name: name.into(),
            kind: GpuBufferKind::Structured,
            element_count,
            element_size,
            random_write: false,
        }
    }

    /// Total size in bytes
    pub const fn size_bytes(&self) -> u64 {
        self.element_count as u64 * self.element_size as u64
    }
}

/// Sim and core types for a resource that syncs only its descriptor
macro_rules! descriptor_resource {
    (
        $(#[$meta:meta])*
        $sim:ident, $(#[$core_meta:meta])* $core:ident, $desc:ty, $kind:ident
    ) => {
        $(#[$meta])*
        pub struct $sim {
            desc: $desc,
            state: CoreObjectState,
            core: OnceLock<Arc<$core>>,
        }

        impl $sim {
            /// Create the resource
            pub fn new(desc: $desc) -> Arc<Self> {
                Arc::new(Self {
                    desc,
                    state: CoreObjectState::new(),
                    core: OnceLock::new(),
                })
            }

            /// Creation parameters
            pub fn desc(&self) -> &$desc {
                &self.desc
            }

            /// Core-thread counterpart
            pub fn core(&self) -> Arc<$core> {
                self.core
                    .get_or_init(|| {
                        Arc::new($core {
                            state: CoreObjectCoreState::new(self.state.id()),
                            desc: self.desc.clone(),
                        })
                    })
                    .clone()
            }
        }

        impl std::fmt::Debug for $sim {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($sim))
                    .field("id", &self.state.id())
                    .field("desc", &self.desc)
                    .finish()
            }
        }

        impl CoreObject for $sim {
            fn core_state(&self) -> &CoreObjectState {
                &self.state
            }

            fn core_object(&self) -> Arc<dyn CoreObjectCore> {
                self.core()
            }

            fn sync_to_core(&self, _frame: &mut FrameAllocator) -> SyncResult<CoreSyncData> {
                Ok(CoreSyncData::new(SyncKind::$kind))
            }
        }

        $(#[$core_meta])*
        #[derive(Debug)]
        pub struct $core {
            state: CoreObjectCoreState,
            desc: $desc,
        }

        impl $core {
            /// Creation parameters
            pub fn desc(&self) -> &$desc {
                &self.desc
            }
        }

        impl CoreObjectCore for $core {
            fn core_state(&self) -> &CoreObjectCoreState {
                &self.state
            }

            fn initialize(&self) {
                log::trace!("Created {} {}", stringify!($kind), self.state.id());
            }

            fn sync_to_core(&self, data: CoreSyncData, _frame: &FrameData) -> SyncResult<()> {
                data.expect_kind(SyncKind::$kind)?;
                data.finish()
            }
        }
    };
}

descriptor_resource!(
    /// Sim-side texture
    Texture,
    /// Core-side texture
    TextureCore,
    TextureDesc,
    Texture
);

descriptor_resource!(
    /// Sim-side sampler state
    SamplerState,
    /// Core-side sampler state
    SamplerStateCore,
    SamplerStateDesc,
    Sampler
);

descriptor_resource!(
    /// Sim-side generic buffer
    GpuBuffer,
    /// Core-side generic buffer
    GpuBufferCore,
    GpuBufferDesc,
    Buffer
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_shares_id_and_desc() {
        let texture = Texture::new(TextureDesc::new_2d("albedo", 256, 128).with_mip_levels(4));
        let core = texture.core();
        assert_eq!(core.core_state().id(), texture.core_state().id());
        assert_eq!(core.desc().mip_levels, 4);
        assert!(Arc::ptr_eq(&core, &texture.core()));
    }

    #[test]
    fn test_wrong_payload_kind_rejected() {
        let sampler = SamplerState::new(SamplerStateDesc::default());
        let frame = FrameData::empty(0);
        assert!(sampler
            .core()
            .sync_to_core(CoreSyncData::new(SyncKind::Texture), &frame)
            .is_err());
        assert!(sampler
            .core()
            .sync_to_core(CoreSyncData::new(SyncKind::Sampler), &frame)
            .is_ok());
    }

    #[test]
    fn test_buffer_size() {
        let buffer = GpuBuffer::new(GpuBufferDesc::structured("lights", 16, 32));
        assert_eq!(buffer.desc().size_bytes(), 512);
    }
}
