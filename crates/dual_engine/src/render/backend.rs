//! Render backend identification
//!
//! The concrete D3D11 and Vulkan backends live outside this crate. Here they are
//! only named, so techniques can declare which backend they target and the
//! material runtime can pick the best one for the active backend.

use serde::{Deserialize, Serialize};

/// Render API a technique is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderBackendKind {
    /// Direct3D 11
    D3D11,
    /// Vulkan
    #[default]
    Vulkan,
}

impl std::fmt::Display for RenderBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::D3D11 => write!(f, "D3D11"),
            Self::Vulkan => write!(f, "Vulkan"),
        }
    }
}

/// Programmable pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GpuProgramType {
    /// Vertex program
    Vertex,
    /// Fragment (pixel) program
    Fragment,
    /// Geometry program
    Geometry,
    /// Hull (tessellation control) program
    Hull,
    /// Domain (tessellation evaluation) program
    Domain,
    /// Compute program
    Compute,
}

impl GpuProgramType {
    /// Number of program stages
    pub const COUNT: usize = 6;

    /// Every stage, in slot order
    pub const ALL: [Self; Self::COUNT] = [
        Self::Vertex,
        Self::Fragment,
        Self::Geometry,
        Self::Hull,
        Self::Domain,
        Self::Compute,
    ];

    /// Slot index of this stage in per-pass arrays
    pub const fn index(self) -> usize {
        match self {
            Self::Vertex => 0,
            Self::Fragment => 1,
            Self::Geometry => 2,
            Self::Hull => 3,
            Self::Domain => 4,
            Self::Compute => 5,
        }
    }
}
