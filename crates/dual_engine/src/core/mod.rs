//! # Core Engine Module
//!
//! Engine-wide configuration shared by the sim and core threads.

pub mod config;

pub use config::{EngineConfig, FrameAllocatorConfig, RendererConfig};
pub use crate::config::{Config, ConfigError};
