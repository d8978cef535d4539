//! # Engine Configuration
//!
//! Settings for the frame allocator, the core thread and logging, grouped
//! per subsystem. Every group has builder-style setters and sensible
//! defaults, and [`EngineConfig`] can be stored as TOML or RON.

use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigError};
use crate::render::backend::RenderBackendKind;

/// # Frame Allocator Configuration
///
/// Sizing of the sim thread's frame allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameAllocatorConfig {
    /// Size of each allocation block in bytes
    pub block_size: usize,
    /// Free blocks kept around for reuse
    pub max_free_blocks: usize,
}

impl FrameAllocatorConfig {
    /// Create a frame allocator configuration
    pub fn new(block_size: usize, max_free_blocks: usize) -> Self {
        Self {
            block_size,
            max_free_blocks,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size < 64 {
            return Err(ConfigError::Invalid(format!(
                "Frame block size must be at least 64 bytes, got {}",
                self.block_size
            )));
        }
        Ok(())
    }
}

impl Default for FrameAllocatorConfig {
    fn default() -> Self {
        Self::new(64 * 1024, 4)
    }
}

/// # Renderer Configuration
///
/// Backend selection and the sim-to-core hand-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Backend materials pick their technique for
    pub backend: RenderBackendKind,
    /// Sync batches that may queue up before the sim thread blocks
    pub sync_queue_capacity: usize,
    /// Name of the core thread
    pub core_thread_name: String,
}

impl RendererConfig {
    /// Create a renderer configuration for `backend`
    pub fn new(backend: RenderBackendKind) -> Self {
        Self {
            backend,
            sync_queue_capacity: 2,
            core_thread_name: "core".to_string(),
        }
    }

    /// Set the sync queue capacity
    pub fn with_sync_queue_capacity(mut self, capacity: usize) -> Self {
        self.sync_queue_capacity = capacity;
        self
    }

    /// Set the core thread name
    pub fn with_core_thread_name(mut self, name: impl Into<String>) -> Self {
        self.core_thread_name = name.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "Sync queue capacity must be at least 1".to_string(),
            ));
        }
        if self.core_thread_name.is_empty() {
            return Err(ConfigError::Invalid("Core thread name cannot be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new(RenderBackendKind::default())
    }
}

/// # Engine Configuration
///
/// Top-level configuration handed to [`Engine::new`](crate::Engine::new).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Log filter, e.g. `"info"` or `"dual_engine=debug"`
    pub log_level: String,
    /// Frame allocator sizing
    pub frame_allocator: FrameAllocatorConfig,
    /// Renderer settings
    pub renderer: RendererConfig,
}

impl EngineConfig {
    /// Create an engine configuration with defaults
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            frame_allocator: FrameAllocatorConfig::default(),
            renderer: RendererConfig::default(),
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the render backend
    pub fn with_backend(mut self, backend: RenderBackendKind) -> Self {
        self.renderer.backend = backend;
        self
    }

    /// Set frame allocator sizing
    pub fn with_frame_allocator(mut self, frame_allocator: FrameAllocatorConfig) -> Self {
        self.frame_allocator = frame_allocator;
        self
    }

    /// Set renderer settings
    pub fn with_renderer(mut self, renderer: RendererConfig) -> Self {
        self.renderer = renderer;
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.frame_allocator.validate()?;
        self.renderer.validate()?;
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for EngineConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.renderer.backend, RenderBackendKind::Vulkan);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = EngineConfig::new().with_renderer(RendererConfig::default().with_sync_queue_capacity(0));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = EngineConfig::new().with_frame_allocator(FrameAllocatorConfig::new(8, 0));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        let config = EngineConfig::new()
            .with_log_level("debug")
            .with_backend(RenderBackendKind::D3D11);

        config.save_to_file(&path).unwrap();
        assert_eq!(EngineConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_ron_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.ron");
        let config = EngineConfig::new()
            .with_renderer(RendererConfig::default().with_core_thread_name("render"));

        config.save_to_file(&path).unwrap();
        assert_eq!(EngineConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        assert!(matches!(
            EngineConfig::default().save_to_file(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
