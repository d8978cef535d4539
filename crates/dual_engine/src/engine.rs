//! Engine façade
//!
//! The [`Engine`] lives on the sim thread. It owns the sim thread's frame
//! allocator, the [`CoreObjectManager`] collecting sync payloads and the
//! handle to the core thread that applies them.

use std::sync::Arc;

use thiserror::Error;

use crate::config::ConfigError;
use crate::core::EngineConfig;
use crate::foundation::logging;
use crate::foundation::memory::FrameAllocator;
use crate::render::backend::RenderBackendKind;
use crate::render::core_object::{CoreObject, CoreObjectManager, CoreThread, SyncError};
use crate::render::gpu::GpuError;
use crate::render::resources::materials::{Material, MaterialError};
use crate::render::shader::Shader;

/// Sim-thread engine handle
pub struct Engine {
    config: EngineConfig,
    frame: FrameAllocator,
    manager: CoreObjectManager,
    core_thread: CoreThread,
}

impl Engine {
    /// Validate `config`, set up logging and spawn the core thread
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        logging::init_with_level(&config.log_level);
        log::info!("Initializing engine ({} backend)...", config.renderer.backend);

        let core_thread = CoreThread::spawn(
            &config.renderer.core_thread_name,
            config.renderer.sync_queue_capacity,
        )
        .map_err(|e| EngineError::InitializationFailed(format!("Core thread: {}", e)))?;
        let frame = FrameAllocator::new(
            config.frame_allocator.block_size,
            config.frame_allocator.max_free_blocks,
        );

        Ok(Self {
            config,
            frame,
            manager: CoreObjectManager::new(),
            core_thread,
        })
    }

    /// Configuration the engine was created with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Active render backend
    pub fn backend(&self) -> RenderBackendKind {
        self.config.renderer.backend
    }

    /// Sim-thread frame allocator
    pub fn frame_allocator(&self) -> &FrameAllocator {
        &self.frame
    }

    /// Sync bookkeeping
    pub fn manager(&self) -> &CoreObjectManager {
        &self.manager
    }

    /// Queue payloads for `object` and its dirty dependencies; they are sent
    /// with the next [`end_frame`](Self::end_frame). Returns the number queued.
    pub fn sync(&mut self, object: &dyn CoreObject) -> Result<usize, EngineError> {
        Ok(self.manager.sync(object, &mut self.frame)?)
    }

    /// Hand everything queued this frame to the core thread. Returns the
    /// number of payloads sent.
    pub fn end_frame(&mut self) -> Result<usize, EngineError> {
        for frame in self.core_thread.recycled_frames() {
            self.frame.recycle(frame);
        }

        let batch = self.manager.take_batch(&mut self.frame);
        let count = batch.len();
        if batch.is_empty() {
            self.frame.recycle(batch.frame);
            return Ok(0);
        }

        log::trace!("Submitting frame {} with {} payload(s)", batch.frame.frame(), count);
        self.core_thread.submit(batch)?;
        Ok(count)
    }

    /// Block until the core thread has applied every submitted frame
    pub fn flush(&mut self) -> Result<(), EngineError> {
        self.core_thread.flush()?;
        for frame in self.core_thread.recycled_frames() {
            self.frame.recycle(frame);
        }
        Ok(())
    }

    /// Hand `shader` to the core thread and wait for its programs to compile
    pub fn load_shader(&mut self, shader: &Arc<Shader>) -> Result<(), EngineError> {
        self.sync(shader.as_ref())?;
        self.end_frame()?;
        shader.block_until_loaded()?;
        log::debug!("Shader '{}' loaded", shader.name());
        Ok(())
    }

    /// Load the material's shader if needed and build its bindings.
    /// Returns whether the material is initialized.
    pub fn initialize_material(&mut self, material: &mut Material) -> Result<bool, EngineError> {
        if material.is_initialized() {
            return Ok(true);
        }
        if let Some(shader) = material.shader().cloned() {
            self.load_shader(&shader)?;
        }
        Ok(material.try_initialize()?)
    }

    /// Send what is still queued and stop the core thread
    pub fn shutdown(mut self) -> Result<(), EngineError> {
        log::info!("Engine shutdown requested");
        self.end_frame()?;
        self.core_thread.shutdown()?;
        log::info!("Engine shutdown complete");
        Ok(())
    }
}

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Initialization error
    #[error("Engine initialization failed: {0}")]
    InitializationFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Sim/core hand-off error
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// GPU program or parameter error
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// Material error
    #[error("Material error: {0}")]
    Material(#[from] MaterialError),
}
