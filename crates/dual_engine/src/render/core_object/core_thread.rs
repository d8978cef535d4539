//! Core-thread run loop
//!
//! The core thread owns every core object's mutable state. It receives sync
//! batches over a bounded channel, initializes objects seen for the first
//! time, applies payloads in the order they were queued and sends the
//! consumed frame back for reuse.

use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};

use super::error::{SyncError, SyncResult};
use super::manager::{SyncBatch, SyncMessage};
use crate::foundation::memory::FrameData;

/// Commands understood by the core thread
#[derive(Debug)]
pub enum CoreCommand {
    /// Apply a batch of sync payloads
    Sync(SyncBatch),
    /// Acknowledge once every earlier command has been processed
    Flush(Sender<()>),
    /// Stop the run loop
    Shutdown,
}

/// Outcome of applying one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Payloads applied successfully
    pub applied: usize,
    /// Payloads rejected by their core object
    pub failed: usize,
    /// Core objects initialized by this batch
    pub initialized: usize,
}

/// Apply `batch` on the calling thread, returning the report and the frame
/// data for recycling.
///
/// A payload that fails to apply is logged and skipped; the rest of the batch
/// still goes through.
pub fn process_batch(batch: SyncBatch) -> (BatchReport, FrameData) {
    let SyncBatch { frame, messages } = batch;
    let mut report = BatchReport::default();

    for SyncMessage {
        target,
        data,
        initialize,
    } in messages
    {
        let state = target.core_state();
        if initialize && state.mark_initialized() {
            target.initialize();
            report.initialized += 1;
        }

        let kind = data.kind();
        match target.sync_to_core(data, &frame) {
            Ok(()) => report.applied += 1,
            Err(err) => {
                log::error!(
                    "Failed to apply {} sync data to core object {}: {}",
                    kind,
                    state.id(),
                    err
                );
                report.failed += 1;
            }
        }
    }

    (report, frame)
}

/// Handle to the spawned core thread
pub struct CoreThread {
    commands: Sender<CoreCommand>,
    recycled: Receiver<FrameData>,
    handle: Option<JoinHandle<()>>,
}

impl CoreThread {
    /// Spawn the core thread. `queue_capacity` bounds the number of batches
    /// in flight; submitting blocks once it is reached.
    pub fn spawn(name: &str, queue_capacity: usize) -> std::io::Result<Self> {
        let (command_tx, command_rx) = channel::bounded(queue_capacity.max(1));
        let (recycle_tx, recycle_rx) = channel::unbounded();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(command_rx, recycle_tx))?;

        log::info!("Spawned core thread '{}' (queue capacity {})", name, queue_capacity);
        Ok(Self {
            commands: command_tx,
            recycled: recycle_rx,
            handle: Some(handle),
        })
    }

    /// Queue a batch for the core thread
    pub fn submit(&self, batch: SyncBatch) -> SyncResult<()> {
        self.commands
            .send(CoreCommand::Sync(batch))
            .map_err(|_| SyncError::Disconnected)
    }

    /// Block until every batch submitted so far has been applied
    pub fn flush(&self) -> SyncResult<()> {
        let (done_tx, done_rx) = channel::bounded(1);
        self.commands
            .send(CoreCommand::Flush(done_tx))
            .map_err(|_| SyncError::Disconnected)?;
        done_rx.recv().map_err(|_| SyncError::Disconnected)
    }

    /// Frames the core thread has finished with
    pub fn recycled_frames(&self) -> Vec<FrameData> {
        self.recycled.try_iter().collect()
    }

    /// Stop the thread after it drains the commands queued before this call
    pub fn shutdown(mut self) -> SyncResult<()> {
        self.stop()
    }

    fn stop(&mut self) -> SyncResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        // The thread may already be gone; joining reports how it ended.
        let _ = self.commands.send(CoreCommand::Shutdown);
        handle.join().map_err(|_| {
            log::error!("Core thread panicked");
            SyncError::Disconnected
        })
    }
}

impl Drop for CoreThread {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("Core thread did not shut down cleanly: {}", err);
        }
    }
}

fn run(commands: Receiver<CoreCommand>, recycled: Sender<FrameData>) {
    log::debug!("Core thread running");

    for command in commands.iter() {
        match command {
            CoreCommand::Sync(batch) => {
                let messages = batch.len();
                let (report, frame) = process_batch(batch);
                log::debug!(
                    "Applied frame {}: {}/{} payload(s), {} initialized, {} failed",
                    frame.frame(),
                    report.applied,
                    messages,
                    report.initialized,
                    report.failed
                );
                // Nobody left to recycle into during shutdown.
                let _ = recycled.send(frame);
            }
            CoreCommand::Flush(done) => {
                let _ = done.send(());
            }
            CoreCommand::Shutdown => break,
        }
    }

    log::debug!("Core thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::memory::FrameAllocator;
    use crate::render::core_object::{CoreObjectCore, CoreObjectManager};
    use crate::render::gpu::{GpuParamBlockBuffer, GpuParamBlockUsage};

    #[test]
    fn test_batch_applied_on_core_thread() {
        let block = GpuParamBlockBuffer::new(16, GpuParamBlockUsage::Dynamic);
        block.write(0, &[1, 2, 3, 4]).unwrap();

        let mut manager = CoreObjectManager::new();
        let mut frame = FrameAllocator::default();
        manager.sync(block.as_ref(), &mut frame).unwrap();

        let core_thread = CoreThread::spawn("core-test", 2).unwrap();
        core_thread.submit(manager.take_batch(&mut frame)).unwrap();
        core_thread.flush().unwrap();

        let core = block.core();
        assert!(core.core_state().is_initialized());
        assert_eq!(&core.cached_data()[..4], &[1, 2, 3, 4]);

        let recycled = core_thread.recycled_frames();
        assert_eq!(recycled.len(), 1);
        for data in recycled {
            frame.recycle(data);
        }
        assert!(frame.free_block_count() > 0);
        core_thread.shutdown().unwrap();
    }

    #[test]
    fn test_failed_payload_does_not_stop_batch() {
        let good = GpuParamBlockBuffer::new(8, GpuParamBlockUsage::Static);
        let bad = GpuParamBlockBuffer::new(8, GpuParamBlockUsage::Static);

        let mut manager = CoreObjectManager::new();
        let mut frame = FrameAllocator::default();
        manager.sync(bad.as_ref(), &mut frame).unwrap();
        manager.sync(good.as_ref(), &mut frame).unwrap();
        let mut batch = manager.take_batch(&mut frame);
        // Route the first payload to the wrong receiver.
        batch.messages[0].target = crate::render::gpu::Texture::new(
            crate::render::gpu::TextureDesc::new_2d("t", 1, 1),
        )
        .core();

        let (report, _) = process_batch(batch);
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.initialized, 2);
    }
}
