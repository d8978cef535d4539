//! Memory management utilities
//!
//! The [`FrameAllocator`] is a linear, stack-disciplined arena for data that only
//! needs to survive until the end of a frame: sim to core sync payloads and other
//! transient byte buffers. It is owned by exactly one thread's run loop and is not
//! shared; allocations are addressed through index-based [`FrameHandle`]s instead
//! of raw pointers.
//!
//! ## Lifecycle
//!
//! ```text
//! mark_frame() ─ alloc() ... alloc() ─ clear()          nested scratch scope
//! alloc() ... alloc() ─ take_frame() ──► FrameData ──► (other thread reads it)
//!                                              │
//!                       recycle(FrameData) ◄───┘        blocks are reused
//! ```
//!
//! A handle becomes stale once the scope it was allocated in is cleared or the
//! frame it belongs to is taken. Reading a stale handle is reported as
//! [`FrameAllocError::Stale`].

use thiserror::Error;

/// Default size of a single allocator block in bytes
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Default number of spare blocks kept around for reuse
pub const DEFAULT_MAX_FREE_BLOCKS: usize = 8;

/// Frame allocator errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameAllocError {
    /// The handle's scope was cleared or its frame was handed off
    #[error("Frame allocation {handle:?} is no longer live")]
    Stale {
        /// Offending handle
        handle: FrameHandle,
    },

    /// The handle was allocated in a different frame than the one being read
    #[error("Frame allocation {handle:?} does not belong to frame {frame}")]
    ForeignFrame {
        /// Offending handle
        handle: FrameHandle,
        /// Frame that was asked to resolve it
        frame: u64,
    },

    /// `clear()` without a matching `mark_frame()`
    #[error("clear() called without a matching mark_frame()")]
    UnbalancedClear,
}

/// Result type for frame allocator operations
pub type FrameAllocResult<T> = Result<T, FrameAllocError>;

/// Handle to a byte range inside a frame allocator block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle {
    frame: u64,
    epoch: u64,
    block: u32,
    offset: u32,
    len: u32,
}

impl FrameHandle {
    /// Length of the allocation in bytes
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether this is a zero-sized allocation
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Frame this allocation belongs to
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    fn range(&self) -> std::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.len as usize
    }
}

struct FrameBlock {
    data: Vec<u8>,
    cursor: usize,
}

struct FrameMark {
    block_count: usize,
    cursor: usize,
    allocated_bytes: usize,
}

/// Thread-owned linear allocator for frame-scoped data
pub struct FrameAllocator {
    block_size: usize,
    max_free_blocks: usize,
    blocks: Vec<FrameBlock>,
    free_blocks: Vec<Vec<u8>>,
    marks: Vec<FrameMark>,
    live_epochs: Vec<u64>,
    next_epoch: u64,
    frame: u64,
    allocated_bytes: usize,
}

impl FrameAllocator {
    /// Create an allocator with the given block size and spare block budget
    pub fn new(block_size: usize, max_free_blocks: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            max_free_blocks,
            blocks: Vec::new(),
            free_blocks: Vec::new(),
            marks: Vec::new(),
            live_epochs: vec![0],
            next_epoch: 1,
            frame: 0,
            allocated_bytes: 0,
        }
    }

    /// Allocate `len` zeroed bytes from the current frame.
    ///
    /// Never fails; a new block is started when the active one is full, and
    /// allocations larger than the block size get a dedicated block.
    pub fn alloc(&mut self, len: usize) -> FrameHandle {
        let fits = self
            .blocks
            .last()
            .is_some_and(|block| block.data.len() - block.cursor >= len);
        if !fits {
            self.push_block(len);
        }

        let block_index = self.blocks.len() - 1;
        let block = &mut self.blocks[block_index];
        let offset = block.cursor;
        block.cursor += len;
        block.data[offset..offset + len].fill(0);
        self.allocated_bytes += len;

        FrameHandle {
            frame: self.frame,
            epoch: self.current_epoch(),
            block: block_index as u32,
            offset: offset as u32,
            len: len as u32,
        }
    }

    /// Allocate a copy of `bytes`
    pub fn alloc_copy(&mut self, bytes: &[u8]) -> FrameHandle {
        let handle = self.alloc(bytes.len());
        let block = &mut self.blocks[handle.block as usize];
        block.data[handle.range()].copy_from_slice(bytes);
        handle
    }

    /// Begin a nested scope; everything allocated after this call is released
    /// by the matching [`clear`](Self::clear).
    pub fn mark_frame(&mut self) {
        self.marks.push(FrameMark {
            block_count: self.blocks.len(),
            cursor: self.blocks.last().map_or(0, |block| block.cursor),
            allocated_bytes: self.allocated_bytes,
        });
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        self.live_epochs.push(epoch);
    }

    /// Release every allocation made since the last [`mark_frame`](Self::mark_frame)
    pub fn clear(&mut self) -> FrameAllocResult<()> {
        let mark = self.marks.pop().ok_or(FrameAllocError::UnbalancedClear)?;
        self.live_epochs.pop();

        while self.blocks.len() > mark.block_count {
            if let Some(block) = self.blocks.pop() {
                self.release_block(block.data);
            }
        }
        if let Some(block) = self.blocks.last_mut() {
            block.cursor = mark.cursor;
        }
        self.allocated_bytes = mark.allocated_bytes;
        Ok(())
    }

    /// Detach everything allocated in this frame so it can be read on another
    /// thread. All outstanding handles resolve against the returned data only.
    pub fn take_frame(&mut self) -> FrameData {
        if !self.marks.is_empty() {
            log::warn!(
                "Taking frame {} with {} unbalanced mark(s); closing them",
                self.frame,
                self.marks.len()
            );
            self.marks.clear();
        }

        let blocks = std::mem::take(&mut self.blocks)
            .into_iter()
            .map(|block| block.data)
            .collect();
        let data = FrameData {
            frame: self.frame,
            blocks,
        };

        self.frame += 1;
        self.live_epochs.clear();
        self.live_epochs.push(self.next_epoch);
        self.next_epoch += 1;
        self.allocated_bytes = 0;
        data
    }

    /// Return the blocks of a consumed frame for reuse
    pub fn recycle(&mut self, data: FrameData) {
        for block in data.blocks {
            self.release_block(block);
        }
    }

    /// Resolve a live handle
    pub fn bytes(&self, handle: FrameHandle) -> FrameAllocResult<&[u8]> {
        self.check_live(handle)?;
        Ok(&self.blocks[handle.block as usize].data[handle.range()])
    }

    /// Resolve a live handle for writing
    pub fn bytes_mut(&mut self, handle: FrameHandle) -> FrameAllocResult<&mut [u8]> {
        self.check_live(handle)?;
        Ok(&mut self.blocks[handle.block as usize].data[handle.range()])
    }

    /// Bytes currently allocated in this frame
    pub const fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    /// Blocks in use by the current frame
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Spare blocks waiting for reuse
    pub fn free_block_count(&self) -> usize {
        self.free_blocks.len()
    }

    /// Index of the frame currently being filled
    pub const fn frame_index(&self) -> u64 {
        self.frame
    }

    fn current_epoch(&self) -> u64 {
        self.live_epochs.last().copied().unwrap_or_default()
    }

    fn check_live(&self, handle: FrameHandle) -> FrameAllocResult<()> {
        let live = handle.frame == self.frame
            && self.live_epochs.contains(&handle.epoch)
            && self
                .blocks
                .get(handle.block as usize)
                .is_some_and(|block| handle.range().end <= block.cursor);
        if live {
            Ok(())
        } else {
            Err(FrameAllocError::Stale { handle })
        }
    }

    fn push_block(&mut self, min_len: usize) {
        let wanted = self.block_size.max(min_len);
        let reuse = self
            .free_blocks
            .iter()
            .position(|block| block.len() >= wanted);
        let data = match reuse {
            Some(index) => self.free_blocks.swap_remove(index),
            None => vec![0; wanted],
        };
        self.blocks.push(FrameBlock { data, cursor: 0 });
    }

    fn release_block(&mut self, block: Vec<u8>) {
        if self.free_blocks.len() < self.max_free_blocks {
            self.free_blocks.push(block);
        }
    }
}

impl Default for FrameAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE, DEFAULT_MAX_FREE_BLOCKS)
    }
}

/// A finished frame detached from its allocator
///
/// Owned and `Send`; travels with a sync batch to the core thread and is handed
/// back to [`FrameAllocator::recycle`] afterwards.
pub struct FrameData {
    frame: u64,
    blocks: Vec<Vec<u8>>,
}

impl FrameData {
    /// An empty frame, for payloads that carry no bytes
    pub const fn empty(frame: u64) -> Self {
        Self {
            frame,
            blocks: Vec::new(),
        }
    }

    /// Frame index this data was taken from
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Resolve a handle allocated in this frame
    pub fn bytes(&self, handle: FrameHandle) -> FrameAllocResult<&[u8]> {
        if handle.frame != self.frame {
            return Err(FrameAllocError::ForeignFrame {
                handle,
                frame: self.frame,
            });
        }
        self.blocks
            .get(handle.block as usize)
            .and_then(|block| block.get(handle.range()))
            .ok_or(FrameAllocError::Stale { handle })
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameData")
            .field("frame", &self.frame)
            .field("blocks", &self.blocks.len())
            .finish()
    }
}
