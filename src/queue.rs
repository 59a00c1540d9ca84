//! Per-stream frame buffer queue (spec "FrameBufferQueue"): container
//! slots that move between four sub-lists — free, queued, dma-current,
//! and done — under a single lock per stream.

use std::collections::VecDeque;

use crate::buffer::{BufferDescriptor, Stream};
use crate::error::{CoreError, Result};

/// Overflow policy applied when `dma_done` has nowhere to put a
/// completed slot because the done sub-list is already full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Oldest undequeued completion is evicted to make room; DMA may
    /// also recycle the oldest done slot directly as its next target
    /// when nothing is queued, keeping capture running without
    /// consumer participation.
    Ring,
    /// No eviction: once done/queued/dma-current account for every
    /// slot, further DMA starts are refused until the consumer
    /// dequeues something.
    Fifo,
}

/// A stream's buffer pool: `capacity` container slots, each always in
/// exactly one of free, queued, dma-current, or done (spec invariant
/// "slots partition").
pub struct FrameBufferQueue {
    stream: Stream,
    mode: QueueMode,
    capacity: usize,
    free: Vec<u32>,
    queued: VecDeque<u32>,
    dma_current: Option<u32>,
    done: VecDeque<u32>,
    payload: Vec<Option<BufferDescriptor>>,
}

impl FrameBufferQueue {
    #[must_use]
    pub fn new(stream: Stream) -> Self {
        Self::with_capacity_hint(stream, 0)
    }

    /// Builds an empty queue with its sub-lists pre-sized to
    /// `capacity_hint`. `realloc` still has to be called to actually
    /// populate the free list; this only avoids the first few
    /// reallocations of the backing `Vec`s/`VecDeque`s once it is.
    #[must_use]
    pub fn with_capacity_hint(stream: Stream, capacity_hint: usize) -> Self {
        Self {
            stream,
            mode: QueueMode::Fifo,
            capacity: 0,
            free: Vec::with_capacity(capacity_hint),
            queued: VecDeque::with_capacity(capacity_hint),
            dma_current: None,
            done: VecDeque::with_capacity(capacity_hint),
            payload: Vec::with_capacity(capacity_hint),
        }
    }

    pub fn set_mode(&mut self, mode: QueueMode) {
        self.mode = mode;
    }

    #[must_use]
    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    #[must_use]
    pub fn dma_count(&self) -> usize {
        if self.dma_current.is_some() {
            1
        } else {
            0
        }
    }

    #[must_use]
    pub fn done_count(&self) -> usize {
        self.done.len()
    }

    /// Re-sizes the pool to `n` slots. Fails `NotPermitted` while a
    /// slot is dma-current; otherwise resets every sub-list (any
    /// queued or done instances are dropped along with their payload).
    pub fn realloc(&mut self, n: usize) -> Result<()> {
        if self.dma_current.is_some() {
            return Err(CoreError::NotPermitted(format!(
                "cannot reallocate {:?} queue while a slot is dma-current",
                self.stream
            )));
        }
        self.capacity = n;
        self.free.clear();
        self.free.extend(0..n as u32);
        self.queued.clear();
        self.done.clear();
        self.payload.clear();
        self.payload.extend((0..n).map(|_| None));
        tracing::debug!(stream = ?self.stream, capacity = n, "queue reallocated");
        Ok(())
    }

    /// Takes a slot off the free list, or `OutOfMemory` if none remain.
    pub fn acquire_free(&mut self) -> Result<u32> {
        self.free.pop().ok_or(CoreError::OutOfMemory)
    }

    /// Moves `slot` from free to the tail of queued, storing `desc` as
    /// its payload.
    pub fn enqueue(&mut self, slot: u32, mut desc: BufferDescriptor) {
        desc.index = slot;
        self.payload[slot as usize] = Some(desc);
        self.queued.push_back(slot);
        tracing::trace!(stream = ?self.stream, slot, "buffer queued");
    }

    /// Pops the head of queued and marks it dma-current. In `Ring`
    /// mode, if nothing is queued, recycles the oldest done slot
    /// directly into dma-current instead of stalling. Returns `None`
    /// if there is truly nothing available to start.
    pub fn pop_for_dma(&mut self) -> Option<u32> {
        debug_assert!(self.dma_current.is_none());
        if let Some(slot) = self.queued.pop_front() {
            self.dma_current = Some(slot);
            return Some(slot);
        }
        if self.mode == QueueMode::Ring {
            if let Some(slot) = self.done.pop_front() {
                self.dma_current = Some(slot);
                return Some(slot);
            }
        }
        None
    }

    /// The descriptor currently attached to dma-current, if any.
    #[must_use]
    pub fn dma_current(&self) -> Option<&BufferDescriptor> {
        self.dma_current
            .map(|slot| self.payload[slot as usize].as_ref().expect("dma-current slot has no payload"))
    }

    /// Forcibly clears dma-current without going through `dma_done`,
    /// returning the slot straight to free. Used when a cancel is
    /// known to have taken effect synchronously (full close, forced
    /// streamoff) rather than via a later completion.
    pub fn cancel_dma_current(&mut self) {
        if let Some(slot) = self.dma_current.take() {
            self.payload[slot as usize] = None;
            self.free.push(slot);
        }
    }

    /// Stamps the dma-current slot with completion metadata and moves
    /// it to the tail of done. In `Ring` mode, evicts the current head
    /// of done first if done is already at capacity. Returns the slot
    /// moved, or `None` if nothing was dma-current.
    pub fn dma_done(&mut self, bytes_used: usize, error: bool) -> Option<u32> {
        let slot = self.dma_current.take()?;
        if let Some(desc) = self.payload[slot as usize].as_mut() {
            desc.bytes_used = bytes_used;
            desc.error = error;
        }
        if self.mode == QueueMode::Ring && self.done.len() >= self.capacity.max(1) {
            if let Some(evicted) = self.done.pop_front() {
                self.payload[evicted as usize] = None;
                self.free.push(evicted);
            }
        }
        self.done.push_back(slot);
        tracing::trace!(stream = ?self.stream, slot, bytes_used, error, "dma completed");
        Some(slot)
    }

    /// Removes and returns the head of done, alongside its slot id.
    /// The payload stays attached until `release` is called; the slot
    /// is temporarily outside every sub-list in the interval between.
    pub fn pop_done(&mut self) -> Option<(u32, BufferDescriptor)> {
        let slot = self.done.pop_front()?;
        let desc = self.payload[slot as usize]?;
        Some((slot, desc))
    }

    /// Returns `slot` to free, clearing its payload.
    pub fn release(&mut self, slot: u32) {
        self.payload[slot as usize] = None;
        self.free.push(slot);
    }
}
