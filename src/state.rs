//! Per-stream state variable and the single-slot rendezvous used to
//! hand a completed buffer from `NotifyPath` to a blocked `dequeue`
//! (spec "StreamState").

use parking_lot::{Condvar, Mutex};

use crate::buffer::{BufferDescriptor, Stream};
use crate::queue::FrameBufferQueue;

/// A stream's position in the capture state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamVariant {
    StreamOff,
    StreamOn,
    Dma,
}

/// Why a blocked `dequeue` was woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    /// A buffer completed and was handed directly to the waiter.
    DmaDone,
    /// `cancel_dequeue` was called for this stream.
    DqCancel,
    /// The still stream just stopped; video should re-check whether it
    /// can resume DMA before sleeping again.
    StillStop,
}

/// Sentinel for "run until stopped": video always uses it; still uses
/// it before `take_picture_start` and again once a finite burst
/// completes.
pub const INFINITE: i64 = -1;

/// The queue and rendezvous bookkeeping for one stream, behind a
/// single lock. Merging them closes the race a separate
/// queue-mutex/rendezvous-mutex pair has: "is a buffer already done?"
/// and "register as a waiter for the next one" must be one atomic
/// step, or a completion landing between the two checks is posted to
/// nobody and then never re-checked by the waiter.
struct Sync {
    queue: FrameBufferQueue,
    waiting: bool,
    done_slot: Option<BufferDescriptor>,
    cause: Option<WakeCause>,
}

impl Sync {
    fn take_done(&mut self) -> Option<BufferDescriptor> {
        let (slot, desc) = self.queue.pop_done()?;
        self.queue.release(slot);
        Some(desc)
    }
}

/// Per-stream mutable state: the STREAMOFF/STREAMON/DMA variable, the
/// remaining-captures counter, and the buffer queue plus its blocking
/// rendezvous, all guarded by one lock.
pub struct StreamState {
    variant: Mutex<StreamVariant>,
    remaining_captures: Mutex<i64>,
    sync: Mutex<Sync>,
    condvar: Condvar,
}

impl StreamState {
    #[must_use]
    pub fn new(stream: Stream, capacity_hint: usize) -> Self {
        Self {
            variant: Mutex::new(StreamVariant::StreamOff),
            remaining_captures: Mutex::new(INFINITE),
            sync: Mutex::new(Sync {
                queue: FrameBufferQueue::with_capacity_hint(stream, capacity_hint),
                waiting: false,
                done_slot: None,
                cause: None,
            }),
            condvar: Condvar::new(),
        }
    }

    #[must_use]
    pub fn variant(&self) -> StreamVariant {
        *self.variant.lock()
    }

    pub fn set_variant(&self, v: StreamVariant) {
        *self.variant.lock() = v;
    }

    #[must_use]
    pub fn remaining(&self) -> i64 {
        *self.remaining_captures.lock()
    }

    pub fn set_remaining(&self, n: i64) {
        *self.remaining_captures.lock() = n;
    }

    /// Decrements the remaining-captures counter, unless it is already
    /// the infinite sentinel or zero.
    pub fn decrement_remaining(&self) {
        let mut r = self.remaining_captures.lock();
        if *r > 0 {
            *r -= 1;
        }
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        matches!(self.variant(), StreamVariant::StreamOn | StreamVariant::Dma)
    }

    /// Runs `f` against this stream's queue under its lock.
    pub fn with_queue<R>(&self, f: impl FnOnce(&mut FrameBufferQueue) -> R) -> R {
        let mut sync = self.sync.lock();
        f(&mut sync.queue)
    }

    /// Non-blocking check for an already-completed buffer.
    pub fn try_take_done(&self) -> Option<BufferDescriptor> {
        self.sync.lock().take_done()
    }

    /// Blocks until a buffer is done or `post` delivers a cancel/chain
    /// cause, returning whatever was posted. Re-checks for a
    /// completion under the same lock it registers `waiting` under, so
    /// a completion that lands between a caller's last non-blocking
    /// check and this call is never missed.
    pub fn wait_for_done(&self) -> (Option<BufferDescriptor>, WakeCause) {
        let mut sync = self.sync.lock();
        if let Some(desc) = sync.take_done() {
            return (Some(desc), WakeCause::DmaDone);
        }
        sync.waiting = true;
        loop {
            self.condvar.wait(&mut sync);
            if let Some(cause) = sync.cause.take() {
                sync.waiting = false;
                return (sync.done_slot.take(), cause);
            }
            // Spurious OS wake with no posted cause: keep waiting.
        }
    }

    #[must_use]
    pub fn has_waiter(&self) -> bool {
        self.sync.lock().waiting
    }

    /// Posts a wake-up carrying an already-popped buffer (or none, for
    /// cancel/chain causes). If two posts race before the waiter
    /// observes either, only the most recent is seen — by design (spec
    /// Design Note "cancel races with DMA-done").
    pub fn post(&self, done_slot: Option<BufferDescriptor>, cause: WakeCause) {
        let mut sync = self.sync.lock();
        sync.done_slot = done_slot;
        sync.cause = Some(cause);
        self.condvar.notify_one();
    }

    /// Marks the dma-current slot done and, if a `dequeue` is already
    /// registered as waiting, atomically pops it and wakes the waiter
    /// with it — all under the one lock, so there is no gap between
    /// "buffer completed" and "waiter notified" for a concurrent
    /// `wait_for_done` to fall into.
    pub fn complete_dma(&self, bytes_used: usize, error: bool) -> Option<u32> {
        let mut sync = self.sync.lock();
        let slot = sync.queue.dma_done(bytes_used, error)?;
        if sync.waiting {
            if let Some(desc) = sync.take_done() {
                sync.waiting = false;
                sync.done_slot = Some(desc);
                sync.cause = Some(WakeCause::DmaDone);
                self.condvar.notify_one();
            }
        }
        Some(slot)
    }
}
