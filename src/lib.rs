//! # duocap-core
//!
//! Core of a dual-stream capture device manager: a continuous *video*
//! stream and a single-shot *still* stream sharing one DMA-capable
//! image pipeline, with one frame buffer queue per stream and an
//! interrupt-context notification path that keeps both in sync.
//!
//! This crate owns:
//!
//! - the per-stream [`FrameBufferQueue`](queue::FrameBufferQueue) —
//!   free/queued/dma-current/done bookkeeping for caller-owned memory;
//! - [`FormatCatalog`](format::FormatCatalog) — the sensor/pipeline
//!   pixel-format and frame-size intersection, built once at
//!   construction;
//! - the pure [`arbiter::next_video_state`] function deciding which
//!   stream owns the shared DMA engine;
//! - [`StreamManager`](manager::StreamManager), the single entry point
//!   for every operation, including the interrupt-context
//!   `notify_dma_done` completion path.
//!
//! It does **not** own character-device glue, poll stubs, board-level
//! interrupt wiring, image decoding/codec logic, power management,
//! device discovery, or user-space buffer allocation — those live in
//! layers above this crate.
//!
//! ## Quick start
//!
//! ```ignore
//! use duocap_core::prelude::*;
//!
//! let manager = StreamManager::new(sensor, pipeline, StreamManagerConfig::default())?;
//! manager.open()?;
//! manager.request_buffers(Stream::Video, 4, QueueMode::Ring)?;
//! manager.queue(Stream::Video, my_buffer)?;
//! manager.streamon(Stream::Video)?;
//! let frame = manager.dequeue(Stream::Video)?;
//! # Ok::<(), duocap_core::CoreError>(())
//! ```
//!
//! ## Concurrency model
//!
//! Every per-stream state variable and queue is guarded by a
//! [`parking_lot::Mutex`]; the blocking half of `dequeue` rendezvous on
//! a [`parking_lot::Condvar`]-backed single slot per stream. The
//! section of `notify_dma_done` that mutates a stream's queue and
//! state stands in for the original driver's interrupt-disable
//! critical section — it is short, takes no other lock, and releases
//! before waking any waiter.
//!
//! ## Error handling
//!
//! All fallible operations return [`CoreError`] via [`Result`]. The one
//! exception is `notify_dma_done`, which runs in interrupt context and
//! cannot propagate failure outward: it logs and drops unrecognized
//! input instead (see its documentation for the exact conditions).

pub mod arbiter;
pub mod buffer;
pub mod collaborators;
pub mod config;
pub mod dma;
pub mod error;
pub mod format;
pub mod manager;
pub mod ops;
pub mod queue;
pub mod state;

#[cfg(test)]
mod scenarios;

pub use buffer::{BufferDescriptor, Stream, UserBuffer};
pub use collaborators::{CtrlDescriptor, CtrlType, ImageData, SensorCtl, SensorFormatEntry};
pub use config::{StreamManagerConfig, StreamManagerConfigBuilder};
pub use error::{CoreError, ExtControlsError, Result};
pub use format::{
    FormatCatalog, FormatEntry, FormatId, FrameIntervalCaps, FrameSizeCaps, FrameSizeEntry, PixFormat, StepwiseInterval,
    StepwiseSize, StreamParm,
};
pub use manager::{ManagerStats, StreamManager};
pub use queue::{FrameBufferQueue, QueueMode};
pub use state::StreamVariant;

/// Common imports for building against this crate.
pub mod prelude {
    pub use crate::buffer::{BufferDescriptor, Stream, UserBuffer};
    pub use crate::collaborators::{CtrlDescriptor, CtrlType, ImageData, SensorCtl, SensorFormatEntry};
    pub use crate::config::StreamManagerConfig;
    pub use crate::error::{CoreError, Result};
    pub use crate::format::{FormatId, PixFormat};
    pub use crate::manager::StreamManager;
    pub use crate::queue::QueueMode;
}
