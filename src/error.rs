//! Error types returned by the capture core's public operations.
//!
//! `NotifyPath` is the one exception: it runs in interrupt context and
//! cannot fail outward, so it logs and drops rather than returning a
//! `CoreError` (see `manager::StreamManager::notify_dma_done`).

use thiserror::Error;

/// Errors surfaced by the capture core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Null/unknown/out-of-range argument, or a legacy control request
    /// made against a control type the legacy form does not support.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// Operation forbidden given the stream's current state.
    #[error("operation not permitted in current state: {0}")]
    NotPermitted(String),

    /// The queue has no free slot to satisfy the request.
    #[error("out of memory")]
    OutOfMemory,

    /// A blocking dequeue was woken by an explicit cancel.
    #[error("dequeue canceled")]
    Canceled,

    /// The sensor or image pipeline does not support the requested
    /// format, size, or control.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Opaque failure reported by a `SensorCtl`/`ImageData` collaborator.
    #[error("collaborator error: {0}")]
    Collaborator(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Result of a multi-control `S_EXT_CTRLS`-style operation: reports
/// the index of the first control that failed to apply, alongside the
/// cause, so the caller can tell which of several controls in the same
/// request were already committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtControlsError {
    pub error_idx: usize,
    pub cause: CoreError,
}

impl std::fmt::Display for ExtControlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "control at index {} failed: {}", self.error_idx, self.cause)
    }
}

impl std::error::Error for ExtControlsError {}
