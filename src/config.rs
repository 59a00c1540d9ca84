//! Configuration surface for [`StreamManager`](crate::manager::StreamManager).
//!
//! The state machine itself has no tunables — every knob here is
//! either a pre-allocation hint or naming used for log spans.

/// Configuration for a [`StreamManager`](crate::manager::StreamManager).
#[derive(Debug, Clone)]
pub struct StreamManagerConfig {
    /// Device path recorded alongside manager state and included in
    /// log spans (e.g. `/dev/video0`).
    pub device_path: String,

    /// Pre-allocation hint for each stream's free-list `Vec`. Queues
    /// still start at zero capacity until `request_buffers` is called;
    /// this only avoids a few reallocations for the common case.
    pub queue_capacity_hint: usize,
}

impl Default for StreamManagerConfig {
    fn default() -> Self {
        Self {
            device_path: "/dev/video0".to_string(),
            queue_capacity_hint: 4,
        }
    }
}

impl StreamManagerConfig {
    #[must_use]
    pub fn builder() -> StreamManagerConfigBuilder {
        StreamManagerConfigBuilder::default()
    }

    /// Rejects a zero capacity hint; everything else is accepted as-is
    /// (the manager itself validates format/size arguments at call
    /// time, not at construction).
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut issues = Vec::new();
        if self.queue_capacity_hint == 0 {
            issues.push("queue_capacity_hint must be at least 1".to_string());
        }
        if self.device_path.is_empty() {
            issues.push("device_path must not be empty".to_string());
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Fluent builder for [`StreamManagerConfig`].
#[derive(Debug, Clone, Default)]
pub struct StreamManagerConfigBuilder {
    device_path: Option<String>,
    queue_capacity_hint: Option<usize>,
}

impl StreamManagerConfigBuilder {
    #[must_use]
    pub fn device_path(mut self, path: impl Into<String>) -> Self {
        self.device_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn queue_capacity_hint(mut self, hint: usize) -> Self {
        self.queue_capacity_hint = Some(hint);
        self
    }

    #[must_use]
    pub fn build(self) -> StreamManagerConfig {
        let default = StreamManagerConfig::default();
        StreamManagerConfig {
            device_path: self.device_path.unwrap_or(default.device_path),
            queue_capacity_hint: self.queue_capacity_hint.unwrap_or(default.queue_capacity_hint),
        }
    }
}
