use std::time::Duration;

use workpipe_frame::{FrameConfig, WireFormat, DEFAULT_MAX_PAYLOAD};
use workpipe_transport::TransportKind;

use crate::error::{PoolError, Result};

/// Default correlation id space: ids wrap at 2^32.
pub const DEFAULT_ID_SPACE: u64 = 1 << 32;

/// Configuration for a [`Pool`](crate::Pool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads. Default: 2.
    pub workers: usize,
    /// Deadline used by [`Pool::submit_default`](crate::Pool::submit_default). Default: 5s.
    pub request_timeout: Duration,
    /// Largest payload accepted on either channel. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Byte stream the down and up channels run on. Default: OS pipes.
    pub transport: TransportKind,
    /// Correlation ids are drawn from `0..id_space`. Default: 2^32.
    pub id_space: u64,
    /// How long shutdown waits for workers to drain before discarding queued work. Default: 5s.
    pub shutdown_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            request_timeout: Duration::from_secs(5),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            transport: TransportKind::default(),
            id_space: DEFAULT_ID_SPACE,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Shrink or grow the correlation id space. Small spaces are mostly useful in tests.
    pub fn with_id_space(mut self, id_space: u64) -> Self {
        self.id_space = id_space;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Reject configurations the pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PoolError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.id_space == 0 {
            return Err(PoolError::InvalidConfig(
                "id_space must be at least 1".to_string(),
            ));
        }
        if self.max_payload_size == 0 {
            return Err(PoolError::InvalidConfig(
                "max_payload_size must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(PoolError::InvalidConfig(
                "request_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Frame settings shared by both pool channels.
    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            wire_format: WireFormat::Tagged,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
