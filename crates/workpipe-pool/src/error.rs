use std::time::Duration;

use workpipe_frame::CorrelationId;

/// Errors returned by pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Transport-level error while opening channels.
    #[error("transport error: {0}")]
    Transport(#[from] workpipe_transport::TransportError),

    /// Frame-level error while sending a request.
    #[error("frame error: {0}")]
    Frame(#[from] workpipe_frame::FrameError),

    /// No response arrived before the caller's deadline.
    #[error("request {id} timed out after {timeout:?}")]
    Timeout {
        id: CorrelationId,
        timeout: Duration,
    },

    /// The pool is shutting down or already stopped.
    #[error("pool is shutting down")]
    ShuttingDown,

    /// Every worker has terminated; nothing can serve the request.
    #[error("no active workers remain")]
    NoActiveWorkers,

    /// A channel failed and the pool stopped serving.
    #[error("pool faulted: {0}")]
    Faulted(String),

    /// Every id in the configured id space is outstanding.
    #[error("correlation id space exhausted ({outstanding} requests outstanding)")]
    IdSpaceExhausted { outstanding: usize },

    /// A freshly allocated id was already registered. Internal invariant
    /// violation; the pool faults.
    #[error("correlation id {id} allocated while still outstanding")]
    IdCollision { id: CorrelationId },

    /// The pool configuration is unusable.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// A pool thread could not be started.
    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        role: String,
        source: std::io::Error,
    },
}

/// Failure reported by a [`Processor`](crate::Processor).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProcessError {
    /// The request failed; the worker keeps serving.
    #[error("{0}")]
    Recoverable(String),

    /// The worker is no longer trustworthy and terminates after replying.
    #[error("fatal worker error: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;
