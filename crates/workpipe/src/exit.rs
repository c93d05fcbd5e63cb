use std::fmt;
use std::io;

use workpipe_frame::FrameError;
use workpipe_pool::PoolError;
use workpipe_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
/// A response did not match what was sent.
pub const VERIFY_FAILED: i32 = 40;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Create { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ChannelClosed | FrameError::IncompleteFrame { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn pool_error(context: &str, err: PoolError) -> CliError {
    match err {
        PoolError::Transport(err) => transport_error(context, err),
        PoolError::Frame(err) => frame_error(context, err),
        PoolError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PoolError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        PoolError::ShuttingDown | PoolError::NoActiveWorkers | PoolError::Faulted(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use workpipe_frame::CorrelationId;

    use super::*;

    #[test]
    fn timeouts_map_to_124() {
        let err = pool_error(
            "submit",
            PoolError::Timeout {
                id: CorrelationId(3),
                timeout: Duration::from_millis(10),
            },
        );
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("submit: "));
    }

    #[test]
    fn nested_errors_unwrap_to_their_layer() {
        let err = pool_error(
            "submit",
            PoolError::Frame(FrameError::PayloadTooLarge { size: 9, max: 8 }),
        );
        assert_eq!(err.code, DATA_INVALID);

        let err = pool_error(
            "start",
            PoolError::Transport(TransportError::Io(io::Error::from(
                io::ErrorKind::PermissionDenied,
            ))),
        );
        assert_eq!(err.code, PERMISSION_DENIED);

        let err = pool_error(
            "start",
            PoolError::Frame(FrameError::Transport(TransportError::Io(io::Error::from(
                io::ErrorKind::PermissionDenied,
            )))),
        );
        assert_eq!(err.code, PERMISSION_DENIED);
    }

    #[test]
    fn config_errors_are_usage_errors() {
        let err = pool_error("start", PoolError::InvalidConfig("workers".to_string()));
        assert_eq!(err.code, USAGE);
    }
}
