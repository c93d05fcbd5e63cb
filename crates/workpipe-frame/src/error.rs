/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The decoded header is not a valid frame (length over the configured
    /// maximum, tagged length shorter than the tag, unknown kind byte).
    #[error("corrupt frame: {reason}")]
    CorruptFrame { reason: String },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A plain frame cannot carry an empty payload; zero length is the sentinel.
    #[error("zero-length payload is reserved for the sentinel frame")]
    ReservedLength,

    /// A frame's layout does not match the stream's configured wire format.
    #[error("frame layout does not match the {expected:?} wire format")]
    FormatMismatch { expected: crate::codec::WireFormat },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The endpoint could not be opened or configured.
    #[error("transport error: {0}")]
    Transport(#[from] workpipe_transport::TransportError),

    /// The stream ended in the middle of a frame.
    #[error("incomplete frame (expected {expected} bytes, got {received})")]
    IncompleteFrame { expected: usize, received: usize },

    /// The stream ended cleanly between frames, or the channel was closed locally.
    #[error("channel closed")]
    ChannelClosed,
}

impl FrameError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptFrame {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
