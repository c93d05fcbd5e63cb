//! Length-prefixed framing for the workpipe down/up channels.
//!
//! Every frame starts with an 8-byte little-endian length. A zero length is
//! the sentinel ("terminate") and carries nothing else. Tagged frames add a
//! correlation id and a kind byte so concurrent callers can share one
//! channel pair:
//! - plain: `[len][payload]`
//! - tagged: `[len][id][kind][payload]`, where `len` covers id + kind + payload
//!
//! No partial reads, no buffer management in user code.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod channel;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::WireCodec;
pub use channel::{channel, ChannelReceiver, ChannelSender};
pub use codec::{
    decode_frame, encode_frame, encode_sentinel, CorrelationId, Frame, FrameConfig, FrameKind,
    Packet, Tag, WireFormat, DEFAULT_MAX_PAYLOAD, LENGTH_SIZE, TAG_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
