use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{
    decode_frame, encode_frame, encode_sentinel, expected_len, Frame, FrameConfig, Packet,
    WireFormat,
};
use crate::error::{FrameError, Result};

/// `tokio_util` codec for the workpipe wire format.
///
/// Decodes into [`Packet`]s and encodes either [`Frame`]s or packets, so a
/// sentinel can be sent through the same sink.
#[derive(Debug, Clone)]
pub struct WireCodec {
    format: WireFormat,
    max_payload_size: usize,
}

impl WireCodec {
    pub fn new(config: &FrameConfig) -> Self {
        Self {
            format: config.wire_format,
            max_payload_size: config.max_payload_size,
        }
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new(&FrameConfig::default())
    }
}

impl Decoder for WireCodec {
    type Item = Packet;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        decode_frame(src, self.format, self.max_payload_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        match self.decode(src)? {
            Some(packet) => Ok(Some(packet)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::IncompleteFrame {
                expected: expected_len(src),
                received: src.len(),
            }),
        }
    }
}

impl Encoder<Frame> for WireCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        if frame.payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.max_payload_size,
            });
        }
        if frame.tag.is_some() != (self.format == WireFormat::Tagged) {
            return Err(FrameError::FormatMismatch {
                expected: self.format,
            });
        }
        encode_frame(&frame, dst)
    }
}

impl Encoder<Packet> for WireCodec {
    type Error = FrameError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<()> {
        match packet {
            Packet::Sentinel => {
                encode_sentinel(dst);
                Ok(())
            }
            Packet::Frame(frame) => Encoder::<Frame>::encode(self, frame, dst),
        }
    }
}
