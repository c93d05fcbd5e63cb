use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Length prefix: one little-endian u64.
pub const LENGTH_SIZE: usize = 8;

/// Correlation tag: id (8) + kind (1) = 9 bytes.
pub const TAG_SIZE: usize = 9;

/// Wire bytes of the sentinel frame (a zero length prefix, nothing after it).
pub const SENTINEL: [u8; LENGTH_SIZE] = [0; LENGTH_SIZE];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Identifier binding a response to the request that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a tagged frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Coordinator → worker assignment.
    Request,
    /// Worker → coordinator result.
    Reply,
    /// Worker → coordinator result for a failed computation.
    Failure,
}

impl FrameKind {
    fn to_byte(self) -> u8 {
        match self {
            FrameKind::Request => 0,
            FrameKind::Reply => 1,
            FrameKind::Failure => 2,
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(FrameKind::Request),
            1 => Ok(FrameKind::Reply),
            2 => Ok(FrameKind::Failure),
            other => Err(FrameError::corrupt(format!("unknown frame kind {other}"))),
        }
    }
}

/// Correlation extension header carried by tagged frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub id: CorrelationId,
    pub kind: FrameKind,
}

/// Which of the two wire layouts a stream uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WireFormat {
    /// `[len][payload]`, single caller, strict FIFO.
    Plain,
    /// `[len][id][kind][payload]`, multiplexed callers.
    #[default]
    Tagged,
}

/// A framed message, optionally tagged for correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Correlation header; `None` for plain frames.
    pub tag: Option<Tag>,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create an untagged frame.
    pub fn plain(payload: impl Into<Bytes>) -> Self {
        Self {
            tag: None,
            payload: payload.into(),
        }
    }

    /// Create a tagged frame.
    pub fn tagged(id: CorrelationId, kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            tag: Some(Tag { id, kind }),
            payload: payload.into(),
        }
    }

    pub fn request(id: CorrelationId, payload: impl Into<Bytes>) -> Self {
        Self::tagged(id, FrameKind::Request, payload)
    }

    pub fn reply(id: CorrelationId, payload: impl Into<Bytes>) -> Self {
        Self::tagged(id, FrameKind::Reply, payload)
    }

    pub fn failure(id: CorrelationId, payload: impl Into<Bytes>) -> Self {
        Self::tagged(id, FrameKind::Failure, payload)
    }

    /// Correlation id, if tagged.
    pub fn id(&self) -> Option<CorrelationId> {
        self.tag.map(|tag| tag.id)
    }

    /// Frame kind, if tagged.
    pub fn kind(&self) -> Option<FrameKind> {
        self.tag.map(|tag| tag.kind)
    }

    /// Value of the length prefix for this frame.
    pub fn body_len(&self) -> usize {
        match self.tag {
            Some(_) => TAG_SIZE + self.payload.len(),
            None => self.payload.len(),
        }
    }

    /// The total wire size of this frame (length prefix + body).
    pub fn wire_size(&self) -> usize {
        LENGTH_SIZE + self.body_len()
    }
}

/// One decoded unit from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// The zero-length termination frame.
    Sentinel,
    Frame(Frame),
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// plain   ┌─────────────┬──────────────────┐
///         │ Length      │ Payload          │
///         │ (8B LE)     │ (Length bytes)   │
///         └─────────────┴──────────────────┘
/// tagged  ┌─────────────┬──────────┬───────┬──────────────────┐
///         │ Length      │ Id       │ Kind  │ Payload          │
///         │ (8B LE)     │ (8B LE)  │ (1B)  │ (Length-9 bytes) │
///         └─────────────┴──────────┴───────┴──────────────────┘
/// ```
///
/// A plain frame with an empty payload would collide with the sentinel and is
/// rejected with [`FrameError::ReservedLength`].
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    if frame.tag.is_none() && frame.payload.is_empty() {
        return Err(FrameError::ReservedLength);
    }

    dst.reserve(frame.wire_size());
    dst.put_u64_le(frame.body_len() as u64);
    if let Some(tag) = frame.tag {
        dst.put_u64_le(tag.id.0);
        dst.put_u8(tag.kind.to_byte());
    }
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Encode the sentinel frame.
pub fn encode_sentinel(dst: &mut BytesMut) {
    dst.put_slice(&SENTINEL);
}

/// Decode a packet from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(
    src: &mut BytesMut,
    format: WireFormat,
    max_payload: usize,
) -> Result<Option<Packet>> {
    if src.len() < LENGTH_SIZE {
        return Ok(None); // Need more data
    }

    let body_len = read_length(src)?;
    if body_len == 0 {
        src.advance(LENGTH_SIZE);
        return Ok(Some(Packet::Sentinel));
    }

    let payload_len = match format {
        WireFormat::Plain => body_len,
        WireFormat::Tagged => body_len.checked_sub(TAG_SIZE).ok_or_else(|| {
            FrameError::corrupt(format!(
                "tagged frame length {body_len} is shorter than the {TAG_SIZE}-byte tag"
            ))
        })?,
    };

    if payload_len > max_payload {
        return Err(FrameError::corrupt(format!(
            "payload length {payload_len} exceeds maximum {max_payload}"
        )));
    }

    let frame_len = body_len
        .checked_add(LENGTH_SIZE)
        .ok_or_else(|| FrameError::corrupt(format!("length {body_len} overflows the frame size")))?;
    if src.len() < frame_len {
        return Ok(None); // Need more data
    }

    src.advance(LENGTH_SIZE);
    let tag = match format {
        WireFormat::Plain => None,
        WireFormat::Tagged => {
            let id = CorrelationId(src.get_u64_le());
            let kind = FrameKind::from_byte(src.get_u8())?;
            Some(Tag { id, kind })
        }
    };
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Packet::Frame(Frame { tag, payload })))
}

/// Number of bytes the frame at the front of `src` needs in total.
///
/// Used to report how much of a truncated frame was missing.
pub fn expected_len(src: &[u8]) -> usize {
    if src.len() < LENGTH_SIZE {
        return LENGTH_SIZE;
    }
    let mut prefix = [0u8; LENGTH_SIZE];
    prefix.copy_from_slice(&src[..LENGTH_SIZE]);
    usize::try_from(u64::from_le_bytes(prefix))
        .map(|len| len.saturating_add(LENGTH_SIZE))
        .unwrap_or(usize::MAX)
}

fn read_length(src: &BytesMut) -> Result<usize> {
    let mut prefix = [0u8; LENGTH_SIZE];
    prefix.copy_from_slice(&src[..LENGTH_SIZE]);
    let raw = u64::from_le_bytes(prefix);
    usize::try_from(raw)
        .map_err(|_| FrameError::corrupt(format!("length {raw} does not fit in memory")))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Wire layout. Default: tagged.
    pub wire_format: WireFormat,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            wire_format: WireFormat::Tagged,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl FrameConfig {
    /// Default configuration for the plain single-caller layout.
    pub fn plain() -> Self {
        Self {
            wire_format: WireFormat::Plain,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(buf: &mut BytesMut, format: WireFormat) -> Packet {
        decode_frame(buf, format, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .expect("buffer should hold a whole frame")
    }

    #[test]
    fn test_plain_layout_on_the_wire() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::plain(&b"abc"[..]), &mut buf).unwrap();
        assert_eq!(&buf[..], &[3, 0, 0, 0, 0, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn test_tagged_layout_on_the_wire() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::reply(CorrelationId(7), &b"ok"[..]), &mut buf).unwrap();

        assert_eq!(buf.len(), LENGTH_SIZE + TAG_SIZE + 2);
        assert_eq!(&buf[..8], &11u64.to_le_bytes());
        assert_eq!(&buf[8..16], &7u64.to_le_bytes());
        assert_eq!(buf[16], 1);
        assert_eq!(&buf[17..], b"ok");
    }

    #[test]
    fn test_tagged_roundtrip_keeps_tag() {
        let mut buf = BytesMut::new();
        let frame = Frame::failure(CorrelationId(99), &b"boom"[..]);
        encode_frame(&frame, &mut buf).unwrap();

        let packet = decode_one(&mut buf, WireFormat::Tagged);
        assert_eq!(packet, Packet::Frame(frame));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_tagged_empty_payload_is_not_a_sentinel() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::request(CorrelationId(1), Bytes::new()), &mut buf).unwrap();

        match decode_one(&mut buf, WireFormat::Tagged) {
            Packet::Frame(frame) => {
                assert_eq!(frame.id(), Some(CorrelationId(1)));
                assert!(frame.payload.is_empty());
            }
            Packet::Sentinel => panic!("empty tagged payload decoded as sentinel"),
        }
    }

    #[test]
    fn test_plain_empty_payload_rejected() {
        let mut buf = BytesMut::new();
        let err = encode_frame(&Frame::plain(Bytes::new()), &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::ReservedLength));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_sentinel_in_both_formats() {
        for format in [WireFormat::Plain, WireFormat::Tagged] {
            let mut buf = BytesMut::new();
            encode_sentinel(&mut buf);
            assert_eq!(decode_one(&mut buf, format), Packet::Sentinel);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_decode_incomplete_prefix() {
        let mut buf = BytesMut::from(&[0x05, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, WireFormat::Plain, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::plain(&b"hello"[..]), &mut buf).unwrap();
        buf.truncate(LENGTH_SIZE + 2);

        let result = decode_frame(&mut buf, WireFormat::Plain, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
        assert_eq!(expected_len(&buf), LENGTH_SIZE + 5);
    }

    #[test]
    fn test_decode_oversized_length_is_corrupt() {
        let mut buf = BytesMut::new();
        buf.put_u64_le(1024 * 1024 * 32);

        let result = decode_frame(&mut buf, WireFormat::Plain, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::CorruptFrame { .. })));
    }

    #[test]
    fn test_decode_length_overflow_is_corrupt() {
        let mut buf = BytesMut::new();
        buf.put_u64_le(u64::MAX);
        buf.put_slice(b"junk");

        let result = decode_frame(&mut buf, WireFormat::Plain, usize::MAX);
        assert!(matches!(result, Err(FrameError::CorruptFrame { .. })));
    }

    #[test]
    fn test_decode_short_tagged_length_is_corrupt() {
        let mut buf = BytesMut::new();
        buf.put_u64_le(4);
        buf.put_slice(b"abcd");

        let result = decode_frame(&mut buf, WireFormat::Tagged, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::CorruptFrame { .. })));
    }

    #[test]
    fn test_decode_unknown_kind_is_corrupt() {
        let mut buf = BytesMut::new();
        buf.put_u64_le(TAG_SIZE as u64);
        buf.put_u64_le(3);
        buf.put_u8(0xEE);

        let result = decode_frame(&mut buf, WireFormat::Tagged, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::CorruptFrame { .. })));
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::plain(&b"first"[..]), &mut buf).unwrap();
        encode_sentinel(&mut buf);
        encode_frame(&Frame::plain(&b"second"[..]), &mut buf).unwrap();

        assert_eq!(
            decode_one(&mut buf, WireFormat::Plain),
            Packet::Frame(Frame::plain(&b"first"[..]))
        );
        assert_eq!(decode_one(&mut buf, WireFormat::Plain), Packet::Sentinel);
        assert_eq!(
            decode_one(&mut buf, WireFormat::Plain),
            Packet::Frame(Frame::plain(&b"second"[..]))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_frame_wire_size() {
        assert_eq!(Frame::plain(&b"test"[..]).wire_size(), LENGTH_SIZE + 4);
        assert_eq!(
            Frame::request(CorrelationId(0), &b"test"[..]).wire_size(),
            LENGTH_SIZE + TAG_SIZE + 4
        );
    }

    #[test]
    fn test_expected_len_without_prefix() {
        assert_eq!(expected_len(&[1, 2]), LENGTH_SIZE);
    }
}
