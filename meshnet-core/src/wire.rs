//! Framing: fixed 18-byte little-endian header (bincode fixint) followed by the payload.
//!
//! `kind(1) | source(6) | destination(6) | hop_count(1) | sequence(2) | payload_len(2) | payload`

use serde::{Deserialize, Serialize};

use crate::address::{PhysicalAddress, ADDRESS_LEN};
use crate::protocol::{Message, MessageKind, MAX_PAYLOAD};

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 1 + ADDRESS_LEN + ADDRESS_LEN + 1 + 2 + 2;

/// Largest frame the encoder produces.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD;

#[derive(Serialize, Deserialize)]
struct WireHeader {
    kind: u8,
    source: [u8; ADDRESS_LEN],
    destination: [u8; ADDRESS_LEN],
    hop_count: u8,
    sequence: u16,
    payload_len: u16,
}

/// Encode a message into one frame of exactly `HEADER_LEN + payload.len()` bytes.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, FrameEncodeError> {
    if msg.payload.len() > MAX_PAYLOAD {
        return Err(FrameEncodeError::PayloadTooLarge(msg.payload.len()));
    }
    let header = WireHeader {
        kind: msg.kind.code(),
        source: *msg.source.as_bytes(),
        destination: *msg.destination.as_bytes(),
        hop_count: msg.hop_count,
        sequence: msg.sequence,
        payload_len: msg.payload.len() as u16,
    };
    let mut out = bincode::serialize(&header)?;
    debug_assert_eq!(out.len(), HEADER_LEN);
    out.extend_from_slice(&msg.payload);
    Ok(out)
}

/// Error encoding a message into a frame (bincode or payload cap).
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("payload of {0} bytes exceeds the 200-byte cap")]
    PayloadTooLarge(usize),
}

/// Decode one frame. Buffers shorter than the header are rejected. The
/// declared payload length is clamped to `MAX_PAYLOAD` and to the bytes
/// actually present; trailing bytes are ignored.
pub fn decode_frame(bytes: &[u8]) -> Result<Message, FrameDecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(FrameDecodeError::Truncated(bytes.len()));
    }
    let header: WireHeader = bincode::deserialize(&bytes[..HEADER_LEN])?;
    let kind =
        MessageKind::from_code(header.kind).ok_or(FrameDecodeError::UnknownKind(header.kind))?;
    let available = bytes.len() - HEADER_LEN;
    let len = (header.payload_len as usize).min(MAX_PAYLOAD).min(available);
    Ok(Message {
        kind,
        source: PhysicalAddress::new(header.source),
        destination: PhysicalAddress::new(header.destination),
        hop_count: header.hop_count,
        sequence: header.sequence,
        payload: bytes[HEADER_LEN..HEADER_LEN + len].to_vec(),
    })
}

/// Error decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("frame of {0} bytes is shorter than the 18-byte header")]
    Truncated(usize),
    #[error("unknown message kind 0x{0:02x}")]
    UnknownKind(u8),
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}
