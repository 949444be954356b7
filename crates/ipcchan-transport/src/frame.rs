//! Length-prefixed packet framing for stream transports.

use bytes::{Buf, BufMut, BytesMut};
use ipcchan_channel::{Packet, DEFAULT_MAX_PAYLOAD};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FrameError;

/// Frame header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "IC" (0x49 0x43).
pub const MAGIC: [u8; 2] = [0x49, 0x43];

/// Configuration for the packet codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum packet body size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Encode a packet into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────────────────────┐
/// │ Magic (2B)   │ Length    │ Body                     │
/// │ 0x49 0x43    │ (4B LE)   │ (Length bytes, JSON)     │
/// │ "IC"         │           │                          │
/// └──────────────┴───────────┴──────────────────────────┘
/// ```
pub fn encode_packet(
    packet: &Packet,
    dst: &mut BytesMut,
    max_payload: usize,
) -> Result<(), FrameError> {
    let body = serde_json::to_vec(packet)?;
    let max = max_payload.min(u32::MAX as usize);
    if body.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: body.len(),
            max,
        });
    }
    dst.reserve(HEADER_SIZE + body.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(body.len() as u32);
    dst.put_slice(&body);
    Ok(())
}

/// Decode a packet from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_packet(src: &mut BytesMut, max_payload: usize) -> Result<Option<Packet>, FrameError> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let body_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    if body_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + body_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let body = src.split_to(body_len);
    let packet = serde_json::from_slice(&body)?;
    Ok(Some(packet))
}

/// `tokio_util` codec over [`encode_packet`] / [`decode_packet`].
#[derive(Debug, Clone, Default)]
pub struct PacketCodec {
    config: FrameConfig,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, FrameError> {
        decode_packet(src, self.config.max_payload_size)
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_packet(&packet, dst, self.config.max_payload_size)
    }
}
