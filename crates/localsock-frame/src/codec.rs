//! Length-prefixed wire format.
//!
//! A message is a 4-byte big-endian payload length followed by the payload
//! bytes. Zero-length payloads are valid messages: the prefix alone is a
//! complete frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Bytes occupied by the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default upper bound on a single payload (64 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// Framing limits shared by both directions of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageConfig {
    /// Largest payload accepted, inbound or outbound.
    pub max_payload: usize,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Append one framed message to `buf`.
pub fn encode_message(payload: &[u8], buf: &mut BytesMut, config: &MessageConfig) -> Result<()> {
    // The prefix is 32 bits; a configured ceiling above that cannot widen it.
    let limit = config.max_payload.min(u32::MAX as usize);
    if payload.len() > limit {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: limit,
        });
    }
    buf.reserve(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    Ok(())
}

/// Extract the next complete message from `buf`, if one has accumulated.
///
/// Returns `Ok(None)` while the frame is still incomplete; the buffered
/// bytes stay in place and the caller reads more. A declared length beyond
/// the configured maximum is an error before any payload is consumed.
pub fn decode_message(buf: &mut BytesMut, config: &MessageConfig) -> Result<Option<Bytes>> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }
    let declared = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if declared > config.max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: declared,
            max: config.max_payload,
        });
    }
    if buf.len() < LENGTH_PREFIX_SIZE + declared {
        buf.reserve(LENGTH_PREFIX_SIZE + declared - buf.len());
        return Ok(None);
    }
    buf.advance(LENGTH_PREFIX_SIZE);
    Ok(Some(buf.split_to(declared).freeze()))
}
