//! Message framing for localsock byte streams.
//!
//! The transport layer moves raw bytes; this crate turns them into
//! discrete messages with a fixed-width length prefix, preserving message
//! boundaries and ordering end to end.

mod codec;
mod error;

pub use codec::{
    decode_message, encode_message, MessageConfig, DEFAULT_MAX_PAYLOAD, LENGTH_PREFIX_SIZE,
};
pub use error::{FrameError, Result};
