/// Errors raised while encoding or decoding framed messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload (outgoing or declared by an incoming prefix) exceeds the
    /// configured maximum. On the receive side the stream is no longer
    /// aligned on a frame boundary and must be discarded.
    #[error("payload of {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
