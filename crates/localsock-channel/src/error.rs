use localsock_frame::FrameError;
use localsock_transport::TransportError;

/// Errors surfaced by channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl ChannelError {
    /// True for retryable timeout outcomes.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
