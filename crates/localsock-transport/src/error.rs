use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur in local transport operations.
///
/// Timeouts are ordinary, retryable outcomes. [`TransportError::Platform`]
/// is the only variant suggesting a non-recoverable environment problem;
/// it wraps the native OS error for diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The identifier is already bound by another live endpoint.
    #[error("endpoint {id} is already bound")]
    EndpointUnavailable { id: String },

    /// The backing OS object could not be created with (or opened under)
    /// owner-only access restrictions.
    #[error("permission denied for endpoint {id}: {source}")]
    PermissionDenied {
        id: String,
        source: std::io::Error,
    },

    /// The identifier does not resolve to any live endpoint.
    #[error("no endpoint found for {id}")]
    EndpointNotFound { id: String },

    /// No client connected within the accept timeout. The server remains
    /// listening and the call may be repeated.
    #[error("accept timed out after {0:?}")]
    AcceptTimeout(Duration),

    /// No server accepted the connection within the connect timeout.
    #[error("connect to {id} timed out after {timeout:?}")]
    ConnectTimeout { id: String, timeout: Duration },

    /// The message could not be fully handed to the OS transport in time.
    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),

    /// No complete message arrived in time. Partial bytes already read are
    /// retained and resumed by the next receive.
    #[error("receive timed out after {0:?}")]
    ReceiveTimeout(Duration),

    /// The peer closed its end of the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The operation was attempted after a local close.
    #[error("endpoint is closed")]
    Closed,

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// Unexpected OS-level failure.
    #[error("platform error during {context}: {source}")]
    Platform {
        context: &'static str,
        source: std::io::Error,
    },
}

impl TransportError {
    pub(crate) fn platform(context: &'static str, source: std::io::Error) -> Self {
        Self::Platform { context, source }
    }

    /// True for the `*Timeout` variants, which callers may simply retry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::AcceptTimeout(_)
                | Self::ConnectTimeout { .. }
                | Self::SendTimeout(_)
                | Self::ReceiveTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
