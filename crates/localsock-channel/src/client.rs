//! Client side: dial an endpoint identifier.

use tracing::info;

use localsock_frame::MessageConfig;
use localsock_transport::{EndpointId, LocalStream, TimeoutSpec};

use crate::channel::Channel;
use crate::error::Result;

/// Connect to a server's endpoint, bounded by `timeout`, with default
/// framing limits.
///
/// An identifier nothing listens on fails fast with `EndpointNotFound`
/// rather than consuming the timeout; the timeout covers the case where
/// the server exists but cannot accept yet.
pub fn connect(id: &EndpointId, timeout: impl Into<TimeoutSpec>) -> Result<Channel> {
    connect_with_config(id, timeout, MessageConfig::default())
}

/// [`connect`] with explicit framing limits. Both sides must agree on the
/// payload ceiling or one of them will reject the other's large messages.
pub fn connect_with_config(
    id: &EndpointId,
    timeout: impl Into<TimeoutSpec>,
    config: MessageConfig,
) -> Result<Channel> {
    let stream = LocalStream::connect(id, timeout.into())?;
    info!(endpoint = %id, "client connected");
    Ok(Channel::new(stream, config))
}
