//! Server side: bind an endpoint, accept channels.

use tracing::info;

use localsock_frame::MessageConfig;
use localsock_transport::{EndpointId, LocalListener, TimeoutSpec};

use crate::channel::{Channel, ConnectionState};
use crate::error::Result;

/// A bound endpoint handing out one [`Channel`] per accepted client.
///
/// The generated identifier is the only thing a client needs; publish it
/// over whatever side channel the processes already share (stdout, an
/// environment variable, a command-line argument).
#[derive(Debug)]
pub struct LocalServer {
    listener: LocalListener,
    config: MessageConfig,
}

impl LocalServer {
    /// Bind a freshly generated endpoint with default framing limits.
    pub fn bind() -> Result<Self> {
        Self::bind_with_config(&EndpointId::generate(), MessageConfig::default())
    }

    /// Bind `id` with explicit framing limits.
    ///
    /// Fails with `EndpointUnavailable` when another live endpoint already
    /// holds the identifier.
    pub fn bind_with_config(id: &EndpointId, config: MessageConfig) -> Result<Self> {
        let listener = LocalListener::bind(id)?;
        info!(endpoint = %id, "server bound");
        Ok(Self { listener, config })
    }

    /// The identifier clients connect to.
    pub fn id(&self) -> &EndpointId {
        self.listener.id()
    }

    /// Wait for one client, bounded by `timeout`.
    ///
    /// On `AcceptTimeout` the server keeps listening and the call may be
    /// repeated. Each accepted channel is independent; accepting again does
    /// not disturb earlier ones.
    pub fn accept(&self, timeout: impl Into<TimeoutSpec>) -> Result<Channel> {
        let stream = self.listener.accept(timeout.into())?;
        Ok(Channel::new(stream, self.config))
    }

    /// Stop listening and release the endpoint identifier. Idempotent, and
    /// safe to call while another thread is blocked in [`LocalServer::accept`].
    /// Already accepted channels stay usable.
    pub fn close(&self) {
        self.listener.close();
    }

    pub fn state(&self) -> ConnectionState {
        if self.listener.is_closed() {
            ConnectionState::Closed
        } else {
            ConnectionState::Listening
        }
    }
}
