//! Platform-dispatched listening endpoint.

use crate::endpoint::EndpointId;
use crate::error::Result;
use crate::stream::LocalStream;
use crate::timeout::TimeoutSpec;

#[cfg(unix)]
use crate::uds::UdsListener;

#[cfg(windows)]
use crate::pipe::PipeListener;

/// A bound local endpoint accepting connections.
///
/// Thread-safe: `close` may be called from another thread while `accept`
/// is blocked, and unblocks it with [`crate::TransportError::Closed`].
#[derive(Debug)]
pub struct LocalListener {
    #[cfg(unix)]
    inner: UdsListener,
    #[cfg(windows)]
    inner: PipeListener,
}

impl LocalListener {
    /// Bind `id`, claiming it exclusively with owner-only access.
    pub fn bind(id: &EndpointId) -> Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                inner: UdsListener::bind(id)?,
            })
        }
        #[cfg(windows)]
        {
            Ok(Self {
                inner: PipeListener::bind(id)?,
            })
        }
    }

    /// Wait for one incoming connection, bounded by `timeout`.
    pub fn accept(&self, timeout: TimeoutSpec) -> Result<LocalStream> {
        #[cfg(unix)]
        {
            self.inner.accept(timeout).map(LocalStream::from_uds)
        }
        #[cfg(windows)]
        {
            self.inner.accept(timeout).map(LocalStream::from_pipe)
        }
    }

    /// The identifier this listener is bound to.
    pub fn id(&self) -> &EndpointId {
        self.inner.id()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Release the endpoint. Idempotent; safe concurrently with `accept`.
    pub fn close(&self) {
        self.inner.close();
    }
}
