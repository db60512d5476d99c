//! Local inter-process byte transport with uniform bounded blocking.
//!
//! One API over two OS mechanisms: Unix domain sockets on POSIX and named
//! pipes with overlapped I/O on Windows. Endpoints are addressed by an
//! opaque [`EndpointId`] that each backend maps to its native namespace,
//! every blocking call takes a [`TimeoutSpec`], and both backends restrict
//! endpoint access to the creating user.

mod endpoint;
mod error;
mod listener;
mod stream;
mod timeout;

#[cfg(windows)]
mod pipe;
#[cfg(unix)]
mod uds;

pub use endpoint::{EndpointId, ENDPOINT_PREFIX};
pub use error::{Result, TransportError};
pub use listener::LocalListener;
pub use stream::LocalStream;
pub use timeout::{Deadline, TimeoutSpec, WaitOutcome};

/// Name of the OS mechanism backing this build.
pub fn backend_name() -> &'static str {
    #[cfg(unix)]
    {
        "unix-domain-socket"
    }
    #[cfg(windows)]
    {
        "windows-named-pipe"
    }
}
