//! Platform-dispatched connected stream.

use crate::endpoint::EndpointId;
use crate::error::Result;
use crate::timeout::{Deadline, TimeoutSpec};

#[cfg(unix)]
use crate::uds::UdsStream;

#[cfg(windows)]
use crate::pipe::PipeStream;

/// A connected byte stream between two local endpoints.
///
/// Both read and write take `&self`, so one thread may receive while
/// another sends on the same stream.
#[derive(Debug)]
pub struct LocalStream {
    #[cfg(unix)]
    inner: UdsStream,
    #[cfg(windows)]
    inner: PipeStream,
}

impl LocalStream {
    /// Connect to the endpoint named by `id`, bounded by `timeout`.
    pub fn connect(id: &EndpointId, timeout: TimeoutSpec) -> Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                inner: UdsStream::connect(id, timeout)?,
            })
        }
        #[cfg(windows)]
        {
            Ok(Self {
                inner: PipeStream::connect(id, timeout)?,
            })
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_uds(inner: UdsStream) -> Self {
        Self { inner }
    }

    #[cfg(windows)]
    pub(crate) fn from_pipe(inner: PipeStream) -> Self {
        Self { inner }
    }

    /// Read up to `buf.len()` bytes, bounded by the deadline.
    ///
    /// Returns `Ok(0)` once the peer has closed its end.
    pub fn recv_some(&self, buf: &mut [u8], deadline: &Deadline) -> Result<usize> {
        self.inner.recv_some(buf, deadline)
    }

    /// Write the whole buffer, bounded by the deadline.
    pub fn send_all(&self, buf: &[u8], deadline: &Deadline) -> Result<()> {
        self.inner.send_all(buf, deadline)
    }

    /// Tear the connection down so blocked peers and concurrent local
    /// operations observe it promptly.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}
