//! Bidirectional message channel over a connected stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use tracing::debug;

use localsock_frame::{decode_message, encode_message, MessageConfig};
use localsock_transport::{Deadline, LocalStream, TimeoutSpec, TransportError};

use crate::error::Result;

/// Bytes read from the stream per receive iteration.
const RECV_CHUNK: usize = 8 * 1024;

/// Lifecycle of a channel or server endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Bound and waiting for peers.
    Listening,
    /// Connection attempt in flight.
    Connecting,
    /// Connected; messages may flow in both directions.
    Connected,
    /// Closed locally or by the peer; the end of a normal lifecycle.
    Closed,
    /// Unusable after a framing violation; no further messages can be
    /// delimited reliably.
    Failed,
}

struct RecvHalf {
    /// Accumulated undecoded bytes, carried across calls so a timeout never
    /// loses a partially received message.
    pending: BytesMut,
    chunk: Box<[u8]>,
}

/// A connected, message-oriented duplex channel.
///
/// Send and receive serialize independently: one thread may block in
/// [`Channel::receive`] while another calls [`Channel::send`]. [`Channel::close`]
/// may be called from any thread and unblocks both.
pub struct Channel {
    stream: LocalStream,
    recv: Mutex<RecvHalf>,
    send: Mutex<BytesMut>,
    config: MessageConfig,
    closed: AtomicBool,
    peer_closed: AtomicBool,
    desynced: AtomicBool,
}

impl Channel {
    pub(crate) fn new(stream: LocalStream, config: MessageConfig) -> Self {
        Self {
            stream,
            recv: Mutex::new(RecvHalf {
                pending: BytesMut::new(),
                chunk: vec![0u8; RECV_CHUNK].into_boxed_slice(),
            }),
            send: Mutex::new(BytesMut::new()),
            config,
            closed: AtomicBool::new(false),
            peer_closed: AtomicBool::new(false),
            desynced: AtomicBool::new(false),
        }
    }

    /// Send one message, bounded by `timeout`.
    ///
    /// The whole frame (prefix and payload) is handed to the transport
    /// before this returns. Zero-length payloads are valid messages.
    pub fn send(&self, payload: &[u8], timeout: impl Into<TimeoutSpec>) -> Result<()> {
        self.ensure_open()?;
        let deadline = Deadline::start(timeout.into());
        let mut buf = lock_unpoisoned(&self.send);
        buf.clear();
        encode_message(payload, &mut buf, &self.config)?;
        self.stream.send_all(&buf, &deadline)?;
        Ok(())
    }

    /// Receive the next message, bounded by `timeout`.
    ///
    /// On timeout, bytes already read stay buffered and the next call
    /// resumes the same message. Returns
    /// [`TransportError::ConnectionClosed`] once the peer end is gone and
    /// no buffered message remains.
    pub fn receive(&self, timeout: impl Into<TimeoutSpec>) -> Result<Bytes> {
        self.ensure_open()?;
        let deadline = Deadline::start(timeout.into());
        let mut half = lock_unpoisoned(&self.recv);
        loop {
            match decode_message(&mut half.pending, &self.config) {
                Ok(Some(message)) => return Ok(message),
                Ok(None) => {}
                Err(err) => {
                    self.desynced.store(true, Ordering::SeqCst);
                    return Err(err.into());
                }
            }
            if self.peer_closed.load(Ordering::SeqCst) {
                return Err(TransportError::ConnectionClosed.into());
            }
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed.into());
            }
            let RecvHalf { pending, chunk } = &mut *half;
            let n = self.stream.recv_some(chunk, &deadline)?;
            if n == 0 {
                // A concurrent local close() also surfaces as end-of-stream;
                // only blame the peer when we did not shut down ourselves.
                if self.closed.load(Ordering::SeqCst) {
                    return Err(TransportError::Closed.into());
                }
                self.peer_closed.store(true, Ordering::SeqCst);
                debug!("peer closed the connection");
                return Err(TransportError::ConnectionClosed.into());
            }
            pending.extend_from_slice(&chunk[..n]);
        }
    }

    /// Close the channel. Idempotent; concurrent blocked operations on the
    /// same channel are torn loose.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stream.shutdown();
        debug!("channel closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        if self.desynced.load(Ordering::SeqCst) {
            ConnectionState::Failed
        } else if self.closed.load(Ordering::SeqCst) || self.peer_closed.load(Ordering::SeqCst) {
            ConnectionState::Closed
        } else {
            ConnectionState::Connected
        }
    }

    /// The framing limits this channel enforces.
    pub fn config(&self) -> &MessageConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed.into());
        }
        Ok(())
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("state", &self.state())
            .finish()
    }
}

/// Recover the data even if a holder panicked; the guarded buffers carry no
/// invariant a panic could break mid-update.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
