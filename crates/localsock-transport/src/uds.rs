//! Unix domain socket backend.
//!
//! The listening endpoint is a filesystem-path UDS created with owner-only
//! permissions before it becomes connectable. Accept uses a poll-bounded
//! readiness wait; stream I/O is bounded through the socket's own timeout
//! options. The socket path is removed on close, guarded by an inode
//! identity check so a replaced path is never deleted.

use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::endpoint::EndpointId;
use crate::error::{Result, TransportError};
use crate::timeout::{Deadline, TimeoutSpec, WaitOutcome};

/// Permission mode for created socket paths.
pub const SOCKET_MODE: u32 = 0o600;

/// Slice length for readiness waits, so a blocked accept can observe a
/// concurrent close.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Pause between connect retries while the server backlog is saturated.
const CONNECT_RETRY_PAUSE: Duration = Duration::from_millis(10);

/// Listening Unix domain socket endpoint.
pub struct UdsListener {
    inner: Mutex<Option<Arc<UnixListener>>>,
    closed: AtomicBool,
    id: EndpointId,
    path: PathBuf,
    created_inode: (u64, u64),
}

impl UdsListener {
    /// Bind and listen on the socket path mapped from `id`.
    ///
    /// An existing socket path is probed with a connect: a live listener
    /// means the identifier is still bound; a refused connect means a stale
    /// socket left by a crashed process, which is removed and rebound. A
    /// non-socket file at the path is never touched.
    pub fn bind(id: &EndpointId) -> Result<Self> {
        let path = id.socket_path();
        validate_path_len(&path)?;

        if path.exists() {
            reclaim_stale_path(id, &path)?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| match e.kind() {
            ErrorKind::AddrInUse => TransportError::EndpointUnavailable {
                id: id.as_str().to_string(),
            },
            ErrorKind::PermissionDenied => TransportError::PermissionDenied {
                id: id.as_str().to_string(),
                source: e,
            },
            _ => TransportError::platform("bind", e),
        })?;

        if let Err(e) = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(SOCKET_MODE))
        {
            let _ = std::fs::remove_file(&path);
            return Err(TransportError::PermissionDenied {
                id: id.as_str().to_string(),
                source: e,
            });
        }

        listener
            .set_nonblocking(true)
            .map_err(|e| TransportError::platform("set-nonblocking", e))?;

        let metadata =
            std::fs::symlink_metadata(&path).map_err(|e| TransportError::platform("stat", e))?;
        let created_inode = (metadata.dev(), metadata.ino());

        info!(endpoint = %id, ?path, "listening on unix domain socket");

        Ok(Self {
            inner: Mutex::new(Some(Arc::new(listener))),
            closed: AtomicBool::new(false),
            id: id.clone(),
            path,
            created_inode,
        })
    }

    /// Wait for one incoming connection, bounded by `timeout`.
    ///
    /// On timeout the listener remains usable and the call may be repeated.
    pub fn accept(&self, timeout: TimeoutSpec) -> Result<UdsStream> {
        let deadline = Deadline::start(timeout);
        let listener = self.shared().ok_or(TransportError::Closed)?;

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }

            match poll_readable(listener.as_raw_fd(), &deadline)? {
                WaitOutcome::Ready => {}
                WaitOutcome::TimedOut => {
                    if deadline.expired() {
                        return Err(TransportError::AcceptTimeout(deadline.requested_duration()));
                    }
                    // Slice elapsed; re-check the close flag and keep waiting.
                    continue;
                }
            }

            match listener.accept() {
                Ok((stream, _addr)) => {
                    stream
                        .set_nonblocking(false)
                        .map_err(|e| TransportError::platform("set-blocking", e))?;
                    debug!(endpoint = %self.id, "accepted connection");
                    return Ok(UdsStream { stream });
                }
                // The readiness event can evaporate if the client gave up.
                Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::platform("accept", e)),
            }
        }
    }

    /// The identifier this listener is bound to.
    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release the listening endpoint and remove the socket path. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let taken = lock_unpoisoned(&self.inner).take();
        drop(taken);
        self.remove_path();
    }

    fn shared(&self) -> Option<Arc<UnixListener>> {
        lock_unpoisoned(&self.inner).as_ref().cloned()
    }

    fn remove_path(&self) {
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        if metadata.file_type().is_socket()
            && (metadata.dev(), metadata.ino()) == self.created_inode
        {
            debug!(path = ?self.path, "removing socket path");
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = ?self.path, error = %e, "failed to remove socket path");
            }
        } else {
            debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
        }
    }
}

impl Drop for UdsListener {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for UdsListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdsListener")
            .field("endpoint", &self.id.as_str())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Connected Unix domain socket stream.
pub struct UdsStream {
    stream: UnixStream,
}

impl UdsStream {
    /// Connect to the endpoint named by `id`, bounded by `timeout`.
    ///
    /// Absence (no path, or a stale path nothing listens on) fails fast with
    /// `EndpointNotFound`; the timeout window only matters when the server
    /// exists but its backlog is saturated.
    pub fn connect(id: &EndpointId, timeout: TimeoutSpec) -> Result<Self> {
        let path = id.socket_path();
        let deadline = Deadline::start(timeout);

        if !path.exists() {
            return Err(TransportError::EndpointNotFound {
                id: id.as_str().to_string(),
            });
        }

        let stream = connect_with_deadline(id, &path, &deadline)?;
        debug!(endpoint = %id, "connected to unix domain socket");
        Ok(Self { stream })
    }

    /// Read whatever bytes are available, bounded by the deadline.
    ///
    /// Returns `Ok(0)` at end-of-stream (peer closed).
    pub fn recv_some(&self, buf: &mut [u8], deadline: &Deadline) -> Result<usize> {
        loop {
            self.stream
                .set_read_timeout(socket_timeout(deadline))
                .map_err(|e| TransportError::platform("set-read-timeout", e))?;
            match (&self.stream).read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_timeout_kind(e.kind()) => {
                    return Err(TransportError::ReceiveTimeout(deadline.requested_duration()));
                }
                Err(e) if is_disconnect_kind(e.kind()) => {
                    return Err(TransportError::ConnectionClosed)
                }
                Err(e) => return Err(TransportError::platform("read", e)),
            }
        }
    }

    /// Write the whole buffer, bounded by the deadline.
    pub fn send_all(&self, buf: &[u8], deadline: &Deadline) -> Result<()> {
        let mut offset = 0usize;
        while offset < buf.len() {
            self.stream
                .set_write_timeout(socket_timeout(deadline))
                .map_err(|e| TransportError::platform("set-write-timeout", e))?;
            match (&self.stream).write(&buf[offset..]) {
                Ok(0) => return Err(TransportError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_timeout_kind(e.kind()) => {
                    return Err(TransportError::SendTimeout(deadline.requested_duration()));
                }
                Err(e) if is_disconnect_kind(e.kind()) => {
                    return Err(TransportError::ConnectionClosed)
                }
                Err(e) => return Err(TransportError::platform("write", e)),
            }
        }
        Ok(())
    }

    /// Shut down both directions so a blocked peer observes the close.
    /// The descriptor itself is released on drop.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

impl std::fmt::Debug for UdsStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdsStream")
            .field("fd", &self.stream.as_raw_fd())
            .finish()
    }
}

/// Recover the data even if a holder panicked; the guarded state is a bare
/// `Option` and cannot be left inconsistent.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Readiness wait on a descriptor, sliced so callers can observe external
/// state between slices. `TimedOut` with an unexpired deadline means only
/// the slice elapsed.
fn poll_readable(fd: RawFd, deadline: &Deadline) -> Result<WaitOutcome> {
    poll_fd(fd, libc::POLLIN, deadline)
}

fn poll_writable(fd: RawFd, deadline: &Deadline) -> Result<WaitOutcome> {
    poll_fd(fd, libc::POLLOUT, deadline)
}

fn poll_fd(fd: RawFd, events: libc::c_short, deadline: &Deadline) -> Result<WaitOutcome> {
    let wait = deadline.remaining_or(POLL_SLICE);
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    // SAFETY: `pfd` is a valid pollfd for the duration of the call and the
    // descriptor is kept alive by the caller.
    let rc = unsafe { libc::poll(&mut pfd, 1, wait.as_millis() as i32) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == ErrorKind::Interrupted {
            // Counts as an elapsed slice; the caller re-checks the deadline.
            return Ok(WaitOutcome::TimedOut);
        }
        return Err(TransportError::platform("poll", err));
    }
    if rc == 0 {
        return Ok(WaitOutcome::TimedOut);
    }
    Ok(WaitOutcome::Ready)
}

/// Deadline-bounded connect on a non-blocking socket.
///
/// A full server backlog surfaces as EAGAIN on AF_UNIX and is retried until
/// the deadline expires; EINPROGRESS is finished with a writability wait.
/// Everything else resolves immediately. The socket is switched back to
/// blocking before it becomes a stream, whose I/O is bounded through the
/// socket timeout options instead.
fn connect_with_deadline(id: &EndpointId, path: &Path, deadline: &Deadline) -> Result<UnixStream> {
    let (addr, addr_len) = sockaddr_un(path)?;
    loop {
        let raw = unsafe {
            libc::socket(
                libc::AF_UNIX,
                libc::SOCK_STREAM | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
                0,
            )
        };
        if raw < 0 {
            return Err(TransportError::platform(
                "socket",
                std::io::Error::last_os_error(),
            ));
        }
        // SAFETY: `raw` is a fresh descriptor owned from here on; OwnedFd
        // closes it on every path that does not become a stream.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: `addr` is a fully initialized sockaddr_un of length `addr_len`.
        let rc = unsafe {
            libc::connect(
                fd.as_raw_fd(),
                std::ptr::addr_of!(addr).cast::<libc::sockaddr>(),
                addr_len,
            )
        };
        if rc == 0 {
            return into_blocking_stream(fd);
        }

        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EINPROGRESS) => return finish_pending_connect(fd, id, deadline),
            Some(libc::ENOENT) | Some(libc::ECONNREFUSED) => {
                return Err(TransportError::EndpointNotFound {
                    id: id.as_str().to_string(),
                });
            }
            Some(libc::EACCES) | Some(libc::EPERM) => {
                return Err(TransportError::PermissionDenied {
                    id: id.as_str().to_string(),
                    source: err,
                });
            }
            Some(libc::EAGAIN) => {
                if deadline.expired() {
                    return Err(TransportError::ConnectTimeout {
                        id: id.as_str().to_string(),
                        timeout: deadline.requested_duration(),
                    });
                }
                std::thread::sleep(deadline.remaining_or(CONNECT_RETRY_PAUSE));
            }
            _ => return Err(TransportError::platform("connect", err)),
        }
    }
}

/// Wait out an in-progress connect, then read its outcome from SO_ERROR.
fn finish_pending_connect(fd: OwnedFd, id: &EndpointId, deadline: &Deadline) -> Result<UnixStream> {
    loop {
        match poll_writable(fd.as_raw_fd(), deadline)? {
            WaitOutcome::Ready => break,
            WaitOutcome::TimedOut => {
                if deadline.expired() {
                    return Err(TransportError::ConnectTimeout {
                        id: id.as_str().to_string(),
                        timeout: deadline.requested_duration(),
                    });
                }
            }
        }
    }

    let mut status: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: `status` and `len` are valid for the option read.
    let rc = unsafe {
        libc::getsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            std::ptr::addr_of_mut!(status).cast(),
            &mut len,
        )
    };
    if rc != 0 {
        return Err(TransportError::platform(
            "getsockopt",
            std::io::Error::last_os_error(),
        ));
    }
    match status {
        0 => into_blocking_stream(fd),
        code if code == libc::ENOENT || code == libc::ECONNREFUSED => {
            Err(TransportError::EndpointNotFound {
                id: id.as_str().to_string(),
            })
        }
        code => Err(TransportError::platform(
            "connect",
            std::io::Error::from_raw_os_error(code),
        )),
    }
}

fn into_blocking_stream(fd: OwnedFd) -> Result<UnixStream> {
    let stream = UnixStream::from(fd);
    stream
        .set_nonblocking(false)
        .map_err(|e| TransportError::platform("set-blocking", e))?;
    Ok(stream)
}

fn reclaim_stale_path(id: &EndpointId, path: &Path) -> Result<()> {
    let metadata =
        std::fs::symlink_metadata(path).map_err(|e| TransportError::platform("stat", e))?;
    if !metadata.file_type().is_socket() {
        // Never delete a foreign file that happens to sit at our path.
        return Err(TransportError::EndpointUnavailable {
            id: id.as_str().to_string(),
        });
    }
    match UnixStream::connect(path) {
        Ok(_) => Err(TransportError::EndpointUnavailable {
            id: id.as_str().to_string(),
        }),
        Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
            debug!(?path, "removing stale socket");
            std::fs::remove_file(path).map_err(|e| TransportError::platform("unlink", e))
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            Err(TransportError::PermissionDenied {
                id: id.as_str().to_string(),
                source: e,
            })
        }
        Err(_) => Err(TransportError::EndpointUnavailable {
            id: id.as_str().to_string(),
        }),
    }
}

fn validate_path_len(path: &Path) -> Result<()> {
    let max = max_sun_path();
    let len = path.as_os_str().len();
    if len >= max {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max,
        });
    }
    Ok(())
}

/// `sockaddr_un.sun_path` is 108 bytes on Linux, 104 on the BSDs and macOS.
fn max_sun_path() -> usize {
    let addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_path.len()
}

fn sockaddr_un(path: &Path) -> Result<(libc::sockaddr_un, libc::socklen_t)> {
    validate_path_len(path)?;
    let bytes = path.as_os_str().as_bytes();
    // SAFETY: sockaddr_un is a plain-old-data struct; all-zero is valid.
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }
    let len = std::mem::offset_of!(libc::sockaddr_un, sun_path) + bytes.len() + 1;
    Ok((addr, len as libc::socklen_t))
}

/// Map the remaining deadline onto SO_RCVTIMEO/SO_SNDTIMEO.
///
/// The socket options reject a zero duration, so an exhausted or zero
/// budget becomes a one-microsecond timeout, which is as close to an
/// immediate poll as the option allows.
fn socket_timeout(deadline: &Deadline) -> Option<Duration> {
    match deadline.remaining() {
        TimeoutSpec::Infinite => None,
        TimeoutSpec::Bounded(d) => Some(d.max(Duration::from_micros(1))),
    }
}

fn is_timeout_kind(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn is_disconnect_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_id(tag: &str) -> EndpointId {
        EndpointId::from_name(format!(
            "localsock-test-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    #[test]
    fn bind_accept_connect_roundtrip() {
        let id = test_id("roundtrip");
        let listener = UdsListener::bind(&id).expect("bind should succeed");
        assert!(id.socket_path().exists());

        let client_id = id.clone();
        let client = std::thread::spawn(move || {
            let stream =
                UdsStream::connect(&client_id, TimeoutSpec::Bounded(Duration::from_secs(2)))
                    .expect("connect should succeed");
            let deadline = Deadline::start(TimeoutSpec::Bounded(Duration::from_secs(2)));
            stream.send_all(b"hello", &deadline).expect("send should succeed");
        });

        let stream = listener
            .accept(TimeoutSpec::Bounded(Duration::from_secs(2)))
            .expect("accept should succeed");
        let deadline = Deadline::start(TimeoutSpec::Bounded(Duration::from_secs(2)));
        let mut buf = [0u8; 16];
        let n = stream.recv_some(&mut buf, &deadline).expect("recv should succeed");
        assert_eq!(&buf[..n], b"hello");

        client.join().expect("client thread should finish");
        listener.close();
        assert!(!id.socket_path().exists(), "socket path should be removed on close");
    }

    #[test]
    fn second_bind_on_live_endpoint_fails() {
        let id = test_id("collision");
        let _listener = UdsListener::bind(&id).expect("first bind should succeed");
        let err = UdsListener::bind(&id).expect_err("second bind should fail");
        assert!(matches!(err, TransportError::EndpointUnavailable { .. }));
    }

    #[test]
    fn stale_socket_is_reclaimed() {
        let id = test_id("stale");
        let listener = UdsListener::bind(&id).expect("bind should succeed");
        // Simulate a crash: drop the listener but leave the path behind.
        {
            let guard = lock_unpoisoned(&listener.inner).take();
            drop(guard);
        }
        std::mem::forget(listener);
        assert!(id.socket_path().exists());

        let rebound = UdsListener::bind(&id).expect("stale path should be reclaimed");
        drop(rebound);
        assert!(!id.socket_path().exists());
    }

    #[test]
    fn bind_refuses_foreign_file_at_path() {
        let id = test_id("foreign");
        std::fs::write(id.socket_path(), b"regular-file").expect("file should be writable");

        let err = UdsListener::bind(&id).expect_err("bind over a regular file should fail");
        assert!(matches!(err, TransportError::EndpointUnavailable { .. }));
        assert!(id.socket_path().exists(), "foreign file must not be deleted");
        let _ = std::fs::remove_file(id.socket_path());
    }

    #[test]
    fn socket_permissions_are_owner_only() {
        let id = test_id("perms");
        let listener = UdsListener::bind(&id).expect("bind should succeed");
        let mode = std::fs::metadata(id.socket_path())
            .expect("socket path should stat")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, SOCKET_MODE);
        drop(listener);
    }

    #[test]
    fn path_too_long_is_rejected() {
        let id = EndpointId::from_name("x".repeat(200));
        let err = UdsListener::bind(&id).expect_err("oversized path should fail");
        assert!(matches!(err, TransportError::PathTooLong { .. }));
    }

    #[test]
    fn accept_times_out_without_client() {
        let id = test_id("accept-timeout");
        let listener = UdsListener::bind(&id).expect("bind should succeed");

        let start = std::time::Instant::now();
        let err = listener
            .accept(TimeoutSpec::Bounded(Duration::from_millis(300)))
            .expect_err("accept should time out");
        let elapsed = start.elapsed();

        assert!(matches!(err, TransportError::AcceptTimeout(_)));
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(800), "timeout overshot: {elapsed:?}");
    }

    #[test]
    fn accept_zero_timeout_polls() {
        let id = test_id("accept-poll");
        let listener = UdsListener::bind(&id).expect("bind should succeed");
        let err = listener
            .accept(TimeoutSpec::POLL)
            .expect_err("poll accept with no client should fail");
        assert!(matches!(err, TransportError::AcceptTimeout(_)));
    }

    #[test]
    fn connect_to_absent_endpoint_fails_fast() {
        let id = test_id("absent");
        let start = std::time::Instant::now();
        let err = UdsStream::connect(&id, TimeoutSpec::Bounded(Duration::from_secs(5)))
            .expect_err("connect to absent endpoint should fail");
        assert!(matches!(err, TransportError::EndpointNotFound { .. }));
        assert!(start.elapsed() < Duration::from_secs(1), "absence must be detected quickly");
    }

    #[test]
    fn connect_completes_before_accept() {
        let id = test_id("pre-accept");
        let listener = UdsListener::bind(&id).expect("bind should succeed");

        // No accept is pending; the connect finishes through the backlog.
        let stream = UdsStream::connect(&id, TimeoutSpec::Bounded(Duration::from_secs(2)))
            .expect("connect should complete without an accept");
        let deadline = Deadline::start(TimeoutSpec::Bounded(Duration::from_secs(2)));
        stream
            .send_all(b"queued", &deadline)
            .expect("send on the fresh stream should succeed");

        let accepted = listener
            .accept(TimeoutSpec::Bounded(Duration::from_secs(2)))
            .expect("accept should pick up the queued connection");
        let mut buf = [0u8; 16];
        let n = accepted
            .recv_some(&mut buf, &deadline)
            .expect("recv should succeed");
        assert_eq!(&buf[..n], b"queued");
    }

    #[test]
    fn close_is_idempotent_and_unblocks_accept() {
        let id = test_id("close");
        let listener = std::sync::Arc::new(UdsListener::bind(&id).expect("bind should succeed"));

        let accepter = {
            let listener = std::sync::Arc::clone(&listener);
            std::thread::spawn(move || listener.accept(TimeoutSpec::Infinite))
        };
        std::thread::sleep(Duration::from_millis(50));
        listener.close();
        listener.close();

        let result = accepter.join().expect("accept thread should finish");
        assert!(matches!(result, Err(TransportError::Closed)));
        assert!(!id.socket_path().exists());
    }

    #[test]
    fn drop_does_not_remove_replaced_path() {
        let id = test_id("replaced");
        let listener = UdsListener::bind(&id).expect("bind should succeed");

        std::fs::remove_file(id.socket_path()).expect("path should be removable");
        std::fs::write(id.socket_path(), b"replacement").expect("file should be writable");

        drop(listener);
        assert!(
            id.socket_path().exists(),
            "close must not remove a path whose identity changed"
        );
        let _ = std::fs::remove_file(id.socket_path());
    }
}
