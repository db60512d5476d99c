//! Windows named pipe backend.
//!
//! Windows has no blocking local-domain socket, so bounded blocking is
//! emulated with overlapped I/O: every accept/read/write issues an
//! asynchronous operation tied to a per-operation event object, waits on
//! that event for the remaining deadline, and on timeout cancels the
//! operation and synchronizes on its acknowledged completion before the
//! buffer leaves scope. Returning while the kernel may still write into the
//! buffer would be a use-after-free, so the cancel-then-wait step is never
//! skipped.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, LocalFree, ERROR_ACCESS_DENIED, ERROR_BROKEN_PIPE,
    ERROR_FILE_NOT_FOUND, ERROR_IO_PENDING, ERROR_NO_DATA, ERROR_OPERATION_ABORTED,
    ERROR_PIPE_BUSY, ERROR_PIPE_CONNECTED, ERROR_PIPE_NOT_CONNECTED, GENERIC_READ, GENERIC_WRITE,
    HANDLE, INVALID_HANDLE_VALUE, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::Security::Authorization::ConvertStringSecurityDescriptorToSecurityDescriptorW;
use windows_sys::Win32::Security::{PSECURITY_DESCRIPTOR, SECURITY_ATTRIBUTES};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FlushFileBuffers, ReadFile, WriteFile, FILE_FLAG_FIRST_PIPE_INSTANCE,
    FILE_FLAG_OVERLAPPED, OPEN_EXISTING, PIPE_ACCESS_DUPLEX,
};
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, WaitNamedPipeW,
    PIPE_READMODE_BYTE, PIPE_TYPE_BYTE, PIPE_UNLIMITED_INSTANCES, PIPE_WAIT,
};
use windows_sys::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};
use windows_sys::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};

use crate::endpoint::EndpointId;
use crate::error::{Result, TransportError};
use crate::timeout::{Deadline, TimeoutSpec, WaitOutcome};

/// In/out buffer size hint for created pipe instances.
const PIPE_BUFFER_SIZE: u32 = 64 * 1024;

/// DACL granting full access to the owning identity only.
const OWNER_ONLY_SDDL: &str = "D:P(A;;GA;;;OW)";

const SDDL_REVISION_1: u32 = 1;

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn platform_code(context: &'static str, code: u32) -> TransportError {
    TransportError::Platform {
        context,
        source: io::Error::from_raw_os_error(code as i32),
    }
}

/// Owned pipe or event handle, closed on drop.
struct OwnedHandle(HANDLE);

// SAFETY: the wrapped HANDLE is an owned kernel object reference; the Win32
// pipe and event APIs used here are callable from any thread.
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: the handle is owned and still open.
        unsafe {
            CloseHandle(self.0);
        }
    }
}

/// Security descriptor restricting pipe access to the creating user.
struct OwnerOnlyDescriptor(PSECURITY_DESCRIPTOR);

// SAFETY: the descriptor is an immutable LocalAlloc'd blob only read by
// CreateNamedPipeW.
unsafe impl Send for OwnerOnlyDescriptor {}
unsafe impl Sync for OwnerOnlyDescriptor {}

impl OwnerOnlyDescriptor {
    fn create(id: &EndpointId) -> Result<Self> {
        let sddl = wide(OWNER_ONLY_SDDL);
        let mut descriptor: PSECURITY_DESCRIPTOR = std::ptr::null_mut();
        // SAFETY: `sddl` is NUL-terminated and outlives the call; the
        // returned descriptor is released with LocalFree on drop.
        let ok = unsafe {
            ConvertStringSecurityDescriptorToSecurityDescriptorW(
                sddl.as_ptr(),
                SDDL_REVISION_1,
                &mut descriptor,
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(TransportError::PermissionDenied {
                id: id.as_str().to_string(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self(descriptor))
    }

    fn attributes(&self) -> SECURITY_ATTRIBUTES {
        SECURITY_ATTRIBUTES {
            nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: self.0,
            bInheritHandle: 0,
        }
    }
}

impl Drop for OwnerOnlyDescriptor {
    fn drop(&mut self) {
        // SAFETY: the descriptor was allocated by the SDDL conversion.
        unsafe {
            LocalFree(self.0);
        }
    }
}

/// One-shot event object for a single overlapped operation.
struct Event(OwnedHandle);

impl Event {
    fn new() -> Result<Self> {
        // SAFETY: creating an unnamed manual-reset event with no inherited
        // security.
        let handle =
            unsafe { CreateEventW(std::ptr::null(), 1, 0, std::ptr::null()) };
        if handle.is_null() {
            return Err(TransportError::platform(
                "create-event",
                io::Error::last_os_error(),
            ));
        }
        Ok(Self(OwnedHandle(handle)))
    }

    fn raw(&self) -> HANDLE {
        self.0 .0
    }
}

/// Bounded wait on an event object.
fn wait_event(event: HANDLE, deadline: &Deadline) -> Result<WaitOutcome> {
    let millis = match deadline.remaining() {
        TimeoutSpec::Infinite => INFINITE,
        TimeoutSpec::Bounded(d) => d.as_millis().min(u128::from(INFINITE - 1)) as u32,
    };
    // SAFETY: the event handle is owned by the caller and open.
    match unsafe { WaitForSingleObject(event, millis) } {
        WAIT_OBJECT_0 => Ok(WaitOutcome::Ready),
        WAIT_TIMEOUT => Ok(WaitOutcome::TimedOut),
        _ => Err(TransportError::platform(
            "wait-event",
            io::Error::last_os_error(),
        )),
    }
}

fn create_instance(
    id: &EndpointId,
    descriptor: &OwnerOnlyDescriptor,
    first: bool,
) -> Result<OwnedHandle> {
    let name = wide(&id.pipe_path());
    let mut open_mode = PIPE_ACCESS_DUPLEX | FILE_FLAG_OVERLAPPED;
    if first {
        // Fails with ERROR_ACCESS_DENIED when the name is already bound,
        // which is exactly the bind-collision contract.
        open_mode |= FILE_FLAG_FIRST_PIPE_INSTANCE;
    }
    let mut attributes = descriptor.attributes();
    // SAFETY: `name` is NUL-terminated and `attributes` points at a live
    // descriptor for the duration of the call.
    let handle = unsafe {
        CreateNamedPipeW(
            name.as_ptr(),
            open_mode,
            PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT,
            PIPE_UNLIMITED_INSTANCES,
            PIPE_BUFFER_SIZE,
            PIPE_BUFFER_SIZE,
            0,
            &mut attributes,
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        // SAFETY: querying the thread-local error code.
        let code = unsafe { GetLastError() };
        return Err(match code {
            ERROR_ACCESS_DENIED | ERROR_PIPE_BUSY if first => TransportError::EndpointUnavailable {
                id: id.as_str().to_string(),
            },
            ERROR_ACCESS_DENIED => TransportError::PermissionDenied {
                id: id.as_str().to_string(),
                source: io::Error::from_raw_os_error(code as i32),
            },
            _ => platform_code("create-named-pipe", code),
        });
    }
    Ok(OwnedHandle(handle))
}

/// Listening named pipe endpoint.
///
/// Holds one unconnected pipe instance at a time; a successful accept hands
/// that instance to the returned stream and immediately creates a fresh
/// instance for the next accept.
pub struct PipeListener {
    inner: Mutex<Option<Arc<OwnedHandle>>>,
    closed: AtomicBool,
    id: EndpointId,
    descriptor: OwnerOnlyDescriptor,
}

impl PipeListener {
    /// Create the first pipe instance for `id`.
    pub fn bind(id: &EndpointId) -> Result<Self> {
        let descriptor = OwnerOnlyDescriptor::create(id)?;
        let instance = create_instance(id, &descriptor, true)?;
        info!(endpoint = %id, "listening on named pipe");
        Ok(Self {
            inner: Mutex::new(Some(Arc::new(instance))),
            closed: AtomicBool::new(false),
            id: id.clone(),
            descriptor,
        })
    }

    /// Wait for one incoming connection, bounded by `timeout`.
    pub fn accept(&self, timeout: TimeoutSpec) -> Result<PipeStream> {
        let deadline = Deadline::start(timeout);
        let instance = self.shared().ok_or(TransportError::Closed)?;

        self.wait_for_client(&instance, &deadline)?;

        // Arm the next accept before handing this instance out. Skipped if a
        // concurrent close already emptied the slot.
        let next = create_instance(&self.id, &self.descriptor, false)?;
        {
            let mut slot = lock_unpoisoned(&self.inner);
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            *slot = Some(Arc::new(next));
        }

        debug!(endpoint = %self.id, "accepted connection");
        match Arc::try_unwrap(instance) {
            Ok(handle) => Ok(PipeStream {
                handle,
                server_side: true,
            }),
            // A concurrent close still holds a reference; honor it.
            Err(_) => Err(TransportError::Closed),
        }
    }

    fn wait_for_client(&self, instance: &Arc<OwnedHandle>, deadline: &Deadline) -> Result<()> {
        let event = Event::new()?;
        // SAFETY: zero-initialized OVERLAPPED is the documented starting
        // state; it stays alive until the operation is known complete.
        let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
        overlapped.hEvent = event.raw();

        // SAFETY: the pipe handle is open and `overlapped` outlives the
        // operation (synchronized below on every path).
        let ok = unsafe { ConnectNamedPipe(instance.0, &mut overlapped) };
        if ok != 0 {
            return Ok(());
        }
        // SAFETY: querying the thread-local error code.
        match unsafe { GetLastError() } {
            ERROR_PIPE_CONNECTED => return Ok(()), // client raced us and already connected
            ERROR_IO_PENDING => {}
            code => return Err(platform_code("connect-named-pipe", code)),
        }

        match wait_event(event.raw(), deadline)? {
            WaitOutcome::Ready => {
                let mut transferred = 0u32;
                // SAFETY: the operation has signaled; this only collects its status.
                let ok = unsafe {
                    GetOverlappedResult(instance.0, &overlapped, &mut transferred, 0)
                };
                if ok == 0 {
                    // SAFETY: querying the thread-local error code.
                    let code = unsafe { GetLastError() };
                    return match code {
                        ERROR_PIPE_CONNECTED => Ok(()),
                        ERROR_OPERATION_ABORTED if self.closed.load(Ordering::SeqCst) => {
                            Err(TransportError::Closed)
                        }
                        _ => Err(platform_code("connect-named-pipe", code)),
                    };
                }
                Ok(())
            }
            WaitOutcome::TimedOut => {
                // SAFETY: cancels the specific operation; completion is
                // synchronized right below before `overlapped` drops.
                unsafe {
                    CancelIoEx(instance.0, &overlapped);
                }
                let mut transferred = 0u32;
                // SAFETY: bWait=1 blocks until the cancelled (or completed)
                // operation is acknowledged by the kernel.
                let ok = unsafe {
                    GetOverlappedResult(instance.0, &overlapped, &mut transferred, 1)
                };
                if ok != 0 {
                    // The client connected in the cancellation window.
                    return Ok(());
                }
                // SAFETY: querying the thread-local error code.
                match unsafe { GetLastError() } {
                    ERROR_PIPE_CONNECTED => Ok(()),
                    ERROR_OPERATION_ABORTED => {
                        if self.closed.load(Ordering::SeqCst) {
                            Err(TransportError::Closed)
                        } else {
                            Err(TransportError::AcceptTimeout(deadline.requested_duration()))
                        }
                    }
                    code => Err(platform_code("connect-named-pipe", code)),
                }
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

    /// Release the listening pipe instance. Idempotent. The OS reclaims the
    /// pipe name once every handle is closed.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(instance) = lock_unpoisoned(&self.inner).take() {
            // Unblock a pending ConnectNamedPipe before the handle drops.
            // SAFETY: the handle is still open; a null overlapped cancels
            // every pending operation this process issued on it.
            unsafe {
                CancelIoEx(instance.0, std::ptr::null());
            }
            drop(instance);
        }
        debug!(endpoint = %self.id, "closed named pipe listener");
    }

    fn shared(&self) -> Option<Arc<OwnedHandle>> {
        lock_unpoisoned(&self.inner).as_ref().cloned()
    }
}

impl Drop for PipeListener {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PipeListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeListener")
            .field("endpoint", &self.id.as_str())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Connected named pipe stream.
pub struct PipeStream {
    handle: OwnedHandle,
    server_side: bool,
}

impl PipeStream {
    /// Connect to the pipe named by `id`, bounded by `timeout`.
    ///
    /// Pipes reject opens while no server accept is outstanding, so "all
    /// instances busy" is retried within the timeout via `WaitNamedPipeW`.
    /// Any other open failure means the endpoint does not exist.
    pub fn connect(id: &EndpointId, timeout: TimeoutSpec) -> Result<Self> {
        let deadline = Deadline::start(timeout);
        let name = wide(&id.pipe_path());

        loop {
            // SAFETY: `name` is NUL-terminated; no security attributes or
            // template handle are passed.
            let handle = unsafe {
                CreateFileW(
                    name.as_ptr(),
                    GENERIC_READ | GENERIC_WRITE,
                    0,
                    std::ptr::null(),
                    OPEN_EXISTING,
                    FILE_FLAG_OVERLAPPED,
                    std::ptr::null_mut(),
                )
            };
            if handle != INVALID_HANDLE_VALUE {
                debug!(endpoint = %id, "connected to named pipe");
                return Ok(Self {
                    handle: OwnedHandle(handle),
                    server_side: false,
                });
            }

            // SAFETY: querying the thread-local error code.
            let code = unsafe { GetLastError() };
            match code {
                ERROR_PIPE_BUSY => {
                    let wait_millis = match deadline.remaining() {
                        TimeoutSpec::Infinite => INFINITE,
                        TimeoutSpec::Bounded(d) => {
                            if deadline.expired() {
                                return Err(TransportError::ConnectTimeout {
                                    id: id.as_str().to_string(),
                                    timeout: deadline.requested_duration(),
                                });
                            }
                            (d.as_millis().min(u128::from(INFINITE - 1)) as u32).max(1)
                        }
                    };
                    // SAFETY: `name` is NUL-terminated and outlives the call.
                    let ok = unsafe { WaitNamedPipeW(name.as_ptr(), wait_millis) };
                    if ok == 0 && deadline.expired() {
                        return Err(TransportError::ConnectTimeout {
                            id: id.as_str().to_string(),
                            timeout: deadline.requested_duration(),
                        });
                    }
                    // An instance freed up (or the wait lapsed); try the open again.
                }
                ERROR_FILE_NOT_FOUND => {
                    return Err(TransportError::EndpointNotFound {
                        id: id.as_str().to_string(),
                    });
                }
                ERROR_ACCESS_DENIED => {
                    return Err(TransportError::PermissionDenied {
                        id: id.as_str().to_string(),
                        source: io::Error::from_raw_os_error(code as i32),
                    });
                }
                _ => return Err(platform_code("open-pipe", code)),
            }
        }
    }

    /// Read whatever bytes are available, bounded by the deadline.
    ///
    /// Returns `Ok(0)` when the peer has closed its end.
    pub fn recv_some(&self, buf: &mut [u8], deadline: &Deadline) -> Result<usize> {
        let event = Event::new()?;
        // SAFETY: zero-initialized OVERLAPPED; kept alive until the
        // operation is known complete on every path below.
        let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
        overlapped.hEvent = event.raw();

        let mut immediate = 0u32;
        // SAFETY: `buf` and `overlapped` outlive the operation; completion
        // is synchronized before either can drop.
        let ok = unsafe {
            ReadFile(
                self.handle.0,
                buf.as_mut_ptr(),
                buf.len() as u32,
                &mut immediate,
                &mut overlapped,
            )
        };
        if ok == 0 {
            // SAFETY: querying the thread-local error code.
            match unsafe { GetLastError() } {
                ERROR_IO_PENDING => {
                    match wait_event(event.raw(), deadline)? {
                        WaitOutcome::Ready => {}
                        WaitOutcome::TimedOut => {
                            return self.cancel_read(&overlapped, deadline);
                        }
                    }
                }
                ERROR_BROKEN_PIPE | ERROR_PIPE_NOT_CONNECTED => return Ok(0),
                code => return Err(platform_code("read", code)),
            }
        }

        self.finish_read(&overlapped)
    }

    /// Synchronize a timed-out read: cancel it and wait for the kernel to
    /// acknowledge before the buffer goes out of scope.
    fn cancel_read(&self, overlapped: &OVERLAPPED, deadline: &Deadline) -> Result<usize> {
        // SAFETY: cancels this specific operation on our handle.
        unsafe {
            CancelIoEx(self.handle.0, overlapped);
        }
        let mut transferred = 0u32;
        // SAFETY: bWait=1 blocks until the operation has fully retired.
        let ok = unsafe { GetOverlappedResult(self.handle.0, overlapped, &mut transferred, 1) };
        if ok != 0 {
            // Completed in the cancellation window; the bytes are valid.
            return Ok(transferred as usize);
        }
        // SAFETY: querying the thread-local error code.
        match unsafe { GetLastError() } {
            ERROR_OPERATION_ABORTED => Err(TransportError::ReceiveTimeout(
                deadline.requested_duration(),
            )),
            ERROR_BROKEN_PIPE | ERROR_PIPE_NOT_CONNECTED => Ok(0),
            code => Err(platform_code("read", code)),
        }
    }

    fn finish_read(&self, overlapped: &OVERLAPPED) -> Result<usize> {
        let mut transferred = 0u32;
        // SAFETY: the operation has completed; this collects its result.
        let ok = unsafe { GetOverlappedResult(self.handle.0, overlapped, &mut transferred, 0) };
        if ok == 0 {
            // SAFETY: querying the thread-local error code.
            return match unsafe { GetLastError() } {
                ERROR_BROKEN_PIPE | ERROR_PIPE_NOT_CONNECTED => Ok(0),
                code => Err(platform_code("read", code)),
            };
        }
        Ok(transferred as usize)
    }

    /// Write the whole buffer, bounded by the deadline.
    pub fn send_all(&self, buf: &[u8], deadline: &Deadline) -> Result<()> {
        let mut offset = 0usize;
        while offset < buf.len() {
            let written = self.write_some(&buf[offset..], deadline)?;
            offset += written;
        }
        Ok(())
    }

    fn write_some(&self, buf: &[u8], deadline: &Deadline) -> Result<usize> {
        let event = Event::new()?;
        // SAFETY: zero-initialized OVERLAPPED; kept alive until the
        // operation is known complete on every path below.
        let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
        overlapped.hEvent = event.raw();

        let mut immediate = 0u32;
        // SAFETY: `buf` and `overlapped` outlive the operation; completion
        // is synchronized before either can drop.
        let ok = unsafe {
            WriteFile(
                self.handle.0,
                buf.as_ptr(),
                buf.len() as u32,
                &mut immediate,
                &mut overlapped,
            )
        };
        if ok == 0 {
            // SAFETY: querying the thread-local error code.
            match unsafe { GetLastError() } {
                ERROR_IO_PENDING => match wait_event(event.raw(), deadline)? {
                    WaitOutcome::Ready => {}
                    WaitOutcome::TimedOut => {
                        // SAFETY: cancel then synchronize, as for reads.
                        unsafe {
                            CancelIoEx(self.handle.0, &overlapped);
                        }
                        let mut transferred = 0u32;
                        // SAFETY: bWait=1 blocks until the operation retires.
                        let ok = unsafe {
                            GetOverlappedResult(self.handle.0, &overlapped, &mut transferred, 1)
                        };
                        if ok != 0 {
                            return Ok(transferred as usize);
                        }
                        // SAFETY: querying the thread-local error code.
                        return match unsafe { GetLastError() } {
                            ERROR_OPERATION_ABORTED => Err(TransportError::SendTimeout(
                                deadline.requested_duration(),
                            )),
                            ERROR_BROKEN_PIPE | ERROR_NO_DATA => {
                                Err(TransportError::ConnectionClosed)
                            }
                            code => Err(platform_code("write", code)),
                        };
                    }
                },
                ERROR_BROKEN_PIPE | ERROR_NO_DATA | ERROR_PIPE_NOT_CONNECTED => {
                    return Err(TransportError::ConnectionClosed)
                }
                code => return Err(platform_code("write", code)),
            }
        }

        let mut transferred = 0u32;
        // SAFETY: the operation has completed; this collects its result.
        let ok = unsafe { GetOverlappedResult(self.handle.0, &overlapped, &mut transferred, 0) };
        if ok == 0 {
            // SAFETY: querying the thread-local error code.
            return match unsafe { GetLastError() } {
                ERROR_BROKEN_PIPE | ERROR_NO_DATA => Err(TransportError::ConnectionClosed),
                code => Err(platform_code("write", code)),
            };
        }
        Ok(transferred as usize)
    }

    /// Abort pending operations so a blocked peer or a concurrent local
    /// operation observes the close. The handle is released on drop.
    pub fn shutdown(&self) {
        // SAFETY: the handle is open; a null overlapped cancels every
        // pending operation this process issued on it.
        unsafe {
            CancelIoEx(self.handle.0, std::ptr::null());
            FlushFileBuffers(self.handle.0);
            if self.server_side {
                DisconnectNamedPipe(self.handle.0);
            }
        }
    }
}

impl std::fmt::Debug for PipeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeStream")
            .field("server_side", &self.server_side)
            .finish()
    }
}

/// Recover the data even if a holder panicked; the guarded state is a bare
/// `Option` and cannot be left inconsistent.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
