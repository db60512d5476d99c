//! Endpoint identifier generation and platform path mapping.
//!
//! An [`EndpointId`] is the opaque handshake value a server publishes and a
//! client dials. The same name maps to a pipe namespace path on Windows and
//! a per-user filesystem path on Unix; neither side ever exchanges the
//! platform path itself.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed namespace prefix for generated identifiers.
pub const ENDPOINT_PREFIX: &str = "localsock";

static NEXT_SUFFIX: AtomicU64 = AtomicU64::new(0);

/// Opaque identifier for a local endpoint, unique per (host, user,
/// process-lifetime).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointId {
    name: String,
}

impl EndpointId {
    /// Generate a fresh identifier.
    ///
    /// Combines the prefix, the current process id, a nanosecond clock
    /// reading, and a process-local counter, so concurrent generation in
    /// multiple processes cannot collide with any live endpoint. Allocates
    /// no OS resource.
    pub fn generate() -> Self {
        let pid = std::process::id();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let counter = NEXT_SUFFIX.fetch_add(1, Ordering::Relaxed);
        Self {
            name: format!("{ENDPOINT_PREFIX}-{pid}-{nanos:x}-{counter}"),
        }
    }

    /// Wrap an identifier received from a server (e.g. over its stdout).
    pub fn from_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The externally visible handshake value.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Pipe namespace path this identifier maps to.
    #[cfg(windows)]
    pub fn pipe_path(&self) -> String {
        format!(r"\\.\pipe\{}", self.name)
    }

    /// Filesystem socket path this identifier maps to.
    #[cfg(unix)]
    pub fn socket_path(&self) -> std::path::PathBuf {
        runtime_dir().join(format!("{}.sock", self.name))
    }
}

/// Per-user runtime directory for socket paths.
///
/// `XDG_RUNTIME_DIR` is per-user and mode 0700 where present; the system
/// temp dir is the fallback (socket files themselves are created 0600).
#[cfg(unix)]
fn runtime_dir() -> std::path::PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) if !dir.is_empty() => std::path::PathBuf::from(dir),
        _ => std::env::temp_dir(),
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
