//! Timeout-bounded local IPC channels over Unix sockets and named pipes.
//!
//! localsock gives two processes on the same machine a duplex,
//! message-oriented channel with one API on every platform: Unix domain
//! sockets on POSIX, named pipes with overlapped I/O on Windows. A server
//! binds a generated endpoint identifier, publishes it over any side
//! channel (stdout, an environment variable), and every blocking call on
//! either side takes an explicit timeout.
//!
//! # Crate Structure
//!
//! - [`transport`] — Platform backends, endpoint identifiers, timeouts
//! - [`frame`] — Length-prefixed message framing
//! - [`channel`] — [`channel::LocalServer`], [`channel::connect`] and the
//!   message [`channel::Channel`]

/// Re-export transport types.
pub mod transport {
    pub use localsock_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use localsock_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use localsock_channel::*;
}
