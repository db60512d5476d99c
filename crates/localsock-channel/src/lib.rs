//! Message channels over local transports.
//!
//! [`LocalServer`] binds a generated endpoint identifier and accepts
//! clients; [`connect`] dials one. Either way you end up with a
//! [`Channel`]: a duplex, message-oriented connection where every blocking
//! call is timeout-bounded and message boundaries survive the transport.

mod channel;
mod client;
mod error;
mod server;

pub use channel::{Channel, ConnectionState};
pub use client::{connect, connect_with_config};
pub use error::{ChannelError, Result};
pub use server::LocalServer;
