//! Peer connection handshake and lifecycle.

mod config;
mod connection;
mod error;
mod events;
pub mod fixtures;
mod handshake;
mod handshaker;
mod transport;

pub use config::Config;
pub use connection::Conn;
pub use error::{CodecError, ConnError, FailureKind, HandshakeError};
pub use events::{Events, NoopEvents};
pub use handshake::{Capabilities, HandshakeCodec, HandshakeMessage};
pub use handshaker::{Handshaker, PendingConn};
pub use transport::{Deadlines, IgnoreDeadlines, NoDeadlines, TimerDeadlines, Transport};
