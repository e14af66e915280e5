//! Handshake and lifecycle management for peer connections in a
//! peer-to-peer blob distribution network.
//!
//! A [`conn::Handshaker`] turns a raw byte stream into a [`conn::Conn`]
//! scoped to one torrent. Connections enforce per-call read and write
//! deadlines and notify their owner exactly once when they close.

pub mod clock;
pub mod conn;
pub mod identity;
pub mod metrics;
pub mod networkevent;
pub mod torrent;
