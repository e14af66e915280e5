use std::io;

use serde_derive::Serialize;

use crate::identity::InfoHash;

/// Coarse classification of handshake failures, used for counters and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Validation,
    Decode,
    Transport,
}

#[derive(thiserror::Error, Debug)]
pub enum HandshakeError {
    #[error("handshake timed out")]
    Timeout,
    #[error("info hash mismatch: expected {expected}, peer sent {actual}")]
    InfoHashMismatch {
        expected: InfoHash,
        actual: InfoHash,
    },
    #[error("malformed handshake: {0}")]
    Decode(String),
    #[error("transport failure during handshake: {0}")]
    Transport(#[source] io::Error),
}

impl HandshakeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            HandshakeError::Timeout => FailureKind::Timeout,
            HandshakeError::InfoHashMismatch { .. } => FailureKind::Validation,
            HandshakeError::Decode(_) => FailureKind::Decode,
            HandshakeError::Transport(_) => FailureKind::Transport,
        }
    }
}

impl From<CodecError> for HandshakeError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => HandshakeError::Transport(e),
            other => HandshakeError::Decode(other.to_string()),
        }
    }
}

/// Errors returned by reads and writes on an established [`super::Conn`].
#[derive(thiserror::Error, Debug)]
pub enum ConnError {
    #[error("connection closed")]
    Closed,
    #[error("connection deadline exceeded")]
    Timeout,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unknown protocol identifier")]
    InvalidProtocol,
    #[error("stream ended after {len} of 68 handshake bytes")]
    Truncated { len: usize },
}
