//! Structured protocol events for offline analysis.

use std::sync::Mutex;

use serde_derive::Serialize;

use crate::conn::FailureKind;
use crate::identity::{InfoHash, PeerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    HandshakeSucceeded {
        local: PeerId,
        remote: PeerId,
        info_hash: InfoHash,
        inbound: bool,
    },
    HandshakeFailed {
        local: PeerId,
        /// Known only if the remote frame was decoded before failing.
        remote: Option<PeerId>,
        info_hash: Option<InfoHash>,
        inbound: bool,
        reason: FailureKind,
        detail: String,
    },
    ConnClosed {
        local: PeerId,
        remote: PeerId,
        info_hash: InfoHash,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::HandshakeSucceeded { .. } => "handshake_succeeded",
            Event::HandshakeFailed { .. } => "handshake_failed",
            Event::ConnClosed { .. } => "conn_closed",
        }
    }
}

/// Sink for network events. Producing must never block the caller.
pub trait Producer: Send + Sync {
    fn produce(&self, event: Event);
}

/// Emits every event as a `tracing` record on the `networkevent` target.
#[derive(Debug, Default)]
pub struct LogProducer;

impl Producer for LogProducer {
    fn produce(&self, event: Event) {
        tracing::info!(target: "networkevent", name = event.name(), event = ?event);
    }
}

/// Keeps events in memory so tests can assert on them.
#[derive(Debug, Default)]
pub struct TestProducer {
    events: Mutex<Vec<Event>>,
}

impl TestProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl Producer for TestProducer {
    fn produce(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
