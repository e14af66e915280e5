use std::sync::atomic::{AtomicU64, Ordering};

use crate::conn::FailureKind;

/// Lock-free counters for handshake outcomes and connection closures.
#[derive(Debug, Default)]
pub struct ConnStats {
    handshake_success: AtomicU64,
    handshake_timeout: AtomicU64,
    handshake_validation: AtomicU64,
    handshake_decode: AtomicU64,
    handshake_transport: AtomicU64,
    closed: AtomicU64,
}

impl ConnStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.handshake_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, kind: FailureKind) {
        let counter = match kind {
            FailureKind::Timeout => &self.handshake_timeout,
            FailureKind::Validation => &self.handshake_validation,
            FailureKind::Decode => &self.handshake_decode,
            FailureKind::Transport => &self.handshake_transport,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_closed(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_success(&self) -> u64 {
        self.handshake_success.load(Ordering::Relaxed)
    }

    pub fn handshake_failures(&self, kind: FailureKind) -> u64 {
        match kind {
            FailureKind::Timeout => self.handshake_timeout.load(Ordering::Relaxed),
            FailureKind::Validation => self.handshake_validation.load(Ordering::Relaxed),
            FailureKind::Decode => self.handshake_decode.load(Ordering::Relaxed),
            FailureKind::Transport => self.handshake_transport.load(Ordering::Relaxed),
        }
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_independent() {
        let stats = ConnStats::new();
        stats.record_success();
        stats.record_failure(FailureKind::Timeout);
        stats.record_failure(FailureKind::Timeout);
        stats.record_failure(FailureKind::Decode);
        stats.record_closed();

        assert_eq!(stats.handshake_success(), 1);
        assert_eq!(stats.handshake_failures(FailureKind::Timeout), 2);
        assert_eq!(stats.handshake_failures(FailureKind::Decode), 1);
        assert_eq!(stats.handshake_failures(FailureKind::Validation), 0);
        assert_eq!(stats.handshake_failures(FailureKind::Transport), 0);
        assert_eq!(stats.closed(), 1);
    }
}
