//! Ready-made handshakers and connections for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Config, Conn, Events, Handshaker, NoDeadlines, NoopEvents};
use crate::clock::TokioClock;
use crate::identity::{InfoHash, PeerId};
use crate::metrics::ConnStats;
use crate::networkevent::TestProducer;
use crate::torrent::TorrentInfo;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Event sink that remembers every closed connection.
#[derive(Debug, Default)]
pub struct RecordingEvents {
    count: AtomicUsize,
    closed: Mutex<Vec<(PeerId, InfoHash)>>,
}

impl RecordingEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> Vec<(PeerId, InfoHash)> {
        self.closed
            .lock()
            .map(|closed| closed.clone())
            .unwrap_or_default()
    }
}

impl Events for RecordingEvents {
    fn conn_closed(&self, conn: &Conn) {
        self.count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut closed) = self.closed.lock() {
            closed.push((conn.peer_id(), conn.info_hash()));
        }
    }
}

pub fn config_fixture() -> Config {
    Config::default().apply_defaults()
}

/// A small torrent whose content identity is derived from `name`.
pub fn info_fixture(name: &str) -> Arc<TorrentInfo> {
    let info = TorrentInfo::new(InfoHash::of(name.as_bytes()), name, 1, 1)
        .expect("fixture piece length is positive");
    Arc::new(info)
}

/// A handshaker with a fresh peer id that discards close notifications.
pub fn handshaker_fixture(config: Config) -> Handshaker {
    handshaker_with(config, PeerId::generate(), Arc::new(NoopEvents))
}

pub fn handshaker_with(config: Config, peer_id: PeerId, events: Arc<dyn Events>) -> Handshaker {
    Handshaker::new(
        config,
        Arc::new(ConnStats::new()),
        Arc::new(TokioClock),
        Arc::new(TestProducer::new()),
        peer_id,
        events,
    )
}

/// Both ends of a live in-memory connection, built without a handshake over
/// a pipe that ignores deadlines. `local` dialed, `remote` accepted.
pub fn pipe_fixture(config: Config, info: Arc<TorrentInfo>) -> (Arc<Conn>, Arc<Conn>) {
    pipe_fixture_with(config, info, Arc::new(NoopEvents))
}

/// Like [`pipe_fixture`], reporting closure of `local` to `events`.
pub fn pipe_fixture_with(
    config: Config,
    info: Arc<TorrentInfo>,
    events: Arc<dyn Events>,
) -> (Arc<Conn>, Arc<Conn>) {
    let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
    let local_hs = handshaker_with(config, PeerId::generate(), events);
    let remote_hs = handshaker_fixture(config);

    let local = local_hs.new_conn(NoDeadlines(a), remote_hs.peer_id(), Arc::clone(&info), false);
    let remote = remote_hs.new_conn(NoDeadlines(b), local_hs.peer_id(), info, true);
    (local, remote)
}

/// Holds the far end of a [`fixture`] connection open. Dropping it hangs up.
#[derive(Debug)]
#[must_use = "dropping the cleanup hangs up the fixture connection"]
pub struct Cleanup {
    remote: Arc<Conn>,
}

impl Cleanup {
    /// The accepted end of the pipe.
    pub fn remote(&self) -> &Arc<Conn> {
        &self.remote
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.remote.close();
    }
}

/// A live local connection, open until the returned [`Cleanup`] is dropped.
pub fn fixture() -> (Arc<Conn>, Cleanup) {
    let (local, remote) = pipe_fixture(Config::default(), info_fixture("fixture"));
    (local, Cleanup { remote })
}
