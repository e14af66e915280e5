use std::fmt;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::bytes::BytesMut;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::config::Config;
use super::error::ConnError;
use super::events::Events;
use super::handshake::Capabilities;
use super::transport::{bounded, BoxTransport, Deadlines};
use crate::clock::Clock;
use crate::identity::{InfoHash, PeerId};
use crate::metrics::ConnStats;
use crate::networkevent::{Event, Producer};
use crate::torrent::TorrentInfo;

struct Reader {
    io: ReadHalf<BoxTransport>,
    /// Bytes the peer sent right behind its handshake frame.
    buffered: BytesMut,
}

/// Everything needed to build a [`Conn`] once the handshake is done.
pub(crate) struct ConnParts {
    pub peer_id: PeerId,
    pub info: Arc<TorrentInfo>,
    pub inbound: bool,
    pub capabilities: Capabilities,
    pub reader: ReadHalf<BoxTransport>,
    pub buffered: BytesMut,
    pub writer: WriteHalf<BoxTransport>,
    pub deadlines: Arc<dyn Deadlines>,
}

/// Shared collaborators handed down from the handshaker.
pub(crate) struct ConnDeps {
    pub local_peer_id: PeerId,
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub stats: Arc<ConnStats>,
    pub producer: Arc<dyn Producer>,
    pub events: Arc<dyn Events>,
}

/// An established connection to one peer for one torrent.
///
/// Reads and writes may run concurrently from different tasks. Every call
/// arms its own deadline. The connection closes on the first of: an explicit
/// [`Conn::close`], remote EOF, a deadline expiry or an I/O error. Closing is
/// terminal and notifies [`Events::conn_closed`] exactly once.
pub struct Conn {
    peer_id: PeerId,
    local_peer_id: PeerId,
    info: Arc<TorrentInfo>,
    inbound: bool,
    capabilities: Capabilities,
    created_at: Instant,

    config: Config,
    clock: Arc<dyn Clock>,
    deadlines: Arc<dyn Deadlines>,

    reader: Mutex<Option<Reader>>,
    writer: Mutex<Option<WriteHalf<BoxTransport>>>,

    closed: AtomicBool,
    shutdown: CancellationToken,

    bytes_read: AtomicU64,
    bytes_written: AtomicU64,

    stats: Arc<ConnStats>,
    producer: Arc<dyn Producer>,
    events: Arc<dyn Events>,
}

impl Conn {
    pub(crate) fn new(parts: ConnParts, deps: ConnDeps) -> Arc<Self> {
        let created_at = deps.clock.now();
        Arc::new(Self {
            peer_id: parts.peer_id,
            local_peer_id: deps.local_peer_id,
            info: parts.info,
            inbound: parts.inbound,
            capabilities: parts.capabilities,
            created_at,
            config: deps.config,
            clock: deps.clock,
            deadlines: parts.deadlines,
            reader: Mutex::new(Some(Reader {
                io: parts.reader,
                buffered: parts.buffered,
            })),
            writer: Mutex::new(Some(parts.writer)),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            stats: deps.stats,
            producer: deps.producer,
            events: deps.events,
        })
    }

    /// Identity of the remote peer.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info.info_hash()
    }

    pub fn info(&self) -> &Arc<TorrentInfo> {
        &self.info
    }

    /// True if the remote peer dialed us.
    pub fn inbound(&self) -> bool {
        self.inbound
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn remote_capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Reads into `buf`, returning the number of bytes read.
    ///
    /// `Ok(0)` for a non-empty `buf` means the peer hung up; the connection is
    /// closed at that point.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, ConnError> {
        if self.is_closed() {
            return Err(ConnError::Closed);
        }

        let result = {
            let mut guard = self.reader.lock().await;
            match guard.as_mut() {
                None => Err(ConnError::Closed),
                Some(reader) if !reader.buffered.is_empty() => {
                    let n = buf.len().min(reader.buffered.len());
                    buf[..n].copy_from_slice(&reader.buffered.split_to(n));
                    Ok(n)
                }
                Some(reader) => {
                    let expiry = self.read_expiry();
                    self.guarded(expiry, reader.io.read(buf)).await
                }
            }
        };
        self.release_if_closed();

        match result {
            Ok(0) if !buf.is_empty() => {
                debug!("Peer {} closed {}", self.peer_id, self.info.info_hash());
                self.close();
                Ok(0)
            }
            Ok(n) => {
                self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Fills `buf` completely under a single read deadline.
    pub async fn read_exact(&self, buf: &mut [u8]) -> Result<(), ConnError> {
        if self.is_closed() {
            return Err(ConnError::Closed);
        }

        let result = {
            let mut guard = self.reader.lock().await;
            match guard.as_mut() {
                None => Err(ConnError::Closed),
                Some(reader) => {
                    let n = buf.len().min(reader.buffered.len());
                    buf[..n].copy_from_slice(&reader.buffered.split_to(n));
                    let rest = &mut buf[n..];
                    if rest.is_empty() {
                        Ok(())
                    } else {
                        let expiry = self.read_expiry();
                        self.guarded(expiry, reader.io.read_exact(rest))
                            .await
                            .map(|_| ())
                    }
                }
            }
        };
        self.release_if_closed();

        match result {
            Ok(()) => {
                self.bytes_read.fetch_add(buf.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Writes and flushes all of `buf` under a single write deadline.
    pub async fn write_all(&self, buf: &[u8]) -> Result<(), ConnError> {
        if self.is_closed() {
            return Err(ConnError::Closed);
        }

        let result = {
            let mut guard = self.writer.lock().await;
            match guard.as_mut() {
                None => Err(ConnError::Closed),
                Some(writer) => {
                    let expiry = self
                        .deadlines
                        .expiry(self.clock.now(), self.config.write_timeout);
                    self.guarded(expiry, async {
                        writer.write_all(buf).await?;
                        writer.flush().await
                    })
                    .await
                }
            }
        };
        self.release_if_closed();

        match result {
            Ok(()) => {
                self.bytes_written
                    .fetch_add(buf.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Closes the connection. Only the first call has any effect: it cancels
    /// in-flight reads and writes, releases the transport and notifies the
    /// event sink.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        self.release_if_closed();

        debug!("Closing {}", self);
        self.stats.record_closed();
        self.producer.produce(Event::ConnClosed {
            local: self.local_peer_id,
            remote: self.peer_id,
            info_hash: self.info.info_hash(),
        });
        self.events.conn_closed(self);
    }

    fn read_expiry(&self) -> Option<Instant> {
        self.deadlines
            .expiry(self.clock.now(), self.config.read_timeout)
    }

    async fn guarded<F, T>(&self, expiry: Option<Instant>, io: F) -> Result<T, ConnError>
    where
        F: Future<Output = io::Result<T>>,
    {
        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => Err(ConnError::Closed),
            result = bounded(self.clock.as_ref(), expiry, io) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(ConnError::Io(e)),
                Err(_) => Err(ConnError::Timeout),
            },
        }
    }

    /// Closes the connection after a failed call and picks the error the
    /// caller sees. Failures caused by a concurrent close read as `Closed`.
    fn fail(&self, err: ConnError) -> ConnError {
        if matches!(err, ConnError::Closed) || self.is_closed() {
            return ConnError::Closed;
        }
        debug!("{} failed: {}", self, err);
        self.close();
        err
    }

    /// Drops whichever transport halves are not currently in use. Called by
    /// close and by every I/O call after it lets go of its half, so the last
    /// holder of a half releases it.
    fn release_if_closed(&self) {
        if !self.is_closed() {
            return;
        }
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Display for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Conn(peer={}, hash={}, inbound={})",
            self.peer_id,
            self.info.info_hash(),
            self.inbound
        )
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("peer_id", &self.peer_id)
            .field("info_hash", &self.info.info_hash())
            .field("inbound", &self.inbound)
            .field("closed", &self.is_closed())
            .finish()
    }
}
