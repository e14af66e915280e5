use std::fmt;
use std::io;
use std::sync::Arc;

use futures::{SinkExt, StreamExt, TryFutureExt};
use tokio::io::{AsyncRead, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, instrument, warn};

use super::config::Config;
use super::connection::{Conn, ConnDeps, ConnParts};
use super::error::HandshakeError;
use super::events::Events;
use super::handshake::{Capabilities, HandshakeCodec, HandshakeMessage};
use super::transport::{bounded, BoxTransport, Deadlines, Transport};
use crate::clock::Clock;
use crate::identity::{InfoHash, PeerId};
use crate::metrics::ConnStats;
use crate::networkevent::{Event, Producer};
use crate::torrent::TorrentInfo;

/// Turns raw transports into [`Conn`]s.
///
/// Holds no per-connection state, so one handshaker can be cloned and used
/// for any number of concurrent handshakes.
#[derive(Clone)]
pub struct Handshaker {
    config: Config,
    stats: Arc<ConnStats>,
    clock: Arc<dyn Clock>,
    producer: Arc<dyn Producer>,
    peer_id: PeerId,
    events: Arc<dyn Events>,
}

/// An inbound transport whose peer has sent its handshake but has not been
/// answered yet. Dropping it rejects the peer and closes the transport.
pub struct PendingConn {
    message: HandshakeMessage,
    reader: FramedRead<ReadHalf<BoxTransport>, HandshakeCodec>,
    writer: WriteHalf<BoxTransport>,
    deadlines: Arc<dyn Deadlines>,
}

impl PendingConn {
    pub fn peer_id(&self) -> PeerId {
        self.message.peer_id
    }

    /// The torrent the remote peer asked for.
    pub fn info_hash(&self) -> InfoHash {
        self.message.info_hash
    }

    pub fn capabilities(&self) -> Capabilities {
        self.message.capabilities
    }
}

impl fmt::Debug for PendingConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingConn")
            .field("peer_id", &self.message.peer_id)
            .field("info_hash", &self.message.info_hash)
            .finish()
    }
}

impl Handshaker {
    pub fn new(
        config: Config,
        stats: Arc<ConnStats>,
        clock: Arc<dyn Clock>,
        producer: Arc<dyn Producer>,
        peer_id: PeerId,
        events: Arc<dyn Events>,
    ) -> Self {
        Self {
            config: config.apply_defaults(),
            stats,
            clock,
            producer,
            peer_id,
            events,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &Arc<ConnStats> {
        &self.stats
    }

    /// Handshakes with a peer we dialed.
    pub async fn dial<T: Transport>(
        &self,
        transport: T,
        info: Arc<TorrentInfo>,
    ) -> Result<Arc<Conn>, HandshakeError> {
        self.establish(transport, info, false).await
    }

    /// Handshakes with a peer that dialed us for a torrent known up front.
    pub async fn accept_for<T: Transport>(
        &self,
        transport: T,
        info: Arc<TorrentInfo>,
    ) -> Result<Arc<Conn>, HandshakeError> {
        self.establish(transport, info, true).await
    }

    /// Runs the symmetric handshake over `transport`.
    ///
    /// Both frames travel concurrently: ours is written while the peer's is
    /// read, so both ends may call this at the same time. The whole exchange
    /// is bounded by the handshake timeout. On any failure the transport is
    /// dropped before returning.
    #[instrument(skip_all, fields(local = %self.peer_id, hash = %info.info_hash(), inbound = inbound))]
    pub async fn establish<T: Transport>(
        &self,
        transport: T,
        info: Arc<TorrentInfo>,
        inbound: bool,
    ) -> Result<Arc<Conn>, HandshakeError> {
        let deadlines = transport.deadlines();
        let expiry = deadlines.expiry(self.clock.now(), self.config.handshake_timeout);

        let transport: BoxTransport = Box::new(transport);
        let (reader, writer) = tokio::io::split(transport);
        let mut reader = FramedRead::new(reader, HandshakeCodec);
        let mut writer = FramedWrite::new(writer, HandshakeCodec);

        let ours = HandshakeMessage::new(info.info_hash(), self.peer_id);
        let exchange = futures::future::try_join(
            writer.send(ours).map_err(HandshakeError::from),
            receive(&mut reader),
        );
        let theirs = match bounded(self.clock.as_ref(), expiry, exchange).await {
            Ok(Ok((_, theirs))) => theirs,
            Ok(Err(e)) => return Err(self.fail(e, inbound, None)),
            Err(_) => return Err(self.fail(HandshakeError::Timeout, inbound, None)),
        };

        if let Err(e) = validate(&theirs, &info) {
            return Err(self.fail(e, inbound, Some(&theirs)));
        }

        let buffered = reader.read_buffer_mut().split();
        let parts = ConnParts {
            peer_id: theirs.peer_id,
            info,
            inbound,
            capabilities: theirs.capabilities,
            reader: reader.into_inner(),
            buffered,
            writer: writer.into_inner(),
            deadlines,
        };
        Ok(self.succeed(parts))
    }

    /// Reads the handshake of a peer that dialed us, without answering yet.
    ///
    /// The caller inspects [`PendingConn::info_hash`] to find the torrent and
    /// finishes with [`Handshaker::establish_pending`].
    #[instrument(skip_all, fields(local = %self.peer_id))]
    pub async fn accept<T: Transport>(&self, transport: T) -> Result<PendingConn, HandshakeError> {
        let deadlines = transport.deadlines();
        let expiry = deadlines.expiry(self.clock.now(), self.config.handshake_timeout);

        let transport: BoxTransport = Box::new(transport);
        let (reader, writer) = tokio::io::split(transport);
        let mut reader = FramedRead::new(reader, HandshakeCodec);

        let message = match bounded(self.clock.as_ref(), expiry, receive(&mut reader)).await {
            Ok(Ok(message)) => message,
            Ok(Err(e)) => return Err(self.fail(e, true, None)),
            Err(_) => return Err(self.fail(HandshakeError::Timeout, true, None)),
        };
        debug!("Peer {} wants {}", message.peer_id, message.info_hash);

        Ok(PendingConn {
            message,
            reader,
            writer,
            deadlines,
        })
    }

    /// Answers a [`PendingConn`] for `info`, producing an inbound [`Conn`].
    #[instrument(skip_all, fields(local = %self.peer_id, hash = %info.info_hash()))]
    pub async fn establish_pending(
        &self,
        pending: PendingConn,
        info: Arc<TorrentInfo>,
    ) -> Result<Arc<Conn>, HandshakeError> {
        let PendingConn {
            message,
            mut reader,
            writer,
            deadlines,
        } = pending;

        if let Err(e) = validate(&message, &info) {
            return Err(self.fail(e, true, Some(&message)));
        }

        let expiry = deadlines.expiry(self.clock.now(), self.config.handshake_timeout);
        let mut writer = FramedWrite::new(writer, HandshakeCodec);
        let ours = HandshakeMessage::new(info.info_hash(), self.peer_id);
        match bounded(self.clock.as_ref(), expiry, writer.send(ours)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.fail(e.into(), true, Some(&message))),
            Err(_) => return Err(self.fail(HandshakeError::Timeout, true, Some(&message))),
        }

        let buffered = reader.read_buffer_mut().split();
        let parts = ConnParts {
            peer_id: message.peer_id,
            info,
            inbound: true,
            capabilities: message.capabilities,
            reader: reader.into_inner(),
            buffered,
            writer: writer.into_inner(),
            deadlines,
        };
        Ok(self.succeed(parts))
    }

    /// Builds a connection directly over `transport`, skipping the handshake.
    /// Only fixtures use this.
    pub(crate) fn new_conn<T: Transport>(
        &self,
        transport: T,
        peer_id: PeerId,
        info: Arc<TorrentInfo>,
        inbound: bool,
    ) -> Arc<Conn> {
        let deadlines = transport.deadlines();
        let transport: BoxTransport = Box::new(transport);
        let (reader, writer) = tokio::io::split(transport);
        Conn::new(
            ConnParts {
                peer_id,
                info,
                inbound,
                capabilities: Capabilities::default(),
                reader,
                buffered: Default::default(),
                writer,
                deadlines,
            },
            self.deps(),
        )
    }

    fn deps(&self) -> ConnDeps {
        ConnDeps {
            local_peer_id: self.peer_id,
            config: self.config,
            clock: Arc::clone(&self.clock),
            stats: Arc::clone(&self.stats),
            producer: Arc::clone(&self.producer),
            events: Arc::clone(&self.events),
        }
    }

    fn succeed(&self, parts: ConnParts) -> Arc<Conn> {
        self.stats.record_success();
        self.producer.produce(Event::HandshakeSucceeded {
            local: self.peer_id,
            remote: parts.peer_id,
            info_hash: parts.info.info_hash(),
            inbound: parts.inbound,
        });
        let conn = Conn::new(parts, self.deps());
        info!("Handshake with peer {} successful", conn.peer_id());
        conn
    }

    fn fail(
        &self,
        err: HandshakeError,
        inbound: bool,
        remote: Option<&HandshakeMessage>,
    ) -> HandshakeError {
        let kind = err.kind();
        warn!("Handshake failed ({:?}): {}", kind, err);
        self.stats.record_failure(kind);
        self.producer.produce(Event::HandshakeFailed {
            local: self.peer_id,
            remote: remote.map(|m| m.peer_id),
            info_hash: remote.map(|m| m.info_hash),
            inbound,
            reason: kind,
            detail: err.to_string(),
        });
        err
    }
}

impl fmt::Debug for Handshaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshaker")
            .field("peer_id", &self.peer_id)
            .field("config", &self.config)
            .finish()
    }
}

async fn receive<R: AsyncRead + Unpin>(
    reader: &mut FramedRead<R, HandshakeCodec>,
) -> Result<HandshakeMessage, HandshakeError> {
    match reader.next().await {
        Some(message) => Ok(message?),
        None => Err(HandshakeError::Transport(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "peer closed the connection before its handshake",
        ))),
    }
}

fn validate(message: &HandshakeMessage, info: &TorrentInfo) -> Result<(), HandshakeError> {
    if message.info_hash != info.info_hash() {
        return Err(HandshakeError::InfoHashMismatch {
            expected: info.info_hash(),
            actual: message.info_hash,
        });
    }
    Ok(())
}
