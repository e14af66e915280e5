use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use swarm_conn::clock::TokioClock;
use swarm_conn::conn::{Config, Conn, ConnError, Events, Handshaker};
use swarm_conn::identity::{InfoHash, PeerId};
use swarm_conn::metrics::ConnStats;
use swarm_conn::networkevent::LogProducer;
use swarm_conn::torrent::TorrentInfo;

#[derive(Parser)]
#[command(name = "swarm-conn", about = "Handshake with swarm peers over TCP")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    timeouts: Timeouts,
}

#[derive(Subcommand)]
enum Command {
    /// Accept peers and print what they send
    Listen {
        #[arg(long, default_value = "0.0.0.0:6881")]
        addr: SocketAddr,
        #[command(flatten)]
        torrent: TorrentArgs,
    },
    /// Dial a peer and send it a message
    Dial {
        addr: SocketAddr,
        #[command(flatten)]
        torrent: TorrentArgs,
        #[arg(long, default_value = "hello")]
        message: String,
    },
}

#[derive(Args)]
struct TorrentArgs {
    /// Bencoded metainfo file describing the torrent
    #[arg(long, conflicts_with = "name")]
    metainfo: Option<PathBuf>,
    /// Derive the torrent identity from this name instead of a metainfo file
    #[arg(long)]
    name: Option<String>,
}

/// Zero keeps the built-in default.
#[derive(Args)]
struct Timeouts {
    #[arg(long, global = true, default_value_t = 0)]
    handshake_timeout_ms: u64,
    #[arg(long, global = true, default_value_t = 0)]
    read_timeout_ms: u64,
    #[arg(long, global = true, default_value_t = 0)]
    write_timeout_ms: u64,
}

impl Timeouts {
    fn config(&self) -> Config {
        Config::default()
            .with_handshake_timeout(Duration::from_millis(self.handshake_timeout_ms))
            .with_read_timeout(Duration::from_millis(self.read_timeout_ms))
            .with_write_timeout(Duration::from_millis(self.write_timeout_ms))
            .apply_defaults()
    }
}

impl TorrentArgs {
    async fn load(&self) -> Result<Arc<TorrentInfo>> {
        let info = match (&self.metainfo, &self.name) {
            (Some(path), _) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed reading {}", path.display()))?;
                TorrentInfo::from_metainfo(&bytes).context("Failed parsing metainfo")?
            }
            (None, Some(name)) => TorrentInfo::new(InfoHash::of(name.as_bytes()), name, 0, 1)?,
            (None, None) => bail!("either --metainfo or --name is required"),
        };
        Ok(Arc::new(info))
    }
}

struct LogEvents;

impl Events for LogEvents {
    fn conn_closed(&self, conn: &Conn) {
        info!(
            "{} closed after {:?} ({} bytes in, {} bytes out)",
            conn,
            conn.created_at().elapsed(),
            conn.bytes_read(),
            conn.bytes_written()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = cli.timeouts.config();
    let handshaker = Handshaker::new(
        config,
        Arc::new(ConnStats::new()),
        Arc::new(TokioClock),
        Arc::new(LogProducer),
        PeerId::generate(),
        Arc::new(LogEvents),
    );
    info!("Local peer id {}", handshaker.peer_id());

    match cli.command {
        Command::Listen { addr, torrent } => listen(handshaker, addr, torrent.load().await?).await,
        Command::Dial {
            addr,
            torrent,
            message,
        } => dial(handshaker, addr, torrent.load().await?, message).await,
    }
}

async fn listen(handshaker: Handshaker, addr: SocketAddr, info: Arc<TorrentInfo>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {} for {}", addr, info);

    loop {
        let (stream, remote) = listener.accept().await.context("Failed to accept")?;
        let handshaker = handshaker.clone();
        let info = Arc::clone(&info);
        tokio::spawn(async move {
            if let Err(e) = serve(handshaker, stream, info).await {
                warn!("Peer {} dropped: {:#}", remote, e);
            }
        });
    }
}

async fn serve(handshaker: Handshaker, stream: TcpStream, info: Arc<TorrentInfo>) -> Result<()> {
    let pending = handshaker.accept(stream).await?;
    if pending.info_hash() != info.info_hash() {
        bail!("peer asked for unknown torrent {}", pending.info_hash());
    }
    let conn = handshaker.establish_pending(pending, info).await?;

    let mut buf = vec![0u8; 16 * 1024];
    loop {
        match conn.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => println!("{}: {}", conn.peer_id(), String::from_utf8_lossy(&buf[..n])),
            Err(ConnError::Closed) => return Ok(()),
            Err(e) => return Err(e).context("Failed reading from peer"),
        }
    }
}

async fn dial(
    handshaker: Handshaker,
    addr: SocketAddr,
    info: Arc<TorrentInfo>,
    message: String,
) -> Result<()> {
    let stream = timeout(handshaker.config().handshake_timeout, TcpStream::connect(addr))
        .await
        .context("Connecting timed out")?
        .with_context(|| format!("Failed to connect to {}", addr))?;

    let conn = handshaker
        .dial(stream, info)
        .await
        .context("Failed to handshake")?;
    conn.write_all(message.as_bytes())
        .await
        .context("Failed to send message")?;
    conn.close();
    Ok(())
}
