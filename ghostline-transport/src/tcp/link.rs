//! TCP link, mesh handshake and per-connection IO tasks.

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::config::TcpConfig;
use crate::communicator::{Communicator, Link};
use crate::mailbox::Mailbox;
use crate::wire::{encode_frame, FrameHeader, HEADER_SIZE};
use crate::{Rank, Tag, TransportError, TransportResult};

/// Link to peers over the TCP mesh.
///
/// Dropping the link closes every outbound queue and waits (bounded by the
/// connection timeout) for queued frames to be flushed, so it must not be
/// dropped from inside an async context.
#[derive(Debug)]
pub struct TcpLink {
    rank: Rank,
    writers: HashMap<Rank, mpsc::UnboundedSender<Vec<u8>>>,
    writer_tasks: Vec<JoinHandle<()>>,
    runtime: Option<Runtime>,
    shutdown_grace: Duration,
}

/// Endpoint of one rank of a TCP mesh.
pub type TcpTransport = Communicator<TcpLink>;

impl Link for TcpLink {
    fn deliver(&mut self, peer: Rank, tag: Tag, payload: &[u8]) -> TransportResult<()> {
        let frame = encode_frame(self.rank, tag, payload)?;
        self.writers
            .get(&peer)
            .ok_or(TransportError::PeerDisconnected { peer })?
            .send(frame)
            .map_err(|_| TransportError::PeerDisconnected { peer })
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        // closing the queues lets each writer flush and shut down its half
        self.writers.clear();
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        let tasks = std::mem::take(&mut self.writer_tasks);
        let grace = self.shutdown_grace;
        runtime.block_on(async move {
            for task in tasks {
                if tokio::time::timeout(grace, task).await.is_err() {
                    tracing::warn!("writer did not flush before shutdown");
                }
            }
        });
        runtime.shutdown_background();
    }
}

impl Communicator<TcpLink> {
    /// Bind `addrs[rank]` and build the mesh.
    pub fn establish(rank: Rank, addrs: &[SocketAddr], config: TcpConfig) -> TransportResult<Self> {
        let addr = addrs.get(rank.index()).ok_or(TransportError::InvalidPeer {
            peer: rank,
            size: addrs.len(),
        })?;
        let listener = std::net::TcpListener::bind(addr)?;
        Self::from_listener(rank, listener, addrs, config)
    }

    /// Build the mesh using an already bound listener for this rank.
    ///
    /// `addrs` lists the listening address of every rank, in rank order.
    pub fn from_listener(
        rank: Rank,
        listener: std::net::TcpListener,
        addrs: &[SocketAddr],
        config: TcpConfig,
    ) -> TransportResult<Self> {
        let size = addrs.len();
        if rank.index() >= size {
            return Err(TransportError::InvalidPeer { peer: rank, size });
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.io_threads.max(1))
            .thread_name("ghostline-io")
            .enable_all()
            .build()?;

        listener.set_nonblocking(true)?;
        let streams = runtime.block_on(connect_mesh(rank, listener, addrs, &config))?;

        let mailbox = Arc::new(Mailbox::new());
        let mut writers = HashMap::with_capacity(streams.len());
        let mut writer_tasks = Vec::with_capacity(streams.len());

        for (peer, stream) in streams {
            stream.set_nodelay(config.nodelay)?;
            let (read_half, write_half) = stream.into_split();
            let (frames_tx, frames_rx) = mpsc::unbounded_channel();

            runtime.spawn(read_frames(peer, read_half, Arc::clone(&mailbox)));
            writer_tasks.push(runtime.spawn(write_frames(
                peer,
                write_half,
                frames_rx,
                Arc::clone(&mailbox),
            )));
            writers.insert(peer, frames_tx);
        }

        tracing::info!(%rank, size, "tcp mesh established");

        let link = TcpLink {
            rank,
            writers,
            writer_tasks,
            runtime: Some(runtime),
            shutdown_grace: config.connection_timeout,
        };
        Ok(Communicator::new(rank, size, link, mailbox))
    }
}

/// Connect to every lower rank and accept every higher rank.
async fn connect_mesh(
    rank: Rank,
    listener: std::net::TcpListener,
    addrs: &[SocketAddr],
    config: &TcpConfig,
) -> TransportResult<Vec<(Rank, TcpStream)>> {
    let listener = TcpListener::from_std(listener)?;
    let mut streams = Vec::with_capacity(addrs.len().saturating_sub(1));

    for peer in Rank::all(rank.index()) {
        let mut stream = connect_with_backoff(peer, addrs[peer.index()], config).await?;
        stream.write_all(&rank.get().to_le_bytes()).await?;
        tracing::debug!(%rank, %peer, "connected to lower rank");
        streams.push((peer, stream));
    }

    let mut accepted = HashSet::new();
    let expected = addrs.len() - rank.index() - 1;
    while accepted.len() < expected {
        let missing = Rank::all(addrs.len())
            .skip(rank.index() + 1)
            .find(|peer| !accepted.contains(peer))
            .unwrap_or(rank);

        let (mut stream, remote) = tokio::time::timeout(config.accept_timeout, listener.accept())
            .await
            .map_err(|_| TransportError::Connection {
                peer: missing,
                message: format!("no connection within {:?}", config.accept_timeout),
            })??;

        let mut hello = [0u8; 4];
        tokio::time::timeout(config.connection_timeout, stream.read_exact(&mut hello))
            .await
            .map_err(|_| TransportError::Protocol {
                message: format!("no hello from {remote}"),
            })??;

        let peer = Rank::new(u32::from_le_bytes(hello));
        if peer <= rank || peer.index() >= addrs.len() || !accepted.insert(peer) {
            return Err(TransportError::Protocol {
                message: format!("unexpected hello from {remote}: rank {peer}"),
            });
        }
        tracing::debug!(%rank, %peer, %remote, "accepted higher rank");
        streams.push((peer, stream));
    }

    Ok(streams)
}

/// Connect to `addr`, retrying with exponential backoff.
async fn connect_with_backoff(
    peer: Rank,
    addr: SocketAddr,
    config: &TcpConfig,
) -> TransportResult<TcpStream> {
    let mut delay = config.initial_reconnect_delay;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let error = match tokio::time::timeout(config.connection_timeout, TcpStream::connect(addr))
            .await
        {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "connect timed out".to_string(),
        };

        if config
            .max_connect_attempts
            .is_some_and(|max| attempts >= max)
        {
            return Err(TransportError::Connection {
                peer,
                message: format!("{error} (gave up after {attempts} attempts)"),
            });
        }

        tracing::warn!(%peer, %addr, attempts, %error, "connect failed, retrying");
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(config.max_reconnect_delay);
    }
}

/// Decode frames from `peer` into the mailbox until the connection ends.
async fn read_frames(peer: Rank, mut reader: OwnedReadHalf, mailbox: Arc<Mailbox>) {
    let mut header_buf = [0u8; HEADER_SIZE];
    loop {
        if let Err(e) = reader.read_exact(&mut header_buf).await {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                tracing::debug!(%peer, "peer closed connection");
                mailbox.disconnect(peer);
            } else {
                tracing::warn!(%peer, error = %e, "read failed");
                mailbox.fail(peer, e.to_string());
            }
            return;
        }

        let header = match FrameHeader::deserialize(&header_buf) {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "malformed frame header");
                mailbox.fail(peer, e.to_string());
                return;
            }
        };

        let mut payload = vec![0u8; header.payload_len()];
        if let Err(e) = reader.read_exact(&mut payload).await {
            tracing::warn!(%peer, error = %e, "connection lost mid-frame");
            mailbox.fail(peer, format!("truncated frame: {e}"));
            return;
        }

        if let Err(e) = header.verify(&payload) {
            tracing::warn!(%peer, error = %e, "corrupted frame");
            mailbox.fail(peer, e.to_string());
            return;
        }
        if header.source != peer {
            mailbox.fail(
                peer,
                format!("frame claims source rank {} on this connection", header.source),
            );
            return;
        }

        mailbox.deliver(peer, header.tag, payload);
    }
}

/// Write queued frames to `peer` until the queue closes.
async fn write_frames(
    peer: Rank,
    mut writer: OwnedWriteHalf,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    mailbox: Arc<Mailbox>,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            tracing::warn!(%peer, error = %e, "write failed");
            mailbox.fail(peer, e.to_string());
            return;
        }
    }
    let _ = writer.shutdown().await;
}
