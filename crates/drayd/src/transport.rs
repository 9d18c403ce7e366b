//! TCP transport — accepts connections, frames inbound bytes, owns writers.
//!
//! Each connection gets a monotonic [`ConnId`], a reader loop that cuts the
//! byte stream into length-prefixed envelopes for the dispatcher, and a
//! writer task that owns the send half. The connection table doubles as the
//! [`ReplySink`]: a reply is one frame queued on the right writer.

use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use dray_core::wire;
use dray_services::{ConnId, Dispatcher, ReplySink, SessionStore};

// ── Connection table ──────────────────────────────────────────────────────────

/// Live connections: id → writer-task queue.
#[derive(Clone, Default)]
pub struct ConnTable {
    inner: Arc<DashMap<ConnId, mpsc::UnboundedSender<Bytes>>>,
}

impl ConnTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    fn register(&self, conn: ConnId, tx: mpsc::UnboundedSender<Bytes>) {
        self.inner.insert(conn, tx);
    }

    fn deregister(&self, conn: ConnId) {
        self.inner.remove(&conn);
    }
}

impl ReplySink for ConnTable {
    fn send(&self, conn: ConnId, frame: Bytes) {
        match self.inner.get(&conn) {
            Some(tx) => {
                if tx.send(frame).is_err() {
                    tracing::debug!(conn, "writer gone, reply dropped");
                }
            }
            None => tracing::debug!(conn, "reply for closed connection dropped"),
        }
    }
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// Accept loop over a pre-bound socket.
pub struct Listener {
    listener: TcpListener,
    max_frame: usize,
    conns: ConnTable,
    sessions: SessionStore,
    dispatcher: Arc<Dispatcher>,
    shutdown: broadcast::Receiver<()>,
}

impl Listener {
    pub fn new(
        listener: TcpListener,
        max_frame: usize,
        conns: ConnTable,
        sessions: SessionStore,
        dispatcher: Arc<Dispatcher>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            listener,
            max_frame,
            conns,
            sessions,
            dispatcher,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let addr = self.listener.local_addr().context("listener has no local addr")?;
        tracing::info!(%addr, "rpc listener ready");

        let mut next_conn: ConnId = 1;

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("rpc listener shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };

                    let conn = next_conn;
                    next_conn += 1;

                    tokio::spawn(serve_conn(
                        conn,
                        stream,
                        peer,
                        self.max_frame,
                        self.conns.clone(),
                        self.sessions.clone(),
                        self.dispatcher.clone(),
                    ));
                }
            }
        }
    }
}

// ── Per-connection I/O ────────────────────────────────────────────────────────

async fn serve_conn(
    conn: ConnId,
    stream: TcpStream,
    peer: std::net::SocketAddr,
    max_frame: usize,
    conns: ConnTable,
    sessions: SessionStore,
    dispatcher: Arc<Dispatcher>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(conn, error = %e, "failed to set TCP_NODELAY");
    }

    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    conns.register(conn, tx);
    tracing::info!(conn, %peer, "connection open");

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write_half.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    read_loop(conn, read_half, max_frame, &dispatcher).await;

    // Connection gone: tear the session down unconditionally. Outstanding
    // sub-tasks still run; their completions become unroutable and are
    // discarded by the aggregator.
    conns.deregister(conn);
    sessions.remove(&conn);
    writer.abort();
    tracing::info!(conn, %peer, "connection closed");
}

/// Cut the byte stream into envelopes and hand each one to the dispatcher.
/// Returns when the peer closes, errors, or declares an oversized frame.
async fn read_loop(
    conn: ConnId,
    mut read_half: OwnedReadHalf,
    max_frame: usize,
    dispatcher: &Dispatcher,
) {
    loop {
        let mut len_buf = [0u8; wire::LEN_PREFIX];
        if read_half.read_exact(&mut len_buf).await.is_err() {
            return;
        }

        let declared = u32::from_be_bytes(len_buf) as usize;
        if declared > max_frame {
            tracing::warn!(conn, declared, max_frame, "oversized frame, closing connection");
            return;
        }

        // The dispatcher re-verifies the prefix against the payload, so the
        // full envelope is passed through, prefix included.
        let mut frame = vec![0u8; wire::LEN_PREFIX + declared];
        frame[..wire::LEN_PREFIX].copy_from_slice(&len_buf);
        if read_half.read_exact(&mut frame[wire::LEN_PREFIX..]).await.is_err() {
            return;
        }

        dispatcher.on_message(conn, &frame);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
