//! Newline-delimited JSON framing over byte streams
//!
//! This module implements [`LineTransport`]: one JSON message per
//! newline-terminated line, over any `AsyncRead`/`AsyncWrite` pair. It is
//! the standard framing for stdio-connected peers and for in-process
//! wiring in tests.
//!
//! # Protocol
//!
//! - Outbound messages are written as a single JSON object followed by a
//!   newline (`\n`).
//! - Inbound messages are read one per line; the newline is stripped and
//!   blank lines are skipped.
//!
//! # Concurrency
//!
//! All writes are funneled through one background task consuming an
//! unbounded channel, so concurrent `write` callers can never interleave
//! bytes within a frame. A second background task drains the reader into
//! an inbound channel; `read` pulls from that channel.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TandemError};
use crate::transport::Transport;

/// Line-framed transport over an `AsyncRead`/`AsyncWrite` pair.
///
/// # Examples
///
/// ```
/// use tandem_rpc::transport::{LineTransport, Transport};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let (a, b) = LineTransport::pair();
/// a.write(r#"{"jsonrpc":"2.0","method":"ping"}"#.to_string()).await?;
/// assert!(b.read().await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LineTransport {
    /// Sender side of the write channel; `write()` enqueues here.
    write_tx: mpsc::UnboundedSender<String>,
    /// Shared receiver for inbound lines (one JSON message per line).
    read_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    /// Cancelled by `close()`; stops both background tasks and unblocks
    /// any pending `read()`.
    shutdown: CancellationToken,
}

impl LineTransport {
    /// Wire up a transport over explicit reader and writer halves.
    ///
    /// Two background Tokio tasks are started immediately: one drains the
    /// reader line by line into the inbound channel, one writes queued
    /// outbound frames with a trailing newline and flushes after each.
    /// Both exit when the transport is closed or the peer disconnects.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<String>();
        let (read_tx, read_rx) = mpsc::unbounded_channel::<String>();
        let shutdown = CancellationToken::new();

        // Writer task: sole owner of the writer half, so frames never
        // interleave no matter how many tasks call write().
        let writer_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut writer = writer;
            loop {
                tokio::select! {
                    _ = writer_shutdown.cancelled() => break,
                    maybe_msg = write_rx.recv() => {
                        let Some(msg) = maybe_msg else { break };
                        let line = format!("{}\n", msg);
                        if writer.write_all(line.as_bytes()).await.is_err() {
                            break;
                        }
                        if writer.flush().await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        // Reader task: one line per message; dropping read_tx on EOF is
        // what turns a peer disconnect into Ok(None) from read().
        let reader_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                tokio::select! {
                    _ = reader_shutdown.cancelled() => break,
                    next = lines.next_line() => {
                        match next {
                            Ok(Some(line)) => {
                                if line.trim().is_empty() {
                                    continue;
                                }
                                if read_tx.send(line).is_err() {
                                    break;
                                }
                            }
                            Ok(None) | Err(_) => break,
                        }
                    }
                }
            }
        });

        Self {
            write_tx,
            read_rx: Arc::new(Mutex::new(read_rx)),
            shutdown,
        }
    }

    /// Bind to the current process's stdin and stdout.
    ///
    /// This is the server side of a stdio-connected peer: the parent
    /// process writes requests to our stdin and reads responses from our
    /// stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Create two transports joined by an in-process duplex pipe.
    ///
    /// Frames written to one endpoint arrive on the other's `read`.
    /// Closing either endpoint surfaces end-of-stream on its peer.
    pub fn pair() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        (Self::new(a_read, a_write), Self::new(b_read, b_write))
    }
}

#[async_trait::async_trait]
impl Transport for LineTransport {
    /// Receive the next line from the inbound channel.
    ///
    /// Returns `Ok(None)` when the reader task has observed EOF or the
    /// transport has been closed.
    async fn read(&self) -> Result<Option<String>> {
        let rx = Arc::clone(&self.read_rx);
        let mut guard = rx.lock().await;
        tokio::select! {
            _ = self.shutdown.cancelled() => Ok(None),
            maybe_line = guard.recv() => Ok(maybe_line),
        }
    }

    /// Enqueue one frame for the writer task.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Transport`] if the writer task has exited
    /// (peer closed or transport closed).
    async fn write(&self, message: String) -> Result<()> {
        self.write_tx.send(message).map_err(|_| {
            anyhow::anyhow!(TandemError::Transport("write channel closed".to_string()))
        })
    }

    /// Stop both background tasks and unblock any pending `read` with
    /// end-of-stream.
    async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        Ok(())
    }
}
