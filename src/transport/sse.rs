//! Event-stream + HTTP POST transport
//!
//! This module implements [`SseTransport`], the client side of an
//! HTTP-served peer: inbound messages arrive as `data: <json>` events on a
//! long-lived `text/event-stream` connection to `{base}/events`, and
//! outbound messages are sent as individual HTTP POST bodies to
//! `{base}/request`.
//!
//! # SSE handling
//!
//! Events are separated by blank lines. Within one event, every `data:`
//! field contributes a line to the payload (multi-line data is joined with
//! `\n`); comment lines (leading `:`) and other fields are ignored. Events
//! with an empty payload are dropped.
//!
//! # Lifecycle
//!
//! [`SseTransport::connect`] starts a background task that opens the event
//! stream and parses it into an inbound channel. `read()` surfaces
//! end-of-stream once the server closes the stream or the transport is
//! closed.

use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TandemError};
use crate::transport::Transport;

/// Event-stream + HTTP POST transport.
///
/// # Examples
///
/// ```no_run
/// use tandem_rpc::transport::SseTransport;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let transport = SseTransport::connect(url::Url::parse("http://localhost:3000")?)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SseTransport {
    /// Underlying reqwest HTTP client, shared with the stream task.
    http_client: Arc<reqwest::Client>,
    /// Base URL; `/events` and `/request` are joined onto it.
    base_url: url::Url,
    /// Shared receiver for parsed inbound events.
    event_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    /// Cancelled by `close()`; stops the stream task and unblocks `read()`.
    shutdown: CancellationToken,
}

impl SseTransport {
    /// Open the event stream and return a wired transport.
    ///
    /// A background task issues `GET {base}/events` with
    /// `Accept: text/event-stream` and parses the body incrementally. The
    /// task exits when the stream ends, the request fails, or the
    /// transport is closed; in every case `read()` then reports
    /// end-of-stream.
    ///
    /// No `write` traffic is attempted at construction time.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Transport`] if `base_url` cannot carry the
    /// `/events` and `/request` path segments.
    pub fn connect(base_url: url::Url) -> Result<Self> {
        let events_url = base_url.join("events").map_err(|e| {
            anyhow::anyhow!(TandemError::Transport(format!("invalid base url: {e}")))
        })?;

        let http_client = Arc::new(reqwest::Client::new());
        let (event_tx, event_rx) = mpsc::unbounded_channel::<String>();
        let shutdown = CancellationToken::new();

        let stream_client = Arc::clone(&http_client);
        let stream_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let response = match stream_client
                .get(events_url.as_str())
                .header("Accept", "text/event-stream")
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("event stream request failed: {e}");
                    return;
                }
            };
            if !response.status().is_success() {
                tracing::warn!("event stream returned HTTP {}", response.status());
                return;
            }

            tokio::select! {
                _ = stream_shutdown.cancelled() => {}
                _ = parse_sse_stream(response.bytes_stream(), event_tx) => {}
            }
            // event_tx is dropped here either way, which surfaces
            // end-of-stream to read().
        });

        Ok(Self {
            http_client,
            base_url,
            event_rx: Arc::new(Mutex::new(event_rx)),
            shutdown,
        })
    }
}

#[async_trait::async_trait]
impl Transport for SseTransport {
    /// Receive the next parsed event payload.
    ///
    /// Returns `Ok(None)` once the event stream has closed or the
    /// transport has been stopped.
    async fn read(&self) -> Result<Option<String>> {
        let rx = Arc::clone(&self.event_rx);
        let mut guard = rx.lock().await;
        tokio::select! {
            _ = self.shutdown.cancelled() => Ok(None),
            maybe_event = guard.recv() => Ok(maybe_event),
        }
    }

    /// POST one message body to `{base}/request`.
    ///
    /// Write atomicity holds trivially: each message is its own HTTP
    /// request body.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Transport`] if the request fails or the
    /// server answers with a non-success status.
    async fn write(&self, message: String) -> Result<()> {
        let request_url = self.base_url.join("request").map_err(|e| {
            anyhow::anyhow!(TandemError::Transport(format!("invalid base url: {e}")))
        })?;

        let response = self
            .http_client
            .post(request_url.as_str())
            .header("Content-Type", "application/json")
            .body(message)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(TandemError::Transport(format!("HTTP POST failed: {e}")))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!(TandemError::Transport(format!(
                "HTTP POST returned status {status}"
            ))));
        }
        Ok(())
    }

    /// Stop the event stream task and unblock any pending `read` with
    /// end-of-stream.
    async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SSE parser
// ---------------------------------------------------------------------------

/// Parse an SSE byte stream and forward complete event payloads to
/// `event_tx`.
///
/// Consumes the stream until it ends or the receiving side goes away.
/// Intended to be driven inside the transport's background task.
async fn parse_sse_stream(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>>,
    event_tx: mpsc::UnboundedSender<String>,
) {
    use futures::StreamExt;

    // Accumulates raw text between blank-line event boundaries.
    let mut buffer = String::new();

    tokio::pin!(byte_stream);

    while let Some(chunk_result) = byte_stream.next().await {
        let chunk = match chunk_result {
            Ok(c) => c,
            Err(_) => break,
        };
        let text = match std::str::from_utf8(&chunk) {
            Ok(s) => s,
            Err(_) => continue,
        };
        buffer.push_str(text);

        while let Some(pos) = buffer.find("\n\n") {
            let event_block = buffer[..pos].to_string();
            buffer = buffer[pos + 2..].to_string();
            if let Some(data) = extract_event_data(&event_block) {
                if event_tx.send(data).is_err() {
                    return;
                }
            }
        }
    }

    // Flush a trailing event with no final blank line.
    if !buffer.is_empty() {
        if let Some(data) = extract_event_data(&buffer) {
            let _ = event_tx.send(data);
        }
    }
}

/// Extract the joined `data:` payload from one SSE event block, or `None`
/// when the block carries no data (comments, unknown fields, keepalives).
fn extract_event_data(event_block: &str) -> Option<String> {
    let mut data_lines: Vec<&str> = Vec::new();

    for line in event_block.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim());
        }
        // Lines starting with `:` are SSE comments; other fields (event:,
        // id:, retry:) have no meaning in this wire contract.
    }

    let data = data_lines.join("\n");
    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}
