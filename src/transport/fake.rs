//! In-process fake transport for unit tests
//!
//! [`FakeTransport::new`] returns a `(FakeTransport, FakeTransportHandle)`
//! pair. Wire the transport into the code under test; from the test side,
//! use the handle to read what was written (`outbound_rx`) and to inject
//! inbound frames (`inbound_tx`).
//!
//! ```text
//! code-under-test write() --> outbound_tx --> outbound_rx (handle reads)
//! handle inbound_tx ------->  inbound_rx --> read() (code under test)
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TandemError};
use crate::transport::Transport;

/// Channel-backed transport for driving the client or server in tests
/// without real I/O.
#[derive(Debug)]
pub struct FakeTransport {
    /// `write()` frames land here; the handle drains them.
    outbound_tx: mpsc::UnboundedSender<String>,
    /// Frames injected by the handle; exposed via `read()`.
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    /// Clone of the handle's inject sender, for `inject` convenience.
    inbound_inject_tx: mpsc::UnboundedSender<String>,
    /// Cancelled by `close()`; unblocks any pending `read()`.
    shutdown: CancellationToken,
}

/// The test-side handle for a [`FakeTransport`].
#[derive(Debug)]
pub struct FakeTransportHandle {
    /// Receives frames written by the code under test.
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
    /// Sends frames into the code under test's `read()`.
    pub inbound_tx: mpsc::UnboundedSender<String>,
}

impl FakeTransport {
    /// Create a new `(FakeTransport, FakeTransportHandle)` pair.
    pub fn new() -> (Self, FakeTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        let transport = Self {
            outbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            inbound_inject_tx: inbound_tx.clone(),
            shutdown: CancellationToken::new(),
        };
        let handle = FakeTransportHandle {
            outbound_rx,
            inbound_tx,
        };
        (transport, handle)
    }

    /// Serialize a JSON value and push it onto the inbound channel.
    ///
    /// # Panics
    ///
    /// Panics if the inbound channel is closed; test wiring, not a
    /// recoverable path.
    pub fn inject(&self, frame: serde_json::Value) {
        let serialized =
            serde_json::to_string(&frame).expect("FakeTransport: failed to serialize frame");
        self.inbound_inject_tx
            .send(serialized)
            .expect("FakeTransport: inbound channel closed before inject");
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    /// Yield the next injected frame, or `Ok(None)` once the transport is
    /// closed.
    async fn read(&self) -> Result<Option<String>> {
        let rx = Arc::clone(&self.inbound_rx);
        let mut guard = rx.lock().await;
        tokio::select! {
            _ = self.shutdown.cancelled() => Ok(None),
            maybe_frame = guard.recv() => Ok(maybe_frame),
        }
    }

    /// Record the frame so the test can read it via the handle.
    async fn write(&self, message: String) -> Result<()> {
        self.outbound_tx.send(message).map_err(|_| {
            anyhow::anyhow!(TandemError::Transport(
                "fake outbound channel closed".to_string()
            ))
        })
    }

    /// Close the inbound side so pending `read()` calls see end-of-stream.
    async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_write_delivers_to_handle_outbound_rx() {
        let (transport, mut handle) = FakeTransport::new();

        transport
            .write(r#"{"jsonrpc":"2.0","method":"ping"}"#.to_string())
            .await
            .unwrap();

        let frame = handle.outbound_rx.recv().await.expect("channel closed");
        assert_eq!(frame, r#"{"jsonrpc":"2.0","method":"ping"}"#);
    }

    #[tokio::test]
    async fn test_read_yields_injected_frame() {
        let (transport, handle) = FakeTransport::new();

        handle
            .inbound_tx
            .send(r#"{"jsonrpc":"2.0","result":{},"id":1}"#.to_string())
            .unwrap();

        let frame = transport.read().await.unwrap().expect("stream ended");
        assert_eq!(frame, r#"{"jsonrpc":"2.0","result":{},"id":1}"#);
    }

    #[tokio::test]
    async fn test_inject_serializes_value() {
        let (transport, _handle) = FakeTransport::new();

        transport.inject(serde_json::json!({"id": 42, "result": {"ok": true}}));

        let frame = transport.read().await.unwrap().expect("stream ended");
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["id"], 42);
    }

    #[tokio::test]
    async fn test_read_returns_none_after_handle_dropped() {
        let (transport, handle) = FakeTransport::new();
        drop(handle);

        // inject_tx still exists on the transport itself, so close the
        // inbound side to simulate the peer going away entirely.
        transport.close().await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), transport.read())
            .await
            .expect("read did not observe end-of-stream");
        assert!(result.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_fails_when_handle_dropped() {
        let (transport, handle) = FakeTransport::new();
        drop(handle);

        let result = transport.write("frame".to_string()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_fake_transport_is_object_safe() {
        let (transport, _handle) = FakeTransport::new();
        let _boxed: Box<dyn Transport> = Box::new(transport);
    }
}
