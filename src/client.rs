//! Transport-agnostic JSON-RPC 2.0 call registry (client side)
//!
//! This module provides [`RpcClient`], which correlates outbound calls with
//! later-arriving responses regardless of completion order. A single
//! dedicated read-loop task pulls frames from the transport and routes
//! them:
//!
//! - A frame carrying an `id` is a response: the matching pending slot is
//!   removed and filled. Responses with no matching slot (late or
//!   duplicate) are silently discarded.
//! - A frame with a `method` but no `id` is a notification: the registered
//!   handler, if any, runs synchronously on the read loop. A slow
//!   notification handler therefore stalls delivery of subsequent
//!   messages; this is a documented ordering/liveness trade-off, not a
//!   bug.
//!
//! In-flight calls are tracked in a `pending` map keyed by a `u64`
//! identifier from a monotonically increasing counter that starts at 1 and
//! is never reused. Each entry is a `oneshot::Sender` filled exactly once
//! by the read loop.
//!
//! No per-call timeout exists: the only cancellation primitive is
//! [`RpcClient::close`], which fails every still-pending call with a
//! connection-closed error so that no caller stays blocked past teardown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TandemError};
use crate::transport::Transport;
use crate::types::{
    Message, Notification, Prompt, Request, RpcError, JSONRPC_VERSION, METHOD_EXECUTE_TOOL,
    METHOD_GET_PROMPT, METHOD_GET_RESOURCE, METHOD_LIST_PROMPTS,
};

/// A notification handler: called with the raw `params` value when a
/// matching notification arrives (`Value::Null` when params are absent).
type NotificationHandler = Box<dyn Fn(serde_json::Value) + Send + Sync + 'static>;

/// The pending-call map: identifier to the slot its response fills.
type PendingMap = HashMap<u64, oneshot::Sender<std::result::Result<serde_json::Value, RpcError>>>;

/// JSON-RPC client with out-of-order response correlation.
///
/// Create one with [`RpcClient::connect`]; issue requests with
/// [`RpcClient::call`] or [`RpcClient::call_raw`] from any number of
/// concurrent tasks, and fire-and-forget notifications with
/// [`RpcClient::notify`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tandem_rpc::{RpcClient, transport::LineTransport};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let (local, _remote) = LineTransport::pair();
/// let client = RpcClient::connect(Arc::new(local));
/// let result = client.call_raw("listPrompts", None).await?;
/// # Ok(())
/// # }
/// ```
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    /// Monotonically increasing identifier counter; starts at 1, never
    /// reused. Unbounded u64, no wraparound handling.
    next_id: AtomicU64,
    /// In-flight calls awaiting a response.
    pending: Mutex<PendingMap>,
    /// Registered notification handlers (method -> handler).
    notification_handlers: Mutex<HashMap<String, NotificationHandler>>,
    /// Stops the read loop; cancelled by `close()`.
    shutdown: CancellationToken,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("next_id", &self.inner.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    /// Attach a client to a transport and start its read loop.
    ///
    /// The read loop runs until the transport reports end-of-stream, a
    /// read error occurs, or [`RpcClient::close`] is called. On every exit
    /// path it fails all still-pending calls with
    /// [`TandemError::ConnectionClosed`].
    pub fn connect(transport: Arc<dyn Transport>) -> Self {
        let inner = Arc::new(ClientInner {
            transport,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            notification_handlers: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        });

        let loop_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            read_loop(loop_inner).await;
        });

        Self { inner }
    }

    /// Issue a call and await the raw result value.
    ///
    /// Allocates the next identifier, registers the pending slot *before*
    /// writing (so the response can never race past registration), encodes
    /// and writes a request, then blocks until the slot is filled. If
    /// encoding or the transport write fails, the registry entry is
    /// removed immediately, so failed sends leave no orphaned entries.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Rpc`] if the peer answered with an error
    /// object, [`TandemError::ConnectionClosed`] if the connection went
    /// away before a response arrived, or a transport/serialization error
    /// if the send itself failed.
    pub async fn call_raw(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock().await;
            pending.insert(id, tx);
        }

        let outcome = async {
            let message = serde_json::to_string(&Request {
                jsonrpc: JSONRPC_VERSION.to_string(),
                method: method.to_string(),
                params,
                id: serde_json::json!(id),
            })?;
            self.inner.transport.write(message).await
        }
        .await;

        if let Err(e) = outcome {
            let mut pending = self.inner.pending.lock().await;
            pending.remove(&id);
            return Err(e);
        }

        // Block until the read loop fills the slot. The sender is dropped
        // (RecvError) only when the loop exits, which means the connection
        // is gone.
        let delivered = rx.await.map_err(|_| TandemError::ConnectionClosed)?;

        delivered.map_err(|e| {
            anyhow::anyhow!(TandemError::Rpc {
                code: e.code,
                message: e.message,
            })
        })
    }

    /// Issue a call with typed parameters and a typed result.
    ///
    /// # Errors
    ///
    /// Everything [`RpcClient::call_raw`] returns, plus a serialization
    /// error if the result cannot be decoded into `R`.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: serde::Serialize + Send,
        R: serde::de::DeserializeOwned,
    {
        let raw = self
            .call_raw(method, Some(serde_json::to_value(params)?))
            .await?;
        serde_json::from_value(raw).map_err(|e| anyhow::anyhow!(TandemError::Serialization(e)))
    }

    /// Send a notification (no identifier, no response expected).
    ///
    /// # Errors
    ///
    /// Returns a transport or serialization error if the frame cannot be
    /// sent.
    pub async fn notify<P: serde::Serialize + Send>(&self, method: &str, params: P) -> Result<()> {
        let message = serde_json::to_string(&Notification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params: Some(serde_json::to_value(params)?),
        })?;
        self.inner.transport.write(message).await
    }

    /// Register a handler for an inbound notification method.
    ///
    /// The handler runs synchronously on the read loop. Registering a
    /// second handler for the same method replaces the first.
    pub async fn on_notification(
        &self,
        method: impl Into<String>,
        f: impl Fn(serde_json::Value) + Send + Sync + 'static,
    ) {
        let mut handlers = self.inner.notification_handlers.lock().await;
        handlers.insert(method.into(), Box::new(f));
    }

    /// Retrieve the server's full prompt mapping.
    pub async fn list_prompts(&self) -> Result<HashMap<String, Prompt>> {
        let raw = self.call_raw(METHOD_LIST_PROMPTS, None).await?;
        serde_json::from_value(raw).map_err(|e| anyhow::anyhow!(TandemError::Serialization(e)))
    }

    /// Look up one prompt by name.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Rpc`] with the server's application error
    /// when the prompt does not exist.
    pub async fn get_prompt(&self, name: &str) -> Result<Prompt> {
        self.call(METHOD_GET_PROMPT, serde_json::json!({ "name": name }))
            .await
    }

    /// Invoke a named resource and return the raw result.
    pub async fn get_resource<P: serde::Serialize + Send>(
        &self,
        name: &str,
        params: P,
    ) -> Result<serde_json::Value> {
        self.call_raw(
            METHOD_GET_RESOURCE,
            Some(serde_json::json!({
                "name": name,
                "params": serde_json::to_value(params)?,
            })),
        )
        .await
    }

    /// Invoke a named resource and decode its result into `R`.
    pub async fn get_resource_as<P, R>(&self, name: &str, params: P) -> Result<R>
    where
        P: serde::Serialize + Send,
        R: serde::de::DeserializeOwned,
    {
        let raw = self.get_resource(name, params).await?;
        serde_json::from_value(raw).map_err(|e| anyhow::anyhow!(TandemError::Serialization(e)))
    }

    /// Invoke a named tool and return the raw result.
    pub async fn execute_tool<P: serde::Serialize + Send>(
        &self,
        name: &str,
        params: P,
    ) -> Result<serde_json::Value> {
        self.call_raw(
            METHOD_EXECUTE_TOOL,
            Some(serde_json::json!({
                "name": name,
                "params": serde_json::to_value(params)?,
            })),
        )
        .await
    }

    /// Invoke a named tool and decode its result into `R`.
    pub async fn execute_tool_as<P, R>(&self, name: &str, params: P) -> Result<R>
    where
        P: serde::Serialize + Send,
        R: serde::de::DeserializeOwned,
    {
        let raw = self.execute_tool(name, params).await?;
        serde_json::from_value(raw).map_err(|e| anyhow::anyhow!(TandemError::Serialization(e)))
    }

    /// Shut the client down.
    ///
    /// Stops the read loop, fails every still-pending call with
    /// [`TandemError::ConnectionClosed`], and closes the transport. A
    /// caller blocked in [`RpcClient::call_raw`] at close time observes
    /// the connection loss instead of waiting forever.
    pub async fn close(&self) -> Result<()> {
        self.inner.shutdown.cancel();
        fail_pending(&self.inner).await;
        self.inner.transport.close().await
    }

    /// Number of calls currently awaiting a response. Test hook.
    #[cfg(test)]
    pub(crate) async fn pending_len(&self) -> usize {
        self.inner.pending.lock().await.len()
    }
}

/// Drop every pending sender so blocked callers resolve to
/// [`TandemError::ConnectionClosed`].
async fn fail_pending(inner: &Arc<ClientInner>) {
    let mut pending = inner.pending.lock().await;
    pending.clear();
}

/// The dedicated single-consumer read loop.
async fn read_loop(inner: Arc<ClientInner>) {
    loop {
        let maybe_frame = tokio::select! {
            biased;

            _ = inner.shutdown.cancelled() => break,
            frame = inner.transport.read() => frame,
        };

        match maybe_frame {
            Ok(Some(raw)) => dispatch_frame(&raw, &inner).await,
            Ok(None) => {
                tracing::debug!("client read loop: end of stream");
                break;
            }
            Err(e) => {
                tracing::warn!("client read loop: transport error: {e}");
                break;
            }
        }
    }

    // Every exit path frees blocked callers.
    fail_pending(&inner).await;
}

/// Classify and route one inbound frame.
async fn dispatch_frame(raw: &str, inner: &Arc<ClientInner>) {
    let message = match Message::decode(raw) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("client read loop: failed to decode inbound frame: {e}");
            return;
        }
    };

    match message {
        Message::Response(resp) => {
            let Some(id) = resp.id.as_u64() else {
                tracing::warn!("client read loop: response has non-integer id: {}", resp.id);
                return;
            };

            let slot = {
                let mut pending = inner.pending.lock().await;
                pending.remove(&id)
            };
            let Some(slot) = slot else {
                tracing::debug!("client read loop: response for unknown id {id}; discarding");
                return;
            };

            let outcome = match resp.error {
                Some(e) => Err(e),
                None => Ok(resp.result.unwrap_or(serde_json::Value::Null)),
            };
            // The caller may already be gone (client closing); nothing to do.
            let _ = slot.send(outcome);
        }
        Message::Notification(notif) => {
            let handlers = inner.notification_handlers.lock().await;
            if let Some(handler) = handlers.get(&notif.method) {
                // Runs inline on the read loop: a slow handler delays all
                // later messages, including responses.
                handler(notif.params.unwrap_or(serde_json::Value::Null));
            } else {
                tracing::debug!(
                    "client read loop: no handler for notification '{}'; dropping",
                    notif.method
                );
            }
        }
    }
}
