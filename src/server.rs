//! JSON-RPC 2.0 server: a concurrent dispatch table over a transport
//!
//! [`Server`] owns a [`Registry`] of named handlers and serves one
//! transport at a time. Every inbound frame is dispatched on its own
//! spawned task, so a slow handler never blocks later requests, and
//! responses may leave in a different order than the requests arrived. Callers correlate by identifier, never by position.
//!
//! Besides user-registered methods, four built-in methods expose the
//! prompt, resource, and tool sub-registries: `listPrompts`, `getPrompt`,
//! `getResource`, and `executeTool`. A user registration under one of
//! those names shadows the built-in.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TandemError};
use crate::transport::Transport;
use crate::types::{
    Notification, Prompt, Response, RpcError, APPLICATION_ERROR, INVALID_REQUEST,
    JSONRPC_VERSION, METHOD_EXECUTE_TOOL, METHOD_GET_PROMPT, METHOD_GET_RESOURCE,
    METHOD_LIST_PROMPTS, METHOD_NOT_FOUND, PARSE_ERROR,
};

/// A request handler.
///
/// Handlers receive a cancellation token that is triggered when the server
/// shuts down, and the raw `params` value of the request (`Value::Null`
/// when params were absent). Returning an error produces an application
/// error response (code −32000) carrying the error's message.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(
        &self,
        ctx: CancellationToken,
        params: serde_json::Value,
    ) -> Result<serde_json::Value>;
}

/// Adapts a plain function over typed parameters into a [`Handler`].
///
/// Absent params decode as JSON `null`, so `Req` should be a type with a
/// null representation (an `Option`, or a struct of optional fields) when
/// callers may omit them.
struct TypedHandler<F, Req> {
    f: F,
    _marker: PhantomData<fn(Req)>,
}

#[async_trait]
impl<F, Req, Resp> Handler for TypedHandler<F, Req>
where
    F: Fn(Req) -> Result<Resp> + Send + Sync,
    Req: serde::de::DeserializeOwned + Send,
    Resp: serde::Serialize,
{
    async fn call(
        &self,
        _ctx: CancellationToken,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let typed: Req = serde_json::from_value(params)
            .map_err(|e| anyhow::anyhow!(TandemError::Handler(format!("invalid params: {e}"))))?;
        let result = (self.f)(typed)?;
        Ok(serde_json::to_value(result)?)
    }
}

/// Wrap a typed function as a resource handler.
///
/// # Examples
///
/// ```
/// use tandem_rpc::server::{resource, Registry};
///
/// # #[tokio::main]
/// # async fn main() {
/// let registry = Registry::new();
/// registry
///     .register_resource("double", resource(|n: i64| Ok(n * 2)))
///     .await;
/// # }
/// ```
pub fn resource<F, Req, Resp>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Req) -> Result<Resp> + Send + Sync + 'static,
    Req: serde::de::DeserializeOwned + Send + 'static,
    Resp: serde::Serialize + 'static,
{
    Arc::new(TypedHandler {
        f,
        _marker: PhantomData,
    })
}

/// Wrap a typed function as a tool handler. Identical adaptation to
/// [`resource`]; the distinction is which sub-registry the result goes in.
pub fn tool<F, Req, Resp>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Req) -> Result<Resp> + Send + Sync + 'static,
    Req: serde::de::DeserializeOwned + Send + 'static,
    Resp: serde::Serialize + 'static,
{
    Arc::new(TypedHandler {
        f,
        _marker: PhantomData,
    })
}

/// The dispatch table: four independently locked name-to-handler maps.
///
/// Each map sits behind its own mutex, and no lock is ever held across a
/// handler's execution, so a long-running handler never blocks concurrent
/// registration or lookup.
pub struct Registry {
    methods: Mutex<HashMap<String, Arc<dyn Handler>>>,
    resources: Mutex<HashMap<String, Arc<dyn Handler>>>,
    tools: Mutex<HashMap<String, Arc<dyn Handler>>>,
    prompts: Mutex<HashMap<String, Prompt>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            methods: Mutex::new(HashMap::new()),
            resources: Mutex::new(HashMap::new()),
            tools: Mutex::new(HashMap::new()),
            prompts: Mutex::new(HashMap::new()),
        }
    }

    /// Register a top-level method handler. Re-registering a name replaces
    /// the previous handler; registering one of the built-in method names
    /// shadows the built-in.
    pub async fn register_handler(&self, method: impl Into<String>, handler: Arc<dyn Handler>) {
        let mut methods = self.methods.lock().await;
        methods.insert(method.into(), handler);
    }

    /// Register a named resource, reachable via the `getResource`
    /// built-in.
    pub async fn register_resource(&self, name: impl Into<String>, handler: Arc<dyn Handler>) {
        let mut resources = self.resources.lock().await;
        resources.insert(name.into(), handler);
    }

    /// Register a named tool, reachable via the `executeTool` built-in.
    pub async fn register_tool(&self, name: impl Into<String>, handler: Arc<dyn Handler>) {
        let mut tools = self.tools.lock().await;
        tools.insert(name.into(), handler);
    }

    /// Register a prompt, served verbatim by `listPrompts` and
    /// `getPrompt`.
    pub async fn register_prompt(&self, prompt: Prompt) {
        let mut prompts = self.prompts.lock().await;
        prompts.insert(prompt.name.clone(), prompt);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// The `{name, params}` envelope used by `getResource` and `executeTool`.
#[derive(serde::Deserialize)]
struct NamedCall {
    name: String,
    #[serde(default)]
    params: serde_json::Value,
}

/// The params of `getPrompt`.
#[derive(serde::Deserialize)]
struct PromptQuery {
    name: String,
}

/// JSON-RPC server over a single transport.
///
/// A `Server` instance owns its [`Registry`]; two servers in one process
/// never share dispatch state.
pub struct Server {
    registry: Arc<Registry>,
    /// The transport currently being served, for outbound notifications.
    active: Mutex<Option<Arc<dyn Transport>>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").finish_non_exhaustive()
    }
}

impl Server {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            active: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// The server's dispatch table, for registrations before (or during)
    /// serving.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Serve one transport until end-of-stream, a read error, or
    /// [`Server::shutdown`].
    ///
    /// Every inbound frame is handled on its own spawned task; the serve
    /// loop itself only reads and spawns, so dispatch never applies
    /// backpressure to the transport.
    ///
    /// # Errors
    ///
    /// Returns the transport's read error if one occurs. Clean
    /// end-of-stream and shutdown both return `Ok(())`.
    pub async fn serve(&self, transport: Arc<dyn Transport>) -> Result<()> {
        {
            let mut active = self.active.lock().await;
            *active = Some(Arc::clone(&transport));
        }

        let outcome = self.serve_loop(&transport).await;

        {
            let mut active = self.active.lock().await;
            *active = None;
        }
        outcome
    }

    async fn serve_loop(&self, transport: &Arc<dyn Transport>) -> Result<()> {
        loop {
            let maybe_frame = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => return Ok(()),
                frame = transport.read() => frame,
            };

            match maybe_frame {
                Ok(Some(raw)) => {
                    let registry = Arc::clone(&self.registry);
                    let transport = Arc::clone(transport);
                    let ctx = self.shutdown.child_token();
                    tokio::spawn(async move {
                        handle_message(&raw, registry, transport, ctx).await;
                    });
                }
                Ok(None) => {
                    tracing::debug!("server: transport end of stream");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("server: transport read error: {e}");
                    return Err(e);
                }
            }
        }
    }

    /// Send a notification to the connected peer.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::NotServing`] when no transport is being
    /// served, or a transport error if the write fails.
    pub async fn notify<P: serde::Serialize + Send>(&self, method: &str, params: P) -> Result<()> {
        let transport = {
            let active = self.active.lock().await;
            active.clone()
        };
        let Some(transport) = transport else {
            return Err(anyhow::anyhow!(TandemError::NotServing(
                "no active transport".to_string()
            )));
        };

        let message = serde_json::to_string(&Notification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params: Some(serde_json::to_value(params)?),
        })?;
        transport.write(message).await
    }

    /// Stop the serve loop, cancel the context token handed to every
    /// in-flight handler, and close the transport being served.
    ///
    /// # Errors
    ///
    /// Returns the transport's close error, if any. Idempotent otherwise.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        let transport = {
            let active = self.active.lock().await;
            active.clone()
        };
        if let Some(transport) = transport {
            transport.close().await?;
        }
        Ok(())
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

/// Process one inbound frame: classify, dispatch, and send exactly one
/// response per request (and none per notification).
async fn handle_message(
    raw: &str,
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
    ctx: CancellationToken,
) {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("server: unparseable frame: {e}");
            let error = RpcError::new(PARSE_ERROR, "Parse error");
            send_response(
                &transport,
                Response::failure(serde_json::Value::Null, error),
            )
            .await;
            return;
        }
    };

    let id = value.get("id").cloned();
    let method = value
        .get("method")
        .and_then(|m| m.as_str())
        .map(str::to_string);
    let valid_version = value.get("jsonrpc").and_then(|v| v.as_str()) == Some(JSONRPC_VERSION);

    // No identifier means notification: never answered, whatever its
    // content.
    let Some(id) = id else {
        match method {
            Some(m) => tracing::debug!("server: dropping notification '{m}'"),
            None => tracing::debug!("server: dropping id-less frame"),
        }
        return;
    };

    let (Some(method), true) = (method, valid_version) else {
        let error = RpcError::new(INVALID_REQUEST, "Invalid request");
        send_response(&transport, Response::failure(id, error)).await;
        return;
    };

    let params = value
        .get("params")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    let outcome = dispatch(&registry, &method, params, ctx).await;

    let response = match outcome {
        Ok(result) => {
            // A null result is indistinguishable from no result; omit it.
            let result = match result {
                serde_json::Value::Null => None,
                other => Some(other),
            };
            Response::success(id, result)
        }
        Err(e) => Response::failure(id, e),
    };
    send_response(&transport, response).await;
}

/// Route a request to a user-registered handler or a built-in.
async fn dispatch(
    registry: &Arc<Registry>,
    method: &str,
    params: serde_json::Value,
    ctx: CancellationToken,
) -> std::result::Result<serde_json::Value, RpcError> {
    // Lookup and execution never overlap under the lock.
    let handler = {
        let methods = registry.methods.lock().await;
        methods.get(method).cloned()
    };
    if let Some(handler) = handler {
        return run_handler(handler, ctx, params).await;
    }

    match method {
        METHOD_LIST_PROMPTS => {
            let prompts = registry.prompts.lock().await;
            serde_json::to_value(&*prompts)
                .map_err(|e| RpcError::new(APPLICATION_ERROR, e.to_string()))
        }
        METHOD_GET_PROMPT => {
            let query: PromptQuery = serde_json::from_value(params)
                .map_err(|e| RpcError::new(APPLICATION_ERROR, format!("invalid params: {e}")))?;
            let prompts = registry.prompts.lock().await;
            match prompts.get(&query.name) {
                Some(prompt) => serde_json::to_value(prompt)
                    .map_err(|e| RpcError::new(APPLICATION_ERROR, e.to_string())),
                None => Err(RpcError::new(
                    APPLICATION_ERROR,
                    format!("prompt not found: {}", query.name),
                )),
            }
        }
        METHOD_GET_RESOURCE => {
            named_dispatch(&registry.resources, "resource", params, ctx).await
        }
        METHOD_EXECUTE_TOOL => named_dispatch(&registry.tools, "tool", params, ctx).await,
        _ => Err(RpcError::new(METHOD_NOT_FOUND, "Method not found")),
    }
}

/// Shared lookup-then-run path for `getResource` and `executeTool`.
async fn named_dispatch(
    map: &Mutex<HashMap<String, Arc<dyn Handler>>>,
    kind: &str,
    params: serde_json::Value,
    ctx: CancellationToken,
) -> std::result::Result<serde_json::Value, RpcError> {
    let call: NamedCall = serde_json::from_value(params)
        .map_err(|e| RpcError::new(APPLICATION_ERROR, format!("invalid params: {e}")))?;

    let handler = {
        let guard = map.lock().await;
        guard.get(&call.name).cloned()
    };
    let Some(handler) = handler else {
        return Err(RpcError::new(
            APPLICATION_ERROR,
            format!("{kind} not found: {}", call.name),
        ));
    };
    run_handler(handler, ctx, call.params).await
}

async fn run_handler(
    handler: Arc<dyn Handler>,
    ctx: CancellationToken,
    params: serde_json::Value,
) -> std::result::Result<serde_json::Value, RpcError> {
    handler
        .call(ctx, params)
        .await
        .map_err(|e| RpcError::new(APPLICATION_ERROR, e.to_string()))
}

async fn send_response(transport: &Arc<dyn Transport>, response: Response) {
    let serialized = match serde_json::to_string(&response) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("server: failed to serialize response: {e}");
            return;
        }
    };
    if let Err(e) = transport.write(serialized).await {
        tracing::warn!("server: failed to write response: {e}");
    }
}
