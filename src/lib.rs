//! # tandem-rpc
//!
//! A minimal JSON-RPC 2.0 substrate for symmetric, connection-oriented
//! peers: a correlating client, a concurrent dispatch server, and a small
//! set of pluggable transports.
//!
//! ## Architecture
//!
//! - [`types`]: the wire structures [`Request`], [`Response`],
//!   [`Notification`], and [`RpcError`], plus the method-name and
//!   error-code constants.
//! - [`transport`]: the [`Transport`](transport::Transport) contract and
//!   its implementations, newline-delimited streams
//!   ([`LineTransport`](transport::LineTransport)) and Server-Sent Events
//!   over HTTP ([`SseTransport`](transport::SseTransport)).
//! - [`client`]: [`RpcClient`], which correlates out-of-order responses
//!   to in-flight calls by identifier and routes inbound notifications to
//!   registered callbacks.
//! - [`server`]: [`Server`] and its [`Registry`](server::Registry) of
//!   method, resource, tool, and prompt handlers, with built-in
//!   `listPrompts` / `getPrompt` / `getResource` / `executeTool` methods.
//! - [`error`]: [`TandemError`] and the crate-wide [`Result`] alias.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tandem_rpc::{RpcClient, Server, server::resource, transport::LineTransport};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let (client_side, server_side) = LineTransport::pair();
//!
//! let server = Arc::new(Server::new());
//! server
//!     .registry()
//!     .register_resource("double", resource(|n: i64| Ok(n * 2)))
//!     .await;
//! tokio::spawn({
//!     let server = Arc::clone(&server);
//!     async move { server.serve(Arc::new(server_side)).await }
//! });
//!
//! let client = RpcClient::connect(Arc::new(client_side));
//! let doubled: i64 = client.get_resource_as("double", 21).await?;
//! assert_eq!(doubled, 42);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod server;
pub mod transport;
pub mod types;

pub use client::RpcClient;
pub use error::{Result, TandemError};
pub use server::{Handler, Server};
pub use types::{Message, Notification, Prompt, Request, Response, RpcError};
