//! Transport abstraction and implementations
//!
//! This module defines the [`Transport`] trait that all framing
//! implementations must satisfy. Concrete implementations live in
//! submodules:
//!
//! - [`line::LineTransport`] -- newline-delimited JSON over any byte stream
//!   pair (process stdio, pipes, an in-process duplex).
//! - [`sse::SseTransport`] -- inbound messages on a long-lived
//!   `text/event-stream` connection, outbound messages as individual HTTP
//!   POST bodies.
//! - [`fake::FakeTransport`] -- in-process fake used in tests (cfg(test)
//!   only).
//!
//! # Design
//!
//! The [`Transport`] trait is intentionally minimal: `read` one complete
//! serialized JSON-RPC message, `write` one complete message, `close` the
//! channel. Framing is the responsibility of each implementation; the
//! correlation and dispatch layers never see partial frames.
//!
//! The `write` concurrency requirement is load-bearing: the server
//! dispatches requests concurrently and handlers complete out of order, so
//! multiple response writes can race. Implementations must never interleave
//! bytes from two concurrent writers within one frame.

use crate::error::Result;

/// Abstraction over a bidirectional message channel.
///
/// Used polymorphically through `Arc<dyn Transport>` by both the client's
/// call registry and the server's dispatch loop.
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
/// let frame = b.read().await?;
/// assert!(frame.unwrap().contains("ping"));
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Block until one complete message is available.
    ///
    /// Returns `Ok(Some(frame))` with the message bytes as a string,
    /// or `Ok(None)` once the peer has closed the channel or [`close`]
    /// was called (the end-of-stream condition).
    ///
    /// [`close`]: Transport::close
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::TandemError::Transport`] on I/O failures
    /// other than a clean end of stream.
    async fn read(&self) -> Result<Option<String>>;

    /// Send one complete message.
    ///
    /// Safe to call concurrently from multiple logical callers; the frame
    /// is delivered whole, never interleaved with another writer's frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::TandemError::Transport`] if the underlying
    /// channel is closed or the I/O operation fails.
    async fn write(&self, message: String) -> Result<()>;

    /// Release underlying resources.
    ///
    /// Any `read` blocked at close time returns the end-of-stream
    /// condition (`Ok(None)`).
    async fn close(&self) -> Result<()>;
}

pub mod line;
pub mod sse;

#[cfg(test)]
pub mod fake;

pub use line::LineTransport;
pub use sse::SseTransport;
