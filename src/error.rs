//! Error types for tandem-rpc
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for tandem-rpc operations
///
/// This enum encompasses all possible errors that can occur while issuing
/// calls, dispatching requests, and driving transports.
#[derive(Error, Debug)]
pub enum TandemError {
    /// Transport-level failures (framing, I/O, closed channels)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The connection was closed while a call was still in flight
    #[error("Connection closed before a response arrived")]
    ConnectionClosed,

    /// The remote peer answered a call with a JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// Numeric JSON-RPC error code (negative by convention)
        code: i64,
        /// Human-readable message from the remote peer
        message: String,
    },

    /// A server handler failed; carried back to the peer as code -32000
    #[error("Handler error: {0}")]
    Handler(String),

    /// The server is not currently attached to a transport
    #[error("Not serving: {0}")]
    NotServing(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for tandem-rpc operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let error = TandemError::Transport("channel closed".to_string());
        assert_eq!(error.to_string(), "Transport error: channel closed");
    }

    #[test]
    fn test_connection_closed_display() {
        let error = TandemError::ConnectionClosed;
        assert_eq!(
            error.to_string(),
            "Connection closed before a response arrived"
        );
    }

    #[test]
    fn test_rpc_error_display() {
        let error = TandemError::Rpc {
            code: -32601,
            message: "Method not found".to_string(),
        };
        assert_eq!(error.to_string(), "RPC error -32601: Method not found");
    }

    #[test]
    fn test_handler_error_display() {
        let error = TandemError::Handler("tool not found: missing".to_string());
        assert_eq!(error.to_string(), "Handler error: tool not found: missing");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let error: TandemError = io_error.into();
        assert!(matches!(error, TandemError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: TandemError = json_error.into();
        assert!(matches!(error, TandemError::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TandemError>();
    }
}
