//! Transport layer for the MCP server.
//!
//! Supports two transport mechanisms:
//! - stdio: newline-delimited JSON-RPC on stdin/stdout (default)
//! - http: Server-Sent Events stream plus a POST endpoint, token protected
//!
//! The stdio to SSE bridge in [`crate::bridge`] is the client side of the
//! second transport.

pub mod http_server;
pub mod stdio;

pub use http_server::{router, serve_http, SessionRegistry};
pub use stdio::{serve_lines, serve_stdio};

use serde_json::{json, Value};

/// Available transport types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// Standard input/output transport (default).
    Stdio,

    /// HTTP transport with SSE.
    Http,
}

/// Error returned when parsing a transport type fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTransportTypeError(String);

impl std::fmt::Display for ParseTransportTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid MCP_TRANSPORT '{}': expected stdio, http or sse",
            self.0
        )
    }
}

impl std::error::Error for ParseTransportTypeError {}

impl std::str::FromStr for TransportType {
    type Err = ParseTransportTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stdio" => Ok(TransportType::Stdio),
            "http" | "sse" => Ok(TransportType::Http),
            _ => Err(ParseTransportTypeError(s.to_string())),
        }
    }
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::Stdio => write!(f, "stdio"),
            TransportType::Http => write!(f, "http"),
        }
    }
}

/// Body of the unauthenticated health endpoint.
pub fn health_payload(database_enabled: bool, sessions: usize) -> Value {
    json!({
        "status": "healthy",
        "server": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "transport": "sse",
        "database": if database_enabled { "configured" } else { "not configured" },
        "sessions": sessions,
        "endpoints": {
            "sse": "/sse",
            "message": "/message",
            "health": "/health"
        }
    })
}
