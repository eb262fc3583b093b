//! Error types for the Epicor MCP Server.
//!
//! Three layers of failure are kept apart:
//! - [`ServerError`]: startup, configuration and transport failures.
//! - [`DbError`]: failures raised by the database connector.
//! - [`DispatchError`]: protocol-level failures of a tool invocation.
//! - [`BridgeError`]: fatal failures of the stdio to SSE bridge.
//!
//! Tool handlers never surface `DbError` to the protocol layer; they turn it
//! into a textual failure payload instead.

use serde::Serialize;
use thiserror::Error;

/// JSON-RPC 2.0 error codes used by the server.
pub mod codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method (or tool) does not exist.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// The tool needs a database connection that is not configured.
    pub const DATABASE_NOT_CONFIGURED: i64 = -32001;
}

/// Startup and transport errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error on a transport stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error
    #[error("HTTP transport error: {0}")]
    Http(String),
}

impl ServerError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Get a user-friendly suggestion for how to fix this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => Some("Check your environment variables and .env file"),
            Self::Http(_) => Some("Check MCP_HTTP_HOST / MCP_HTTP_PORT and that the port is free"),
            Self::Io(_) => None,
        }
    }
}

/// Errors raised by the database connector.
#[derive(Debug, Error)]
pub enum DbError {
    /// A write-capable keyword was found in a submitted statement.
    #[error(
        "Blocked operation: query contains disallowed keyword '{keyword}'. Only read-only SELECT statements are permitted."
    )]
    Blocked { keyword: String },

    /// Connection establishment or connection-level failure.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Query exceeded the request timeout.
    #[error("Query timeout: operation exceeded {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    /// Query execution error reported by the server or driver.
    #[error(
        "Query execution error: {message}{}",
        .sql_error_code.map(|code| format!(" (SQL Server error {})", code)).unwrap_or_default()
    )]
    Query {
        message: String,
        sql_error_code: Option<u32>,
    },

    /// Caller-supplied input was rejected before reaching the database.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Message fragments that identify a connection-level fault.
const CONNECTION_FAULT_MARKERS: &[&str] = &[
    "econnreset",
    "connection reset",
    "socket",
    "connection closed",
    "connection is closed",
    "connection lost",
    "broken pipe",
    "epipe",
];

impl DbError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
        }
    }

    /// Create a query execution error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query {
            message: msg.into(),
            sql_error_code: None,
        }
    }

    /// Create a query execution error with the SQL Server error number.
    pub fn query_with_code(msg: impl Into<String>, code: u32) -> Self {
        Self::Query {
            message: msg.into(),
            sql_error_code: Some(code),
        }
    }

    /// Create a blocked-operation error.
    pub fn blocked(keyword: impl Into<String>) -> Self {
        Self::Blocked {
            keyword: keyword.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this failure warrants a reconnect-and-retry cycle.
    ///
    /// Connection errors always qualify. Query errors qualify when the
    /// driver message names a reset, socket failure, closed or lost
    /// connection.
    pub fn is_connection_fault(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Query { message, .. } => is_connection_fault_message(message),
            _ => false,
        }
    }
}

/// Check a driver message for connection-level fault markers.
pub fn is_connection_fault_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    CONNECTION_FAULT_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

impl From<tiberius::error::Error> for DbError {
    fn from(e: tiberius::error::Error) -> Self {
        use tiberius::error::Error;

        match &e {
            Error::Io { .. } => DbError::connection(format!("IO error: {}", e)),
            Error::Tls(_) => DbError::connection(format!("TLS error: {}", e)),
            Error::Routing { .. } => DbError::connection(format!("Routing error: {}", e)),
            Error::Server(token) => DbError::query_with_code(token.message(), token.code()),
            _ => DbError::query(e.to_string()),
        }
    }
}

impl<E: std::fmt::Display> From<bb8::RunError<E>> for DbError {
    fn from(e: bb8::RunError<E>) -> Self {
        match e {
            bb8::RunError::User(inner) => {
                DbError::connection(format!("Failed to acquire connection: {}", inner))
            }
            bb8::RunError::TimedOut => {
                DbError::connection("Timed out waiting for a pooled connection")
            }
        }
    }
}

/// Protocol-level failures of a tool invocation.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No tool with that name exists.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The tool exists but needs a database connection that is not configured.
    #[error("Database not configured: tool '{0}' requires MSSQL_HOST, MSSQL_USER and MSSQL_PASSWORD")]
    DatabaseNotConfigured(String),

    /// Arguments did not match the tool's input schema.
    #[error("Invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },
}

impl DispatchError {
    /// The JSON-RPC error code for this failure.
    pub fn code(&self) -> i64 {
        match self {
            Self::UnknownTool(_) => codes::METHOD_NOT_FOUND,
            Self::DatabaseNotConfigured(_) => codes::DATABASE_NOT_CONFIGURED,
            Self::InvalidArguments { .. } => codes::INVALID_PARAMS,
        }
    }
}

/// Fatal failures of the stdio to SSE bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The SSE stream could not be opened or broke mid-stream.
    #[error("SSE connection failed: {0}")]
    Connect(#[from] reqwest::Error),

    /// The SSE endpoint answered with something other than 200.
    #[error("SSE endpoint returned HTTP {0}")]
    Status(u16),

    /// No `endpoint` event arrived in time.
    #[error("No endpoint event received within {0:?}")]
    EndpointTimeout(std::time::Duration),

    /// The `endpoint` event carried a URL that cannot be resolved.
    #[error("Invalid endpoint URL '{url}': {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The stream sent more than the buffer limit without ending an event.
    #[error("SSE event exceeded {limit} bytes without a terminating blank line")]
    EventTooLarge { limit: usize },

    /// Local stdin/stdout failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(codes::PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }
}

impl From<DispatchError> for RpcError {
    fn from(e: DispatchError) -> Self {
        RpcError::new(e.code(), e.to_string())
    }
}
