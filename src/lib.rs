//! # Epicor MCP Server
//!
//! A read-only Model Context Protocol (MCP) server for Epicor Kinetic
//! SQL Server databases.
//!
//! This crate provides:
//! - **Reference tools**: search and describe Epicor tables, relations and
//!   join paths from the exported BAQ relationship CSV files
//! - **Database tools**: read-only queries and catalog lookups against a
//!   live database, hidden when no database is configured
//! - **Transports**: stdio, HTTP/SSE with token auth, and a stdio to SSE
//!   bridge for hosts that can only spawn subprocesses
//!
//! ## Architecture
//!
//! Every transport feeds JSON-RPC messages through [`handlers`], which
//! routes `tools/call` to the [`EpicorMcpServer`] dispatcher. The
//! relationship index is loaded once and shared read-only; the database
//! connector owns the connection pool and its reconnect logic.

pub mod bridge;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod handlers;
pub mod index;
pub mod logging;
pub mod protocol;
pub mod security;
pub mod server;
pub mod shutdown;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{BridgeError, DbError, DispatchError, ServerError};
pub use server::EpicorMcpServer;
