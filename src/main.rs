//! Epicor MCP Server entry point.
//!
//! Serves the MCP tools over stdio (the default, for Claude Desktop and
//! other subprocess hosts) or over HTTP/SSE when `MCP_TRANSPORT=http`.
//!
//! Features:
//! - Signal handling (SIGTERM, SIGINT, SIGHUP)
//! - Database connection warm-up and release on shutdown

use anyhow::{Context, Result};
use epicor_mcp_server::config::load_dotenv;
use epicor_mcp_server::logging::init_logging;
use epicor_mcp_server::shutdown::{install_signal_handlers, ShutdownController};
use epicor_mcp_server::transport::{serve_http, serve_stdio, TransportType};
use epicor_mcp_server::{Config, EpicorMcpServer};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = load_dotenv();
    init_logging();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        dotenv = ?dotenv,
        "Epicor MCP Server starting"
    );

    std::panic::set_hook(Box::new(|info| {
        error!("[PANIC] {}", info);
    }));

    let config = Config::from_env().map_err(|e| {
        if let Some(hint) = e.suggestion() {
            error!("{} ({})", e, hint);
        }
        e
    })?;
    info!(
        transport = %config.transport.mode,
        database = config.database_configured(),
        "Configuration loaded"
    );

    let server = EpicorMcpServer::from_config(&config);
    server.warm_up().await;

    let shutdown = Arc::new(ShutdownController::new());
    install_signal_handlers(Arc::clone(&shutdown));

    let served = match config.transport.mode {
        TransportType::Stdio => serve_stdio(server.clone(), shutdown.signal())
            .await
            .context("stdio transport failed"),
        TransportType::Http => serve_http(server.clone(), &config.transport, shutdown.signal())
            .await
            .context("HTTP transport failed"),
    };

    let signalled = shutdown.is_shutting_down();
    shutdown.graceful_shutdown(&server).await;

    // A pending stdin read keeps the runtime from shutting down on its own.
    if config.transport.mode == TransportType::Stdio && signalled {
        if let Err(e) = &served {
            error!("{:#}", e);
            std::process::exit(1);
        }
        std::process::exit(0);
    }
    served
}
