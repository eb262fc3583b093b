//! stdio to SSE bridge.
//!
//! Spawned by an MCP host in place of the server: reads JSON-RPC from
//! stdin, forwards it to a remote server's HTTP/SSE transport named by
//! `MCP_SSE_URL`, and writes the responses to stdout.

use anyhow::Result;
use epicor_mcp_server::bridge::run_bridge;
use epicor_mcp_server::config::{load_dotenv, BridgeConfig};
use epicor_mcp_server::logging::init_logging;
use tokio::io::BufReader;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    init_logging();

    let config = BridgeConfig::from_env()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint_timeout = ?config.endpoint_timeout,
        "Epicor MCP bridge starting"
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    if let Err(e) = run_bridge(&config, stdin, stdout).await {
        error!("Bridge stopped: {}", e);
        return Err(e.into());
    }
    info!("Bridge closed");
    Ok(())
}
