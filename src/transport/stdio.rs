//! Newline-delimited JSON-RPC over stdin/stdout.

use crate::handlers::handle_raw;
use crate::server::EpicorMcpServer;
use crate::shutdown::ShutdownSignal;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

/// Serve on the process's stdin/stdout until EOF or shutdown.
pub async fn serve_stdio(
    server: EpicorMcpServer,
    shutdown: ShutdownSignal,
) -> std::io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve_lines(server, stdin, stdout, shutdown).await
}

/// Serve one message per line from `reader`, writing responses to `writer`.
///
/// Requests are handled one at a time, in arrival order.
pub async fn serve_lines<R, W>(
    server: EpicorMcpServer,
    reader: R,
    mut writer: W,
    mut shutdown: ShutdownSignal,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    info!("stdio transport ready");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shutdown.recv() => {
                info!("stdio transport stopping on shutdown");
                break;
            }
        };

        let Some(line) = line else {
            debug!("stdin closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        if let Some(response) = handle_raw(&server, &line).await {
            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::RelationshipIndex;
    use crate::shutdown::ShutdownController;
    use serde_json::Value;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_responses_in_order_and_notifications_silent() {
        let server = EpicorMcpServer::new(Arc::new(RelationshipIndex::default()), None);
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n"
        );
        let mut output = Vec::new();
        let controller = ShutdownController::new();

        serve_lines(server, input.as_bytes(), &mut output, controller.signal())
            .await
            .unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["id"], 2);
        assert_eq!(lines[1]["result"]["tools"].as_array().unwrap().len(), 8);
    }
}
