//! Line-delimited JSON-RPC over stdio (spec.md §4.6 "stdio transport"),
//! generalized from the teacher's `run_stdio_loop`/`handle_request` pair
//! (`src/main.rs`): CRLF-tolerant, blank lines ignored, parse failures
//! answered with -32700 rather than killing the loop, EOF terminates.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;
use crate::mcp::{JsonRpcRequest, JsonRpcResponse, McpServer};

use super::Transport;

pub struct StdioTransport;

impl Transport for StdioTransport {
    async fn run(self, server: Arc<McpServer>, cancel: CancellationToken) -> Result<(), BridgeError> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(stdin).lines();

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line.map_err(BridgeError::Io)?,
            };
            let Some(raw) = line else {
                tracing::info!("stdio: EOF, shutting down");
                break;
            };
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            tracing::debug!(%line, "stdio: received");

            let response = match serde_json::from_str::<JsonRpcRequest>(line) {
                Ok(request) => server.handle_request(request, &cancel).await,
                Err(e) => JsonRpcResponse::error(None, -32700, &format!("parse error: {}", e)),
            };

            let encoded = serde_json::to_string(&response).map_err(|e| BridgeError::Transport(e.to_string()))?;
            tracing::debug!(response = %encoded, "stdio: sending");
            stdout.write_all(encoded.as_bytes()).await.map_err(BridgeError::Io)?;
            stdout.write_all(b"\n").await.map_err(BridgeError::Io)?;
            stdout.flush().await.map_err(BridgeError::Io)?;
        }

        Ok(())
    }
}
