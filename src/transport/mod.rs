//! Transport abstraction: each transport owns its own start/stop loop and
//! defers all protocol semantics to the injected [`McpServer`]
//! (spec.md §9 "Transport").

pub mod http;
pub mod stdio;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;
use crate::mcp::McpServer;

/// A message transport that reads JSON-RPC requests, hands each to the
/// server, and writes back responses. Generalized from the teacher's
/// `run_stdio_loop`/`handle_request` pair (`src/main.rs`) into something
/// that can also carry an HTTP+SSE implementation.
pub trait Transport {
    async fn run(self, server: Arc<McpServer>, cancel: CancellationToken) -> Result<(), BridgeError>;
}
