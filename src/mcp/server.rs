//! The MCP server: owns the tool registry and dispatches JSON-RPC
//! requests over whichever [`crate::transport::Transport`] is wired up
//! (spec.md §4.3).

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::constants::{MCP_PROTOCOL_VERSION, SERVER_NAME};
use crate::error::{categorize_error_message, McpError};
use crate::model::ServiceMetadata;
use crate::odata::ODataClient;

use super::dispatch;
use super::protocol::*;
use super::registry::ToolRegistry;

pub struct McpServer {
    client: Arc<ODataClient>,
    metadata: ServiceMetadata,
    config: Arc<BridgeConfig>,
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(client: Arc<ODataClient>, metadata: ServiceMetadata, config: Arc<BridgeConfig>) -> Self {
        let registry = ToolRegistry::from_synthesized(crate::tools::synthesize(&metadata, &config));
        Self {
            client,
            metadata,
            config,
            registry,
        }
    }

    pub fn tool_count(&self) -> usize {
        self.registry.len()
    }

    /// Handle one JSON-RPC request, producing the matching response
    /// (spec.md §4.3). `cancel` bounds how long a `tools/call` is allowed
    /// to run before its underlying OData request is cancelled.
    pub async fn handle_request(&self, request: JsonRpcRequest, cancel: &CancellationToken) -> JsonRpcResponse {
        if request.jsonrpc != "2.0" {
            return JsonRpcResponse::error(request.id, -32600, "invalid request: jsonrpc version must be \"2.0\"");
        }

        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "initialized" | "notifications/initialized" => {
                JsonRpcResponse::success(request.id, serde_json::json!({}))
            }
            "ping" => JsonRpcResponse::success(request.id, serde_json::json!({})),
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => self.handle_tools_call(request.id, request.params, cancel).await,
            "resources/list" => JsonRpcResponse::success(request.id, serde_json::json!({"resources": []})),
            "prompts/list" => JsonRpcResponse::success(request.id, serde_json::json!({"prompts": []})),
            other => JsonRpcResponse::error(
                request.id,
                McpError::MethodNotFound(other.to_string()).rpc_code() as i32,
                &format!("method not found: {}", other),
            ),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::standard(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        JsonRpcResponse::success(id, serde_json::to_value(result).expect("InitializeResult always serializes"))
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools: Vec<Tool> = self
            .registry
            .iter_in_order()
            .map(|registered| Tool {
                name: registered.info.name.clone(),
                description: registered.info.description.clone(),
                input_schema: registered.info.input_schema.clone(),
            })
            .collect();
        let result = ListToolsResult { tools };
        JsonRpcResponse::success(id, serde_json::to_value(result).expect("ListToolsResult always serializes"))
    }

    async fn handle_tools_call(
        &self,
        id: Option<Value>,
        params: Option<Value>,
        cancel: &CancellationToken,
    ) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value).transpose() {
            Ok(Some(p)) => p,
            Ok(None) => {
                return JsonRpcResponse::error(id, McpError::InvalidParams("missing params".into()).rpc_code() as i32, "invalid params: missing params")
            }
            Err(e) => {
                return JsonRpcResponse::error(
                    id,
                    McpError::InvalidParams(e.to_string()).rpc_code() as i32,
                    &format!("invalid params: {}", e),
                )
            }
        };

        let Some(registered) = self.registry.get(&params.name) else {
            let err = McpError::ToolNotFound(params.name.clone());
            return JsonRpcResponse::error(id, err.rpc_code() as i32, &err.to_string());
        };

        let args = params.arguments.unwrap_or_default();
        let call = dispatch::dispatch(&registered.handler, &self.metadata, &self.client, &self.config, &args, cancel);
        let result = match tokio::time::timeout(crate::constants::DEFAULT_REQUEST_TIMEOUT, call).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                Err("request timed out".to_string())
            }
        };
        match result {
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                JsonRpcResponse::success(id, serde_json::to_value(CallToolResult::text(text)).expect("always serializes"))
            }
            Err(message) => {
                // The full error text always goes in `message` (spec.md
                // §4.3); `verbose_errors` additionally echoes the tool name
                // in `data` for debugging.
                let code = categorize_error_message(&message);
                let mut response = JsonRpcResponse::error(id, code as i32, &message);
                if self.config.verbose_errors {
                    if let Some(error) = response.error.as_mut() {
                        error.data = Some(serde_json::json!({"tool": params.name}));
                    }
                }
                response
            }
        }
    }
}
