//! Tool generation: eager and lazy modes, naming, filtering, and
//! input-schema construction (spec.md §4.4).

mod eager;
pub(crate) mod filter;
mod lazy;
pub mod naming;
pub mod schema;

use crate::config::{BridgeConfig, ToolMode};
use crate::model::{OperationKind, ServiceMetadata, ToolInfo};

/// A small record carrying the operation tag plus the captured
/// entity-set/function name (spec.md §9 "Handler dispatch" — "In
/// languages without closures, a small record ... suffices"; Rust could
/// close over these too, but a plain enum keeps dispatch data, not code,
/// in the registry, which is what the MCP server needs to serialize/
/// inspect at `tools/list` time).
#[derive(Debug, Clone)]
pub enum ToolHandler {
    ServiceInfo,
    ListEntities(String),
    CountEntities(String),
    GetEntity(String),
    SearchEntities(String),
    CreateEntity(String),
    UpdateEntity(String),
    DeleteEntity(String),
    CallFunction(String),
    /// Lazy-mode generic tools: the bound name is a call-time argument.
    LazyListEntities,
    LazyCountEntities,
    LazyGetEntity,
    LazyGetEntitySchema,
    LazyCreateEntity,
    LazyUpdateEntity,
    LazyDeleteEntity,
    LazyListFunctions,
    LazyCallFunction,
}

pub struct SynthesizedTool {
    pub info: ToolInfo,
    pub handler: ToolHandler,
}

/// Estimate the eager tool count for the lazy-mode auto-enable threshold
/// (spec.md §4.4 "Auto-enable lazy mode if the estimated eager tool count
/// (≈ 6 · |entity_sets| + |function_imports|) exceeds `lazy_threshold`").
pub fn estimate_eager_tool_count(metadata: &ServiceMetadata) -> usize {
    6 * metadata.entity_sets.len() + metadata.function_imports.len()
}

/// Generate the tool catalog for a parsed service, in eager or lazy mode
/// as resolved by [`BridgeConfig::tool_mode`].
pub fn synthesize(metadata: &ServiceMetadata, config: &BridgeConfig) -> Vec<SynthesizedTool> {
    let estimated = estimate_eager_tool_count(metadata);
    match config.tool_mode(estimated) {
        ToolMode::Eager => eager::synthesize(metadata, config),
        ToolMode::Lazy => lazy::synthesize(metadata, config),
    }
}

pub(crate) fn service_info_tool(config: &BridgeConfig) -> SynthesizedTool {
    let name = naming::service_info_tool_name(config);
    SynthesizedTool {
        info: ToolInfo {
            name,
            description: "Report the connected OData service's version, namespace, entity sets, \
                and function imports."
                .to_string(),
            operation: OperationKind::ServiceInfo,
            entity_set: None,
            function: None,
            input_schema: serde_json::json!({"type": "object", "properties": {}, "required": []}),
        },
        handler: ToolHandler::ServiceInfo,
    }
}
