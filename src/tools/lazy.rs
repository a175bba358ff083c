//! Lazy tool-generation mode: exactly 10 generic tools (7 in fully
//! read-only mode), each parameterized by `entity_set`/`function_name`
//! strings supplied at call time (spec.md §4.4 "Lazy mode").

use serde_json::Map;

use crate::config::BridgeConfig;
use crate::model::{OperationKind, ServiceMetadata, ToolInfo};

use super::filter::op_enabled;
use super::schema::{add_query_option_properties, advertised_option_name};
use super::{naming, service_info_tool, SynthesizedTool, ToolHandler};

pub fn synthesize(_metadata: &ServiceMetadata, config: &BridgeConfig) -> Vec<SynthesizedTool> {
    let mut tools = vec![service_info_tool(config)];

    tools.push(list_entities_tool(config));
    tools.push(count_entities_tool(config));
    tools.push(get_entity_tool(config));
    tools.push(get_entity_schema_tool(config));

    if op_enabled(OperationKind::Create, config) {
        tools.push(generic_tool(
            "create_entity",
            "Create a new entity in the named entity set.",
            OperationKind::Create,
            ToolHandler::LazyCreateEntity,
            config,
            &[("entity_set", "string", true), ("data", "object", true)],
        ));
    }
    if op_enabled(OperationKind::Update, config) {
        tools.push(generic_tool(
            "update_entity",
            "Update an existing entity in the named entity set by key.",
            OperationKind::Update,
            ToolHandler::LazyUpdateEntity,
            config,
            &[
                ("entity_set", "string", true),
                ("key", "object", true),
                ("data", "object", true),
            ],
        ));
    }
    if op_enabled(OperationKind::Delete, config) {
        tools.push(generic_tool(
            "delete_entity",
            "Delete an entity in the named entity set by key.",
            OperationKind::Delete,
            ToolHandler::LazyDeleteEntity,
            config,
            &[("entity_set", "string", true), ("key", "object", true)],
        ));
    }

    tools.push(list_functions_tool(config));
    tools.push(call_function_tool(config));

    tools
}

fn generic_tool(
    base_name: &str,
    description: &str,
    operation: OperationKind,
    handler: ToolHandler,
    config: &BridgeConfig,
    extra_properties: &[(&str, &str, bool)],
) -> SynthesizedTool {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (name, ty, is_required) in extra_properties {
        properties.insert(name.to_string(), serde_json::json!({"type": ty}));
        if *is_required {
            required.push(name.to_string());
        }
    }
    SynthesizedTool {
        info: ToolInfo {
            name: naming::attach_lazy_affixes(base_name, config),
            description: description.to_string(),
            operation,
            entity_set: None,
            function: None,
            input_schema: serde_json::json!({"type": "object", "properties": properties, "required": required}),
        },
        handler,
    }
}

fn list_entities_tool(config: &BridgeConfig) -> SynthesizedTool {
    let mut properties = Map::new();
    properties.insert(
        "entity_set".to_string(),
        serde_json::json!({"type": "string", "description": "Entity set name to list"}),
    );
    add_query_option_properties(&mut properties, config);
    SynthesizedTool {
        info: ToolInfo {
            name: naming::attach_lazy_affixes("list_entities", config),
            description: "List/filter entities from any entity set.".to_string(),
            operation: OperationKind::Filter,
            entity_set: None,
            function: None,
            input_schema: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": ["entity_set"],
            }),
        },
        handler: ToolHandler::LazyListEntities,
    }
}

fn count_entities_tool(config: &BridgeConfig) -> SynthesizedTool {
    let mut properties = Map::new();
    properties.insert(
        "entity_set".to_string(),
        serde_json::json!({"type": "string", "description": "Entity set name to count"}),
    );
    properties.insert(
        advertised_option_name("$filter", config),
        serde_json::json!({"type": "string", "description": "Optional OData filter expression"}),
    );
    SynthesizedTool {
        info: ToolInfo {
            name: naming::attach_lazy_affixes("count_entities", config),
            description: "Count entities in any entity set, optionally filtered.".to_string(),
            operation: OperationKind::Count,
            entity_set: None,
            function: None,
            input_schema: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": ["entity_set"],
            }),
        },
        handler: ToolHandler::LazyCountEntities,
    }
}

fn get_entity_tool(config: &BridgeConfig) -> SynthesizedTool {
    generic_tool(
        "get_entity",
        "Get a single entity from any entity set by key.",
        OperationKind::Get,
        ToolHandler::LazyGetEntity,
        config,
        &[("entity_set", "string", true), ("key", "object", true)],
    )
}

fn get_entity_schema_tool(config: &BridgeConfig) -> SynthesizedTool {
    generic_tool(
        "get_entity_schema",
        "Describe an entity set's properties, key, and capabilities.",
        OperationKind::Get,
        ToolHandler::LazyGetEntitySchema,
        config,
        &[("entity_set", "string", true)],
    )
}

fn list_functions_tool(config: &BridgeConfig) -> SynthesizedTool {
    generic_tool(
        "list_functions",
        "List the service's callable function/action imports.",
        OperationKind::Function,
        ToolHandler::LazyListFunctions,
        config,
        &[],
    )
}

fn call_function_tool(config: &BridgeConfig) -> SynthesizedTool {
    generic_tool(
        "call_function",
        "Call a function or action import by name.",
        OperationKind::Function,
        ToolHandler::LazyCallFunction,
        config,
        &[("function_name", "string", true), ("parameters", "object", false)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ODataVersion;
    use std::collections::HashMap;
    use std::time::SystemTime;

    fn empty_metadata() -> ServiceMetadata {
        ServiceMetadata {
            service_root: "https://example.com/svc/".to_string(),
            version: ODataVersion::V2,
            schema_namespace: String::new(),
            container_name: String::new(),
            entity_types: HashMap::new(),
            entity_sets: HashMap::new(),
            function_imports: HashMap::new(),
            parsed_at: SystemTime::now(),
        }
    }

    #[test]
    fn lazy_mode_generates_exactly_ten_tools() {
        let meta = empty_metadata();
        let mut cfg = BridgeConfig::default();
        cfg.lazy_metadata = true;
        cfg.no_postfix = true;
        let tools = synthesize(&meta, &cfg);
        assert_eq!(tools.len(), 10);
        let expected = [
            "odata_service_info",
            "list_entities",
            "count_entities",
            "get_entity",
            "get_entity_schema",
            "create_entity",
            "update_entity",
            "delete_entity",
            "list_functions",
            "call_function",
        ];
        for (tool, prefix) in tools.iter().zip(expected.iter()) {
            assert!(tool.info.name.starts_with(prefix), "{} vs {}", tool.info.name, prefix);
        }
    }

    #[test]
    fn read_only_lazy_mode_drops_to_seven_tools() {
        let meta = empty_metadata();
        let mut cfg = BridgeConfig::default();
        cfg.lazy_metadata = true;
        cfg.no_postfix = true;
        cfg.read_only = true;
        let tools = synthesize(&meta, &cfg);
        assert_eq!(tools.len(), 7);
        assert!(!tools.iter().any(|t| t.info.name == "create_entity"));
        assert!(!tools.iter().any(|t| t.info.name == "update_entity"));
        assert!(!tools.iter().any(|t| t.info.name == "delete_entity"));
    }
}
