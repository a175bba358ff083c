//! Eager tool-generation mode: one tool per (entity set × allowed
//! operation) plus one per allowed function import, plus
//! `odata_service_info` (spec.md §4.4 "Eager mode").

use serde_json::Map;

use crate::config::BridgeConfig;
use crate::model::{EntitySet, EntityType, FunctionImport, OperationKind, ServiceMetadata, ToolInfo};

use super::filter::{base_op_enabled, name_allowed, op_enabled};
use super::schema::{add_query_option_properties, entity_payload_schema, key_properties_schema, merge_schemas};
use super::{naming, service_info_tool, SynthesizedTool, ToolHandler};

pub fn synthesize(metadata: &ServiceMetadata, config: &BridgeConfig) -> Vec<SynthesizedTool> {
    let mut tools = vec![service_info_tool(config)];

    // Entity names sorted alphabetically first (spec.md §4.4, §8 "tools/list
    // ordering equals ... alphabetical entity-set order").
    for set_name in metadata.entity_set_names_sorted() {
        if !name_allowed(set_name, &config.allowed_entities) {
            continue;
        }
        let set = &metadata.entity_sets[set_name];
        let Some(entity_type) = metadata.entity_type_for_set(set_name) else {
            continue;
        };
        tools.extend(entity_tools(set, entity_type, config));
    }

    let mut function_names: Vec<&String> = metadata.function_imports.keys().collect();
    function_names.sort();
    for name in function_names {
        let fi = &metadata.function_imports[name];
        if !name_allowed(name, &config.allowed_functions) {
            continue;
        }
        let allowed = if fi.is_modifying() {
            op_enabled(OperationKind::Function, config)
        } else {
            base_op_enabled(OperationKind::Function, config)
        };
        if !allowed {
            continue;
        }
        tools.push(function_tool(fi, config));
    }

    tools
}

fn entity_tools(set: &EntitySet, entity_type: &EntityType, config: &BridgeConfig) -> Vec<SynthesizedTool> {
    let mut tools = Vec::new();
    let has_key = !entity_type.key_properties.is_empty();

    if op_enabled(OperationKind::Filter, config) {
        tools.push(list_tool(set, entity_type, config));
    }
    if op_enabled(OperationKind::Count, config) {
        tools.push(count_tool(set, config));
    }
    if op_enabled(OperationKind::Get, config) && has_key {
        tools.push(get_tool(set, entity_type, config));
    }
    if set.searchable && op_enabled(OperationKind::Search, config) {
        tools.push(search_tool(set, entity_type, config));
    }
    if set.creatable && op_enabled(OperationKind::Create, config) {
        tools.push(create_tool(set, entity_type, config));
    }
    if set.updatable && op_enabled(OperationKind::Update, config) && has_key {
        tools.push(update_tool(set, entity_type, config));
    }
    if set.deletable && op_enabled(OperationKind::Delete, config) && has_key {
        tools.push(delete_tool(set, entity_type, config));
    }

    tools
}

fn list_tool(set: &EntitySet, entity_type: &EntityType, config: &BridgeConfig) -> SynthesizedTool {
    let mut properties = Map::new();
    add_query_option_properties(&mut properties, config);
    let schema = serde_json::json!({"type": "object", "properties": properties, "required": []});
    let _ = entity_type;
    SynthesizedTool {
        info: ToolInfo {
            name: naming::entity_tool_name(OperationKind::Filter, &set.name, config),
            description: format!("List/filter '{}' entities using OData query options.", set.name),
            operation: OperationKind::Filter,
            entity_set: Some(set.name.clone()),
            function: None,
            input_schema: schema,
        },
        handler: ToolHandler::ListEntities(set.name.clone()),
    }
}

fn count_tool(set: &EntitySet, config: &BridgeConfig) -> SynthesizedTool {
    let mut properties = Map::new();
    properties.insert(
        super::schema::advertised_option_name("$filter", config),
        serde_json::json!({"type": "string", "description": "Optional OData filter expression"}),
    );
    SynthesizedTool {
        info: ToolInfo {
            name: naming::entity_tool_name(OperationKind::Count, &set.name, config),
            description: format!("Count '{}' entities, optionally filtered.", set.name),
            operation: OperationKind::Count,
            entity_set: Some(set.name.clone()),
            function: None,
            input_schema: serde_json::json!({"type": "object", "properties": properties, "required": []}),
        },
        handler: ToolHandler::CountEntities(set.name.clone()),
    }
}

fn get_tool(set: &EntitySet, entity_type: &EntityType, config: &BridgeConfig) -> SynthesizedTool {
    let mut properties = Map::new();
    add_query_option_properties(&mut properties, config);
    let opts_schema = serde_json::json!({"type": "object", "properties": properties, "required": []});
    let schema = merge_schemas(key_properties_schema(entity_type), opts_schema);
    SynthesizedTool {
        info: ToolInfo {
            name: naming::entity_tool_name(OperationKind::Get, &set.name, config),
            description: format!("Get a single '{}' entity by its key.", set.name),
            operation: OperationKind::Get,
            entity_set: Some(set.name.clone()),
            function: None,
            input_schema: schema,
        },
        handler: ToolHandler::GetEntity(set.name.clone()),
    }
}

fn search_tool(set: &EntitySet, entity_type: &EntityType, config: &BridgeConfig) -> SynthesizedTool {
    let mut properties = Map::new();
    properties.insert(
        super::schema::advertised_option_name("$search", config),
        serde_json::json!({"type": "string", "description": "Free-text search expression"}),
    );
    add_query_option_properties(&mut properties, config);
    let _ = entity_type;
    SynthesizedTool {
        info: ToolInfo {
            name: naming::entity_tool_name(OperationKind::Search, &set.name, config),
            description: format!("Free-text search '{}' entities.", set.name),
            operation: OperationKind::Search,
            entity_set: Some(set.name.clone()),
            function: None,
            input_schema: serde_json::json!({"type": "object", "properties": properties, "required": []}),
        },
        handler: ToolHandler::SearchEntities(set.name.clone()),
    }
}

fn create_tool(set: &EntitySet, entity_type: &EntityType, config: &BridgeConfig) -> SynthesizedTool {
    SynthesizedTool {
        info: ToolInfo {
            name: naming::entity_tool_name(OperationKind::Create, &set.name, config),
            description: format!("Create a new '{}' entity.", set.name),
            operation: OperationKind::Create,
            entity_set: Some(set.name.clone()),
            function: None,
            input_schema: entity_payload_schema(entity_type, true),
        },
        handler: ToolHandler::CreateEntity(set.name.clone()),
    }
}

fn update_tool(set: &EntitySet, entity_type: &EntityType, config: &BridgeConfig) -> SynthesizedTool {
    let schema = merge_schemas(key_properties_schema(entity_type), entity_payload_schema(entity_type, false));
    SynthesizedTool {
        info: ToolInfo {
            name: naming::entity_tool_name(OperationKind::Update, &set.name, config),
            description: format!("Update an existing '{}' entity by its key.", set.name),
            operation: OperationKind::Update,
            entity_set: Some(set.name.clone()),
            function: None,
            input_schema: schema,
        },
        handler: ToolHandler::UpdateEntity(set.name.clone()),
    }
}

fn delete_tool(set: &EntitySet, entity_type: &EntityType, config: &BridgeConfig) -> SynthesizedTool {
    SynthesizedTool {
        info: ToolInfo {
            name: naming::entity_tool_name(OperationKind::Delete, &set.name, config),
            description: format!("Delete a '{}' entity by its key.", set.name),
            operation: OperationKind::Delete,
            entity_set: Some(set.name.clone()),
            function: None,
            input_schema: key_properties_schema(entity_type),
        },
        handler: ToolHandler::DeleteEntity(set.name.clone()),
    }
}

fn function_tool(fi: &FunctionImport, config: &BridgeConfig) -> SynthesizedTool {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in &fi.parameters {
        properties.insert(
            param.name.clone(),
            serde_json::json!({"type": super::schema::edm_to_json_schema_type(&param.odata_type)}),
        );
        if !param.nullable {
            required.push(param.name.clone());
        }
    }
    SynthesizedTool {
        info: ToolInfo {
            name: naming::function_tool_name(&fi.name, config),
            description: format!(
                "Call the {} import '{}' ({}).",
                if fi.is_action { "action" } else { "function" },
                fi.name,
                fi.http_method.as_str()
            ),
            operation: OperationKind::Function,
            entity_set: None,
            function: Some(fi.name.clone()),
            input_schema: serde_json::json!({"type": "object", "properties": properties, "required": required}),
        },
        handler: ToolHandler::CallFunction(fi.name.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpMethod, ODataVersion};
    use std::collections::HashMap;
    use std::time::SystemTime;

    fn sample_metadata() -> ServiceMetadata {
        let mut entity_types = HashMap::new();
        entity_types.insert(
            "Product".to_string(),
            EntityType {
                name: "Product".to_string(),
                properties: vec![
                    crate::model::Property {
                        name: "ID".to_string(),
                        odata_type: "Edm.Int32".to_string(),
                        nullable: false,
                        is_key: true,
                        description: None,
                        facets: Default::default(),
                    },
                    crate::model::Property {
                        name: "Name".to_string(),
                        odata_type: "Edm.String".to_string(),
                        nullable: true,
                        is_key: false,
                        description: None,
                        facets: Default::default(),
                    },
                ],
                key_properties: vec!["ID".to_string()],
                navigation_properties: vec![],
            },
        );
        let mut entity_sets = HashMap::new();
        entity_sets.insert("Products".to_string(), EntitySet::v2_defaults("Products", "Product"));
        let mut function_imports = HashMap::new();
        function_imports.insert(
            "GetTop".to_string(),
            FunctionImport {
                name: "GetTop".to_string(),
                http_method: HttpMethod::Get,
                return_type: None,
                parameters: vec![],
                is_bound: false,
                is_action: false,
            },
        );
        ServiceMetadata {
            service_root: "https://example.com/svc/".to_string(),
            version: ODataVersion::V2,
            schema_namespace: "ns".to_string(),
            container_name: "C".to_string(),
            entity_types,
            entity_sets,
            function_imports,
            parsed_at: SystemTime::now(),
        }
    }

    #[test]
    fn eager_mode_generates_crud_plus_function_plus_service_info() {
        let meta = sample_metadata();
        let mut cfg = BridgeConfig::default();
        cfg.no_postfix = true;
        let tools = synthesize(&meta, &cfg);
        let names: Vec<&str> = tools.iter().map(|t| t.info.name.as_str()).collect();
        assert!(names.contains(&"odata_service_info"));
        assert!(names.contains(&"filter_products"));
        assert!(names.contains(&"count_products"));
        assert!(names.contains(&"get_products"));
        assert!(names.contains(&"create_products"));
        assert!(names.contains(&"update_products"));
        assert!(names.contains(&"delete_products"));
        assert!(!names.iter().any(|n| n.contains("search_products")));
        assert!(names.iter().any(|n| n.contains("gettop")));
    }

    #[test]
    fn read_only_drops_mutating_tools() {
        let meta = sample_metadata();
        let mut cfg = BridgeConfig::default();
        cfg.no_postfix = true;
        cfg.read_only = true;
        let tools = synthesize(&meta, &cfg);
        let names: Vec<&str> = tools.iter().map(|t| t.info.name.as_str()).collect();
        assert!(!names.contains(&"create_products"));
        assert!(!names.contains(&"update_products"));
        assert!(!names.contains(&"delete_products"));
        assert!(names.contains(&"get_products"));
    }
}
