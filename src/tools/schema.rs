//! JSON-Schema fragment construction for tool `input_schema`s: entity
//! property schemas (create/update) and OData system query options
//! (spec.md §4.4 "Input schemas").

use serde_json::{Map, Value};

use crate::config::BridgeConfig;
use crate::constants::{EDM_BOOLEAN_TYPES, EDM_INTEGER_TYPES, EDM_NUMBER_TYPES, EDM_STRING_TYPES};
use crate::model::EntityType;

/// The OData system query options every list/get tool may expose
/// (spec.md §4.4). Order is fixed so schemas are deterministic.
pub const SYSTEM_QUERY_OPTIONS: &[(&str, &str)] = &[
    ("$filter", "OData filter expression, e.g. \"Name eq 'Widget'\""),
    ("$select", "Comma-separated list of properties to return"),
    ("$expand", "Comma-separated list of navigation properties to expand"),
    ("$orderby", "Sort order, e.g. \"Name desc\""),
    ("$top", "Maximum number of records to return"),
    ("$skip", "Number of records to skip, for pagination"),
    ("$count", "Include a total count of matching records"),
];

/// An option name as advertised to the MCP caller: `claude_code_friendly`
/// drops the leading `$` (spec.md §4.4 "claude-code-friendly mode").
pub fn advertised_option_name(system_name: &str, config: &BridgeConfig) -> String {
    if config.claude_code_friendly {
        system_name.trim_start_matches('$').to_string()
    } else {
        system_name.to_string()
    }
}

/// Map a tool argument key back to its OData system-option spelling, if
/// it is one (spec.md §4.4 "on dispatch, properties starting without `$`
/// are remapped to the OData spelling").
pub fn odata_option_name(arg_name: &str) -> Option<&'static str> {
    SYSTEM_QUERY_OPTIONS
        .iter()
        .map(|(name, _)| *name)
        .find(|system_name| system_name.trim_start_matches('$') == arg_name)
}

/// Map an `Edm.*` primitive type string (or `Collection(...)` wrapper) to
/// a JSON-Schema primitive type name (spec.md §4.4).
pub fn edm_to_json_schema_type(odata_type: &str) -> &'static str {
    let inner = odata_type
        .strip_prefix("Collection(")
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(odata_type);

    if EDM_STRING_TYPES.contains(&inner) {
        "string"
    } else if EDM_INTEGER_TYPES.contains(&inner) {
        "integer"
    } else if EDM_NUMBER_TYPES.contains(&inner) {
        "number"
    } else if EDM_BOOLEAN_TYPES.contains(&inner) {
        "boolean"
    } else {
        "string"
    }
}

/// Add the system query options to a schema's `properties`/`required`
/// (list/get/search/count tools).
pub fn add_query_option_properties(properties: &mut Map<String, Value>, config: &BridgeConfig) {
    for (system_name, description) in SYSTEM_QUERY_OPTIONS {
        let schema_type = if *system_name == "$top" || *system_name == "$skip" {
            "integer"
        } else if *system_name == "$count" {
            "boolean"
        } else {
            "string"
        };
        properties.insert(
            advertised_option_name(system_name, config),
            serde_json::json!({"type": schema_type, "description": description}),
        );
    }
}

/// Build the `object` JSON-Schema for a key-lookup tool (get/update/
/// delete): one property per key property, all required.
pub fn key_properties_schema(entity_type: &EntityType) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for key_name in &entity_type.key_properties {
        if let Some(prop) = entity_type.property(key_name) {
            properties.insert(
                prop.name.clone(),
                serde_json::json!({"type": edm_to_json_schema_type(&prop.odata_type)}),
            );
            required.push(prop.name.clone());
        }
    }
    serde_json::json!({"type": "object", "properties": properties, "required": required})
}

/// Build the `object` JSON-Schema for an entity payload (create/update):
/// create omits key properties; both require non-nullable properties
/// (spec.md §4.4).
pub fn entity_payload_schema(entity_type: &EntityType, for_create: bool) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for prop in &entity_type.properties {
        if for_create && prop.is_key {
            continue;
        }
        properties.insert(
            prop.name.clone(),
            serde_json::json!({"type": edm_to_json_schema_type(&prop.odata_type)}),
        );
        if !prop.nullable && !prop.is_key {
            required.push(prop.name.clone());
        }
    }
    serde_json::json!({"type": "object", "properties": properties, "required": required})
}

/// Merge `extra` required/optional properties (e.g. key properties for
/// update, or the system query options for list) onto a base schema
/// produced by [`entity_payload_schema`]/[`key_properties_schema`].
pub fn merge_schemas(base: Value, extra: Value) -> Value {
    let mut properties = base["properties"].as_object().cloned().unwrap_or_default();
    let mut required: Vec<String> = base["required"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    if let Some(extra_props) = extra["properties"].as_object() {
        for (k, v) in extra_props {
            properties.insert(k.clone(), v.clone());
        }
    }
    if let Some(extra_required) = extra["required"].as_array() {
        for r in extra_required {
            if let Some(s) = r.as_str() {
                if !required.iter().any(|x| x == s) {
                    required.push(s.to_string());
                }
            }
        }
    }

    serde_json::json!({"type": "object", "properties": properties, "required": required})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edm_types_map_to_json_schema_types() {
        assert_eq!(edm_to_json_schema_type("Edm.String"), "string");
        assert_eq!(edm_to_json_schema_type("Edm.Int32"), "integer");
        assert_eq!(edm_to_json_schema_type("Edm.Decimal"), "number");
        assert_eq!(edm_to_json_schema_type("Edm.Boolean"), "boolean");
        assert_eq!(edm_to_json_schema_type("Collection(Edm.String)"), "string");
        assert_eq!(edm_to_json_schema_type("Edm.Guid"), "string");
        assert_eq!(edm_to_json_schema_type("Edm.Date"), "string");
    }

    #[test]
    fn claude_code_friendly_drops_dollar_prefix() {
        let mut cfg = BridgeConfig::default();
        cfg.claude_code_friendly = true;
        assert_eq!(advertised_option_name("$filter", &cfg), "filter");
        let mut cfg2 = BridgeConfig::default();
        cfg2.claude_code_friendly = false;
        assert_eq!(advertised_option_name("$filter", &cfg2), "$filter");
    }

    #[test]
    fn odata_option_name_remaps_bare_name() {
        assert_eq!(odata_option_name("filter"), Some("$filter"));
        assert_eq!(odata_option_name("top"), Some("$top"));
        assert_eq!(odata_option_name("unknown"), None);
    }
}
