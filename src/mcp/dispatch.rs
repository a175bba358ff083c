//! Translate a registered tool's [`ToolHandler`] plus a `tools/call`
//! argument map into an [`ODataClient`] invocation, and shape the result
//! with [`response_enhancer`] (spec.md §4.3 "tools/call", §4.5).

use std::collections::HashMap;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::error::ODataError;
use crate::model::{EntityType, ServiceMetadata};
use crate::odata::{response, ODataClient, QueryOptions, UpdateMethod};
use crate::response_enhancer;
use crate::tools::filter::{base_op_enabled, name_allowed, op_enabled};
use crate::tools::ToolHandler;

/// OData system query options a `tools/call` argument map may carry,
/// beyond the claude-code-friendly bare spellings handled by
/// [`crate::tools::schema::odata_option_name`] (that helper only covers
/// `SYSTEM_QUERY_OPTIONS`; `$search` is tool-specific and listed here too).
const RECOGNIZED_OPTIONS: &[&str] = &[
    "$filter", "$select", "$expand", "$orderby", "$top", "$skip", "$count", "$search",
];

fn canonical_option_name(key: &str) -> Option<String> {
    if key.starts_with('$') {
        RECOGNIZED_OPTIONS.iter().find(|o| **o == key).map(|o| o.to_string())
    } else {
        let dollar = format!("${}", key);
        RECOGNIZED_OPTIONS
            .iter()
            .find(|o| **o == dollar)
            .map(|o| o.to_string())
    }
}

fn value_to_query_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Build a [`QueryOptions`] from recognized system-option arguments,
/// ignoring everything else (key properties, payload fields, `entity_set`).
fn query_options_from_args(args: &HashMap<String, Value>, exclude: &[&str]) -> QueryOptions {
    let mut opts = QueryOptions::new();
    for (key, value) in args {
        if exclude.contains(&key.as_str()) {
            continue;
        }
        if let Some(name) = canonical_option_name(key) {
            opts.set(name, value_to_query_string(value));
        }
    }
    opts
}

fn args_to_object(args: &HashMap<String, Value>, exclude: &[&str]) -> Map<String, Value> {
    args.iter()
        .filter(|(k, _)| !exclude.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn key_from_named_args(args: &HashMap<String, Value>, names: &[String]) -> Result<Vec<(String, Value)>, String> {
    let mut key = Vec::with_capacity(names.len());
    for name in names {
        let value = args
            .get(name)
            .ok_or_else(|| format!("missing required key property '{}'", name))?;
        key.push((name.clone(), value.clone()));
    }
    Ok(key)
}

fn key_from_object_arg(args: &HashMap<String, Value>) -> Result<Vec<(String, Value)>, String> {
    let obj = args
        .get("key")
        .and_then(Value::as_object)
        .ok_or_else(|| "missing required parameter 'key' (object)".to_string())?;
    Ok(obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

fn entity_type_for<'a>(metadata: &'a ServiceMetadata, set_name: &str) -> Result<&'a EntityType, String> {
    metadata
        .entity_type_for_set(set_name)
        .ok_or_else(|| format!("unknown entity set '{}'", set_name))
}

fn string_arg<'a>(args: &'a HashMap<String, Value>, name: &str) -> Result<&'a str, String> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing required parameter '{}'", name))
}

fn odata_err(context: &str, err: ODataError) -> String {
    format!("failed to {}: {}", context, err)
}

/// Dispatch one `tools/call` invocation. Returns the JSON value to embed
/// as the tool result's text content, or a human-readable error message.
pub async fn dispatch(
    handler: &ToolHandler,
    metadata: &ServiceMetadata,
    client: &ODataClient,
    config: &BridgeConfig,
    args: &HashMap<String, Value>,
    cancel: &CancellationToken,
) -> Result<Value, String> {
    match handler {
        ToolHandler::ServiceInfo => Ok(service_info(metadata)),

        ToolHandler::ListEntities(set_name) => {
            let opts = query_options_from_args(args, &[]);
            let value = client
                .get_entity_set(set_name, &opts, cancel)
                .await
                .map_err(|e| odata_err(&format!("list entities from {}", set_name), e))?;
            Ok(response_enhancer::enhance(value, &opts, config))
        }

        ToolHandler::CountEntities(set_name) => count_entities(set_name, args, metadata, client, config, cancel).await,

        ToolHandler::GetEntity(set_name) => {
            let entity_type = entity_type_for(metadata, set_name)?;
            let key = key_from_named_args(args, &entity_type.key_properties)?;
            let exclude: Vec<&str> = entity_type.key_properties.iter().map(String::as_str).collect();
            let opts = query_options_from_args(args, &exclude);
            let value = client
                .get_entity(set_name, &key, &opts, cancel)
                .await
                .map_err(|e| odata_err(&format!("get entity from {}", set_name), e))?;
            Ok(response_enhancer::enhance(value, &opts, config))
        }

        ToolHandler::SearchEntities(set_name) => {
            let opts = query_options_from_args(args, &[]);
            if opts.get("$search").is_none() {
                return Err("missing required parameter 'search'".to_string());
            }
            let value = client
                .get_entity_set(set_name, &opts, cancel)
                .await
                .map_err(|e| odata_err(&format!("search entities in {}", set_name), e))?;
            Ok(response_enhancer::enhance(value, &opts, config))
        }

        ToolHandler::CreateEntity(set_name) => {
            let data = Value::Object(args_to_object(args, &[]));
            let prepared = response_enhancer::prepare_write_payload(data, config);
            let value = client
                .create_entity(set_name, &prepared, cancel)
                .await
                .map_err(|e| odata_err(&format!("create entity in {}", set_name), e))?;
            Ok(response_enhancer::enhance(value, &QueryOptions::new(), config))
        }

        ToolHandler::UpdateEntity(set_name) => {
            let entity_type = entity_type_for(metadata, set_name)?;
            let key = key_from_named_args(args, &entity_type.key_properties)?;
            let exclude: Vec<&str> = entity_type.key_properties.iter().map(String::as_str).collect();
            let data = Value::Object(args_to_object(args, &exclude));
            let prepared = response_enhancer::prepare_write_payload(data, config);
            let value = client
                .update_entity(set_name, &key, &prepared, UpdateMethod::default(), cancel)
                .await
                .map_err(|e| odata_err(&format!("update entity in {}", set_name), e))?;
            Ok(response_enhancer::enhance(value, &QueryOptions::new(), config))
        }

        ToolHandler::DeleteEntity(set_name) => {
            let entity_type = entity_type_for(metadata, set_name)?;
            let key = key_from_named_args(args, &entity_type.key_properties)?;
            client
                .delete_entity(set_name, &key, cancel)
                .await
                .map_err(|e| odata_err(&format!("delete entity in {}", set_name), e))?;
            Ok(serde_json::json!({"deleted": true, "entity_set": set_name}))
        }

        ToolHandler::CallFunction(name) => call_function(name, args, metadata, client, config, cancel).await,

        ToolHandler::LazyListEntities => {
            let set_name = string_arg(args, "entity_set")?.to_string();
            let opts = query_options_from_args(args, &["entity_set"]);
            let value = client
                .get_entity_set(&set_name, &opts, cancel)
                .await
                .map_err(|e| odata_err(&format!("list entities from {}", set_name), e))?;
            Ok(response_enhancer::enhance(value, &opts, config))
        }

        ToolHandler::LazyCountEntities => {
            let set_name = string_arg(args, "entity_set")?.to_string();
            count_entities(&set_name, args, metadata, client, config, cancel).await
        }

        ToolHandler::LazyGetEntity => {
            let set_name = string_arg(args, "entity_set")?.to_string();
            let key = key_from_object_arg(args)?;
            let opts = query_options_from_args(args, &["entity_set", "key"]);
            let value = client
                .get_entity(&set_name, &key, &opts, cancel)
                .await
                .map_err(|e| odata_err(&format!("get entity from {}", set_name), e))?;
            Ok(response_enhancer::enhance(value, &opts, config))
        }

        ToolHandler::LazyGetEntitySchema => {
            let set_name = string_arg(args, "entity_set")?;
            entity_schema(set_name, metadata)
        }

        ToolHandler::LazyCreateEntity => {
            let set_name = string_arg(args, "entity_set")?.to_string();
            let data = args
                .get("data")
                .cloned()
                .ok_or_else(|| "missing required parameter 'data' (object)".to_string())?;
            let prepared = response_enhancer::prepare_write_payload(data, config);
            let value = client
                .create_entity(&set_name, &prepared, cancel)
                .await
                .map_err(|e| odata_err(&format!("create entity in {}", set_name), e))?;
            Ok(response_enhancer::enhance(value, &QueryOptions::new(), config))
        }

        ToolHandler::LazyUpdateEntity => {
            let set_name = string_arg(args, "entity_set")?.to_string();
            let key = key_from_object_arg(args)?;
            let data = args
                .get("data")
                .cloned()
                .ok_or_else(|| "missing required parameter 'data' (object)".to_string())?;
            let prepared = response_enhancer::prepare_write_payload(data, config);
            let value = client
                .update_entity(&set_name, &key, &prepared, UpdateMethod::default(), cancel)
                .await
                .map_err(|e| odata_err(&format!("update entity in {}", set_name), e))?;
            Ok(response_enhancer::enhance(value, &QueryOptions::new(), config))
        }

        ToolHandler::LazyDeleteEntity => {
            let set_name = string_arg(args, "entity_set")?.to_string();
            let key = key_from_object_arg(args)?;
            client
                .delete_entity(&set_name, &key, cancel)
                .await
                .map_err(|e| odata_err(&format!("delete entity in {}", set_name), e))?;
            Ok(serde_json::json!({"deleted": true, "entity_set": set_name}))
        }

        ToolHandler::LazyListFunctions => Ok(list_functions(metadata, config)),

        ToolHandler::LazyCallFunction => {
            let name = string_arg(args, "function_name")?.to_string();
            if !name_allowed(&name, &config.allowed_functions) {
                return Err(format!("function '{}' is not allowed by configuration", name));
            }
            let params = args
                .get("parameters")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            call_function(&name, &params.into_iter().collect(), metadata, client, config, cancel).await
        }
    }
}

async fn count_entities(
    set_name: &str,
    args: &HashMap<String, Value>,
    metadata: &ServiceMetadata,
    client: &ODataClient,
    config: &BridgeConfig,
    cancel: &CancellationToken,
) -> Result<Value, String> {
    let mut opts = query_options_from_args(args, &["entity_set"]);
    opts.set("$top", "0");
    if metadata.version.is_v4() {
        opts.set("$count", "true");
    } else {
        opts.set("$inlinecount", "allpages");
    }
    let value = client
        .get_entity_set(set_name, &opts, cancel)
        .await
        .map_err(|e| odata_err(&format!("count entities in {}", set_name), e))?;
    let count = response::extract_count(&value);
    Ok(serde_json::json!({"entity_set": set_name, "count": count}))
}

async fn call_function(
    name: &str,
    args: &HashMap<String, Value>,
    metadata: &ServiceMetadata,
    client: &ODataClient,
    config: &BridgeConfig,
    cancel: &CancellationToken,
) -> Result<Value, String> {
    let fi = metadata
        .function_imports
        .get(name)
        .ok_or_else(|| format!("unknown function import '{}'", name))?;

    let allowed = if fi.is_modifying() {
        op_enabled(crate::model::OperationKind::Function, config)
    } else {
        base_op_enabled(crate::model::OperationKind::Function, config)
    };
    if !allowed {
        return Err(format!("function '{}' is disabled by configuration", name));
    }

    let mut params = Vec::with_capacity(fi.parameters.len());
    for param in &fi.parameters {
        match args.get(&param.name) {
            Some(value) => params.push((param.name.clone(), value.clone())),
            None if !param.nullable => {
                return Err(format!("missing required parameter '{}'", param.name));
            }
            None => {}
        }
    }

    let value = client
        .call_function(name, &params, fi.http_method, cancel)
        .await
        .map_err(|e| odata_err(&format!("call function {}", name), e))?;
    Ok(response_enhancer::enhance(value, &QueryOptions::new(), config))
}

fn service_info(metadata: &ServiceMetadata) -> Value {
    let entity_sets = metadata.entity_set_names_sorted();
    let mut functions: Vec<&str> = metadata.function_imports.keys().map(String::as_str).collect();
    functions.sort_unstable();

    serde_json::json!({
        "service_root": metadata.service_root,
        "version": metadata.version.as_str(),
        "schema_namespace": metadata.schema_namespace,
        "container_name": metadata.container_name,
        "entity_sets": entity_sets,
        "function_imports": functions,
    })
}

fn entity_schema(set_name: &str, metadata: &ServiceMetadata) -> Result<Value, String> {
    let set = metadata
        .entity_sets
        .get(set_name)
        .ok_or_else(|| format!("unknown entity set '{}'", set_name))?;
    let entity_type = entity_type_for(metadata, set_name)?;

    let properties: Vec<Value> = entity_type
        .properties
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name,
                "type": p.odata_type,
                "nullable": p.nullable,
                "is_key": p.is_key,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "entity_set": set_name,
        "entity_type": entity_type.name,
        "key_properties": entity_type.key_properties,
        "properties": properties,
        "creatable": set.creatable,
        "updatable": set.updatable,
        "deletable": set.deletable,
        "searchable": set.searchable,
        "pageable": set.pageable,
    }))
}

fn list_functions(metadata: &ServiceMetadata, config: &BridgeConfig) -> Value {
    let mut names: Vec<&String> = metadata
        .function_imports
        .keys()
        .filter(|n| name_allowed(n, &config.allowed_functions))
        .collect();
    names.sort();

    let functions: Vec<Value> = names
        .into_iter()
        .map(|name| {
            let fi = &metadata.function_imports[name];
            serde_json::json!({
                "name": fi.name,
                "http_method": fi.http_method.as_str(),
                "is_action": fi.is_action,
                "parameters": fi.parameters.iter().map(|p| serde_json::json!({
                    "name": p.name,
                    "type": p.odata_type,
                    "nullable": p.nullable,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();

    serde_json::json!({"functions": functions})
}
