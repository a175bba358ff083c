//! Response enrichment applied to every successful OData response before
//! it is handed back to the MCP client, and the inverse shaping applied to
//! create/update payloads before they are sent (spec.md §4.5).

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::config::BridgeConfig;
use crate::constants::DECIMAL_FIELD_HINTS;
use crate::odata::QueryOptions;

/// Shape a successful OData response for an MCP tool result: size/byte
/// caps, pagination hints, legacy date conversion, `__metadata` stripping
/// (spec.md §4.5 points 1-5).
pub fn enhance(mut body: Value, query: &QueryOptions, config: &BridgeConfig) -> Value {
    if !config.response_metadata {
        strip_metadata(&mut body);
    }
    if config.legacy_dates {
        convert_legacy_dates(&mut body);
    }

    let mut truncation = None;
    if let Some(obj) = body.as_object_mut() {
        if let Some(Value::Array(items)) = obj.get_mut("value") {
            truncation = apply_size_cap(items, config.max_items);
            if truncation.is_none() {
                truncation = apply_byte_cap(items, config.max_response_size);
            }
        }
    }

    if let Some((original_count, cap)) = truncation {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("truncated".to_string(), Value::Bool(true));
            obj.insert("original_count".to_string(), Value::from(original_count));
            obj.insert("max_items".to_string(), Value::from(cap));
            obj.insert(
                "warning".to_string(),
                Value::String(format!(
                    "Response truncated from {} to {} items; refine your query with $top/$skip or $filter to see more.",
                    original_count, cap
                )),
            );
        }
    }

    if config.pagination_hints {
        if let Some(pagination) = pagination_block(&body, query) {
            if let Some(obj) = body.as_object_mut() {
                obj.insert("pagination".to_string(), pagination);
            }
        }
    }

    body
}

/// Shape a create/update payload before it is sent to the OData service:
/// inverse (ISO -> legacy) date conversion and decimal-field numeric
/// coercion (spec.md §4.5 points 4, 6).
pub fn prepare_write_payload(mut data: Value, config: &BridgeConfig) -> Value {
    if config.legacy_dates {
        convert_iso_to_legacy(&mut data);
    }
    if config.decimal_coercion {
        coerce_decimal_fields(&mut data);
    }
    data
}

/// Truncate `items` to `max_items` if it exceeds that length
/// (spec.md §4.5 point 1). Returns `(original_count, max_items)` if it did.
fn apply_size_cap(items: &mut Vec<Value>, max_items: usize) -> Option<(usize, usize)> {
    let original = items.len();
    if original > max_items {
        items.truncate(max_items);
        Some((original, max_items))
    } else {
        None
    }
}

/// If the JSON-encoded size of `items` exceeds `max_bytes`, estimate the
/// average item size and keep `floor(max_bytes / avg_size)` items, at
/// least one (spec.md §4.5 point 2).
fn apply_byte_cap(items: &mut Vec<Value>, max_bytes: usize) -> Option<(usize, usize)> {
    let encoded_len = serde_json::to_vec(items).map(|v| v.len()).unwrap_or(0);
    if encoded_len <= max_bytes || items.is_empty() {
        return None;
    }
    let original = items.len();
    let avg_size = (encoded_len / original).max(1);
    let keep = (max_bytes / avg_size).max(1).min(original);
    if keep >= original {
        return None;
    }
    items.truncate(keep);
    Some((original, keep))
}

/// Build the `pagination` block (spec.md §4.5 point 3): `total_count`,
/// `current_count`, `skip`, `top`, `has_more`, and a textual
/// `suggested_next_call`.
fn pagination_block(body: &Value, query: &QueryOptions) -> Option<Value> {
    let current_count = body.get("value")?.as_array()?.len();
    let total_count = body.get("@odata.count").and_then(|v| v.as_i64());
    let skip: i64 = query.get("$skip").and_then(|v| v.parse().ok()).unwrap_or(0);
    let top: Option<i64> = query.get("$top").and_then(|v| v.parse().ok());

    let has_more = total_count
        .map(|total| skip + current_count as i64 < total)
        .unwrap_or(false);

    let next_skip = skip + current_count as i64;
    let next_top = top.unwrap_or(current_count as i64).max(1);
    let suggested_next_call = if has_more {
        format!("retry with $skip={} and $top={}", next_skip, next_top)
    } else {
        "no further pages".to_string()
    };

    let mut map = Map::new();
    map.insert(
        "total_count".to_string(),
        total_count.map(Value::from).unwrap_or(Value::Null),
    );
    map.insert("current_count".to_string(), Value::from(current_count));
    map.insert("skip".to_string(), Value::from(skip));
    if let Some(top) = top {
        map.insert("top".to_string(), Value::from(top));
    }
    map.insert("has_more".to_string(), Value::Bool(has_more));
    map.insert("suggested_next_call".to_string(), Value::String(suggested_next_call));
    Some(Value::Object(map))
}

/// Recursively remove any `__metadata` key from object maps
/// (spec.md §4.5 point 5, default behavior).
fn strip_metadata(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("__metadata");
            for v in map.values_mut() {
                strip_metadata(v);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_metadata(item);
            }
        }
        _ => {}
    }
}

/// Recursively convert every string matching `/Date(<epoch-ms>)/` into
/// ISO-8601 `YYYY-MM-DDTHH:MM:SSZ` (spec.md §4.5 point 4).
fn convert_legacy_dates(value: &mut Value) {
    match value {
        Value::String(s) => {
            if let Some(iso) = legacy_date_to_iso(s) {
                *s = iso;
            }
        }
        Value::Object(map) => {
            for v in map.values_mut() {
                convert_legacy_dates(v);
            }
        }
        Value::Array(items) => {
            for item in items {
                convert_legacy_dates(item);
            }
        }
        _ => {}
    }
}

/// The inverse: recursively convert ISO-8601 strings back to the legacy
/// `/Date(<epoch-ms>)/` form before a write (spec.md §4.5 point 4).
fn convert_iso_to_legacy(value: &mut Value) {
    match value {
        Value::String(s) => {
            if let Some(legacy) = iso_to_legacy_date(s) {
                *s = legacy;
            }
        }
        Value::Object(map) => {
            for v in map.values_mut() {
                convert_iso_to_legacy(v);
            }
        }
        Value::Array(items) => {
            for item in items {
                convert_iso_to_legacy(item);
            }
        }
        _ => {}
    }
}

/// Parse `/Date(1234567890000)/` or `/Date(1234567890000+0200)/`, ignoring
/// any trailing timezone offset (the payload carries milliseconds UTC).
fn legacy_date_to_iso(s: &str) -> Option<String> {
    let inner = s.strip_prefix("/Date(")?.strip_suffix(")/")?;
    let digits_end = inner
        .find(|c: char| c != '-' && !c.is_ascii_digit())
        .unwrap_or(inner.len());
    let millis: i64 = inner[..digits_end].parse().ok()?;
    let dt: DateTime<Utc> = Utc.timestamp_millis_opt(millis).single()?;
    Some(dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

/// Render an RFC3339 timestamp back into the legacy `/Date(ms)/` form.
fn iso_to_legacy_date(s: &str) -> Option<String> {
    let dt = DateTime::parse_from_rfc3339(s).ok()?;
    Some(format!("/Date({})/", dt.timestamp_millis()))
}

/// Coerce integer/float values of decimal-shaped fields (by name heuristic)
/// to their canonical string form before a write; booleans and null are
/// untouched (spec.md §4.5 point 6).
fn coerce_decimal_fields(value: &mut Value) {
    if let Value::Object(map) = value {
        let keys: Vec<String> = map.keys().cloned().collect();
        for key in keys {
            let is_decimal_shaped = is_decimal_field_name(&key);
            if let Some(v) = map.get_mut(&key) {
                match v {
                    Value::Object(_) | Value::Array(_) => coerce_decimal_fields(v),
                    Value::Number(n) if is_decimal_shaped => {
                        *v = Value::String(n.to_string());
                    }
                    _ => {}
                }
            }
        }
    }
}

fn is_decimal_field_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    DECIMAL_FIELD_HINTS.iter().any(|hint| lower.contains(hint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> BridgeConfig {
        BridgeConfig::default()
    }

    #[test]
    fn size_cap_truncates_and_annotates() {
        let mut cfg = config();
        cfg.max_items = 2;
        cfg.pagination_hints = false;
        let body = json!({"value": [1, 2, 3, 4]});
        let enhanced = enhance(body, &QueryOptions::new(), &cfg);
        assert_eq!(enhanced["value"].as_array().unwrap().len(), 2);
        assert_eq!(enhanced["truncated"], json!(true));
        assert_eq!(enhanced["original_count"], json!(4));
        assert_eq!(enhanced["max_items"], json!(2));
    }

    #[test]
    fn no_truncation_marker_under_the_cap() {
        let cfg = config();
        let body = json!({"value": [1, 2]});
        let enhanced = enhance(body, &QueryOptions::new(), &cfg);
        assert!(enhanced.get("truncated").is_none());
    }

    #[test]
    fn pagination_hint_math() {
        let mut cfg = config();
        cfg.pagination_hints = true;
        let body = json!({"value": (0..10).map(|i| json!({"id": i})).collect::<Vec<_>>(), "@odata.count": 42});
        let mut query = QueryOptions::new();
        query.set("$skip", "20");
        query.set("$top", "10");
        let enhanced = enhance(body, &query, &cfg);
        let pagination = &enhanced["pagination"];
        assert_eq!(pagination["total_count"], json!(42));
        assert_eq!(pagination["current_count"], json!(10));
        assert_eq!(pagination["has_more"], json!(true));
        assert!(pagination["suggested_next_call"]
            .as_str()
            .unwrap()
            .contains("$skip=30"));
    }

    #[test]
    fn has_more_false_when_fully_consumed() {
        let cfg = config();
        let body = json!({"value": [1,2,3], "@odata.count": 3});
        let mut query = QueryOptions::new();
        query.set("$skip", "0");
        let enhanced = enhance(body, &query, &cfg);
        assert_eq!(enhanced["pagination"]["has_more"], json!(false));
    }

    #[test]
    fn legacy_date_converted_to_iso() {
        let mut value = json!({"Created": "/Date(1349271024000)/"});
        convert_legacy_dates(&mut value);
        assert_eq!(value["Created"], json!("2012-10-03T10:10:24Z"));
    }

    #[test]
    fn legacy_date_with_timezone_offset_strips_offset() {
        let mut value = json!({"Created": "/Date(1349271024000+0200)/"});
        convert_legacy_dates(&mut value);
        assert_eq!(value["Created"], json!("2012-10-03T10:10:24Z"));
    }

    #[test]
    fn iso_round_trips_to_legacy() {
        let mut value = json!({"Created": "2012-10-03T10:10:24Z"});
        convert_iso_to_legacy(&mut value);
        assert_eq!(value["Created"], json!("/Date(1349271024000)/"));
    }

    #[test]
    fn metadata_key_stripped_recursively() {
        let mut value = json!({"__metadata": {"uri": "x"}, "Nested": {"__metadata": {}, "Id": 1}});
        strip_metadata(&mut value);
        assert!(value.get("__metadata").is_none());
        assert!(value["Nested"].get("__metadata").is_none());
        assert_eq!(value["Nested"]["Id"], json!(1));
    }

    #[test]
    fn decimal_heuristic_coerces_numbers_to_strings() {
        let mut value = json!({"UnitPrice": 19.99, "Quantity": 3, "Active": true, "Name": "x"});
        coerce_decimal_fields(&mut value);
        assert_eq!(value["UnitPrice"], json!("19.99"));
        assert_eq!(value["Quantity"], json!("3"));
        assert_eq!(value["Active"], json!(true));
        assert_eq!(value["Name"], json!("x"));
    }

    #[test]
    fn write_payload_applies_both_date_and_decimal_rules() {
        let cfg = config();
        let data = json!({"Price": 10, "DueDate": "2012-10-03T10:10:24Z"});
        let prepared = prepare_write_payload(data, &cfg);
        assert_eq!(prepared["Price"], json!("10"));
        assert_eq!(prepared["DueDate"], json!("/Date(1349271024000)/"));
    }
}
