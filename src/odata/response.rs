//! Response normalization (spec.md §4.2 "Response normalization") and
//! OData error-body parsing (spec.md §7).

use serde_json::{Map, Value};

use crate::error::{ODataError, ODataErrorBody};
use crate::model::ODataVersion;

/// Parse a response body as JSON and normalize its shape:
///
/// - If it carries a top-level `error` object, return an [`ODataError`].
/// - v2: unwrap the `d` envelope. A collection wrapper
///   `{results, __count?, __next?}` becomes a canonical
///   `{value, @odata.count?, @odata.nextLink?}`; otherwise `d` itself is
///   the single-entity result.
/// - v4: the document shape is left alone.
///
/// A count arriving as a JSON string or number is coerced to a 64-bit
/// integer in both cases.
pub fn normalize_body(body: &[u8], version: ODataVersion, status: u16) -> Result<Value, ODataError> {
    let parsed: Value = serde_json::from_slice(body)
        .map_err(|e| ODataError::ParseError(format!("invalid JSON body: {}", e)))?;

    if let Some(error_obj) = parsed.get("error") {
        return Err(ODataError::ServerError {
            status,
            body: parse_error_body(error_obj),
        });
    }

    match version {
        ODataVersion::V2 => Ok(normalize_v2(parsed)),
        ODataVersion::V4 => Ok(normalize_v4(parsed)),
    }
}

fn normalize_v2(parsed: Value) -> Value {
    let d = match parsed.get("d") {
        Some(d) => d.clone(),
        None => return parsed,
    };

    if let Some(results) = d.get("results") {
        let mut envelope = Map::new();
        envelope.insert("value".to_string(), results.clone());
        if let Some(count) = d.get("__count") {
            envelope.insert("@odata.count".to_string(), coerce_count(count));
        }
        if let Some(next) = d.get("__next") {
            envelope.insert("@odata.nextLink".to_string(), next.clone());
        }
        Value::Object(envelope)
    } else {
        d
    }
}

fn normalize_v4(mut parsed: Value) -> Value {
    if let Some(obj) = parsed.as_object_mut() {
        if let Some(count) = obj.get("@odata.count").cloned() {
            obj.insert("@odata.count".to_string(), coerce_count(&count));
        }
    }
    parsed
}

fn coerce_count(value: &Value) -> Value {
    match value {
        Value::String(s) => s
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

/// Parse a v2 (`{error:{code, message:{lang,value}, innererror?}}`) or v4
/// (`{error:{code, message, target?, details?}}`) error body into one
/// rendered detail (spec.md §7).
fn parse_error_body(error_obj: &Value) -> ODataErrorBody {
    let code = error_obj.get("code").and_then(|v| v.as_str()).map(String::from);

    // v2 nests the human message under message.value; v4 has it directly.
    let message = error_obj
        .get("message")
        .and_then(|m| {
            m.as_str()
                .map(String::from)
                .or_else(|| m.get("value").and_then(|v| v.as_str()).map(String::from))
        });

    let target = error_obj.get("target").and_then(|v| v.as_str()).map(String::from);

    let severity = error_obj
        .get("innererror")
        .and_then(|ie| ie.get("severity"))
        .and_then(|v| v.as_str())
        .map(String::from);

    let mut details = Vec::new();
    if let Some(details_arr) = error_obj.get("details").and_then(|v| v.as_array()) {
        for d in details_arr {
            if let Some(msg) = d.get("message").and_then(|v| v.as_str()) {
                details.push(msg.to_string());
            }
        }
    }
    if let Some(inner_message) = error_obj
        .get("innererror")
        .and_then(|ie| ie.get("message"))
        .and_then(|v| v.as_str())
    {
        details.push(inner_message.to_string());
    }

    ODataErrorBody {
        code,
        message,
        target,
        severity,
        details,
    }
}

/// Extract the canonical `value` array from a normalized response, if it
/// represents a collection.
pub fn extract_value(normalized: &Value) -> Option<&Vec<Value>> {
    normalized.get("value").and_then(|v| v.as_array())
}

pub fn extract_count(normalized: &Value) -> Option<i64> {
    normalized.get("@odata.count").and_then(|v| v.as_i64())
}

pub fn extract_next_link(normalized: &Value) -> Option<String> {
    normalized
        .get("@odata.nextLink")
        .and_then(|v| v.as_str())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn v2_collection_envelope_is_normalized() {
        let body = json!({"d": {"results": [{"Id": 1}], "__count": "2", "__next": "https://x/next"}});
        let normalized = normalize_v2(body);
        assert_eq!(extract_value(&normalized).unwrap().len(), 1);
        assert_eq!(extract_count(&normalized), Some(2));
        assert_eq!(extract_next_link(&normalized).unwrap(), "https://x/next");
    }

    #[test]
    fn v2_single_entity_unwraps_d() {
        let body = json!({"d": {"Id": 1, "Name": "a"}});
        let normalized = normalize_v2(body);
        assert_eq!(normalized.get("Id").unwrap(), &json!(1));
    }

    #[test]
    fn v4_document_passthrough_with_count_coercion() {
        let body = json!({"value": [{"Id": 1}], "@odata.count": "5"});
        let normalized = normalize_v4(body);
        assert_eq!(extract_count(&normalized), Some(5));
    }

    #[test]
    fn error_object_triggers_server_error() {
        let body = json!({"error": {"code": "400", "message": {"lang": "en", "value": "bad"}}});
        let err = normalize_body(
            serde_json::to_vec(&body).unwrap().as_slice(),
            ODataVersion::V2,
            400,
        )
        .unwrap_err();
        match err {
            ODataError::ServerError { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body.message.as_deref(), Some("bad"));
            }
            _ => panic!("expected ServerError"),
        }
    }

    #[test]
    fn v4_error_body_with_details() {
        let error = json!({
            "code": "ERR1",
            "message": "bad request",
            "target": "Name",
            "details": [{"message": "detail 1"}]
        });
        let parsed = parse_error_body(&error);
        assert_eq!(parsed.code.as_deref(), Some("ERR1"));
        assert_eq!(parsed.details, vec!["detail 1".to_string()]);
    }
}
