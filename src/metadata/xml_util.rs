//! Small helpers shared by the v2 and v4 EDMX walkers.

use quick_xml::events::BytesStart;

/// Strip an XML namespace prefix (`sap:creatable` -> `creatable`).
pub fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

/// Read an attribute by its local name (namespace-prefix-insensitive).
pub fn attr(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        let key = String::from_utf8_lossy(a.key.as_ref()).to_string();
        if local_name(&key) == name {
            a.unescape_value().ok().map(|v| v.to_string())
        } else {
            None
        }
    })
}

/// Read a boolean attribute, defaulting when absent.
pub fn attr_bool(e: &BytesStart, name: &str, default: bool) -> bool {
    attr(e, name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

/// Last path segment of a (possibly namespaced) element tag, e.g.
/// `b"edmx:Edmx"` -> `"Edmx"`.
pub fn tag_local_name(e: &BytesStart) -> String {
    let name = e.name();
    let raw = String::from_utf8_lossy(name.as_ref()).to_string();
    local_name(&raw).to_string()
}

/// Strip the namespace prefix off a qualified type name, keeping
/// `Collection(...)` wrappers and `Edm.*` primitives intact
/// (spec.md §4.1 v4 type normalization).
pub fn normalize_type_name(raw: &str) -> String {
    if let Some(inner) = raw
        .strip_prefix("Collection(")
        .and_then(|s| s.strip_suffix(')'))
    {
        return format!("Collection({})", normalize_type_name(inner));
    }
    if raw.starts_with("Edm.") {
        return raw.to_string();
    }
    // Namespace-prefixed complex/entity type: keep the unqualified tail.
    raw.rsplit('.').next().unwrap_or(raw).to_string()
}
