//! Query-string and key-predicate construction (spec.md §4.2 "URL
//! construction").

use serde_json::Value;

use crate::model::ODataVersion;

/// Arbitrary OData system/custom query options, forwarded to the service
/// as strings (the bridge never parses `$filter` locally — spec.md §1
/// Non-goals). Insertion order is preserved; only the composite-key
/// predicate has an ordering requirement (alphabetical, for deterministic
/// URLs).
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub params: Vec<(String, String)>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if let Some(existing) = self.params.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value.into();
        } else {
            self.params.push((key, value.into()));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Build the `?a=b&c=d` query string, applying the version-aware
    /// defaults and translations from spec.md §4.2:
    /// - v2: always add `$format=json`; default `$inlinecount=allpages`
    ///   when the caller did not supply one.
    /// - v4: no automatic format; `$inlinecount=allpages`/`none` is
    ///   translated to `$count=true`/`$count=false` and the `$inlinecount`
    ///   key is dropped.
    pub fn to_query_string(&self, version: ODataVersion) -> String {
        let mut params = self.params.clone();

        match version {
            ODataVersion::V2 => {
                if !params.iter().any(|(k, _)| k == "$format") {
                    params.push(("$format".to_string(), "json".to_string()));
                }
                if !params.iter().any(|(k, _)| k == "$inlinecount") {
                    params.push(("$inlinecount".to_string(), "allpages".to_string()));
                }
            }
            ODataVersion::V4 => {
                if let Some(pos) = params.iter().position(|(k, _)| k == "$inlinecount") {
                    let (_, v) = params.remove(pos);
                    let count_value = match v.as_str() {
                        "allpages" => "true",
                        "none" => "false",
                        other => other,
                    };
                    params.push(("$count".to_string(), count_value.to_string()));
                }
            }
        }

        build_query_string(&params)
    }
}

/// RFC 3986 percent-encoding: run the standard `application/x-www-form-
/// urlencoded` serializer (which also percent-encodes `$`, `'`, etc.) and
/// then replace every `+` with `%20`, since OData servers reject `+` for
/// spaces (spec.md §4.2).
pub fn build_query_string(params: &[(String, String)]) -> String {
    if params.is_empty() {
        return String::new();
    }
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in params {
        serializer.append_pair(k, v);
    }
    format!("?{}", serializer.finish().replace('+', "%20"))
}

fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Render a single JSON scalar as an OData literal inside a key predicate
/// or function-parameter value: quoted-and-escaped for strings, bare for
/// everything else.
fn render_key_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Build the `(predicate)` body for a key lookup (spec.md §4.2): a single
/// key renders as a bare literal; a composite key renders as
/// `k1=v1,k2=v2,...` with keys sorted alphabetically for deterministic
/// URLs.
pub fn build_key_predicate(key: &[(String, Value)]) -> String {
    if key.len() == 1 {
        return render_key_literal(&key[0].1);
    }
    let mut sorted: Vec<&(String, Value)> = key.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, render_key_literal(v)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Render a function-import parameter list for a GET-style call:
/// `name(param1='a',param2=2)` with string values URL-escaped *inside* the
/// surrounding single quotes (spec.md §4.2).
pub fn build_function_params(params: &[(String, Value)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, render_function_param_literal(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn render_function_param_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", encode_component(s)),
        other => render_key_literal(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn v2_adds_format_and_inlinecount_by_default() {
        let opts = QueryOptions::new();
        let qs = opts.to_query_string(ODataVersion::V2);
        assert!(qs.contains("%24format=json"));
        assert!(qs.contains("%24inlinecount=allpages"));
    }

    #[test]
    fn v2_respects_caller_supplied_inlinecount() {
        let mut opts = QueryOptions::new();
        opts.set("$inlinecount", "none");
        let qs = opts.to_query_string(ODataVersion::V2);
        assert!(qs.contains("%24inlinecount=none"));
    }

    #[test]
    fn v4_translates_inlinecount_allpages_to_count_true() {
        let mut opts = QueryOptions::new();
        opts.set("$inlinecount", "allpages");
        let qs = opts.to_query_string(ODataVersion::V4);
        assert!(qs.contains("%24count=true"));
        assert!(!qs.contains("inlinecount"));
    }

    #[test]
    fn v4_translates_inlinecount_none_to_count_false() {
        let mut opts = QueryOptions::new();
        opts.set("$inlinecount", "none");
        let qs = opts.to_query_string(ODataVersion::V4);
        assert!(qs.contains("%24count=false"));
    }

    #[test]
    fn v4_does_not_add_format() {
        let opts = QueryOptions::new();
        let qs = opts.to_query_string(ODataVersion::V4);
        assert!(!qs.contains("format"));
    }

    #[test]
    fn percent_encodes_spaces_not_plus() {
        let mut opts = QueryOptions::new();
        opts.set("$filter", "Name eq 'Test Value'");
        let qs = opts.to_query_string(ODataVersion::V4);
        assert!(qs.contains("%24filter=Name%20eq%20%27Test%20Value%27"));
        assert!(!qs.contains('+'));
    }

    #[test]
    fn composite_key_predicate_sorted_alphabetically() {
        let k1 = vec![("b".to_string(), json!(2)), ("a".to_string(), json!(1))];
        let k2 = vec![("a".to_string(), json!(1)), ("b".to_string(), json!(2))];
        assert_eq!(build_key_predicate(&k1), build_key_predicate(&k2));
        assert_eq!(build_key_predicate(&k1), "a=1,b=2");
    }

    #[test]
    fn single_string_key_is_quoted() {
        let k = vec![("Id".to_string(), json!("abc"))];
        assert_eq!(build_key_predicate(&k), "'abc'");
    }

    #[test]
    fn single_integer_key_is_bare() {
        let k = vec![("Id".to_string(), json!(42))];
        assert_eq!(build_key_predicate(&k), "42");
    }

    #[test]
    fn function_param_strings_escaped_inside_quotes() {
        let params = vec![("name".to_string(), json!("a b"))];
        assert_eq!(build_function_params(&params), "name='a%20b'");
    }
}
