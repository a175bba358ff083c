//! Tool-name derivation: base `{op}_{set}`/`{set}_{op}` forms, prefix/
//! postfix attachment, `service_id` derivation from the service URL, and
//! the `tool_shrink` abbreviations (spec.md §4.4 "Tool naming").

use crate::config::{BridgeConfig, ToolNameStyle};
use crate::model::OperationKind;

/// Canonical (long) op-name fragment used in tool names.
fn op_fragment(op: OperationKind) -> &'static str {
    match op {
        OperationKind::Filter => "filter",
        OperationKind::Count => "count",
        OperationKind::Get => "get",
        OperationKind::Search => "search",
        OperationKind::Create => "create",
        OperationKind::Update => "update",
        OperationKind::Delete => "delete",
        OperationKind::Function => "call",
        OperationKind::ServiceInfo => "service_info",
    }
}

/// `tool_shrink=true` swaps `update -> upd`, `delete -> del`; other ops
/// unchanged (spec.md §4.4).
fn shrunk(op: OperationKind, shrink: bool) -> &'static str {
    if !shrink {
        return op_fragment(op);
    }
    match op {
        OperationKind::Update => "upd",
        OperationKind::Delete => "del",
        other => op_fragment(other),
    }
}

/// Base name before prefix/postfix: `{op}_{set}` (postfix style, the
/// default) or `{set}_{op}` (prefix style).
fn base_name(op: OperationKind, set_name: &str, style: ToolNameStyle, shrink: bool) -> String {
    let frag = shrunk(op, shrink);
    match style {
        ToolNameStyle::Postfix => format!("{}_{}", frag, set_name),
        ToolNameStyle::Prefix => format!("{}_{}", set_name, frag),
    }
}

/// Full tool name for an entity-set operation, with prefix/postfix/
/// `_for_{service_id}` attachment applied (spec.md §4.4).
pub fn entity_tool_name(op: OperationKind, set_name: &str, config: &BridgeConfig) -> String {
    let base = base_name(
        op,
        &set_name.to_ascii_lowercase(),
        config.tool_name_style.into(),
        config.tool_shrink,
    );
    attach_affixes(base, config)
}

/// Full tool name for a function/action-import tool: the function name
/// itself, with the same prefix/postfix rules applied.
pub fn function_tool_name(function_name: &str, config: &BridgeConfig) -> String {
    attach_affixes(function_name.to_ascii_lowercase(), config)
}

/// Name for the one `odata_service_info` tool every mode generates
/// (spec.md §4.4). Subject to the same prefix/postfix rules as any other
/// tool.
pub fn service_info_tool_name(config: &BridgeConfig) -> String {
    attach_affixes("odata_service_info".to_string(), config)
}

/// Apply prefix/postfix rules to one of lazy mode's fixed generic tool
/// names (spec.md §4.4 "Lazy mode").
pub fn attach_lazy_affixes(base_name: &str, config: &BridgeConfig) -> String {
    attach_affixes(base_name.to_string(), config)
}

fn attach_affixes(base: String, config: &BridgeConfig) -> String {
    let mut name = base;
    if let Some(prefix) = &config.tool_prefix {
        name = format!("{}{}", prefix, name);
    }
    if let Some(postfix) = &config.tool_postfix {
        name = format!("{}{}", name, postfix);
    } else if !config.no_postfix
        && matches!(config.tool_name_style, crate::config::ToolNameStyleConfig::Postfix)
    {
        name = format!("{}_for_{}", name, service_id(&config.service_url));
    }
    name
}

/// Derive a short, stable `service_id` from the service root URL
/// (spec.md §4.4 "Tool naming"), tried in order:
/// 1. SAP `/…_SRV` segment -> first letter + first digit run in it.
/// 2. `.svc` endpoint -> first <=5 chars of the segment + `Svc`.
/// 3. `/odata/Name` -> `Name` truncated to 8 chars.
/// 4. Last meaningful path segment otherwise.
/// 5. Fallback: `od`.
pub fn service_id(service_url: &str) -> String {
    let path = service_url.trim_end_matches('/');
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if let Some(srv_segment) = segments.iter().rev().find(|s| s.to_ascii_uppercase().ends_with("_SRV")) {
        if let Some(id) = sap_srv_id(srv_segment) {
            return id;
        }
    }

    if let Some(svc_segment) = segments.iter().rev().find(|s| s.to_ascii_lowercase().ends_with(".svc")) {
        let stem = svc_segment.trim_end_matches(".svc").trim_end_matches(".Svc");
        let short: String = stem.chars().take(5).collect();
        return format!("{}Svc", short);
    }

    if let Some(pos) = segments.iter().position(|s| s.eq_ignore_ascii_case("odata")) {
        if let Some(name) = segments.get(pos + 1) {
            return name.chars().take(8).collect();
        }
    }

    if let Some(last) = segments.last() {
        return last.to_string();
    }

    "od".to_string()
}

fn sap_srv_id(segment: &str) -> Option<String> {
    let first_char = segment.chars().next()?.to_ascii_lowercase();
    let digits: String = segment
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        Some(first_char.to_string())
    } else {
        Some(format!("{}{}", first_char, digits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BridgeConfig {
        BridgeConfig::default()
    }

    #[test]
    fn default_postfix_mode_appends_service_id() {
        let mut cfg = config();
        cfg.service_url = "https://host/sap/opu/odata/sap/API_SALES_ORDER_SRV/".to_string();
        let name = entity_tool_name(OperationKind::Filter, "SalesOrders", &cfg);
        assert!(name.starts_with("filter_salesorders_for_"));
    }

    #[test]
    fn explicit_postfix_suppresses_service_id() {
        let mut cfg = config();
        cfg.tool_postfix = Some("_x".to_string());
        let name = entity_tool_name(OperationKind::Get, "Products", &cfg);
        assert_eq!(name, "get_products_x");
    }

    #[test]
    fn no_postfix_flag_suppresses_service_id() {
        let mut cfg = config();
        cfg.no_postfix = true;
        let name = entity_tool_name(OperationKind::Get, "Products", &cfg);
        assert_eq!(name, "get_products");
    }

    #[test]
    fn prefix_style_swaps_order_and_has_no_service_id_suffix() {
        let mut cfg = config();
        cfg.tool_name_style = crate::config::ToolNameStyleConfig::Prefix;
        let name = entity_tool_name(OperationKind::Delete, "Products", &cfg);
        assert_eq!(name, "products_delete");
    }

    #[test]
    fn tool_shrink_abbreviates_update_and_delete() {
        let mut cfg = config();
        cfg.no_postfix = true;
        cfg.tool_shrink = true;
        assert_eq!(entity_tool_name(OperationKind::Update, "P", &cfg), "upd_p");
        assert_eq!(entity_tool_name(OperationKind::Delete, "P", &cfg), "del_p");
        assert_eq!(entity_tool_name(OperationKind::Get, "P", &cfg), "get_p");
    }

    #[test]
    fn service_id_sap_srv_pattern() {
        assert_eq!(
            service_id("https://host/sap/opu/odata/sap/API_SALES_ORDER_SRV/"),
            "a".to_string()
        );
    }

    #[test]
    fn service_id_svc_pattern() {
        assert_eq!(service_id("https://host/my/Northwind.svc/"), "North".to_string() + "Svc");
    }

    #[test]
    fn service_id_odata_pattern() {
        assert_eq!(service_id("https://host/odata/Inventory/"), "Inventor");
    }

    #[test]
    fn service_id_fallback_last_segment() {
        assert_eq!(service_id("https://host/api/catalog/"), "catalog");
    }

    #[test]
    fn service_id_fallback_od_when_no_path() {
        assert_eq!(service_id("https://host/"), "od");
    }
}
