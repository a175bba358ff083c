//! Name-pattern filtering (`allowed_entities`/`allowed_functions`) and
//! operation-kind filtering (`enable_ops`/`disable_ops`) (spec.md §4.4
//! "Filter patterns", "Operation-kind filter").

use crate::config::{BridgeConfig, ReadOnlyPolicy};
use crate::model::OperationKind;

/// Does `name` pass the pattern list? An empty list passes everything.
/// A pattern may be a `*` suffix (prefix match), a `*` prefix (suffix
/// match), or an exact match.
pub fn name_allowed(name: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|p| pattern_matches(p, name))
}

fn pattern_matches(pattern: &str, name: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        name.starts_with(prefix)
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        name.ends_with(suffix)
    } else {
        pattern == name
    }
}

/// Expand the `R` shorthand (Search ∪ Filter/Count ∪ Get) into its
/// constituent op codes; every other code passes through unchanged
/// (spec.md §4.4).
fn expand_codes(spec: &str) -> Vec<char> {
    let mut out = Vec::new();
    for c in spec.chars().filter(|c| !c.is_whitespace() && *c != ',') {
        let c = c.to_ascii_uppercase();
        if c == 'R' {
            out.extend(['S', 'F', 'G']);
        } else {
            out.push(c);
        }
    }
    out
}

/// Is `op` enabled under the config's operation-kind filter and read-only
/// policy? Enable-list is exclusive if set (only listed codes pass),
/// otherwise the disable-list excludes (spec.md §4.4). Read-only mode is
/// equivalent to additionally disabling C/U/D (and A unless
/// `read_only_but_functions`).
pub fn op_enabled(op: OperationKind, config: &BridgeConfig) -> bool {
    if !base_op_enabled(op, config) {
        return false;
    }

    let code = op.op_code();
    match config.read_only_policy() {
        ReadOnlyPolicy::Disabled => true,
        ReadOnlyPolicy::ReadOnly => !matches!(code, 'C' | 'U' | 'D' | 'A'),
        ReadOnlyPolicy::ReadOnlyButFunctions => !matches!(code, 'C' | 'U' | 'D'),
    }
}

/// `op_enabled` without the read-only-policy gate — only the
/// `enable_ops`/`disable_ops` filter. Used for non-modifying function
/// imports, which are never gated by read-only mode (spec.md §4.4 "skip
/// modifying functions ... unless config allows them in read-only mode").
pub fn base_op_enabled(op: OperationKind, config: &BridgeConfig) -> bool {
    let code = op.op_code();
    if let Some(enable) = &config.enable_ops {
        expand_codes(enable).contains(&code)
    } else if let Some(disable) = &config.disable_ops {
        !expand_codes(disable).contains(&code)
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pattern_list_allows_everything() {
        assert!(name_allowed("Anything", &[]));
    }

    #[test]
    fn prefix_wildcard_matches() {
        assert!(name_allowed("Products", &["Prod*".to_string()]));
        assert!(!name_allowed("Customers", &["Prod*".to_string()]));
    }

    #[test]
    fn suffix_wildcard_matches() {
        assert!(name_allowed("SalesOrders", &["*Orders".to_string()]));
    }

    #[test]
    fn exact_match_required_without_wildcard() {
        assert!(name_allowed("Products", &["Products".to_string()]));
        assert!(!name_allowed("ProductsV2", &["Products".to_string()]));
    }

    #[test]
    fn read_only_disables_cud_and_actions() {
        let mut cfg = BridgeConfig::default();
        cfg.read_only = true;
        assert!(!op_enabled(OperationKind::Create, &cfg));
        assert!(!op_enabled(OperationKind::Update, &cfg));
        assert!(!op_enabled(OperationKind::Delete, &cfg));
        assert!(!op_enabled(OperationKind::Function, &cfg));
        assert!(op_enabled(OperationKind::Get, &cfg));
    }

    #[test]
    fn read_only_but_functions_keeps_actions_callable() {
        let mut cfg = BridgeConfig::default();
        cfg.read_only_but_functions = true;
        assert!(!op_enabled(OperationKind::Create, &cfg));
        assert!(op_enabled(OperationKind::Function, &cfg));
    }

    #[test]
    fn enable_list_is_exclusive() {
        let mut cfg = BridgeConfig::default();
        cfg.enable_ops = Some("G,F".to_string());
        assert!(op_enabled(OperationKind::Get, &cfg));
        assert!(op_enabled(OperationKind::Filter, &cfg));
        assert!(!op_enabled(OperationKind::Create, &cfg));
    }

    #[test]
    fn disable_list_excludes_only_named_codes() {
        let mut cfg = BridgeConfig::default();
        cfg.disable_ops = Some("D".to_string());
        assert!(!op_enabled(OperationKind::Delete, &cfg));
        assert!(op_enabled(OperationKind::Create, &cfg));
    }

    #[test]
    fn r_shorthand_expands_to_search_filter_get() {
        let mut cfg = BridgeConfig::default();
        cfg.enable_ops = Some("R".to_string());
        assert!(op_enabled(OperationKind::Search, &cfg));
        assert!(op_enabled(OperationKind::Filter, &cfg));
        assert!(op_enabled(OperationKind::Count, &cfg));
        assert!(op_enabled(OperationKind::Get, &cfg));
        assert!(!op_enabled(OperationKind::Create, &cfg));
    }
}
