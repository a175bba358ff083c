//! The configuration record the bridge accepts at start-up (spec.md §6).
//!
//! This is a plain data record: the CLI, environment-variable surface, the
//! dotenv loader, and interactive credential-acquisition flows are explicit
//! external collaborators (spec.md §1) and are not implemented here. Tests
//! and embedders build a `BridgeConfig` by hand or via `Default` plus field
//! overrides.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Resolved credentials handed to the bridge. Acquisition (basic-auth
/// prompts, browser/SAML/AAD/PowerShell/WebView2 cookie flows) happens
/// upstream; the bridge only ever sees the resulting value.
#[derive(Debug, Clone, Default)]
pub enum Credentials {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    CookieJar {
        cookies: HashMap<String, String>,
    },
    BearerViaCookie {
        bearer_cookie_name: String,
        cookies: HashMap<String, String>,
    },
}

/// Tool-name casing/affix controls (spec.md §4.4).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolNameStyle {
    /// `{op}_{set}` — the default.
    #[default]
    Postfix,
    /// `{set}_{op}`.
    Prefix,
}

/// Tool-generation mode (spec.md §4.4).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolMode {
    #[default]
    Eager,
    Lazy,
}

/// Mutually-exclusive read-only policy (spec.md §6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadOnlyPolicy {
    #[default]
    Disabled,
    /// Disable C/U/D and A (actions/functions that modify).
    ReadOnly,
    /// Disable C/U/D but keep modifying function/action imports callable.
    ReadOnlyButFunctions,
}

/// Transport selection (spec.md §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Http { bind_addr: String },
}

impl Default for TransportKind {
    fn default() -> Self {
        TransportKind::Stdio
    }
}

/// The full configuration record (spec.md §6 table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub service_url: String,

    pub username: Option<String>,
    pub password: Option<String>,
    pub cookies: HashMap<String, String>,

    pub tool_prefix: Option<String>,
    pub tool_postfix: Option<String>,
    pub no_postfix: bool,
    pub tool_shrink: bool,
    pub tool_name_style: ToolNameStyleConfig,

    pub allowed_entities: Vec<String>,
    pub allowed_functions: Vec<String>,

    pub read_only: bool,
    pub read_only_but_functions: bool,

    pub enable_ops: Option<String>,
    pub disable_ops: Option<String>,

    pub pagination_hints: bool,
    pub legacy_dates: bool,
    pub response_metadata: bool,
    pub verbose_errors: bool,
    pub decimal_coercion: bool,

    pub max_response_size: usize,
    pub max_items: usize,

    pub lazy_metadata: bool,
    pub lazy_threshold: usize,

    pub claude_code_friendly: bool,

    pub transport: TransportConfig,

    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_fraction: f64,
}

/// Mirrors `ToolNameStyle` but is `serde`-friendly for config deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolNameStyleConfig {
    #[default]
    Postfix,
    Prefix,
}

impl From<ToolNameStyleConfig> for ToolNameStyle {
    fn from(v: ToolNameStyleConfig) -> Self {
        match v {
            ToolNameStyleConfig::Postfix => ToolNameStyle::Postfix,
            ToolNameStyleConfig::Prefix => ToolNameStyle::Prefix,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    Stdio,
    Http {
        bind_addr: String,
        /// Non-localhost binds require this explicit opt-in (spec.md §4.6).
        #[serde(default)]
        i_know_what_i_am_doing: bool,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Stdio
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            service_url: String::new(),
            username: None,
            password: None,
            cookies: HashMap::new(),
            tool_prefix: None,
            tool_postfix: None,
            no_postfix: false,
            tool_shrink: false,
            tool_name_style: ToolNameStyleConfig::default(),
            allowed_entities: Vec::new(),
            allowed_functions: Vec::new(),
            read_only: false,
            read_only_but_functions: false,
            enable_ops: None,
            disable_ops: None,
            pagination_hints: true,
            legacy_dates: true,
            response_metadata: false,
            verbose_errors: false,
            decimal_coercion: true,
            max_response_size: crate::constants::DEFAULT_MAX_RESPONSE_SIZE,
            max_items: crate::constants::DEFAULT_MAX_ITEMS,
            lazy_metadata: false,
            lazy_threshold: 50,
            claude_code_friendly: false,
            transport: TransportConfig::default(),
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

impl BridgeConfig {
    /// `service_url` normalized to always end with "/" (spec.md §3).
    pub fn normalized_service_url(&self) -> String {
        if self.service_url.ends_with('/') {
            self.service_url.clone()
        } else {
            format!("{}/", self.service_url)
        }
    }

    /// Resolve the effective read-only policy, enforcing the documented
    /// mutual exclusion (spec.md §6: "Mutual exclusion required").
    pub fn read_only_policy(&self) -> ReadOnlyPolicy {
        match (self.read_only, self.read_only_but_functions) {
            (true, _) => ReadOnlyPolicy::ReadOnly,
            (false, true) => ReadOnlyPolicy::ReadOnlyButFunctions,
            (false, false) => ReadOnlyPolicy::Disabled,
        }
    }

    pub fn tool_mode(&self, estimated_eager_tool_count: usize) -> ToolMode {
        if self.lazy_metadata || estimated_eager_tool_count > self.lazy_threshold {
            ToolMode::Lazy
        } else {
            ToolMode::Eager
        }
    }
}
