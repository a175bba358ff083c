//! Shared constants used across the metadata parser, OData client, tool
//! synthesizer, and response enhancer.

use std::time::Duration;

/// Default MCP protocol version advertised on `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name reported in `initialize` results.
pub const SERVER_NAME: &str = "odata-mcp-bridge";

/// Fixed `User-Agent` sent on every OData HTTP request.
pub const USER_AGENT: &str = concat!("odata-mcp-bridge/", env!("CARGO_PKG_VERSION"));

/// Header carrying the CSRF token.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Sentinel value requesting a fresh CSRF token.
pub const CSRF_FETCH_SENTINEL: &str = "Fetch";

/// Sentinel value servers return when a request lacked a valid token.
pub const CSRF_REQUIRED_SENTINEL: &str = "required";

/// Default per-request HTTP timeout (spec.md §5).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle-connection cap for SSE streams before the stale-stream reaper closes them.
pub const SSE_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Per-client SSE event queue capacity.
pub const SSE_QUEUE_CAPACITY: usize = 10;

/// Default byte cap on a shaped response's `value` payload.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024;

/// Default item-count cap on a shaped response's `value` payload.
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// Default HTTP/SSE bind address (localhost only unless explicitly overridden).
pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8080";

/// HTTP statuses the retry loop treats as transient.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Name fragments that mark a property as SAP-Decimal-shaped for the
/// write-side numeric-coercion heuristic (spec.md §4.5 point 6). Best-effort
/// SAP OData v2 compatibility shim — over-inclusive by design, overridable
/// via `BridgeConfig::decimal_coercion`.
pub const DECIMAL_FIELD_HINTS: &[&str] = &[
    "qty", "quantity", "amount", "price", "cost", "rate", "percentage", "weight", "volume",
];

/// `Edm.*` primitive type names accepted across v2 and v4 (includes the v4
/// additions: `Edm.Date`, `Edm.TimeOfDay`, `Edm.Duration`, `Edm.Stream`).
pub const EDM_STRING_TYPES: &[&str] = &[
    "Edm.String",
    "Edm.Guid",
    "Edm.DateTime",
    "Edm.DateTimeOffset",
    "Edm.Date",
    "Edm.TimeOfDay",
    "Edm.Time",
    "Edm.Duration",
    "Edm.Binary",
    "Edm.Stream",
];

pub const EDM_INTEGER_TYPES: &[&str] = &[
    "Edm.Int16",
    "Edm.Int32",
    "Edm.Int64",
    "Edm.Byte",
    "Edm.SByte",
];

pub const EDM_NUMBER_TYPES: &[&str] = &["Edm.Single", "Edm.Double", "Edm.Decimal"];

pub const EDM_BOOLEAN_TYPES: &[&str] = &["Edm.Boolean"];
