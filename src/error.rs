//! Error taxonomy (spec.md §7). One `thiserror` enum per layer, following
//! the teacher's `ODataError`/`AuthError` style: named variants, `#[from]`
//! conversions, and a message that is safe to surface verbatim to an MCP
//! caller.

use thiserror::Error;

/// Failures from EDMX/metadata parsing.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to fetch metadata: {0}")]
    FetchFailed(String),

    #[error("failed to parse EDMX document: {0}")]
    XmlParseFailed(String),

    #[error("metadata document had no usable EntityContainer")]
    NoContainer,

    #[error("entity set '{0}' references unknown entity type '{1}'")]
    DanglingEntityType(String, String),

    #[error("fallback service-document fetch failed: {0}")]
    FallbackFailed(String),
}

/// A structured OData error parsed from a v2 or v4 error response body
/// (spec.md §7).
#[derive(Debug, Clone, Default)]
pub struct ODataErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
    pub target: Option<String>,
    pub severity: Option<String>,
    pub details: Vec<String>,
}

impl std::fmt::Display for ODataErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "[{}] ", code)?;
        }
        write!(f, "{}", self.message.as_deref().unwrap_or("unknown error"))?;
        if let Some(target) = &self.target {
            write!(f, " (target: {})", target)?;
        }
        if let Some(severity) = &self.severity {
            write!(f, " (severity: {})", severity)?;
        }
        if !self.details.is_empty() {
            write!(f, " — details: {}", self.details.join("; "))?;
        }
        Ok(())
    }
}

/// Failures from the OData client (spec.md §4.2, §7).
#[derive(Error, Debug)]
pub enum ODataError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request was cancelled")]
    Cancelled,

    #[error("OData server error {status}: {body}")]
    ServerError { status: u16, body: ODataErrorBody },

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("CSRF token could not be established: {0}")]
    CsrfFailed(String),

    #[error("retry budget ({0}) exhausted")]
    RetriesExhausted(u32),

    #[error("failed to parse OData response: {0}")]
    ParseError(String),
}

impl ODataError {
    /// HTTP status code this error carries, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ODataError::ServerError { status, .. } => Some(*status),
            ODataError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failures surfaced by MCP protocol handling (spec.md §4.3, §7).
#[derive(Error, Debug)]
pub enum McpError {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    OData(#[from] ODataError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// JSON-RPC error code this error maps to (spec.md §4.3).
    pub fn rpc_code(&self) -> i64 {
        match self {
            McpError::ParseError(_) => -32700,
            McpError::InvalidRequest(_) => -32600,
            McpError::MethodNotFound(_) => -32601,
            McpError::ToolNotFound(_) | McpError::InvalidParams(_) => -32602,
            McpError::OData(e) => categorize_odata_error(e),
            McpError::Internal(_) => -32603,
        }
    }
}

/// Categorize a handler-level error message by substring match into an MCP
/// error code (spec.md §7): 400/404/409/422 and "entity not found" ->
/// -32602; everything else (CSRF, timeout, 401/403/5xx, network) -> -32603.
pub fn categorize_error_message(message: &str) -> i64 {
    let lower = message.to_ascii_lowercase();
    let invalid_params = lower.contains("400")
        || lower.contains("404")
        || lower.contains("409")
        || lower.contains("422")
        || lower.contains("entity not found")
        || lower.contains("not found");
    if invalid_params {
        -32602
    } else {
        -32603
    }
}

fn categorize_odata_error(e: &ODataError) -> i64 {
    categorize_error_message(&e.to_string())
}

/// Top-level error for the bridge's `run()`/`stop()` lifecycle
/// (spec.md §6 CLI exit semantics).
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("metadata ingest failed: {0}")]
    Metadata(#[from] MetadataError),

    #[error("service exposes no entity sets or types after metadata parse and fallback: {0}")]
    EmptyCatalog(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_and_not_found_map_to_invalid_params() {
        assert_eq!(categorize_error_message("HTTP 409: Conflict"), -32602);
        assert_eq!(categorize_error_message("HTTP 400: Bad Request"), -32602);
        assert_eq!(categorize_error_message("HTTP 404: Not Found"), -32602);
        assert_eq!(categorize_error_message("HTTP 422: Unprocessable Entity"), -32602);
        assert_eq!(categorize_error_message("entity not found: Products(1)"), -32602);
    }

    #[test]
    fn server_and_network_errors_map_to_internal() {
        assert_eq!(categorize_error_message("HTTP 500: Internal Server Error"), -32603);
        assert_eq!(categorize_error_message("network error: connection refused"), -32603);
        assert_eq!(categorize_error_message("request timed out"), -32603);
        assert_eq!(categorize_error_message("CSRF token could not be established"), -32603);
    }
}
