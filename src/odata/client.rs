//! The OData client: version-aware request/response handling, CSRF-token
//! lifecycle, exponential-backoff retry logic, and concurrent-safe auth
//! state (spec.md §4.2).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::Credentials;
use crate::constants::{
    CSRF_FETCH_SENTINEL, CSRF_HEADER, CSRF_REQUIRED_SENTINEL, RETRYABLE_STATUSES, USER_AGENT,
};
use crate::error::ODataError;
use crate::model::{HttpMethod, ODataVersion, ServiceMetadata};

use super::query::{build_function_params, build_key_predicate, QueryOptions};
use super::response;

/// `PUT`/`PATCH`/`MERGE` — the update verb a caller may request
/// (spec.md §4.2 `UpdateEntity`, default `PUT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMethod {
    #[default]
    Put,
    Patch,
    Merge,
}

impl UpdateMethod {
    fn http_method(self) -> Method {
        match self {
            UpdateMethod::Put => Method::PUT,
            UpdateMethod::Patch => Method::PATCH,
            UpdateMethod::Merge => Method::from_bytes(b"MERGE").expect("MERGE is a valid token"),
        }
    }
}

/// Backoff/retry policy (spec.md §4.2 "Retry/backoff policy").
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter_fraction: f64,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_fraction: 0.1,
            retryable_statuses: RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `n` (n >= 1), before jitter: `min(initial *
    /// multiplier^(n-1), max)` (spec.md §4.2 point 1, §8 "Backoff
    /// monotonicity").
    fn base_delay(&self, n: u32) -> Duration {
        let scaled = self.initial_backoff.as_secs_f64() * self.multiplier.powi(n as i32 - 1);
        let capped = scaled.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Apply uniform jitter in `±jitter_fraction * delay`, clamped at >= 0.
    fn jittered_delay(&self, n: u32) -> Duration {
        let base = self.base_delay(n);
        if self.jitter_fraction <= 0.0 {
            return base;
        }
        let spread = base.as_secs_f64() * self.jitter_fraction;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((base.as_secs_f64() + offset).max(0.0))
    }
}

#[derive(Debug, Default)]
struct ClientState {
    csrf_token: String,
    session_cookies: Vec<(String, String)>,
    static_cookies: std::collections::HashMap<String, String>,
}

/// The OData client owned exclusively by the bridge (spec.md §3 "OData
/// client state", §4.2).
pub struct ODataClient {
    http: Client,
    service_root: String,
    credentials: Credentials,
    state: RwLock<ClientState>,
    /// Set once during metadata parse, read without synchronization after
    /// (spec.md §5 "Shared state").
    is_v4: AtomicBool,
    retry: RetryConfig,
}

impl ODataClient {
    pub fn new(service_root: impl Into<String>, credentials: Credentials, retry: RetryConfig) -> Self {
        let service_root = {
            let s = service_root.into();
            if s.ends_with('/') {
                s
            } else {
                format!("{}/", s)
            }
        };

        let static_cookies = match &credentials {
            Credentials::CookieJar { cookies } | Credentials::BearerViaCookie { cookies, .. } => {
                cookies.clone()
            }
            _ => std::collections::HashMap::new(),
        };

        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("reqwest client builds with default TLS backend");

        Self {
            http,
            service_root,
            credentials,
            state: RwLock::new(ClientState {
                csrf_token: String::new(),
                session_cookies: Vec::new(),
                static_cookies,
            }),
            is_v4: AtomicBool::new(false),
            retry,
        }
    }

    pub fn service_root(&self) -> &str {
        &self.service_root
    }

    fn version(&self) -> ODataVersion {
        if self.is_v4.load(Ordering::Relaxed) {
            ODataVersion::V4
        } else {
            ODataVersion::V2
        }
    }

    /// Fetch and parse `$metadata`, setting `is_v4` on success. If the
    /// document fails to parse, fall back to the service document (JSON) at
    /// the service root and return a minimal catalog (spec.md §4.1
    /// "Fallback", §4.2 `GetMetadata`) — the caller is responsible for
    /// treating an empty catalog as a hard error.
    pub async fn get_metadata(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ServiceMetadata, crate::error::MetadataError> {
        let url = format!("{}$metadata", self.service_root);
        let (status, _headers, body) = self
            .send_raw(Method::GET, &url, None, false, cancel)
            .await
            .map_err(|e| crate::error::MetadataError::FetchFailed(e.to_string()))?;

        if !StatusCode::from_u16(status)
            .map(|s| s.is_success())
            .unwrap_or(false)
        {
            return Err(crate::error::MetadataError::FetchFailed(format!(
                "metadata endpoint returned HTTP {}",
                status
            )));
        }

        match crate::metadata::parse_metadata(&body, &self.service_root) {
            Ok(metadata) => {
                self.is_v4.store(metadata.version.is_v4(), Ordering::Relaxed);
                Ok(metadata)
            }
            Err(parse_err) => {
                tracing::warn!(
                    "$metadata parse failed ({}), falling back to the service document",
                    parse_err
                );
                self.fetch_minimal_fallback(cancel).await
            }
        }
    }

    /// GET the service document (JSON) at the service root and build a
    /// minimal catalog from it (spec.md §4.1 "Fallback").
    async fn fetch_minimal_fallback(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ServiceMetadata, crate::error::MetadataError> {
        let (status, _headers, _body) = self
            .send_raw(Method::GET, &self.service_root, None, false, cancel)
            .await
            .map_err(|e| crate::error::MetadataError::FallbackFailed(e.to_string()))?;

        if !StatusCode::from_u16(status)
            .map(|s| s.is_success())
            .unwrap_or(false)
        {
            return Err(crate::error::MetadataError::FallbackFailed(format!(
                "service document endpoint returned HTTP {}",
                status
            )));
        }

        let metadata = crate::metadata::minimal_fallback(&self.service_root);
        self.is_v4.store(false, Ordering::Relaxed);
        Ok(metadata)
    }

    /// `GET {set}?{opts}` (spec.md §4.2 `GetEntitySet`).
    pub async fn get_entity_set(
        &self,
        entity_set: &str,
        opts: &QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<Value, ODataError> {
        let query = opts.to_query_string(self.version());
        let url = format!("{}{}{}", self.service_root, entity_set, query);
        self.get_value(&url, cancel).await
    }

    /// `GET {set}({predicate}){?opts}` (spec.md §4.2 `GetEntity`).
    pub async fn get_entity(
        &self,
        entity_set: &str,
        key: &[(String, Value)],
        opts: &QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<Value, ODataError> {
        let predicate = build_key_predicate(key);
        let query = opts.to_query_string(self.version());
        let url = format!("{}{}({}){}", self.service_root, entity_set, predicate, query);
        self.get_value(&url, cancel).await
    }

    async fn get_value(&self, url: &str, cancel: &CancellationToken) -> Result<Value, ODataError> {
        let (status, _headers, body) = self.send_raw(Method::GET, url, None, false, cancel).await?;
        self.to_value(status, &body)
    }

    /// `POST` with fresh CSRF token, JSON body (spec.md §4.2 `CreateEntity`).
    pub async fn create_entity(
        &self,
        entity_set: &str,
        data: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ODataError> {
        let url = format!("{}{}", self.service_root, entity_set);
        let body = Bytes::from(serde_json::to_vec(data).map_err(|e| ODataError::ParseError(e.to_string()))?);
        let (status, _headers, resp_body) =
            self.send_raw(Method::POST, &url, Some(body), true, cancel).await?;
        self.to_value(status, &resp_body)
    }

    /// `{method} {set}({predicate})` (`PUT`/`PATCH`/`MERGE`, default `PUT`)
    /// with fresh CSRF token (spec.md §4.2 `UpdateEntity`).
    pub async fn update_entity(
        &self,
        entity_set: &str,
        key: &[(String, Value)],
        data: &Value,
        method: UpdateMethod,
        cancel: &CancellationToken,
    ) -> Result<Value, ODataError> {
        let predicate = build_key_predicate(key);
        let url = format!("{}{}({})", self.service_root, entity_set, predicate);
        let body = Bytes::from(serde_json::to_vec(data).map_err(|e| ODataError::ParseError(e.to_string()))?);
        let (status, _headers, resp_body) = self
            .send_raw(method.http_method(), &url, Some(body), true, cancel)
            .await?;
        if resp_body.is_empty() {
            return Ok(Value::Null);
        }
        self.to_value(status, &resp_body)
    }

    /// `DELETE` with fresh CSRF token (spec.md §4.2 `DeleteEntity`).
    pub async fn delete_entity(
        &self,
        entity_set: &str,
        key: &[(String, Value)],
        cancel: &CancellationToken,
    ) -> Result<(), ODataError> {
        let predicate = build_key_predicate(key);
        let url = format!("{}{}({})", self.service_root, entity_set, predicate);
        let (status, _headers, body) = self
            .send_raw(Method::DELETE, &url, None, true, cancel)
            .await?;
        if !(200..300).contains(&status) {
            return Err(self.error_for_status(status, &body));
        }
        Ok(())
    }

    /// `GET` with URL-encoded params, or `POST` with a JSON body and fresh
    /// CSRF token (spec.md §4.2 `CallFunction`).
    pub async fn call_function(
        &self,
        name: &str,
        params: &[(String, Value)],
        method: HttpMethod,
        cancel: &CancellationToken,
    ) -> Result<Value, ODataError> {
        match method {
            HttpMethod::Get => {
                let rendered = build_function_params(params);
                let url = format!("{}{}({})", self.service_root, name, rendered);
                self.get_value(&url, cancel).await
            }
            HttpMethod::Post => {
                let url = format!("{}{}", self.service_root, name);
                let mut map = serde_json::Map::new();
                for (k, v) in params {
                    map.insert(k.clone(), v.clone());
                }
                let body = Bytes::from(
                    serde_json::to_vec(&Value::Object(map))
                        .map_err(|e| ODataError::ParseError(e.to_string()))?,
                );
                let (status, _headers, resp_body) =
                    self.send_raw(Method::POST, &url, Some(body), true, cancel).await?;
                self.to_value(status, &resp_body)
            }
        }
    }

    fn to_value(&self, status: u16, body: &[u8]) -> Result<Value, ODataError> {
        if body.is_empty() {
            return Ok(Value::Null);
        }
        if !(200..300).contains(&status) {
            // Body may still carry a structured OData error, which
            // normalize_body already turns into ODataError::ServerError.
            return match response::normalize_body(body, self.version(), status) {
                Ok(_) => Err(self.error_for_status(status, body)),
                Err(e) => Err(e),
            };
        }
        response::normalize_body(body, self.version(), status)
    }

    fn error_for_status(&self, status: u16, body: &[u8]) -> ODataError {
        if status == 404 {
            return ODataError::NotFound(String::from_utf8_lossy(body).to_string());
        }
        ODataError::HttpStatus {
            status,
            body: String::from_utf8_lossy(body).to_string(),
        }
    }

    /// Core retry loop (spec.md §4.2 "Retry/backoff policy", §8 "Retry
    /// budget", "CSRF recovery does not count against the retry budget").
    async fn send_raw(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
        is_modifying: bool,
        cancel: &CancellationToken,
    ) -> Result<(u16, reqwest::header::HeaderMap, Bytes), ODataError> {
        if is_modifying {
            // Proactive refresh: failure is logged, not fatal (spec.md §4.2
            // "Modifying methods always refresh CSRF proactively").
            if let Err(e) = self.fetch_csrf_token(cancel).await {
                tracing::warn!("proactive CSRF token fetch failed: {}", e);
            }
        }

        let mut attempt: u32 = 0;
        let mut csrf_retried = false;

        loop {
            if attempt > 0 {
                self.sleep_with_jitter(attempt, cancel).await?;
            }

            let outcome = self.attempt_once(&method, url, body.as_ref(), cancel).await;

            let (status, headers, resp_body) = match outcome {
                Ok(v) => v,
                Err(e) => {
                    if attempt < self.retry.max_retries {
                        attempt += 1;
                        continue;
                    }
                    return Err(e);
                }
            };

            if is_modifying
                && status == 403
                && !csrf_retried
                && is_csrf_failure(status, &headers, &resp_body)
            {
                csrf_retried = true;
                self.clear_csrf_token().await;
                if let Err(e) = self.fetch_csrf_token(cancel).await {
                    tracing::warn!("CSRF recovery fetch failed: {}", e);
                }
                // Retried without incrementing the attempt budget.
                continue;
            }

            if self.retry.retryable_statuses.contains(&status) && attempt < self.retry.max_retries {
                attempt += 1;
                continue;
            }

            return Ok((status, headers, resp_body));
        }
    }

    async fn attempt_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Bytes>,
        cancel: &CancellationToken,
    ) -> Result<(u16, reqwest::header::HeaderMap, Bytes), ODataError> {
        let mut builder = self.http.request(method.clone(), url);
        builder = self.apply_headers(builder).await;
        if let Some(b) = body {
            builder = builder
                .header("Content-Type", "application/json")
                .body(b.clone());
        }

        let send_fut = builder.send();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ODataError::Cancelled),
            result = send_fut => {
                let resp = result.map_err(ODataError::Network)?;
                let status = resp.status().as_u16();
                let headers = resp.headers().clone();
                let bytes_fut = resp.bytes();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(ODataError::Cancelled),
                    body = bytes_fut => {
                        let body = body.map_err(ODataError::Network)?;
                        Ok((status, headers, body))
                    }
                }
            }
        }
    }

    async fn apply_headers(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let version = self.version();
        let accept = if version.is_v4() {
            "application/json;odata.metadata=minimal"
        } else {
            "application/json"
        };
        builder = builder.header("Accept", accept).header("User-Agent", USER_AGENT);

        match &self.credentials {
            Credentials::Basic { username, password } => {
                builder = builder.basic_auth(username, Some(password));
            }
            Credentials::BearerViaCookie {
                bearer_cookie_name,
                cookies,
            } => {
                if let Some(token) = cookies.get(bearer_cookie_name) {
                    builder = builder.bearer_auth(token);
                }
            }
            _ => {}
        }

        let state = self.state.read().await;
        let mut cookie_pairs: Vec<String> = state
            .static_cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        cookie_pairs.extend(
            state
                .session_cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v)),
        );
        if !cookie_pairs.is_empty() {
            builder = builder.header("Cookie", cookie_pairs.join("; "));
        }
        if !state.csrf_token.is_empty() {
            builder = builder.header(CSRF_HEADER, state.csrf_token.clone());
        }
        drop(state);

        builder
    }

    /// GET the service root with `X-CSRF-Token: Fetch`, extract the token
    /// (rejecting the sentinel value) and accumulate `Set-Cookie` cookies
    /// (spec.md §4.2 "CSRF failure").
    async fn fetch_csrf_token(&self, cancel: &CancellationToken) -> Result<(), ODataError> {
        let mut builder = self
            .http
            .get(&self.service_root)
            .header(CSRF_HEADER, CSRF_FETCH_SENTINEL)
            .header("Accept", "application/json");

        {
            let state = self.state.read().await;
            let mut cookie_pairs: Vec<String> = state
                .static_cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            cookie_pairs.extend(
                state
                    .session_cookies
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v)),
            );
            if !cookie_pairs.is_empty() {
                builder = builder.header("Cookie", cookie_pairs.join("; "));
            }
        }

        let send_fut = builder.send();
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ODataError::Cancelled),
            result = send_fut => result.map_err(ODataError::Network)?,
        };

        let headers = resp.headers().clone();
        let new_cookies = extract_set_cookies(&headers);

        let token = headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut state = self.state.write().await;
        state.session_cookies.extend(new_cookies);
        match token {
            Some(t) if !t.eq_ignore_ascii_case(CSRF_FETCH_SENTINEL) && !t.is_empty() => {
                state.csrf_token = t;
                Ok(())
            }
            Some(t) if t.eq_ignore_ascii_case(CSRF_FETCH_SENTINEL) => Err(ODataError::CsrfFailed(
                "server echoed the Fetch sentinel instead of issuing a token".into(),
            )),
            _ => Err(ODataError::CsrfFailed(
                "server did not return an X-CSRF-Token header".into(),
            )),
        }
    }

    async fn clear_csrf_token(&self) {
        let mut state = self.state.write().await;
        state.csrf_token.clear();
    }

    async fn sleep_with_jitter(
        &self,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<(), ODataError> {
        let delay = self.retry.jittered_delay(attempt);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ODataError::Cancelled),
            _ = sleep(delay) => Ok(()),
        }
    }
}

/// A CSRF failure: HTTP 403 and either the `x-csrf-token: required` header
/// (case-insensitive) or a CSRF-flavored body substring (spec.md §4.2).
fn is_csrf_failure(status: u16, headers: &reqwest::header::HeaderMap, body: &[u8]) -> bool {
    if status != 403 {
        return false;
    }
    let header_says_required = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case(CSRF_REQUIRED_SENTINEL))
        .unwrap_or(false);
    if header_says_required {
        return true;
    }
    let body_text = String::from_utf8_lossy(body);
    body_text.contains("CSRF token validation failed") || body_text.to_ascii_lowercase().contains("csrf")
}

fn extract_set_cookies(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| {
            let kv = raw.split(';').next()?;
            let (k, v) = kv.split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry_config(jitter: f64) -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_fraction: jitter,
            retryable_statuses: RETRYABLE_STATUSES.to_vec(),
        }
    }

    #[test]
    fn backoff_is_monotonic_without_jitter() {
        let cfg = retry_config(0.0);
        assert_eq!(cfg.base_delay(1), Duration::from_millis(100));
        assert_eq!(cfg.base_delay(2), Duration::from_millis(200));
        assert_eq!(cfg.base_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_caps_at_max() {
        let cfg = RetryConfig {
            max_retries: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(2),
            multiplier: 10.0,
            jitter_fraction: 0.0,
            retryable_statuses: RETRYABLE_STATUSES.to_vec(),
        };
        assert_eq!(cfg.base_delay(5), Duration::from_secs(2));
    }

    #[test]
    fn csrf_failure_detected_by_header() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CSRF_HEADER, "required".parse().unwrap());
        assert!(is_csrf_failure(403, &headers, b""));
    }

    #[test]
    fn csrf_failure_detected_by_body_substring() {
        let headers = reqwest::header::HeaderMap::new();
        assert!(is_csrf_failure(
            403,
            &headers,
            b"{\"error\":\"CSRF token validation failed\"}"
        ));
    }

    #[test]
    fn non_403_is_never_a_csrf_failure() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CSRF_HEADER, "required".parse().unwrap());
        assert!(!is_csrf_failure(401, &headers, b""));
    }

    #[test]
    fn set_cookie_pairs_are_extracted() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::SET_COOKIE,
            "sap-sid=abc123; Path=/; HttpOnly".parse().unwrap(),
        );
        let cookies = extract_set_cookies(&headers);
        assert_eq!(cookies, vec![("sap-sid".to_string(), "abc123".to_string())]);
    }
}
