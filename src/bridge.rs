//! Top-level wiring: parse metadata, build the OData client and tool
//! catalog, and run the configured transport (spec.md §6 "Startup
//! sequence", §9).

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{BridgeConfig, Credentials, TransportConfig};
use crate::error::BridgeError;
use crate::mcp::McpServer;
use crate::odata::{ODataClient, RetryConfig};
use crate::transport::{http::HttpTransport, stdio::StdioTransport, Transport};

/// Owns the cancellation token that `stop()` trips and `run()` watches,
/// so an embedder can hold a `Bridge` and shut it down from another task.
pub struct Bridge {
    config: Arc<BridgeConfig>,
    cancel: CancellationToken,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
            cancel: CancellationToken::new(),
        }
    }

    /// A clone of the bridge's cancellation token, e.g. to wire up a
    /// `tokio::signal::ctrl_c()` handler externally.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request a graceful shutdown; `run()` returns once the active
    /// transport notices.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Fetch metadata, synthesize the tool catalog, and serve until
    /// `stop()` is called or the transport's own loop exits (stdio EOF).
    pub async fn run(&self) -> Result<(), BridgeError> {
        let retry = RetryConfig {
            max_retries: self.config.max_retries,
            initial_backoff: Duration::from_millis(self.config.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.config.max_backoff_ms),
            multiplier: self.config.backoff_multiplier,
            jitter_fraction: self.config.jitter_fraction,
            ..RetryConfig::default()
        };
        let client = Arc::new(ODataClient::new(
            self.config.normalized_service_url(),
            credentials_from(&self.config),
            retry,
        ));

        tracing::info!(service_url = %self.config.service_url, "fetching $metadata");
        let metadata = client.get_metadata(&self.cancel).await?;
        if metadata.entity_sets.is_empty() && metadata.entity_types.is_empty() {
            return Err(BridgeError::EmptyCatalog(self.config.service_url.clone()));
        }
        tracing::info!(
            version = metadata.version.as_str(),
            entity_sets = metadata.entity_sets.len(),
            function_imports = metadata.function_imports.len(),
            "metadata parsed"
        );

        let server = Arc::new(McpServer::new(client, metadata, self.config.clone()));
        tracing::info!(tool_count = server.tool_count(), "tool catalog synthesized");

        match &self.config.transport {
            TransportConfig::Stdio => StdioTransport.run(server, self.cancel.clone()).await,
            TransportConfig::Http { bind_addr, i_know_what_i_am_doing } => {
                HttpTransport {
                    bind_addr: bind_addr.clone(),
                    i_know_what_i_am_doing: *i_know_what_i_am_doing,
                }
                .run(server, self.cancel.clone())
                .await
            }
        }
    }
}

fn credentials_from(config: &BridgeConfig) -> Credentials {
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        Credentials::Basic {
            username: username.clone(),
            password: password.clone(),
        }
    } else if !config.cookies.is_empty() {
        Credentials::CookieJar {
            cookies: config.cookies.clone(),
        }
    } else {
        Credentials::None
    }
}
