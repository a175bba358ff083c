//! odata-mcp-bridge
//!
//! Entry point for the MCP server binary. Reads connection settings from
//! the environment (no CLI/dotenv surface — spec.md §1 Non-goals) and
//! serves whichever transport the environment selects, default stdio.

use std::io;

use odata_mcp_bridge::config::{BridgeConfig, TransportConfig};
use odata_mcp_bridge::Bridge;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // MCP uses stdout for protocol messages; logs always go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    tracing::info!("starting odata-mcp-bridge...");

    let config = config_from_env()?;
    let bridge = Bridge::new(config);

    let cancel = bridge.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c, shutting down");
            cancel.cancel();
        }
    });

    bridge.run().await?;
    Ok(())
}

fn config_from_env() -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    let mut config = BridgeConfig::default();

    config.service_url =
        std::env::var("ODATA_SERVICE_URL").map_err(|_| "ODATA_SERVICE_URL environment variable must be set")?;

    if let Ok(username) = std::env::var("ODATA_USERNAME") {
        config.username = Some(username);
    }
    if let Ok(password) = std::env::var("ODATA_PASSWORD") {
        config.password = Some(password);
    }

    if env_flag("ODATA_READ_ONLY") {
        config.read_only = true;
    }
    if env_flag("ODATA_READ_ONLY_BUT_FUNCTIONS") {
        config.read_only_but_functions = true;
    }
    if env_flag("ODATA_LAZY_METADATA") {
        config.lazy_metadata = true;
    }
    if env_flag("ODATA_CLAUDE_CODE_FRIENDLY") {
        config.claude_code_friendly = true;
    }

    if let Ok(bind_addr) = std::env::var("ODATA_HTTP_BIND") {
        config.transport = TransportConfig::Http {
            bind_addr,
            i_know_what_i_am_doing: env_flag("ODATA_I_KNOW_WHAT_I_AM_DOING"),
        };
    }

    Ok(config)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
