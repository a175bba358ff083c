//! odata-mcp-bridge
//!
//! Model Context Protocol bridge exposing any OData v2/v4 service's
//! entity sets and function/action imports as MCP tools.

pub mod bridge;
pub mod config;
pub mod constants;
pub mod error;
pub mod mcp;
pub mod metadata;
pub mod model;
pub mod odata;
pub mod response_enhancer;
pub mod tools;
pub mod transport;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use odata::{ODataClient, ODataError, QueryOptions};
