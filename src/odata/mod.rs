//! The OData client: version-aware request/response handling, CSRF-token
//! lifecycle, exponential-backoff retry, and response normalization
//! (spec.md §4.2).

pub mod client;
pub mod query;
pub mod response;

pub use client::{ODataClient, RetryConfig, UpdateMethod};
pub use query::QueryOptions;
