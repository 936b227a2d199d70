pub mod health;
pub mod manifest;
pub mod metrics;
pub mod segment;

use serde::Deserialize;

/// Query parameters shared by the proxy routes
#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    /// Absolute origin URL; validated by the handler so a missing value
    /// produces a JSON 400 rather than an extractor rejection
    pub url: Option<String>,
}
