//! Configuration for the triage CLI and library consumers.

use std::env;

/// Runtime configuration, read from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the maintenance API.
    pub api_base: String,
    /// Fixed bearer token (CLI use; interactive sessions use a broker).
    pub api_token: Option<String>,
    /// Default page size for list queries.
    pub page_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: env::var("TRIAGE_API_BASE")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            api_token: env::var("TRIAGE_API_TOKEN").ok().filter(|t| !t.is_empty()),
            page_limit: env::var("TRIAGE_PAGE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(50),
        }
    }
}
