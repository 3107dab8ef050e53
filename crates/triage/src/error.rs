//! Error types for the triage core.

use thiserror::Error;

/// Errors produced by the API client and the mutation orchestrator.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure (connection, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response with a best-effort backend message.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// HTTP 200 but the response envelope carried `success: false`.
    #[error("backend rejected the request: {0}")]
    Application(String),

    /// Response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Client-side guard rejected the operation before any network call.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Token acquisition failed in the identity broker.
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl Error {
    /// Whether this error indicates the endpoint is absent on the deployed
    /// backend (used to degrade the cancel endpoint to a status patch).
    #[must_use]
    pub const fn is_unsupported_endpoint(&self) -> bool {
        matches!(self, Self::Http { status: 404 | 405, .. })
    }
}
