//! Errors raised by the network collaborators behind the tools
//!
//! These never escape the dispatcher: every handler turns them into a
//! fallback or a `{error}` result.

/// Error type for search providers and transform endpoints
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{provider} returned HTTP {status}")]
    Status { provider: &'static str, status: u16 },
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
