//! Error types for wantlist_analyzer

use thiserror::Error;

/// Unified error type for analyzer operations
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to parse a JSON payload
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// HTTP error status code from an external service
    #[error("HTTP error: {0}")]
    HttpStatus(reqwest::StatusCode),

    /// The listing service answered 429. Carries the `retry-after`
    /// header value in seconds, when the service sent one.
    #[error("Rate limited by the listing service")]
    RateLimited(Option<u64>),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request failed validation before any work began
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result alias for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;
