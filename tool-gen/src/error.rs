//! Error types for tool generation.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for generation operations.
pub type Result<T> = std::result::Result<T, GenerationError>;

/// Errors that can occur while generating or publishing a tool.
///
/// A candidate that fails sandbox validation is not an error; see
/// [`crate::sandbox::Validation`].
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The text generator has no usable credentials or endpoint.
    #[error("text generator not configured")]
    ProviderNotConfigured,

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Invalid response from the provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Writing a validated tool into the hot directory failed.
    #[error("failed to publish {}: {message}", path.display())]
    Publish { path: PathBuf, message: String },

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
