//! Error types for Confab.

use thiserror::Error;

/// Convenient result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConfabError>;

/// Primary error type for all Confab operations.
#[derive(Error, Debug)]
pub enum ConfabError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// The backend failed after part of a streamed reply was already
    /// delivered. Never retried; `partial` holds everything delivered
    /// before the failure.
    #[error("Stream interrupted after {} delivered chars: {message}", partial.chars().count())]
    StreamInterrupted { partial: String, message: String },

    #[error("Fatal provider error: {0}")]
    Fatal(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Broad classification controlling whether a failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Credential missing or rejected. Never retried.
    Auth,
    /// Network hiccup, rate limit, 5xx-equivalent. Retryable with backoff.
    Transient,
    /// Malformed request or permanent rejection. Never retried.
    Fatal,
}

impl ConfabError {
    /// Classify this error for the retry policy.
    ///
    /// `StreamInterrupted` classifies as `Fatal` even when the underlying
    /// cause was transient: part of the reply already reached the caller,
    /// and a retry would generate an unrelated reply.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Auth(_) => ErrorClass::Auth,
            Self::Transient(_)
            | Self::RateLimited { .. }
            | Self::Network(_)
            | Self::Timeout(_) => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }

    /// Whether the retry policy may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}
