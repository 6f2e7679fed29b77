//! Redfish client errors

use thiserror::Error;

/// Errors that can occur when talking to a BMC over Redfish
#[derive(Debug, Error)]
pub enum RedfishError {
    /// Transport-level error (connection refused, timeout, TLS)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Authentication failed (401/403); terminal until credentials rotate
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The service returned a semantic error (4xx/5xx with a body)
    #[error("Redfish API error: {0}")]
    Api(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested capability is not available on this protocol
    #[error("Unsupported protocol operation: {0}")]
    Unsupported(String),

    /// The update task ended in a terminal failure state
    #[error("Task failed: {0}")]
    Task(String),
}

impl RedfishError {
    /// Whether the error is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api(msg) => msg.starts_with("5"),
            _ => false,
        }
    }
}
