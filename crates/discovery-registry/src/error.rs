//! Registry errors

use thiserror::Error;

/// Errors that can occur in the discovery registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The HTTP listener could not be bound
    #[error("Failed to bind registry listener: {0}")]
    Bind(#[from] std::io::Error),

    /// A posted payload could not be parsed
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Metrics registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}
