//! Controller-specific error types.
//!
//! This module defines error types specific to the unified MetalOps
//! controller that are not covered by upstream library errors.

use macdb::MacDbError;
use redfish_client::RedfishError;
use thiserror::Error;

/// Errors that can occur in the MetalOps controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Redfish error talking to a BMC
    #[error("Redfish error: {0}")]
    Redfish(#[from] RedfishError),

    /// MAC prefix database error
    #[error("MAC database error: {0}")]
    MacDb(#[from] MacDbError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A referenced Server does not exist
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// A referenced BMC does not exist
    #[error("BMC not found: {0}")]
    BmcNotFound(String),

    /// A referenced secret does not exist or is missing keys
    #[error("Secret invalid: {0}")]
    SecretInvalid(String),

    /// A resource is in a state the requested operation does not allow
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Optimistic-concurrency conflict; requeue and re-derive
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether this is a CAS conflict that should be retried silently.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Kube(kube::Error::Api(response)) => response.code == 409,
            _ => false,
        }
    }
}
