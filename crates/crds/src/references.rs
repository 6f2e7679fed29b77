//! Kubernetes object references for MetalOps CRDs
//!
//! All cross-resource relationships are expressed as names (soft references,
//! resolved by lookup). Ownership is carried separately through standard
//! Kubernetes owner references on metadata.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to another MetalOps resource by name.
///
/// Namespace defaults to the namespace of the referencing resource.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    /// Name of the referenced resource
    pub name: String,

    /// Namespace of the referenced resource (defaults to same namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectRef {
    /// Create a reference in the same namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    /// Create a reference with an explicit namespace.
    pub fn with_namespace(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }
}

/// Reference to a secret holding BMC credentials.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Name of the BMCSecret
    pub name: String,
}

impl SecretRef {
    /// Create a secret reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
