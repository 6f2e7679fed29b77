//! ServerClaim CRD
//!
//! A tenant's demand for a server. Exactly one of `serverRef` or
//! `serverSelector` selects the target; their identity is immutable once set
//! (null to value and value to null are allowed, enforced at admission).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::references::{ObjectRef, SecretRef};
use crate::server::Power;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "ServerClaim",
    namespaced,
    status = "ServerClaimStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ServerClaimSpec {
    /// Desired power once bound
    #[serde(default)]
    pub power: Power,

    /// Claim a specific server by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_ref: Option<ObjectRef>,

    /// Claim any Available server matching these labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_selector: Option<BTreeMap<String, String>>,

    /// Ignition payload handed to the boot configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignition_secret_ref: Option<SecretRef>,

    /// Boot image for the tenant workload
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerClaimStatus {
    /// Binding phase
    pub phase: ClaimPhase,

    /// The server this claim is bound to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_server_ref: Option<ObjectRef>,
}

/// Claim binding phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ClaimPhase {
    /// No server bound yet
    #[default]
    #[serde(alias = "unbound")]
    Unbound,

    /// Bound to the server named in claimedServerRef
    #[serde(alias = "bound")]
    Bound,
}
