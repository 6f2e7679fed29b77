//! ServerMaintenance CRD
//!
//! A ticket authorizing disruptive work on one server. The maintenance
//! arbiter guarantees at most one ticket per server is InMaintenance at any
//! instant.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::references::{ObjectRef, SecretRef};
use crate::server::Power;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "ServerMaintenance",
    namespaced,
    status = "ServerMaintenanceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ServerMaintenanceSpec {
    /// Admission policy for this ticket
    #[serde(default)]
    pub policy: MaintenancePolicy,

    /// Server the work targets
    pub server_ref: ObjectRef,

    /// Desired server power while the ticket is held
    #[serde(default)]
    pub server_power: Power,

    /// Boot configuration installed for the duration of the maintenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_boot_configuration_template: Option<BootConfigurationTemplate>,
}

/// Template for the maintenance boot configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BootConfigurationTemplate {
    /// Name given to the materialized configuration
    pub name: String,

    /// Boot image
    pub image: String,

    /// Ignition payload reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignition_secret_ref: Option<SecretRef>,
}

/// Maintenance admission policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum MaintenancePolicy {
    /// Wait until the server is Available or an approval annotation appears
    #[default]
    OwnerApproval,

    /// Admit immediately regardless of server state
    Enforced,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerMaintenanceStatus {
    /// Ticket state
    pub state: MaintenanceState,
}

/// Maintenance ticket state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum MaintenanceState {
    /// Queued behind the policy gate or another ticket
    #[default]
    #[serde(alias = "pending")]
    Pending,

    /// Admitted; the server is drained into Maintenance
    #[serde(alias = "inMaintenance")]
    InMaintenance,

    /// Work finished, server restored
    #[serde(alias = "completed")]
    Completed,

    /// Work failed, server restored
    #[serde(alias = "failed")]
    Failed,
}
