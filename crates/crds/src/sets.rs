//! Set CRDs
//!
//! A Set materializes a template across a label-selected population of
//! Servers or BMCs and rolls up aggregate per-phase counters. Sets are pure
//! templating and fan-out; the children carry the actual state machines.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bios_settings::SettingsFlowItem;
use crate::bios_version::{FirmwareImage, UpdatePolicy};
use crate::server_maintenance::{BootConfigurationTemplate, MaintenancePolicy};

/// Aggregated child counters shared by every Set kind.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SetStatus {
    /// Targets matched by the selector
    pub selected: u32,

    /// Children that exist
    pub total: u32,

    /// Children in Pending
    pub pending: u32,

    /// Children in InProgress
    pub in_progress: u32,

    /// Children in Applied/Completed
    pub completed: u32,

    /// Children in Failed
    pub failed: u32,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "BIOSSettingsSet",
    namespaced,
    status = "SetStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BIOSSettingsSetSpec {
    /// Label selector over Servers
    pub server_selector: BTreeMap<String, String>,

    /// Template stamped out per selected server
    pub template: BIOSSettingsTemplate,
}

/// BIOSSettings template without the target reference.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BIOSSettingsTemplate {
    /// BIOS version the settings apply to
    pub version: String,

    /// Desired attribute values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings_map: BTreeMap<String, String>,

    /// Ordered flow of setting steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settings_flow: Vec<SettingsFlowItem>,

    /// Maintenance policy stamped onto children
    #[serde(default)]
    pub server_maintenance_policy: MaintenancePolicy,

    /// Retry budget stamped onto children
    #[serde(default)]
    pub failed_auto_retry_count: u32,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "BIOSVersionSet",
    namespaced,
    status = "SetStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BIOSVersionSetSpec {
    /// Label selector over Servers
    pub server_selector: BTreeMap<String, String>,

    /// Template stamped out per selected server
    pub template: FirmwareVersionTemplate,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "BMCSettingsSet",
    namespaced,
    status = "SetStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BMCSettingsSetSpec {
    /// Label selector over BMCs
    pub bmc_selector: BTreeMap<String, String>,

    /// Template stamped out per selected BMC
    pub template: BMCSettingsTemplate,
}

/// BMCSettings template without the target reference.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BMCSettingsTemplate {
    /// BMC firmware version the settings apply to
    pub version: String,

    /// Desired manager attribute values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings_map: BTreeMap<String, String>,

    /// Maintenance policy stamped onto children
    #[serde(default)]
    pub server_maintenance_policy: MaintenancePolicy,

    /// Retry budget stamped onto children
    #[serde(default)]
    pub failed_auto_retry_count: u32,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "BMCVersionSet",
    namespaced,
    status = "SetStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BMCVersionSetSpec {
    /// Label selector over BMCs
    pub bmc_selector: BTreeMap<String, String>,

    /// Template stamped out per selected BMC
    pub template: FirmwareVersionTemplate,
}

/// Firmware version template shared by BIOSVersionSet and BMCVersionSet.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareVersionTemplate {
    /// Target firmware version string
    pub version: String,

    /// Re-flash even when versions already match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_policy: Option<UpdatePolicy>,

    /// Firmware image source
    pub image: FirmwareImage,

    /// Maintenance policy stamped onto children
    #[serde(default)]
    pub server_maintenance_policy: MaintenancePolicy,

    /// Retry budget stamped onto children
    #[serde(default)]
    pub failed_auto_retry_count: u32,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "ServerMaintenanceSet",
    namespaced,
    status = "SetStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ServerMaintenanceSetSpec {
    /// Label selector over Servers
    pub server_selector: BTreeMap<String, String>,

    /// Template stamped out per selected server
    pub template: ServerMaintenanceTemplate,
}

/// ServerMaintenance template without the target reference.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerMaintenanceTemplate {
    /// Admission policy stamped onto children
    #[serde(default)]
    pub policy: MaintenancePolicy,

    /// Desired server power during maintenance
    #[serde(default)]
    pub server_power: crate::server::Power,

    /// Boot configuration installed for the maintenance window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_boot_configuration_template: Option<BootConfigurationTemplate>,
}
