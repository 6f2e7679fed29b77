//! BMCVersion CRD
//!
//! Desired BMC firmware revision plus the image to flash. Shares the
//! firmware-upgrade types with BIOSVersion.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::bios_version::{FirmwareImage, UpdatePolicy, UpgradeTask, VersionState};
use crate::conditions::Condition;
use crate::references::ObjectRef;
use crate::server_maintenance::MaintenancePolicy;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "BMCVersion",
    namespaced,
    status = "BMCVersionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BMCVersionSpec {
    /// Target firmware version string
    pub version: String,

    /// Re-flash even when the device already reports the target version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_policy: Option<UpdatePolicy>,

    /// Firmware image source
    pub image: FirmwareImage,

    /// Target BMC. Immutable post-create.
    pub bmc_ref: ObjectRef,

    /// Policy for the maintenance requested for the flash window
    #[serde(default)]
    pub server_maintenance_policy: MaintenancePolicy,

    /// Maintenance tickets requested by this object, one per affected server
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub server_maintenance_refs: Vec<ObjectRef>,

    /// Automatic retries with a fresh task submission
    #[serde(default)]
    pub failed_auto_retry_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BMCVersionStatus {
    /// Upgrade state
    pub state: VersionState,

    /// Redfish task tracking the running upgrade
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_task: Option<UpgradeTask>,

    /// Automatic retries left before Failed becomes terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_retries_remaining: Option<u32>,

    /// Conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Generation last acted upon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
