//! BIOSVersion CRD
//!
//! Desired BIOS firmware revision plus the image to flash. The shared
//! firmware-upgrade types here are reused by BMCVersion.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::Condition;
use crate::references::{ObjectRef, SecretRef};
use crate::server_maintenance::MaintenancePolicy;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "BIOSVersion",
    namespaced,
    status = "BIOSVersionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BIOSVersionSpec {
    /// Target firmware version string
    pub version: String,

    /// Re-flash even when the device already reports the target version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_policy: Option<UpdatePolicy>,

    /// Firmware image source
    pub image: FirmwareImage,

    /// Target server. Immutable post-create.
    pub server_ref: ObjectRef,

    /// Policy for the maintenance requested for the flash window
    #[serde(default)]
    pub server_maintenance_policy: MaintenancePolicy,

    /// Maintenance ticket requested by this object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_maintenance_ref: Option<ObjectRef>,

    /// Automatic retries with a fresh task submission
    #[serde(default)]
    pub failed_auto_retry_count: u32,
}

/// Firmware update policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// Submit the update even when versions already match
    Force,
}

/// Firmware image source passed to the Redfish update service.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareImage {
    /// Image URI
    pub uri: String,

    /// Transfer protocol (HTTP, HTTPS, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_protocol: Option<String>,

    /// Credentials for the image host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BIOSVersionStatus {
    /// Upgrade state
    pub state: VersionState,

    /// Redfish task tracking the running upgrade
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_task: Option<UpgradeTask>,

    /// Automatic retries left before Failed becomes terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_retries_remaining: Option<u32>,

    /// Conditions (PostUpgradeVersionMismatch, task errors)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Generation last acted upon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Firmware upgrade state; Completed and Failed are sinks modulo the retry
/// annotation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum VersionState {
    /// No task submitted for the observed generation
    #[default]
    #[serde(alias = "pending")]
    Pending,

    /// Task submitted, polling progress
    #[serde(alias = "inProgress")]
    InProgress,

    /// Firmware verified at the target version
    #[serde(alias = "completed")]
    Completed,

    /// Retry budget exhausted or verification mismatch
    #[serde(alias = "failed")]
    Failed,
}

/// Observed state of the Redfish update task.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeTask {
    /// Task monitor URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Redfish TaskState
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_state: Option<String>,

    /// Redfish TaskStatus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_status: Option<String>,

    /// Completion percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<u8>,
}
