//! BMCSettings CRD
//!
//! Desired BMC (manager) configuration for one BMC, valid for one firmware
//! version. Shares the settings state machinery with BIOSSettings.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bios_settings::{SettingsState, UpdateSettingState};
use crate::conditions::Condition;
use crate::references::ObjectRef;
use crate::server_maintenance::MaintenancePolicy;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "BMCSettings",
    namespaced,
    status = "BMCSettingsStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BMCSettingsSpec {
    /// BMC firmware version these settings apply to
    pub version: String,

    /// Desired manager attribute values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings_map: BTreeMap<String, String>,

    /// Target BMC. Immutable post-create.
    pub bmc_ref: ObjectRef,

    /// Policy for the maintenance requested for the servers behind this BMC
    #[serde(default)]
    pub server_maintenance_policy: MaintenancePolicy,

    /// Maintenance tickets requested by this object, one per affected server
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub server_maintenance_refs: Vec<ObjectRef>,

    /// Automatic retries after a failed verification
    #[serde(default)]
    pub failed_auto_retry_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BMCSettingsStatus {
    /// Outer state
    pub state: SettingsState,

    /// Inner step while InProgress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_setting_state: Option<UpdateSettingState>,

    /// Automatic retries left before Failed becomes terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_retries_remaining: Option<u32>,

    /// When the settings were last verified applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_time: Option<chrono::DateTime<chrono::Utc>>,

    /// Conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Generation last acted upon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
