//! BIOSSettings CRD
//!
//! Desired BIOS configuration for one server, valid for one firmware version.
//! Settings are applied either as a flat map or as an ordered flow of
//! prioritized steps. The shared state machinery here is reused by
//! BMCSettings.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::conditions::Condition;
use crate::references::ObjectRef;
use crate::server_maintenance::MaintenancePolicy;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "BIOSSettings",
    namespaced,
    status = "BIOSSettingsStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BIOSSettingsSpec {
    /// BIOS version these settings apply to
    pub version: String,

    /// Desired attribute values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings_map: BTreeMap<String, String>,

    /// Ordered flow of setting steps, applied by ascending priority.
    /// Steps sharing a priority are ordered by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settings_flow: Vec<SettingsFlowItem>,

    /// Target server. Immutable post-create.
    pub server_ref: ObjectRef,

    /// Policy for the maintenance requested when a reboot is required
    #[serde(default)]
    pub server_maintenance_policy: MaintenancePolicy,

    /// Maintenance ticket requested by this object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_maintenance_ref: Option<ObjectRef>,

    /// Automatic retries after a failed verification
    #[serde(default)]
    pub failed_auto_retry_count: u32,
}

/// One prioritized step of a settings flow.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsFlowItem {
    /// Step name
    pub name: String,

    /// Ascending application priority
    pub priority: i32,

    /// Attribute values applied in this step
    pub settings: BTreeMap<String, String>,
}

/// Order flow items by ascending priority, name-lexicographic within a
/// priority.
pub fn ordered_flow(items: &[SettingsFlowItem]) -> Vec<&SettingsFlowItem> {
    let mut sorted: Vec<&SettingsFlowItem> = items.iter().collect();
    sorted.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
    sorted
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BIOSSettingsStatus {
    /// Outer state
    pub state: SettingsState,

    /// Inner step while InProgress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_setting_state: Option<UpdateSettingState>,

    /// Flow step issued in the current round, checked during verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_issued_flow_step: Option<String>,

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

/// Outer settings state; Applied and Failed are sinks modulo the retry
/// annotation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum SettingsState {
    /// No work started for the observed generation
    #[default]
    #[serde(alias = "pending")]
    Pending,

    /// Multi-phase update underway
    #[serde(alias = "inProgress")]
    InProgress,

    /// Verified on the device
    #[serde(alias = "applied")]
    Applied,

    /// Retry budget exhausted
    #[serde(alias = "failed")]
    Failed,
}

/// Inner step of the reboot-spanning settings update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum UpdateSettingState {
    /// Patch submitted to the device
    IssueSettingUpdate,
    /// Waiting for the server to power off
    WaitOnServerRebootPowerOff,
    /// Waiting for the server to power back on
    WaitOnServerRebootPowerOn,
    /// Re-reading and comparing settings
    VerifySettingUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, priority: i32) -> SettingsFlowItem {
        SettingsFlowItem {
            name: name.to_string(),
            priority,
            settings: BTreeMap::new(),
        }
    }

    #[test]
    fn test_flow_ordered_by_priority_then_name() {
        let items = vec![item("b", 2), item("z", 1), item("a", 2)];
        let ordered: Vec<&str> = ordered_flow(&items).iter().map(|i| i.name.as_str()).collect();
        assert_eq!(ordered, vec!["z", "a", "b"]);
    }
}
