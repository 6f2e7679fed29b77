//! Redfish resource models
//!
//! Typed views of the Redfish resources the controllers touch. Field names
//! follow the DMTF schemas (PascalCase on the wire); only the properties the
//! reconcilers read are modeled.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to another resource by `@odata.id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ODataId {
    /// Resource URI
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
}

/// The service root, entry point of every Redfish tree.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceRoot {
    /// Service UUID
    #[serde(rename = "UUID", skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Systems collection link
    #[serde(rename = "Systems", skip_serializing_if = "Option::is_none")]
    pub systems: Option<ODataId>,

    /// Managers collection link
    #[serde(rename = "Managers", skip_serializing_if = "Option::is_none")]
    pub managers: Option<ODataId>,

    /// UpdateService link
    #[serde(rename = "UpdateService", skip_serializing_if = "Option::is_none")]
    pub update_service: Option<ODataId>,
}

/// A Redfish collection (Systems, Managers, SoftwareInventory).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Collection {
    /// Collection members
    #[serde(rename = "Members")]
    pub members: Vec<ODataId>,

    /// Member count
    #[serde(rename = "Members@odata.count", skip_serializing_if = "Option::is_none")]
    pub members_count: Option<u32>,
}

/// Observed chassis power state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PowerState {
    /// Powered on
    On,
    /// Powered off
    Off,
    /// Transitioning to on
    PoweringOn,
    /// Transitioning to off
    PoweringOff,
}

/// Redfish ResetType values accepted by the ComputerSystem Reset action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResetType {
    /// Turn on
    On,
    /// Turn on immediately
    ForceOn,
    /// Orderly shutdown
    GracefulShutdown,
    /// Cut power immediately
    ForceOff,
    /// Orderly reboot
    GracefulRestart,
    /// Immediate reboot
    ForceRestart,
    /// Power off then on
    PowerCycle,
}

/// A ComputerSystem resource.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ComputerSystem {
    /// System identifier within the Systems collection
    #[serde(rename = "Id")]
    pub id: String,

    /// System UUID
    #[serde(rename = "UUID", skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Resource URI
    #[serde(rename = "@odata.id", skip_serializing_if = "Option::is_none")]
    pub odata_id: Option<String>,

    /// Manufacturer
    #[serde(rename = "Manufacturer", skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    /// Model
    #[serde(rename = "Model", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// SKU
    #[serde(rename = "SKU", skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,

    /// Serial number
    #[serde(rename = "SerialNumber", skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,

    /// BIOS version
    #[serde(rename = "BiosVersion", skip_serializing_if = "Option::is_none")]
    pub bios_version: Option<String>,

    /// Power state
    #[serde(rename = "PowerState", skip_serializing_if = "Option::is_none")]
    pub power_state: Option<PowerState>,

    /// Indicator LED state
    #[serde(rename = "IndicatorLED", skip_serializing_if = "Option::is_none")]
    pub indicator_led: Option<String>,

    /// Memory summary
    #[serde(rename = "MemorySummary", skip_serializing_if = "Option::is_none")]
    pub memory_summary: Option<MemorySummary>,

    /// Boot settings
    #[serde(rename = "Boot", skip_serializing_if = "Option::is_none")]
    pub boot: Option<Boot>,
}

/// MemorySummary block of a ComputerSystem.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MemorySummary {
    /// Total memory in GiB
    #[serde(rename = "TotalSystemMemoryGiB", skip_serializing_if = "Option::is_none")]
    pub total_system_memory_gib: Option<f64>,
}

/// Boot block of a ComputerSystem.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Boot {
    /// One-shot or continuous boot source override target
    #[serde(rename = "BootSourceOverrideTarget", skip_serializing_if = "Option::is_none")]
    pub boot_source_override_target: Option<String>,

    /// Override arming state (Disabled, Once, Continuous)
    #[serde(rename = "BootSourceOverrideEnabled", skip_serializing_if = "Option::is_none")]
    pub boot_source_override_enabled: Option<String>,

    /// Persistent boot order by device name
    #[serde(rename = "BootOrder", skip_serializing_if = "Option::is_none")]
    pub boot_order: Option<Vec<String>>,
}

/// A Manager (BMC) resource.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Manager {
    /// Manager identifier within the Managers collection
    #[serde(rename = "Id")]
    pub id: String,

    /// Manufacturer
    #[serde(rename = "Manufacturer", skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    /// Model
    #[serde(rename = "Model", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Firmware version
    #[serde(rename = "FirmwareVersion", skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,

    /// Power state of the manager itself
    #[serde(rename = "PowerState", skip_serializing_if = "Option::is_none")]
    pub power_state: Option<PowerState>,

    /// Serial number
    #[serde(rename = "SerialNumber", skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

/// A SoftwareInventory entry from the UpdateService firmware inventory.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SoftwareInventory {
    /// Inventory identifier (e.g. "BIOS", "BMC")
    #[serde(rename = "Id")]
    pub id: String,

    /// Installed version
    #[serde(rename = "Version", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Whether this component is updateable
    #[serde(rename = "Updateable", skip_serializing_if = "Option::is_none")]
    pub updateable: Option<bool>,
}

/// Redfish TaskState values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskState {
    /// Created, not yet started
    New,
    /// Queued
    Pending,
    /// Executing
    Running,
    /// Dell-style alias for Running
    Starting,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Exception,
    /// Cancelled by the service
    Killed,
    /// Cancelled by a client
    Cancelled,
}

impl TaskState {
    /// Whether this state is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Exception | Self::Killed | Self::Cancelled)
    }
}

/// A Task resource returned by the task monitor.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Task {
    /// Task identifier
    #[serde(rename = "Id")]
    pub id: String,

    /// Task state
    #[serde(rename = "TaskState", skip_serializing_if = "Option::is_none")]
    pub task_state: Option<TaskState>,

    /// OK/Warning/Critical
    #[serde(rename = "TaskStatus", skip_serializing_if = "Option::is_none")]
    pub task_status: Option<String>,

    /// Completion percentage
    #[serde(rename = "PercentComplete", skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<u8>,
}

/// Request body for UpdateService.SimpleUpdate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleUpdateRequest {
    /// Image URI
    #[serde(rename = "ImageURI")]
    pub image_uri: String,

    /// Transfer protocol
    #[serde(rename = "TransferProtocol", skip_serializing_if = "Option::is_none")]
    pub transfer_protocol: Option<String>,

    /// Username for the image host
    #[serde(rename = "Username", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for the image host
    #[serde(rename = "Password", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// One attribute entry of a BIOS attribute registry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RegistryAttribute {
    /// Attribute name
    #[serde(rename = "AttributeName")]
    pub attribute_name: String,

    /// Whether changing this attribute requires a reboot
    #[serde(rename = "ResetRequired", skip_serializing_if = "Option::is_none")]
    pub reset_required: Option<bool>,
}

/// A BIOS attribute registry, flattened to the entries the diff needs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AttributeRegistry {
    /// Registry attribute entries
    #[serde(rename = "RegistryEntries")]
    pub registry_entries: RegistryEntries,
}

/// RegistryEntries block of an attribute registry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RegistryEntries {
    /// Attribute metadata
    #[serde(rename = "Attributes")]
    pub attributes: Vec<RegistryAttribute>,
}

impl AttributeRegistry {
    /// Whether changing the named attribute requires a reboot. Unknown
    /// attributes are treated as reboot-requiring.
    pub fn reset_required(&self, attribute: &str) -> bool {
        self.registry_entries
            .attributes
            .iter()
            .find(|a| a.attribute_name == attribute)
            .and_then(|a| a.reset_required)
            .unwrap_or(true)
    }
}

/// Attributes map carried by Bios and Manager resources.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// One event inside a Redfish event payload.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RedfishEvent {
    /// Event identifier
    #[serde(rename = "EventId", skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    /// Event type
    #[serde(rename = "EventType", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    /// Severity (OK, Warning, Critical)
    #[serde(rename = "Severity", skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    /// Human-readable message
    #[serde(rename = "Message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of `POST /serverevents/alerts/{hostname}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EventPayload {
    /// Events in this delivery
    #[serde(rename = "Events")]
    pub events: Vec<RedfishEvent>,
}

/// One metric value of a metric report.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MetricValue {
    /// Metric identifier
    #[serde(rename = "MetricId", skip_serializing_if = "Option::is_none")]
    pub metric_id: Option<String>,

    /// Reported value
    #[serde(rename = "MetricValue", skip_serializing_if = "Option::is_none")]
    pub metric_value: Option<String>,
}

/// Body of `POST /serverevents/metricsreport/{hostname}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MetricReportPayload {
    /// Metric values in this report
    #[serde(rename = "MetricValues")]
    pub metric_values: Vec<MetricValue>,
}
