//! BMC and BMCSecret CRDs
//!
//! A BMC is a manageable out-of-band controller. Exactly one of `endpointRef`
//! or the inline `endpoint` block must be set; `endpointRef` is immutable
//! after creation (enforced at admission).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::conditions::Condition;
use crate::references::{ObjectRef, SecretRef};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "BMC",
    namespaced,
    status = "BMCStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BMCSpec {
    /// Reference to the Endpoint this BMC was discovered from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_ref: Option<ObjectRef>,

    /// Inline endpoint for BMCs registered without L2 discovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<InlineEndpoint>,

    /// Credentials used to open management sessions
    pub bmc_secret_ref: SecretRef,

    /// Management protocol
    pub protocol: Protocol,

    /// Serial console access protocol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_protocol: Option<ConsoleProtocol>,

    /// Desired BMC settings object applied by the settings reconciler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc_settings_ref: Option<ObjectRef>,

    /// Hostname used by the event collector to index back to this BMC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// MAC/IP pair carried inline on the BMC spec.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InlineEndpoint {
    /// MAC address, canonical colon-separated lowercase
    pub mac_address: String,

    /// IP address of the BMC
    pub ip: String,
}

/// Management protocol selection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    /// Protocol name
    pub name: ProtocolName,

    /// Management port (e.g. 443 for Redfish)
    pub port: u16,

    /// URI scheme, defaults to https
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

/// Supported management protocols.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ProtocolName {
    /// Standard Redfish over HTTPS
    Redfish,
    /// Redfish served by a local agent
    RedfishLocal,
    /// Redfish proxied through the cluster network
    RedfishKube,
    /// Legacy IPMI
    IPMI,
    /// SSH management fallback
    SSH,
}

/// Serial console protocol.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleProtocol {
    /// Console protocol name (e.g. "SSH", "IPMI")
    pub name: String,

    /// Console port
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BMCStatus {
    /// MAC address resolved from the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,

    /// IP address resolved from the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Manufacturer reported by the manager resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    /// Model reported by the manager resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// SKU reported by the manager resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,

    /// Serial number reported by the manager resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,

    /// BMC firmware version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,

    /// Power state of the manager
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<String>,

    /// Reachability state
    pub state: BMCState,

    /// Conditions (protocol errors, auth failures)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Timestamp of the last BMC reset issued by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reset_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// BMC reachability state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum BMCState {
    /// Not yet connected
    #[default]
    #[serde(alias = "pending")]
    Pending,

    /// Session established, Servers derived
    #[serde(alias = "enabled")]
    Enabled,

    /// Protocol error talking to the BMC
    #[serde(alias = "error")]
    Error,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "BMCSecret",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BMCSecretSpec {
    /// Base64-encoded credential data, keys "username" and "password"
    pub data: BTreeMap<String, String>,

    /// Once true, admission rejects any mutation of data
    #[serde(default)]
    pub immutable: bool,
}

/// Data key for the username entry in a BMCSecret.
pub const SECRET_USERNAME_KEY: &str = "username";
/// Data key for the password entry in a BMCSecret.
pub const SECRET_PASSWORD_KEY: &str = "password";
