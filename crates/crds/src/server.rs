//! Server CRD
//!
//! The managed physical system, distinct from its BMC. The status `state`
//! field is the heart of the lifecycle state machine:
//!
//! Initial -> Discovery -> Available -> Reserved, with Maintenance entered
//! from Available or Reserved and Error reachable from any non-Initial state.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::bmc::Protocol;
use crate::conditions::Condition;
use crate::references::{ObjectRef, SecretRef};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "Server",
    namespaced,
    status = "ServerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    /// Redfish system UUID. Unique and immutable.
    pub system_uuid: String,

    /// Redfish URI of the ComputerSystem resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_uri: Option<String>,

    /// Desired power state
    #[serde(default)]
    pub power: Power,

    /// Desired indicator LED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicator_led: Option<IndicatorLed>,

    /// Claim currently bound to this server; cleared on release, never swapped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_ref: Option<ObjectRef>,

    /// Maintenance ticket currently holding this server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_ref: Option<ObjectRef>,

    /// BMC managing this server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc_ref: Option<ObjectRef>,

    /// Inline BMC access for servers without a BMC object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc: Option<InlineBmcAccess>,

    /// Normal boot configuration, installed while Reserved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_configuration_ref: Option<ObjectRef>,

    /// Boot configuration installed while in Maintenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_boot_configuration_ref: Option<ObjectRef>,

    /// Ordered boot device names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub boot_order: Vec<String>,

    /// Desired BIOS settings object forwarded to the settings reconciler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bios_settings_ref: Option<ObjectRef>,
}

/// Inline BMC access block for servers registered without a BMC object.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InlineBmcAccess {
    /// BMC address
    pub address: String,

    /// Management protocol
    pub protocol: Protocol,

    /// Credentials
    pub bmc_secret_ref: SecretRef,
}

/// Desired or observed power state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum Power {
    /// Powered on
    On,
    /// Powered off
    #[default]
    Off,
}

/// Chassis indicator LED setting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum IndicatorLed {
    /// Steady on
    Lit,
    /// Blinking for identification
    Blinking,
    /// Off
    Off,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    /// Hardware inventory collected during discovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<ServerInventory>,

    /// Observed power state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<Power>,

    /// Observed indicator LED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicator_led: Option<IndicatorLed>,

    /// Lifecycle state
    pub state: ServerState,

    /// Conditions (DiscoveryTimedOut, AuthFailed, CriticalEventReceived, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ServerState {
    /// Just created, status not yet initialized
    #[default]
    #[serde(alias = "initial")]
    Initial,

    /// Probe OS boot in progress, waiting for inventory
    #[serde(alias = "discovery")]
    Discovery,

    /// Inventoried and free for claiming
    #[serde(alias = "available")]
    Available,

    /// Bound to a ServerClaim
    #[serde(alias = "reserved")]
    Reserved,

    /// Held by a ServerMaintenance ticket
    #[serde(alias = "maintenance")]
    Maintenance,

    /// Terminal until the retry annotation clears it
    #[serde(alias = "error")]
    Error,
}

impl ServerState {
    /// Whether the transition from `self` to `to` is allowed by the
    /// lifecycle graph.
    pub fn can_transition_to(self, to: ServerState) -> bool {
        use ServerState::*;
        match (self, to) {
            (Initial, Discovery) => true,
            (Discovery, Available) | (Discovery, Error) => true,
            (Available, Reserved) | (Available, Maintenance) => true,
            (Reserved, Available) | (Reserved, Maintenance) => true,
            (Maintenance, Available) | (Maintenance, Reserved) => true,
            // Irrecoverable errors from any non-Initial state
            (Available, Error) | (Reserved, Error) | (Maintenance, Error) => true,
            // Operator retry resets Error back to the start of the machine
            (Error, Initial) => true,
            (a, b) => a == b,
        }
    }
}

/// Inventory reported by the probe OS or read from Redfish.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerInventory {
    /// System manufacturer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    /// System model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// SKU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,

    /// Serial number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,

    /// BIOS version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bios_version: Option<String>,

    /// Total system memory in MiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_system_memory_mib: Option<u64>,

    /// Processors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processors: Vec<ProcessorInventory>,

    /// Storage devices
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storages: Vec<StorageInventory>,

    /// Network interfaces with LLDP neighbors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_interfaces: Vec<NetworkInterfaceInventory>,
}

/// One processor package.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorInventory {
    /// Socket or slot identifier
    pub id: String,

    /// Processor model string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Core count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,

    /// Thread count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
}

/// One storage device.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageInventory {
    /// Device name
    pub name: String,

    /// Capacity in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_bytes: Option<u64>,

    /// Rotational or solid-state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// One NIC, including what the probe OS heard over LLDP.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceInventory {
    /// Interface name
    pub name: String,

    /// MAC address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,

    /// IP address if one was acquired during probing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// LLDP neighbors seen on this interface
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lldp_neighbors: Vec<LldpNeighbor>,
}

/// A neighbor reported via LLDP.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LldpNeighbor {
    /// Neighbor system name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_name: Option<String>,

    /// Neighbor chassis ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chassis_id: Option<String>,

    /// Neighbor port ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_graph_allows_documented_transitions() {
        use ServerState::*;
        assert!(Initial.can_transition_to(Discovery));
        assert!(Discovery.can_transition_to(Available));
        assert!(Discovery.can_transition_to(Error));
        assert!(Available.can_transition_to(Reserved));
        assert!(Reserved.can_transition_to(Available));
        assert!(Available.can_transition_to(Maintenance));
        assert!(Reserved.can_transition_to(Maintenance));
        assert!(Maintenance.can_transition_to(Reserved));
        assert!(Error.can_transition_to(Initial));
    }

    #[test]
    fn test_lifecycle_graph_rejects_shortcuts() {
        use ServerState::*;
        assert!(!Initial.can_transition_to(Available));
        assert!(!Initial.can_transition_to(Error));
        assert!(!Available.can_transition_to(Discovery));
        assert!(!Error.can_transition_to(Available));
        assert!(!Reserved.can_transition_to(Discovery));
    }
}
