//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test data and setting up test
//! scenarios.

#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
#[cfg(test)]
use std::collections::BTreeMap;

/// Helper to create a test Server in a given lifecycle state
#[cfg(test)]
pub fn make_server(name: &str, state: ServerState) -> Server {
    Server {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: ServerSpec {
            system_uuid: format!("uuid-{name}"),
            ..Default::default()
        },
        status: Some(ServerStatus {
            state,
            ..Default::default()
        }),
    }
}

/// Helper to create a labeled test Server
#[cfg(test)]
pub fn make_labeled_server(name: &str, state: ServerState, labels: &[(&str, &str)]) -> Server {
    let mut server = make_server(name, state);
    server.metadata.labels = Some(
        labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );
    server
}

/// Helper to create a test ServerClaim with a label selector
#[cfg(test)]
pub fn make_selector_claim(name: &str, selector: &[(&str, &str)], image: &str) -> ServerClaim {
    ServerClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: ServerClaimSpec {
            power: Power::On,
            server_ref: None,
            server_selector: Some(
                selector
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ignition_secret_ref: None,
            image: image.to_string(),
        },
        status: None,
    }
}

/// Helper to create a test ServerClaim naming an explicit server
#[cfg(test)]
pub fn make_ref_claim(name: &str, server: &str, image: &str) -> ServerClaim {
    ServerClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: ServerClaimSpec {
            power: Power::On,
            server_ref: Some(ObjectRef::new(server)),
            server_selector: None,
            ignition_secret_ref: None,
            image: image.to_string(),
        },
        status: None,
    }
}

/// Helper to create a test ServerMaintenance with a creation timestamp
/// offset (seconds after a fixed epoch) for arbitration ordering
#[cfg(test)]
pub fn make_maintenance(
    name: &str,
    server: &str,
    policy: MaintenancePolicy,
    state: MaintenanceState,
    created_offset_secs: i64,
) -> ServerMaintenance {
    let epoch = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    ServerMaintenance {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            creation_timestamp: Some(Time(epoch + chrono::Duration::seconds(created_offset_secs))),
            ..Default::default()
        },
        spec: ServerMaintenanceSpec {
            policy,
            server_ref: ObjectRef::new(server),
            server_power: Power::Off,
            server_boot_configuration_template: None,
        },
        status: Some(ServerMaintenanceStatus { state }),
    }
}

/// Helper to create a test BIOSSettings with a flat settings map
#[cfg(test)]
pub fn make_bios_settings(name: &str, server: &str, version: &str, settings: &[(&str, &str)]) -> BIOSSettings {
    BIOSSettings {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: BIOSSettingsSpec {
            version: version.to_string(),
            settings_map: settings
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            settings_flow: Vec::new(),
            server_ref: ObjectRef::new(server),
            server_maintenance_policy: MaintenancePolicy::Enforced,
            server_maintenance_ref: None,
            failed_auto_retry_count: 0,
        },
        status: None,
    }
}

/// Helper to create a flow step
#[cfg(test)]
pub fn make_flow_step(name: &str, priority: i32, settings: &[(&str, &str)]) -> SettingsFlowItem {
    SettingsFlowItem {
        name: name.to_string(),
        priority,
        settings: settings
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

/// Helper to create a Redfish ComputerSystem for the mock
#[cfg(test)]
pub fn make_system(id: &str, uuid: &str, power: redfish_client::PowerState) -> redfish_client::ComputerSystem {
    redfish_client::ComputerSystem {
        id: id.to_string(),
        uuid: Some(uuid.to_string()),
        odata_id: Some(format!("/redfish/v1/Systems/{id}")),
        power_state: Some(power),
        ..Default::default()
    }
}

/// Helper to create an attribute registry marking which keys need a reboot
#[cfg(test)]
pub fn make_registry(entries: &[(&str, bool)]) -> redfish_client::AttributeRegistry {
    redfish_client::AttributeRegistry {
        registry_entries: redfish_client::RegistryEntries {
            attributes: entries
                .iter()
                .map(|(name, reboot)| redfish_client::RegistryAttribute {
                    attribute_name: name.to_string(),
                    reset_required: Some(*reboot),
                })
                .collect(),
        },
    }
}

/// Helper for attribute maps
#[cfg(test)]
pub fn make_attributes(entries: &[(&str, serde_json::Value)]) -> redfish_client::Attributes {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect::<BTreeMap<_, _>>()
}
