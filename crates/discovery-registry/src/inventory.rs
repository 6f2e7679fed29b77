//! In-memory inventory store
//!
//! The probe OS booted during discovery posts its inventory here, keyed by
//! system UUID. The Server reconciler polls the store until the report for
//! its UUID arrives. Writes are rare and small, so a single mutex guards the
//! whole map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Inventory report posted by the probe OS.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReport {
    /// DMI/SMBIOS identity
    #[serde(default)]
    pub dmi: DmiInfo,

    /// Total system memory in MiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_system_memory_mib: Option<u64>,

    /// Processor packages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processors: Vec<ProcessorReport>,

    /// Block devices
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<DiskReport>,

    /// NICs with LLDP neighbors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nics: Vec<NicReport>,
}

/// DMI identity block.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DmiInfo {
    /// Manufacturer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    /// Product model
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
}

/// One processor package.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorReport {
    /// Socket identifier
    pub id: String,

    /// Model string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Core count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,

    /// Thread count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
}

/// One block device.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiskReport {
    /// Device name
    pub name: String,

    /// Capacity in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_bytes: Option<u64>,

    /// Media type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// One NIC with what it heard over LLDP.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NicReport {
    /// Interface name
    pub name: String,

    /// MAC address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,

    /// IP acquired during probing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// LLDP neighbors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lldp_neighbors: Vec<LldpNeighborReport>,
}

/// One LLDP neighbor.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LldpNeighborReport {
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

#[derive(Debug, Clone)]
struct StoredInventory {
    report: InventoryReport,
    received_at: std::time::Instant,
}

/// Mutex-guarded inventory map keyed by system UUID
#[derive(Debug, Default)]
pub struct InventoryStore {
    entries: Mutex<HashMap<Uuid, StoredInventory>>,
}

impl InventoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest report for a system. Later posts replace earlier ones.
    pub fn insert(&self, system_uuid: Uuid, report: InventoryReport) {
        debug!("Storing inventory for {}", system_uuid);
        let stored = StoredInventory {
            report,
            received_at: std::time::Instant::now(),
        };
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.insert(system_uuid, stored);
            }
            Err(poisoned) => {
                warn!("Inventory store mutex poisoned, recovering");
                poisoned.into_inner().insert(system_uuid, stored);
            }
        }
    }

    /// Take a consistent snapshot of the report for a system.
    pub fn get(&self, system_uuid: &Uuid) -> Option<InventoryReport> {
        match self.entries.lock() {
            Ok(entries) => entries.get(system_uuid).map(|s| s.report.clone()),
            Err(poisoned) => poisoned.into_inner().get(system_uuid).map(|s| s.report.clone()),
        }
    }

    /// Remove the report for a system, returning whether it was present.
    pub fn remove(&self, system_uuid: &Uuid) -> bool {
        match self.entries.lock() {
            Ok(mut entries) => entries.remove(system_uuid).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(system_uuid).is_some(),
        }
    }

    /// Drop entries older than `ttl`, returning how many were purged.
    pub fn purge_older_than(&self, ttl: Duration) -> usize {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = entries.len();
        entries.retain(|_, stored| stored.received_at.elapsed() < ttl);
        before - entries.len()
    }

    /// Number of stored reports.
    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(serial: &str) -> InventoryReport {
        InventoryReport {
            dmi: DmiInfo {
                serial_number: Some(serial.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_then_get_snapshot() {
        let store = InventoryStore::new();
        let uuid = Uuid::new_v4();
        store.insert(uuid, report("abc"));
        let snapshot = store.get(&uuid).unwrap();
        assert_eq!(snapshot.dmi.serial_number.as_deref(), Some("abc"));
    }

    #[test]
    fn test_later_post_replaces_earlier() {
        let store = InventoryStore::new();
        let uuid = Uuid::new_v4();
        store.insert(uuid, report("old"));
        store.insert(uuid, report("new"));
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(&uuid).unwrap().dmi.serial_number.as_deref(),
            Some("new")
        );
    }

    #[test]
    fn test_purge_drops_stale_entries() {
        let store = InventoryStore::new();
        store.insert(Uuid::new_v4(), report("a"));
        let purged = store.purge_older_than(Duration::from_secs(0));
        assert_eq!(purged, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = InventoryStore::new();
        assert!(store.get(&Uuid::new_v4()).is_none());
    }
}
