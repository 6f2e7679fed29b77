//! Unit tests for the Server state machine helpers

#[cfg(test)]
mod tests {
    use crate::reconciler::lifecycle::server::{inventory_from_report, power_annotation_reset};
    use discovery_registry::{DmiInfo, InventoryReport, LldpNeighborReport, NicReport};
    use crds::OperationAnnotation;
    use redfish_client::ResetType;

    #[test]
    fn test_power_annotations_map_one_to_one() {
        assert_eq!(
            power_annotation_reset(OperationAnnotation::GracefulRestartServerPower),
            Some(ResetType::GracefulRestart)
        );
        assert_eq!(
            power_annotation_reset(OperationAnnotation::HardRestartServerPower),
            Some(ResetType::ForceRestart)
        );
        assert_eq!(
            power_annotation_reset(OperationAnnotation::PowerCycleServerPower),
            Some(ResetType::PowerCycle)
        );
        assert_eq!(
            power_annotation_reset(OperationAnnotation::ForceOffServerPower),
            Some(ResetType::ForceOff)
        );
        assert_eq!(
            power_annotation_reset(OperationAnnotation::ForceOnServerPower),
            Some(ResetType::ForceOn)
        );
    }

    #[test]
    fn test_non_power_annotations_map_to_nothing() {
        assert_eq!(power_annotation_reset(OperationAnnotation::IgnoreReconciliation), None);
        assert_eq!(power_annotation_reset(OperationAnnotation::ForceResetBmc), None);
        assert_eq!(
            power_annotation_reset(OperationAnnotation::RetryFailedStateResource),
            None
        );
    }

    #[test]
    fn test_inventory_conversion_keeps_identity_and_nics() {
        let report = InventoryReport {
            dmi: DmiInfo {
                manufacturer: Some("Dell".to_string()),
                model: Some("R750".to_string()),
                serial_number: Some("ABC123".to_string()),
                bios_version: Some("1.9".to_string()),
                ..Default::default()
            },
            total_system_memory_mib: Some(262144),
            nics: vec![NicReport {
                name: "eth0".to_string(),
                mac_address: Some("aa:bb:cc:dd:ee:ff".to_string()),
                ip_address: Some("10.1.0.7".to_string()),
                lldp_neighbors: vec![LldpNeighborReport {
                    system_name: Some("tor-1".to_string()),
                    chassis_id: Some("11:22:33:44:55:66".to_string()),
                    port_id: Some("Ethernet1/7".to_string()),
                }],
            }],
            ..Default::default()
        };

        let inventory = inventory_from_report(&report);
        assert_eq!(inventory.manufacturer.as_deref(), Some("Dell"));
        assert_eq!(inventory.model.as_deref(), Some("R750"));
        assert_eq!(inventory.bios_version.as_deref(), Some("1.9"));
        assert_eq!(inventory.total_system_memory_mib, Some(262144));
        assert_eq!(inventory.network_interfaces.len(), 1);
        let nic = &inventory.network_interfaces[0];
        assert_eq!(nic.mac_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(nic.lldp_neighbors[0].system_name.as_deref(), Some("tor-1"));
    }

    #[test]
    fn test_inventory_conversion_of_empty_report() {
        let inventory = inventory_from_report(&InventoryReport::default());
        assert!(inventory.manufacturer.is_none());
        assert!(inventory.processors.is_empty());
        assert!(inventory.network_interfaces.is_empty());
    }
}
