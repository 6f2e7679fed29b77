//! Unit tests for the BMC settings reconciler helpers

#[cfg(test)]
mod tests {
    use crate::reconciler::firmware::settings_diff;
    use crate::test_utils::make_attributes;
    use redfish_client::{Manager, MockRedfishClient, RedfishClientTrait};
    use serde_json::json;

    #[tokio::test]
    async fn test_manager_attribute_patch_applies_immediately() {
        let mock = MockRedfishClient::new("https://10.0.0.1");
        mock.add_manager(Manager {
            id: "1".to_string(),
            firmware_version: Some("7.10".to_string()),
            ..Default::default()
        });
        mock.set_manager_attributes("1", make_attributes(&[("NTPEnabled", json!(false))]));

        let desired = [("NTPEnabled".to_string(), "true".to_string())].into_iter().collect();
        let current = mock.get_manager_attributes("1").await.unwrap();
        let diff = settings_diff(&current, &desired);
        assert_eq!(diff.len(), 1);

        // Manager attributes need no reboot; a verify right after the patch
        // sees the converged state
        mock.patch_manager_attributes("1", &diff).await.unwrap();
        let verified = mock.get_manager_attributes("1").await.unwrap();
        assert!(settings_diff(&verified, &desired).is_empty());
    }

    #[tokio::test]
    async fn test_manager_enumeration_orders_by_id() {
        let mock = MockRedfishClient::new("https://10.0.0.1");
        mock.add_manager(Manager {
            id: "2".to_string(),
            ..Default::default()
        });
        mock.add_manager(Manager {
            id: "1".to_string(),
            ..Default::default()
        });
        let managers = mock.list_managers().await.unwrap();
        assert_eq!(managers[0].id, "1");
        assert_eq!(managers.len(), 2);
    }
}
