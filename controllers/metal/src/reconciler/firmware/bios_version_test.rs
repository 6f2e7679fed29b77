//! Unit tests for the firmware version reconciler helpers

#[cfg(test)]
mod tests {
    use crate::reconciler::firmware::bios_version::upgrade_needed;
    use redfish_client::{
        MockRedfishClient, RedfishClientTrait, SimpleUpdateRequest, TaskState,
    };
    use crds::UpdatePolicy;

    #[test]
    fn test_upgrade_skipped_when_versions_match() {
        assert!(!upgrade_needed(Some("2.0"), "2.0", None));
    }

    #[test]
    fn test_upgrade_needed_on_version_drift() {
        assert!(upgrade_needed(Some("1.9"), "2.0", None));
        assert!(upgrade_needed(None, "2.0", None));
    }

    #[test]
    fn test_force_policy_always_upgrades() {
        assert!(upgrade_needed(Some("2.0"), "2.0", Some(UpdatePolicy::Force)));
    }

    /// The device-side flow of S4: first task fails with Exception, the
    /// retry submission completes and the device reports the new version.
    #[tokio::test]
    async fn test_task_exception_then_retry_completes() {
        let mock = MockRedfishClient::new("https://10.0.0.1");
        mock.set_firmware("BIOS", "1.9");
        mock.stage_firmware_update("BIOS", "2.0");
        mock.script_task_outcomes(vec![TaskState::Exception, TaskState::Completed]);

        let request = SimpleUpdateRequest {
            image_uri: "http://x/fw.bin".to_string(),
            transfer_protocol: None,
            username: None,
            password: None,
        };

        // First submission fails
        let uri = mock.simple_update(&request).await.unwrap();
        let task = mock.get_task(&uri).await.unwrap();
        assert_eq!(task.task_state, Some(TaskState::Exception));
        let firmware = mock.get_firmware_inventory("BIOS").await.unwrap();
        assert_eq!(firmware.version.as_deref(), Some("1.9"));

        // Fresh submission succeeds and flashes the staged version
        let uri = mock.simple_update(&request).await.unwrap();
        let task = mock.get_task(&uri).await.unwrap();
        assert_eq!(task.task_state, Some(TaskState::Completed));
        assert_eq!(task.percent_complete, Some(100));
        let firmware = mock.get_firmware_inventory("BIOS").await.unwrap();
        assert_eq!(firmware.version.as_deref(), Some("2.0"));
    }

    #[test]
    fn test_terminal_task_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Exception.is_terminal());
        assert!(TaskState::Killed.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
    }
}
