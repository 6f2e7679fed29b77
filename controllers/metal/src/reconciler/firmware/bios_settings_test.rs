//! Unit tests for the BIOS settings reconciler helpers

#[cfg(test)]
mod tests {
    use crate::reconciler::firmware::bios_settings::{desired_settings, needs_reboot, next_issue};
    use crate::reconciler::firmware::settings_diff;
    use crate::test_utils::*;
    use redfish_client::{MockRedfishClient, PowerState, RedfishClientTrait, ResetType};
    use serde_json::json;

    #[test]
    fn test_desired_settings_merges_map_and_flow() {
        let mut settings = make_bios_settings("bs-1", "s-a", "1.9", &[("NumLock", "On")]);
        settings.spec.settings_flow = vec![
            make_flow_step("later", 2, &[("NumLock", "Off")]),
            make_flow_step("earlier", 1, &[("BootMode", "Uefi")]),
        ];
        let desired = desired_settings(&settings);
        // The later flow step overrides the flat map
        assert_eq!(desired.get("NumLock").map(String::as_str), Some("Off"));
        assert_eq!(desired.get("BootMode").map(String::as_str), Some("Uefi"));
    }

    #[test]
    fn test_next_issue_picks_first_divergent_flow_step() {
        let mut settings = make_bios_settings("bs-1", "s-a", "1.9", &[]);
        settings.spec.settings_flow = vec![
            make_flow_step("second", 2, &[("NumLock", "Off")]),
            make_flow_step("first", 1, &[("BootMode", "Uefi")]),
        ];
        // BootMode already converged, so the second step is next
        let current = make_attributes(&[("BootMode", json!("Uefi")), ("NumLock", json!("On"))]);
        let (step, patch) = next_issue(&settings, &current);
        assert_eq!(step.as_deref(), Some("second"));
        assert_eq!(patch.get("NumLock"), Some(&json!("Off")));
    }

    #[test]
    fn test_next_issue_uses_flat_map_without_flow() {
        let settings = make_bios_settings("bs-1", "s-a", "1.9", &[("NumLock", "Off")]);
        let current = make_attributes(&[("NumLock", json!("On"))]);
        let (step, patch) = next_issue(&settings, &current);
        assert!(step.is_none());
        assert_eq!(patch.len(), 1);
    }

    #[test]
    fn test_reboot_classification_follows_registry() {
        let registry = make_registry(&[("BootMode", true), ("NumLock", false)]);
        let only_numlock = make_attributes(&[("NumLock", json!("Off"))]);
        assert!(!needs_reboot(&registry, &only_numlock));
        let with_bootmode = make_attributes(&[("BootMode", json!("Legacy"))]);
        assert!(needs_reboot(&registry, &with_bootmode));
    }

    #[test]
    fn test_unknown_attributes_classify_as_reboot_required() {
        let registry = make_registry(&[("NumLock", false)]);
        let unknown = make_attributes(&[("SecretKnob", json!("On"))]);
        assert!(needs_reboot(&registry, &unknown));
    }

    /// The device-side round trip of S3: patch staged settings, power cycle,
    /// verify the staged values landed.
    #[tokio::test]
    async fn test_patch_power_cycle_verify_round_trip() {
        let mock = MockRedfishClient::new("https://10.0.0.1");
        mock.add_system(make_system("1", "uuid-1", PowerState::On));
        mock.set_bios_attributes(
            "1",
            make_attributes(&[("BootMode", json!("Uefi")), ("NumLock", json!("On"))]),
        );

        let desired = [("NumLock".to_string(), "Off".to_string())].into_iter().collect();
        let current = mock.get_bios_attributes("1").await.unwrap();
        let diff = settings_diff(&current, &desired);
        assert_eq!(diff.len(), 1);

        mock.patch_bios_attributes("1", &diff).await.unwrap();
        // Staged only; nothing changes until the reboot
        let unchanged = mock.get_bios_attributes("1").await.unwrap();
        assert_eq!(unchanged.get("NumLock"), Some(&json!("On")));

        mock.reset_system("1", ResetType::GracefulShutdown).await.unwrap();
        mock.reset_system("1", ResetType::On).await.unwrap();

        let verified = mock.get_bios_attributes("1").await.unwrap();
        assert!(settings_diff(&verified, &desired).is_empty());
    }

    /// Re-running against converged settings issues no further writes.
    #[tokio::test]
    async fn test_converged_settings_need_no_patch() {
        let mock = MockRedfishClient::new("https://10.0.0.1");
        mock.add_system(make_system("1", "uuid-1", PowerState::Off));
        mock.set_bios_attributes("1", make_attributes(&[("NumLock", json!("Off"))]));

        let desired = [("NumLock".to_string(), "Off".to_string())].into_iter().collect();
        let current = mock.get_bios_attributes("1").await.unwrap();
        assert!(settings_diff(&current, &desired).is_empty());

        mock.reset_calls();
        // A converged diff never reaches patch_bios_attributes
        assert!(mock.calls().is_empty());
    }
}
