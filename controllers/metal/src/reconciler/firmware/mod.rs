//! Firmware reconcilers
//!
//! Handles: BIOS/BMC settings application and BIOS/BMC firmware upgrades,
//! both gated behind the maintenance arbiter when the mutation is disruptive.

pub mod bios_settings;
#[cfg(test)]
pub mod bios_settings_test;
pub mod bmc_settings;
#[cfg(test)]
pub mod bmc_settings_test;
pub mod bios_version;
#[cfg(test)]
pub mod bios_version_test;
pub mod bmc_version;

use redfish_client::Attributes;
use std::collections::BTreeMap;

/// Parse a desired setting string into the JSON value shape the device uses.
pub(crate) fn desired_value(desired: &str) -> serde_json::Value {
    if let Ok(b) = desired.parse::<bool>() {
        return serde_json::Value::Bool(b);
    }
    if let Ok(i) = desired.parse::<i64>() {
        return serde_json::Value::Number(i.into());
    }
    serde_json::Value::String(desired.to_string())
}

/// Whether the current attribute value already equals the desired string.
pub(crate) fn value_matches(current: Option<&serde_json::Value>, desired: &str) -> bool {
    let Some(current) = current else {
        return false;
    };
    match current {
        serde_json::Value::String(s) => s == desired,
        other => *other == desired_value(desired),
    }
}

/// The subset of desired settings that differ from the device.
pub(crate) fn settings_diff(current: &Attributes, desired: &BTreeMap<String, String>) -> Attributes {
    desired
        .iter()
        .filter(|(key, value)| !value_matches(current.get(*key), value))
        .map(|(key, value)| (key.clone(), desired_value(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_matches_handles_types() {
        assert!(value_matches(Some(&json!("Uefi")), "Uefi"));
        assert!(value_matches(Some(&json!(true)), "true"));
        assert!(value_matches(Some(&json!(42)), "42"));
        assert!(!value_matches(Some(&json!("On")), "Off"));
        assert!(!value_matches(None, "On"));
    }

    #[test]
    fn test_settings_diff_picks_only_divergent_keys() {
        let mut current = Attributes::new();
        current.insert("BootMode".to_string(), json!("Uefi"));
        current.insert("NumLock".to_string(), json!("On"));

        let mut desired = BTreeMap::new();
        desired.insert("BootMode".to_string(), "Uefi".to_string());
        desired.insert("NumLock".to_string(), "Off".to_string());

        let diff = settings_diff(&current, &desired);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.get("NumLock"), Some(&json!("Off")));
    }

    #[test]
    fn test_settings_diff_empty_when_converged() {
        let mut current = Attributes::new();
        current.insert("NumLock".to_string(), json!("Off"));
        let mut desired = BTreeMap::new();
        desired.insert("NumLock".to_string(), "Off".to_string());
        assert!(settings_diff(&current, &desired).is_empty());
    }
}
