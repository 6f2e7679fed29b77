//! Endpoint CRD
//!
//! A discovered (MAC, IP) pairing on the management network. Created by the
//! external L2 discovery; resolved into a BMC by the endpoint reconciler.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::Condition;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal.microscaler.io",
    version = "v1alpha1",
    kind = "Endpoint",
    namespaced,
    status = "EndpointStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSpec {
    /// MAC address, canonical colon-separated lowercase. Unique cluster-wide.
    pub mac_address: String,

    /// IP address observed for the MAC
    pub ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStatus {
    /// Resolution state
    pub state: EndpointState,

    /// Conditions (e.g. UnknownMacPrefix)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Endpoint resolution state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum EndpointState {
    /// MAC prefix not yet resolved to a BMC
    #[default]
    #[serde(alias = "pending")]
    Pending,

    /// A BMC object exists for this endpoint
    #[serde(alias = "resolved")]
    Resolved,
}

/// Canonicalize a MAC address to colon-separated lowercase.
///
/// Accepts colon, dash, or dot separated input as reported by switches.
pub fn canonical_mac(raw: &str) -> Option<String> {
    let hex: String = raw
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect::<String>()
        .to_ascii_lowercase();
    if hex.len() != 12 {
        return None;
    }
    let octets: Vec<&str> = (0..6).map(|i| &hex[i * 2..i * 2 + 2]).collect();
    Some(octets.join(":"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_mac_accepts_separator_variants() {
        assert_eq!(canonical_mac("AA:BB:CC:DD:EE:FF").as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(canonical_mac("aa-bb-cc-dd-ee-ff").as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(canonical_mac("aabb.ccdd.eeff").as_deref(), Some("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_canonical_mac_rejects_short_input() {
        assert_eq!(canonical_mac("aa:bb:cc"), None);
        assert_eq!(canonical_mac(""), None);
    }
}
