//! MAC prefix database
//!
//! Maps the OUI prefix of a discovered BMC MAC address to its manufacturer,
//! management protocol, and default credentials. Loaded from the YAML file
//! handed to the controller at startup; lookups match the longest configured
//! prefix.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading or querying the prefix database
#[derive(Debug, Error)]
pub enum MacDbError {
    /// The database file could not be read
    #[error("Failed to read MAC prefix file: {0}")]
    Io(#[from] std::io::Error),

    /// The database file is not valid YAML
    #[error("Failed to parse MAC prefix file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// No entry matches the MAC
    #[error("No MAC prefix entry matches {0}")]
    NoMatch(String),

    /// The MAC address is not parseable
    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),
}

/// One entry of the prefix database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MacPrefixEntry {
    /// Colon-separated lowercase prefix, e.g. "aa:bb:cc"
    pub mac_prefix: String,

    /// Hardware manufacturer
    pub manufacturer: String,

    /// Management protocol name (Redfish, IPMI, SSH)
    pub protocol: String,

    /// Management port
    pub port: u16,

    /// BMC type tag, free-form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// Factory credentials tried in order
    #[serde(default)]
    pub default_credentials: Vec<DefaultCredentials>,

    /// Console access if the vendor exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console: Option<ConsoleEntry>,
}

/// Factory credential pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DefaultCredentials {
    /// Username
    pub username: String,

    /// Password
    pub password: String,
}

/// Console protocol entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEntry {
    /// Console protocol name
    pub r#type: String,

    /// Console port
    pub port: u16,
}

/// Loaded MAC prefix database
#[derive(Debug, Clone)]
pub struct MacPrefixDatabase {
    entries: Vec<MacPrefixEntry>,
}

impl MacPrefixDatabase {
    /// Load the database from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MacDbError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse the database from a YAML string.
    pub fn parse(raw: &str) -> Result<Self, MacDbError> {
        let entries: Vec<MacPrefixEntry> = serde_yaml::from_str(raw)?;
        debug!("Loaded {} MAC prefix entries", entries.len());
        Ok(Self { entries })
    }

    /// Build a database from in-memory entries (for tests).
    pub fn from_entries(entries: Vec<MacPrefixEntry>) -> Self {
        Self { entries }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the database is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the entry with the longest prefix matching the MAC.
    ///
    /// The MAC must already be canonical colon-separated lowercase.
    pub fn lookup(&self, mac: &str) -> Result<&MacPrefixEntry, MacDbError> {
        if mac.len() < 8 || !mac.contains(':') {
            return Err(MacDbError::InvalidMac(mac.to_string()));
        }
        self.entries
            .iter()
            .filter(|e| mac.starts_with(e.mac_prefix.as_str()))
            .max_by_key(|e| e.mac_prefix.len())
            .ok_or_else(|| MacDbError::NoMatch(mac.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
- macPrefix: "aa:bb:cc"
  manufacturer: Dell
  protocol: Redfish
  port: 443
  type: iDRAC
  defaultCredentials:
    - username: u
      password: p
  console:
    type: SSH
    port: 22
- macPrefix: "aa:bb:cc:dd"
  manufacturer: Dell
  protocol: Redfish
  port: 8443
  defaultCredentials:
    - username: root
      password: calvin
- macPrefix: "11:22:33"
  manufacturer: Lenovo
  protocol: IPMI
  port: 623
"#;

    #[test]
    fn test_lookup_matches_prefix() {
        let db = MacPrefixDatabase::parse(SAMPLE).unwrap();
        let entry = db.lookup("11:22:33:44:55:66").unwrap();
        assert_eq!(entry.manufacturer, "Lenovo");
        assert_eq!(entry.protocol, "IPMI");
        assert_eq!(entry.port, 623);
    }

    #[test]
    fn test_lookup_prefers_longest_prefix() {
        let db = MacPrefixDatabase::parse(SAMPLE).unwrap();
        let entry = db.lookup("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(entry.port, 8443);
        let entry = db.lookup("aa:bb:cc:00:11:22").unwrap();
        assert_eq!(entry.port, 443);
    }

    #[test]
    fn test_lookup_unknown_prefix_errors() {
        let db = MacPrefixDatabase::parse(SAMPLE).unwrap();
        assert!(matches!(
            db.lookup("ff:ff:ff:00:00:00"),
            Err(MacDbError::NoMatch(_))
        ));
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let db = MacPrefixDatabase::parse(SAMPLE).unwrap();
        assert!(matches!(db.lookup("nonsense"), Err(MacDbError::InvalidMac(_))));
    }

    #[test]
    fn test_default_credentials_and_console_parse() {
        let db = MacPrefixDatabase::parse(SAMPLE).unwrap();
        let entry = db.lookup("aa:bb:cc:00:11:22").unwrap();
        assert_eq!(entry.default_credentials[0].username, "u");
        assert_eq!(entry.default_credentials[0].password, "p");
        let console = entry.console.as_ref().unwrap();
        assert_eq!(console.r#type, "SSH");
        assert_eq!(console.port, 22);
    }
}
