//! BMC driver factory
//!
//! Dispatch across management protocols is a closed sum type rather than
//! dynamic registration: the factory maps the declared protocol onto a
//! capability-complete client, and protocols without a wire implementation
//! are refused up front.

use crate::error::RedfishError;
use crate::pool::RedfishClientPool;
use crate::redfish_trait::RedfishClientTrait;
use std::sync::Arc;

/// Management protocols a BMC may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmcProtocol {
    /// Standard Redfish over HTTPS
    Redfish,
    /// Redfish served by a local agent
    RedfishLocal,
    /// Redfish proxied through the cluster network
    RedfishKube,
    /// Legacy IPMI
    Ipmi,
    /// SSH management fallback
    Ssh,
}

impl BmcProtocol {
    /// Parse the protocol name carried on a BMC spec.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Redfish" => Some(Self::Redfish),
            "RedfishLocal" => Some(Self::RedfishLocal),
            "RedfishKube" => Some(Self::RedfishKube),
            "IPMI" => Some(Self::Ipmi),
            "SSH" => Some(Self::Ssh),
            _ => None,
        }
    }
}

/// Resolve a protocol + endpoint into a client from the session pool.
///
/// All Redfish flavors share the HTTP client; IPMI and SSH have no wire
/// implementation here and are refused with `Unsupported`.
pub fn connect(
    pool: &RedfishClientPool,
    protocol: BmcProtocol,
    address: &str,
    username: &str,
    password: &str,
) -> Result<Arc<dyn RedfishClientTrait>, RedfishError> {
    match protocol {
        BmcProtocol::Redfish | BmcProtocol::RedfishLocal | BmcProtocol::RedfishKube => {
            pool.acquire(address, username, password)
        }
        BmcProtocol::Ipmi => Err(RedfishError::Unsupported("IPMI".to_string())),
        BmcProtocol::Ssh => Err(RedfishError::Unsupported("SSH".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_protocol_names() {
        assert_eq!(BmcProtocol::parse("Redfish"), Some(BmcProtocol::Redfish));
        assert_eq!(BmcProtocol::parse("IPMI"), Some(BmcProtocol::Ipmi));
        assert_eq!(BmcProtocol::parse("telnet"), None);
    }

    #[test]
    fn test_unsupported_protocols_are_refused() {
        let pool = RedfishClientPool::new(true);
        let result = connect(&pool, BmcProtocol::Ipmi, "https://10.0.0.1", "u", "p");
        assert!(matches!(result, Err(RedfishError::Unsupported(_))));
    }
}
