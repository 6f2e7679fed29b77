//! Redfish session pool
//!
//! One client per BMC, cached by (address, credentials). A credential change
//! evicts the stale entry so the next acquisition reconnects with the new
//! secret. The pool is bounded; the oldest idle entry is dropped when full.

use crate::client::RedfishClient;
use crate::error::RedfishError;
use crate::redfish_trait::RedfishClientTrait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Default bound on cached sessions.
const DEFAULT_MAX_SESSIONS: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    address: String,
    username: String,
    password: String,
}

/// Bounded cache of Redfish clients keyed by address and credentials
pub struct RedfishClientPool {
    clients: Mutex<PoolState>,
    insecure: bool,
    max_sessions: usize,
}

struct PoolState {
    entries: HashMap<PoolKey, Arc<dyn RedfishClientTrait>>,
    // Insertion order for eviction when the pool is full
    order: Vec<PoolKey>,
}

impl RedfishClientPool {
    /// Create a pool with the default session bound.
    pub fn new(insecure: bool) -> Self {
        Self::with_capacity(insecure, DEFAULT_MAX_SESSIONS)
    }

    /// Create a pool with an explicit session bound.
    pub fn with_capacity(insecure: bool, max_sessions: usize) -> Self {
        Self {
            clients: Mutex::new(PoolState {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
            insecure,
            max_sessions,
        }
    }

    /// Get the cached client for this address/credentials pair, creating one
    /// if absent. Entries for the same address with different credentials are
    /// evicted.
    pub fn acquire(
        &self,
        address: &str,
        username: &str,
        password: &str,
    ) -> Result<Arc<dyn RedfishClientTrait>, RedfishError> {
        let key = PoolKey {
            address: address.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        };

        let mut state = match self.clients.lock() {
            Ok(state) => state,
            Err(poisoned) => {
                warn!("Redfish pool mutex poisoned, recovering");
                poisoned.into_inner()
            }
        };

        if let Some(client) = state.entries.get(&key) {
            return Ok(Arc::clone(client));
        }

        // Credentials rotated: drop any stale session for the same address
        let stale: Vec<PoolKey> = state
            .entries
            .keys()
            .filter(|k| k.address == key.address)
            .cloned()
            .collect();
        for stale_key in stale {
            debug!("Evicting stale Redfish session for {}", stale_key.address);
            state.entries.remove(&stale_key);
            state.order.retain(|k| *k != stale_key);
        }

        if state.entries.len() >= self.max_sessions {
            if let Some(oldest) = state.order.first().cloned() {
                debug!("Session pool full, evicting {}", oldest.address);
                state.entries.remove(&oldest);
                state.order.remove(0);
            }
        }

        let client: Arc<dyn RedfishClientTrait> = Arc::new(RedfishClient::new(
            key.address.clone(),
            key.username.clone(),
            key.password.clone(),
            self.insecure,
        )?);
        state.entries.insert(key.clone(), Arc::clone(&client));
        state.order.push(key);
        Ok(client)
    }

    /// Number of cached sessions.
    pub fn len(&self) -> usize {
        match self.clients.lock() {
            Ok(state) => state.entries.len(),
            Err(poisoned) => poisoned.into_inner().entries.len(),
        }
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for RedfishClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedfishClientPool")
            .field("insecure", &self.insecure)
            .field("max_sessions", &self.max_sessions)
            .field("cached", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_caches_per_credentials() {
        let pool = RedfishClientPool::new(true);
        let a = pool.acquire("https://10.0.0.1", "root", "calvin").unwrap();
        let b = pool.acquire("https://10.0.0.1", "root", "calvin").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_credential_change_evicts_stale_session() {
        let pool = RedfishClientPool::new(true);
        let _old = pool.acquire("https://10.0.0.1", "root", "calvin").unwrap();
        let _new = pool.acquire("https://10.0.0.1", "root", "rotated").unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_pool_bound_evicts_oldest() {
        let pool = RedfishClientPool::with_capacity(true, 2);
        let _a = pool.acquire("https://10.0.0.1", "u", "p").unwrap();
        let _b = pool.acquire("https://10.0.0.2", "u", "p").unwrap();
        let _c = pool.acquire("https://10.0.0.3", "u", "p").unwrap();
        assert_eq!(pool.len(), 2);
    }
}
