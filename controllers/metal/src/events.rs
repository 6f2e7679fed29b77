//! Critical-event sink
//!
//! The discovery registry's event collector forwards Redfish alerts with
//! severity Critical here. The sink resolves the sending BMC hostname back
//! to its Servers and appends a `CriticalEventReceived` condition to each.

use crate::reconcile_helpers::status_patch;
use crds::{upsert_condition, Condition, Server, BMC};
use discovery_registry::EventSink;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Resource};
use redfish_client::RedfishEvent;
use tracing::{debug, warn};

/// Condition type appended for critical Redfish events.
const COND_CRITICAL_EVENT: &str = "CriticalEventReceived";

/// Sink appending conditions to the Servers behind the alerting BMC.
pub struct CriticalEventConditionSink {
    bmc_api: Api<BMC>,
    server_api: Api<Server>,
}

impl CriticalEventConditionSink {
    /// Create a sink writing through the given APIs.
    pub fn new(bmc_api: Api<BMC>, server_api: Api<Server>) -> Self {
        Self { bmc_api, server_api }
    }

    /// BMC names matching a delivery hostname: explicit `spec.hostname`
    /// first, object name as the fallback.
    async fn bmc_names_for_hostname(&self, hostname: &str) -> Vec<String> {
        let Ok(bmcs) = self.bmc_api.list(&ListParams::default()).await else {
            return Vec::new();
        };
        bmcs.items
            .iter()
            .filter(|bmc| {
                bmc.spec.hostname.as_deref() == Some(hostname)
                    || bmc.meta().name.as_deref() == Some(hostname)
            })
            .filter_map(|bmc| bmc.meta().name.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl EventSink for CriticalEventConditionSink {
    async fn critical_event(&self, hostname: &str, event: &RedfishEvent) {
        let bmc_names = self.bmc_names_for_hostname(hostname).await;
        if bmc_names.is_empty() {
            debug!("No BMC matches event hostname {}", hostname);
            return;
        }

        let Ok(servers) = self.server_api.list(&ListParams::default()).await else {
            warn!("Failed to list servers for critical event from {}", hostname);
            return;
        };

        for server in servers.items {
            let behind = server
                .spec
                .bmc_ref
                .as_ref()
                .is_some_and(|r| bmc_names.contains(&r.name));
            if !behind {
                continue;
            }
            let Some(server_name) = server.meta().name.clone() else {
                continue;
            };
            let mut status = server.status.clone().unwrap_or_default();
            upsert_condition(
                &mut status.conditions,
                Condition::new(
                    COND_CRITICAL_EVENT,
                    event.event_id.clone().unwrap_or_else(|| "Unknown".to_string()),
                    event.message.clone().unwrap_or_default(),
                ),
            );
            if let Err(e) = self
                .server_api
                .patch_status(&server_name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await
            {
                warn!("Failed to mark critical event on Server {}: {}", server_name, e);
            }
        }
    }
}
