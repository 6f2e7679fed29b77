//! BMC reconciler
//!
//! Maintains BMC status (reachability, identity, firmware, power) and derives
//! a Server object for every system in the Redfish Systems collection. A
//! finalizer drains the derived Servers before the BMC itself is released.

use super::super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::{
    clear_operation_annotation_patch, ensure_finalizer, name_of, namespace_of, owner_reference,
    remove_finalizer, status_patch,
};
use crds::{
    upsert_condition, BMCState, Condition, ObjectRef, OperationAnnotation, Server, ServerSpec, BMC,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube_runtime::controller::Action;
use redfish_client::{PowerState, RedfishError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Finalizer draining derived Servers before the BMC goes away.
const BMC_FINALIZER: &str = "metal.microscaler.io/bmc-protection";

impl Reconciler {
    pub(crate) async fn reconcile_bmc(&self, bmc: &BMC) -> Result<Action, ControllerError> {
        let name = name_of(bmc, "BMC")?;
        let namespace = namespace_of(bmc);
        let resource_key = format!("{}/{}", namespace, name);

        if crds::is_reconciliation_ignored(bmc) {
            debug!("BMC {}/{} has reconciliation ignored", namespace, name);
            return Ok(Action::await_change());
        }

        if bmc.metadata.deletion_timestamp.is_some() {
            return self.finalize_bmc(bmc, &name).await;
        }
        ensure_finalizer(&self.bmc_api, bmc, BMC_FINALIZER).await?;

        info!("Reconciling BMC {}/{}", namespace, name);

        let (mac, ip) = self.resolve_bmc_endpoint(bmc).await?;
        let client = match self.bmc_client(bmc).await {
            Ok(client) => client,
            Err(ControllerError::Redfish(RedfishError::Unsupported(protocol))) => {
                self.bmc_error(bmc, &name, "UnsupportedProtocol", &format!("protocol {protocol} has no driver"))
                    .await?;
                return Ok(Action::await_change());
            }
            Err(e) => return Err(e),
        };

        // Connectivity probe doubles as the credentials check
        if let Err(e) = client.get_service_root().await {
            return match e {
                RedfishError::Authentication(msg) => {
                    self.bmc_error(bmc, &name, "AuthFailed", &msg).await?;
                    Ok(Action::await_change())
                }
                RedfishError::Transport(_) => {
                    warn!("BMC {}/{} unreachable: {}", namespace, name, e);
                    self.bmc_pending(bmc, &name).await?;
                    self.increment_error(&resource_key);
                    Ok(self.requeue_with_backoff(&resource_key))
                }
                other => {
                    self.bmc_error(bmc, &name, "ProtocolError", &other.to_string())
                        .await?;
                    self.increment_error(&resource_key);
                    Ok(self.requeue_with_backoff(&resource_key))
                }
            };
        }

        // One-shot BMC reset requested through the operation annotation
        if crds::operation_of(bmc) == Some(OperationAnnotation::ForceResetBmc) {
            let managers = client.list_managers().await?;
            if let Some(manager) = managers.first() {
                client.reset_manager(&manager.id).await?;
                info!("Reset BMC {}/{} on operator request", namespace, name);
            }
            let mut status = bmc.status.clone().unwrap_or_default();
            status.last_reset_time = Some(chrono::Utc::now());
            self.bmc_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            self.bmc_api
                .patch(
                    &name,
                    &PatchParams::default(),
                    &Patch::Merge(&clear_operation_annotation_patch()),
                )
                .await?;
            return Ok(Action::requeue(Duration::from_secs(30)));
        }

        let managers = client.list_managers().await?;
        let manager = managers.first();

        let mut status = bmc.status.clone().unwrap_or_default();
        status.mac_address = Some(mac);
        status.ip = Some(ip);
        if let Some(manager) = manager {
            status.manufacturer = manager.manufacturer.clone();
            status.model = manager.model.clone();
            status.serial_number = manager.serial_number.clone();
            status.firmware_version = manager.firmware_version.clone();
            status.power_state = manager.power_state.map(|p| match p {
                PowerState::On | PowerState::PoweringOn => "On".to_string(),
                PowerState::Off | PowerState::PoweringOff => "Off".to_string(),
            });
        }
        status.state = BMCState::Enabled;
        status.conditions.retain(|c| c.r#type != "AuthFailed" && c.r#type != "ProtocolError");

        if bmc.status.as_ref() != Some(&status) {
            self.bmc_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
        }

        // First successful connect: route this BMC's alerts at the collector
        let was_enabled = bmc
            .status
            .as_ref()
            .map(|s| s.state == BMCState::Enabled)
            .unwrap_or(false);
        if !was_enabled {
            let hostname = bmc.spec.hostname.as_deref().unwrap_or(&name);
            let destination = format!("{}/serverevents/alerts/{}", self.config.registry_url, hostname);
            if let Err(e) = client.create_event_subscription(&destination).await {
                warn!("BMC {}: event subscription failed: {}", name, e);
            }
        }

        self.derive_servers(bmc, &name, client.as_ref()).await?;

        self.reset_error(&resource_key);
        Ok(Action::requeue(self.config.bmc_resync_interval))
    }

    /// Create a Server for every system not yet represented.
    async fn derive_servers(
        &self,
        bmc: &BMC,
        bmc_name: &str,
        client: &dyn redfish_client::RedfishClientTrait,
    ) -> Result<(), ControllerError> {
        let systems = client.list_systems().await?;
        let existing = self.server_api.list(&ListParams::default()).await?;

        for system in systems {
            let Some(uuid) = system.uuid.clone() else {
                warn!("System {} on BMC {} has no UUID, skipping", system.id, bmc_name);
                continue;
            };
            let uuid = uuid.to_lowercase();
            if existing
                .items
                .iter()
                .any(|s| s.spec.system_uuid.eq_ignore_ascii_case(&uuid))
            {
                continue;
            }

            let server_name = format!("{}-{}", bmc_name, system.id.to_lowercase());
            let server = Server {
                metadata: ObjectMeta {
                    name: Some(server_name.clone()),
                    namespace: bmc.metadata.namespace.clone(),
                    owner_references: Some(vec![owner_reference::<BMC>(&bmc.metadata)?]),
                    ..Default::default()
                },
                spec: ServerSpec {
                    system_uuid: uuid.clone(),
                    system_uri: system.odata_id.clone(),
                    bmc_ref: Some(ObjectRef::new(bmc_name)),
                    ..Default::default()
                },
                status: None,
            };
            match self.server_api.create(&PostParams::default(), &server).await {
                Ok(_) => info!("Created Server {} for system {} (uuid {})", server_name, system.id, uuid),
                Err(kube::Error::Api(e)) if e.code == 409 => {
                    debug!("Server {} already exists", server_name);
                }
                Err(e) => return Err(ControllerError::Kube(e)),
            }
        }
        Ok(())
    }

    /// Drain derived Servers, then release the finalizer.
    async fn finalize_bmc(&self, bmc: &BMC, name: &str) -> Result<Action, ControllerError> {
        let servers = self.server_api.list(&ListParams::default()).await?;
        let children: Vec<&Server> = servers
            .items
            .iter()
            .filter(|s| s.spec.bmc_ref.as_ref().is_some_and(|r| r.name == *name))
            .collect();

        if children.is_empty() {
            remove_finalizer(&self.bmc_api, bmc, BMC_FINALIZER).await?;
            info!("BMC {} finalized", name);
            return Ok(Action::await_change());
        }

        for child in children {
            if child.metadata.deletion_timestamp.is_some() {
                continue;
            }
            let child_name = name_of(child, "Server")?;
            info!("Draining Server {} of deleted BMC {}", child_name, name);
            match self.server_api.delete(&child_name, &DeleteParams::default()).await {
                Ok(_) => {}
                Err(kube::Error::Api(e)) if e.code == 404 => {}
                Err(e) => return Err(ControllerError::Kube(e)),
            }
        }
        Ok(Action::requeue(Duration::from_secs(5)))
    }

    async fn bmc_pending(&self, bmc: &BMC, name: &str) -> Result<(), ControllerError> {
        let mut status = bmc.status.clone().unwrap_or_default();
        if status.state == BMCState::Pending {
            return Ok(());
        }
        status.state = BMCState::Pending;
        self.bmc_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        Ok(())
    }

    async fn bmc_error(
        &self,
        bmc: &BMC,
        name: &str,
        reason: &str,
        message: &str,
    ) -> Result<(), ControllerError> {
        let mut status = bmc.status.clone().unwrap_or_default();
        status.state = BMCState::Error;
        upsert_condition(
            &mut status.conditions,
            Condition::new(reason, reason, message).with_observed_generation(bmc.metadata.generation),
        );
        self.bmc_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        Ok(())
    }
}
