//! Server reconciler
//!
//! Owns the per-server lifecycle state machine:
//!
//! Initial -> Discovery -> Available -> Reserved, with Maintenance gating
//! disruptive work and Error terminal until the retry annotation clears it.
//! Each invocation observes the current state, performs at most one
//! externally-visible mutation, and requeues.

use super::super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::{
    clear_annotation_patch, clear_operation_annotation_patch, name_of, namespace_of,
    owner_reference, status_patch,
};
use crds::{
    remove_condition, upsert_condition, BootConfigurationState, Condition, IndicatorLed, ObjectRef,
    OperationAnnotation, Power, Server, ServerBootConfiguration, ServerBootConfigurationSpec,
    ServerInventory, ServerState, ServerStatus, PREVIOUS_STATE_ANNOTATION,
};
use discovery_registry::InventoryReport;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::Resource;
use kube_runtime::controller::Action;
use redfish_client::{PowerState, ResetType};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Condition marking the start of the discovery wait.
const COND_DISCOVERY_STARTED: &str = "DiscoveryStarted";
/// Condition marking an outstanding graceful power-off request.
const COND_POWER_OFF_REQUESTED: &str = "PowerOffRequested";
/// Condition recording a discovery that never produced inventory.
const COND_DISCOVERY_TIMED_OUT: &str = "DiscoveryTimedOut";

/// Map a one-shot power annotation onto its Redfish ResetType.
pub(crate) fn power_annotation_reset(op: OperationAnnotation) -> Option<ResetType> {
    match op {
        OperationAnnotation::GracefulRestartServerPower => Some(ResetType::GracefulRestart),
        OperationAnnotation::HardRestartServerPower => Some(ResetType::ForceRestart),
        OperationAnnotation::PowerCycleServerPower => Some(ResetType::PowerCycle),
        OperationAnnotation::ForceOffServerPower => Some(ResetType::ForceOff),
        OperationAnnotation::ForceOnServerPower => Some(ResetType::ForceOn),
        _ => None,
    }
}

/// Translate a probe OS inventory report into the Server status shape.
pub(crate) fn inventory_from_report(report: &InventoryReport) -> ServerInventory {
    ServerInventory {
        manufacturer: report.dmi.manufacturer.clone(),
        model: report.dmi.model.clone(),
        sku: report.dmi.sku.clone(),
        serial_number: report.dmi.serial_number.clone(),
        bios_version: report.dmi.bios_version.clone(),
        total_system_memory_mib: report.total_system_memory_mib,
        processors: report
            .processors
            .iter()
            .map(|p| crds::ProcessorInventory {
                id: p.id.clone(),
                model: p.model.clone(),
                cores: p.cores,
                threads: p.threads,
            })
            .collect(),
        storages: report
            .disks
            .iter()
            .map(|d| crds::StorageInventory {
                name: d.name.clone(),
                capacity_bytes: d.capacity_bytes,
                media_type: d.media_type.clone(),
            })
            .collect(),
        network_interfaces: report
            .nics
            .iter()
            .map(|n| crds::NetworkInterfaceInventory {
                name: n.name.clone(),
                mac_address: n.mac_address.clone(),
                ip_address: n.ip_address.clone(),
                lldp_neighbors: n
                    .lldp_neighbors
                    .iter()
                    .map(|l| crds::LldpNeighbor {
                        system_name: l.system_name.clone(),
                        chassis_id: l.chassis_id.clone(),
                        port_id: l.port_id.clone(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

impl Reconciler {
    pub(crate) async fn reconcile_server(&self, server: &Server) -> Result<Action, ControllerError> {
        let name = name_of(server, "Server")?;
        let namespace = namespace_of(server);
        let resource_key = format!("{}/{}", namespace, name);

        if crds::is_reconciliation_ignored(server) {
            debug!("Server {}/{} has reconciliation ignored", namespace, name);
            return Ok(Action::await_change());
        }
        if server.metadata.deletion_timestamp.is_some() {
            // Owner references cascade boot configs and claims
            return Ok(Action::await_change());
        }

        let state = server.status.as_ref().map(|s| s.state).unwrap_or_default();
        debug!("Reconciling Server {}/{} in state {:?}", namespace, name, state);

        // Operator retry resets Error to the start of the machine
        if state == ServerState::Error {
            if crds::operation_of(server) == Some(OperationAnnotation::RetryFailedStateResource) {
                let mut status = server.status.clone().unwrap_or_default();
                status.state = ServerState::Initial;
                status.conditions.clear();
                self.server_api
                    .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                self.server_api
                    .patch(
                        &name,
                        &PatchParams::default(),
                        &Patch::Merge(&clear_operation_annotation_patch()),
                    )
                    .await?;
                info!("Server {}/{} reset from Error to Initial", namespace, name);
                return Ok(Action::requeue(Duration::ZERO));
            }
            return Ok(Action::await_change());
        }

        // One-shot Redfish reset requested through the operation annotation
        if let Some(reset) = crds::operation_of(server).and_then(power_annotation_reset) {
            let (client, system_id) = self.server_client(server).await?;
            client.reset_system(&system_id, reset).await?;
            self.server_api
                .patch(
                    &name,
                    &PatchParams::default(),
                    &Patch::Merge(&clear_operation_annotation_patch()),
                )
                .await?;
            info!("Server {}/{}: submitted one-shot {:?}", namespace, name, reset);
            return Ok(Action::requeue(self.config.power_polling_interval));
        }

        let action = match state {
            ServerState::Initial => self.server_initial(server, &name).await,
            ServerState::Discovery => self.server_discovery(server, &name).await,
            ServerState::Available => self.server_available(server, &name).await,
            ServerState::Reserved => self.server_reserved(server, &name).await,
            ServerState::Maintenance => self.server_in_maintenance(server, &name).await,
            ServerState::Error => Ok(Action::await_change()),
        };
        match action {
            Ok(action) => {
                self.reset_error(&resource_key);
                Ok(action)
            }
            Err(e) if e.is_conflict() => {
                debug!("Server {}/{} write conflict, requeueing", namespace, name);
                Ok(Action::requeue(Duration::from_secs(1)))
            }
            Err(e) => {
                self.increment_error(&resource_key);
                Err(e)
            }
        }
    }

    /// Initial: clear stale status, ensure the machine is off, move to
    /// Discovery. Probing is skipped when cached inventory may be reused.
    async fn server_initial(&self, server: &Server, name: &str) -> Result<Action, ControllerError> {
        let (client, system_id) = self.server_client(server).await?;
        let power = client.get_power_state(&system_id).await?;

        let mut status = server.status.clone().unwrap_or_default();

        if power == PowerState::On || power == PowerState::PoweringOn {
            if !self.config.enforce_first_boot && status.inventory.is_some() {
                // Credentials work and we already hold an inventory; no re-probe
                status.state = ServerState::Available;
                status.power_state = Some(Power::On);
                self.server_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                info!("Server {} kept cached inventory, now Available", name);
                return Ok(Action::requeue(Duration::ZERO));
            }
            return self.drive_power_off(server, name, &client, &system_id, status).await;
        }

        // Off: wipe stale observations and enter Discovery
        status.inventory = None;
        status.power_state = Some(Power::Off);
        status.conditions.clear();
        status.state = ServerState::Discovery;
        self.server_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        info!("Server {} entering Discovery", name);
        Ok(Action::requeue(Duration::ZERO))
    }

    /// Discovery: boot the probe OS over PXE and wait for its inventory to
    /// arrive in the registry, bounded by the discovery timeout.
    async fn server_discovery(&self, server: &Server, name: &str) -> Result<Action, ControllerError> {
        let (client, system_id) = self.server_client(server).await?;
        let mut status = server.status.clone().unwrap_or_default();

        let system_uuid = Uuid::parse_str(&server.spec.system_uuid).map_err(|_| {
            ControllerError::InvalidConfig(format!(
                "Server {} has malformed systemUuid {}",
                name, server.spec.system_uuid
            ))
        });
        let system_uuid = match system_uuid {
            Ok(uuid) => uuid,
            Err(e) => {
                status.state = ServerState::Error;
                upsert_condition(
                    &mut status.conditions,
                    Condition::new("MalformedSystemUuid", "MalformedSystemUuid", e.to_string())
                        .with_observed_generation(server.metadata.generation),
                );
                self.server_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                return Ok(Action::await_change());
            }
        };

        // Inventory arrived: record it, power down, go Available
        if let Some(report) = self.registry.get(&system_uuid) {
            status.inventory = Some(inventory_from_report(&report));
            let power = client.get_power_state(&system_id).await?;
            if power != PowerState::Off {
                return self.drive_power_off(server, name, &client, &system_id, status).await;
            }
            self.remove_discovery_boot_config(server, name).await?;
            self.registry.remove(&system_uuid);
            status.power_state = Some(Power::Off);
            status.state = ServerState::Available;
            remove_condition(&mut status.conditions, COND_DISCOVERY_STARTED);
            remove_condition(&mut status.conditions, COND_POWER_OFF_REQUESTED);
            self.server_api
                .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            info!("Server {} inventoried, now Available", name);
            return Ok(Action::requeue(Duration::ZERO));
        }

        // Bound the wait from the first discovery attempt
        let started = status
            .conditions
            .iter()
            .find(|c| c.r#type == COND_DISCOVERY_STARTED)
            .and_then(|c| c.last_transition_time);
        if let Some(started) = started {
            let waited = chrono::Utc::now().signed_duration_since(started);
            if waited.to_std().unwrap_or_default() > self.config.discovery_timeout {
                status.state = ServerState::Error;
                upsert_condition(
                    &mut status.conditions,
                    Condition::new(
                        COND_DISCOVERY_TIMED_OUT,
                        "ProbeSilent",
                        format!("no inventory after {:?}", self.config.discovery_timeout),
                    )
                    .with_observed_generation(server.metadata.generation),
                );
                self.server_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                warn!("Server {} discovery timed out", name);
                return Ok(Action::await_change());
            }
        } else {
            upsert_condition(
                &mut status.conditions,
                Condition::new(COND_DISCOVERY_STARTED, "ProbeBooting", "waiting for probe inventory")
                    .with_observed_generation(server.metadata.generation),
            );
            self.server_api
                .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
        }

        self.ensure_discovery_boot_config(server, name).await?;

        let power = client.get_power_state(&system_id).await?;
        if power == PowerState::Off {
            client.set_boot_override(&system_id, "Pxe", "Once").await?;
            client.reset_system(&system_id, ResetType::On).await?;
            info!("Server {} PXE-booting probe OS", name);
        }
        Ok(Action::requeue(self.config.power_polling_interval))
    }

    /// Available: steady state; observe claim binding and maintenance
    /// admission, and keep the machine at its desired power.
    async fn server_available(&self, server: &Server, name: &str) -> Result<Action, ControllerError> {
        if server.spec.maintenance_ref.is_some() {
            return self.transition(server, name, ServerState::Maintenance).await;
        }
        if server.spec.claim_ref.is_some() {
            return self.transition(server, name, ServerState::Reserved).await;
        }
        if let Some(action) = self.enforce_power(server, name, server.spec.power).await? {
            return Ok(action);
        }
        Ok(Action::requeue(self.config.server_resync_interval))
    }

    /// Reserved: enforce power, boot configuration, boot order, and the
    /// indicator LED against Redfish.
    async fn server_reserved(&self, server: &Server, name: &str) -> Result<Action, ControllerError> {
        if server.spec.maintenance_ref.is_some() {
            return self.transition(server, name, ServerState::Maintenance).await;
        }
        if server.spec.claim_ref.is_none() {
            return self.transition(server, name, ServerState::Available).await;
        }

        // Hold power-on until the render completes
        if server.spec.power == Power::On {
            if let Some(boot_ref) = &server.spec.boot_configuration_ref {
                let config = self.boot_config_api.get_opt(&boot_ref.name).await?;
                let ready = config
                    .and_then(|c| c.status)
                    .map(|s| s.state == BootConfigurationState::Ready)
                    .unwrap_or(false);
                if !ready {
                    debug!("Server {} waiting for boot configuration {}", name, boot_ref.name);
                    return Ok(Action::requeue(Duration::from_secs(10)));
                }
            }
        }

        let (client, system_id) = self.server_client(server).await?;

        if !server.spec.boot_order.is_empty() {
            let system = client.get_system(&system_id).await?;
            let current = system.boot.and_then(|b| b.boot_order).unwrap_or_default();
            if current != server.spec.boot_order {
                client.set_boot_order(&system_id, &server.spec.boot_order).await?;
                info!("Server {}: boot order updated", name);
                return Ok(Action::requeue(Duration::from_secs(1)));
            }
        }

        if let Some(led) = server.spec.indicator_led {
            let observed = server.status.as_ref().and_then(|s| s.indicator_led);
            if observed != Some(led) {
                let value = match led {
                    IndicatorLed::Lit => "Lit",
                    IndicatorLed::Blinking => "Blinking",
                    IndicatorLed::Off => "Off",
                };
                client.set_indicator_led(&system_id, value).await?;
                let mut status = server.status.clone().unwrap_or_default();
                status.indicator_led = Some(led);
                self.server_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                return Ok(Action::requeue(Duration::from_secs(1)));
            }
        }

        if let Some(action) = self.enforce_power(server, name, server.spec.power).await? {
            return Ok(action);
        }
        Ok(Action::requeue(self.config.server_resync_interval))
    }

    /// Maintenance: the arbiter owns the bookkeeping; the server reconciler
    /// only drives the power the ticket requests and gates everything else.
    async fn server_in_maintenance(&self, server: &Server, name: &str) -> Result<Action, ControllerError> {
        let Some(maintenance_ref) = &server.spec.maintenance_ref else {
            // Ticket released: restore the pre-maintenance state
            let previous = server
                .meta()
                .annotations
                .as_ref()
                .and_then(|a| a.get(PREVIOUS_STATE_ANNOTATION))
                .map(String::as_str);
            let restored = match previous {
                Some("Reserved") => ServerState::Reserved,
                _ => ServerState::Available,
            };
            self.server_api
                .patch(
                    name,
                    &PatchParams::default(),
                    &Patch::Merge(&clear_annotation_patch(PREVIOUS_STATE_ANNOTATION)),
                )
                .await?;
            return self.transition(server, name, restored).await;
        };

        let maintenance = self.maintenance_api.get_opt(&maintenance_ref.name).await?;
        let desired_power = maintenance
            .map(|m| m.spec.server_power)
            .unwrap_or(Power::Off);
        if let Some(action) = self.enforce_power(server, name, desired_power).await? {
            return Ok(action);
        }
        Ok(Action::requeue(self.config.server_resync_interval))
    }

    async fn transition(
        &self,
        server: &Server,
        name: &str,
        to: ServerState,
    ) -> Result<Action, ControllerError> {
        let from = server.status.as_ref().map(|s| s.state).unwrap_or_default();
        if !from.can_transition_to(to) {
            return Err(ControllerError::InvalidState(format!(
                "Server {name}: transition {from:?} -> {to:?} not allowed"
            )));
        }
        let mut status = server.status.clone().unwrap_or_default();
        status.state = to;
        self.server_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        info!("Server {} transitioned {:?} -> {:?}", name, from, to);
        Ok(Action::requeue(Duration::ZERO))
    }

    /// Compare desired power with Redfish and converge. Returns the requeue
    /// action while a change is still in flight, None once settled.
    async fn enforce_power(
        &self,
        server: &Server,
        name: &str,
        desired: Power,
    ) -> Result<Option<Action>, ControllerError> {
        let (client, system_id) = self.server_client(server).await?;
        let actual = client.get_power_state(&system_id).await?;

        let observed = match actual {
            PowerState::On | PowerState::PoweringOn => Power::On,
            PowerState::Off | PowerState::PoweringOff => Power::Off,
        };
        if server.status.as_ref().and_then(|s| s.power_state) != Some(observed) {
            let mut status = server.status.clone().unwrap_or_default();
            status.power_state = Some(observed);
            self.server_api
                .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
        }

        match (desired, actual) {
            (Power::On, PowerState::Off) => {
                client.reset_system(&system_id, ResetType::On).await?;
                info!("Server {}: powering on", name);
                Ok(Some(Action::requeue(self.config.power_polling_interval)))
            }
            (Power::Off, PowerState::On) => {
                let status = server.status.clone().unwrap_or_default();
                let action = self
                    .drive_power_off(server, name, &client, &system_id, status)
                    .await?;
                Ok(Some(action))
            }
            (_, PowerState::PoweringOn | PowerState::PoweringOff) => {
                Ok(Some(Action::requeue(self.config.power_polling_interval)))
            }
            _ => Ok(None),
        }
    }

    /// Issue a graceful shutdown once, poll, and escalate to ForceOff after
    /// the polling budget when enforcement is configured.
    async fn drive_power_off(
        &self,
        server: &Server,
        name: &str,
        client: &std::sync::Arc<dyn redfish_client::RedfishClientTrait>,
        system_id: &str,
        mut status: ServerStatus,
    ) -> Result<Action, ControllerError> {
        let requested = status
            .conditions
            .iter()
            .find(|c| c.r#type == COND_POWER_OFF_REQUESTED)
            .and_then(|c| c.last_transition_time);

        match requested {
            None => {
                client
                    .reset_system(system_id, ResetType::GracefulShutdown)
                    .await?;
                upsert_condition(
                    &mut status.conditions,
                    Condition::new(COND_POWER_OFF_REQUESTED, "GracefulShutdown", "waiting for power off")
                        .with_observed_generation(server.metadata.generation),
                );
                self.server_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                Ok(Action::requeue(self.config.power_polling_interval))
            }
            Some(since) => {
                let power = client.get_power_state(system_id).await?;
                if power == PowerState::Off {
                    remove_condition(&mut status.conditions, COND_POWER_OFF_REQUESTED);
                    status.power_state = Some(Power::Off);
                    self.server_api
                        .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                        .await?;
                    return Ok(Action::requeue(Duration::ZERO));
                }
                let waited = chrono::Utc::now()
                    .signed_duration_since(since)
                    .to_std()
                    .unwrap_or_default();
                if waited > self.config.power_polling_timeout {
                    if self.config.enforce_power_off {
                        client.reset_system(system_id, ResetType::ForceOff).await?;
                        warn!("Server {}: graceful shutdown timed out, forcing off", name);
                        return Ok(Action::requeue(self.config.power_polling_interval));
                    }
                    status.state = ServerState::Error;
                    upsert_condition(
                        &mut status.conditions,
                        Condition::new("PowerOffTimedOut", "GracefulShutdownIgnored", "server did not power off")
                            .with_observed_generation(server.metadata.generation),
                    );
                    self.server_api
                        .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                        .await?;
                    return Ok(Action::await_change());
                }
                Ok(Action::requeue(self.config.power_polling_interval))
            }
        }
    }

    /// Install the system-managed probe boot configuration.
    async fn ensure_discovery_boot_config(
        &self,
        server: &Server,
        name: &str,
    ) -> Result<(), ControllerError> {
        let config_name = format!("{name}-discovery");
        if self.boot_config_api.get_opt(&config_name).await?.is_some() {
            return Ok(());
        }
        let config = ServerBootConfiguration {
            metadata: ObjectMeta {
                name: Some(config_name.clone()),
                namespace: server.metadata.namespace.clone(),
                owner_references: Some(vec![owner_reference::<Server>(&server.metadata)?]),
                ..Default::default()
            },
            spec: ServerBootConfigurationSpec {
                server_ref: ObjectRef::new(name),
                image: self.config.probe_os_image.clone(),
                ignition_secret_ref: None,
            },
            status: None,
        };
        match self.boot_config_api.create(&PostParams::default(), &config).await {
            Ok(_) => info!("Created discovery boot configuration {}", config_name),
            Err(kube::Error::Api(e)) if e.code == 409 => {}
            Err(e) => return Err(ControllerError::Kube(e)),
        }
        if server.spec.boot_configuration_ref.is_none() {
            let patch = serde_json::json!({
                "spec": { "bootConfigurationRef": { "name": config_name } }
            });
            self.server_api
                .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
        }
        Ok(())
    }

    /// Remove the probe boot configuration once discovery finishes.
    async fn remove_discovery_boot_config(
        &self,
        server: &Server,
        name: &str,
    ) -> Result<(), ControllerError> {
        let config_name = format!("{name}-discovery");
        match self
            .boot_config_api
            .delete(&config_name, &DeleteParams::default())
            .await
        {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => return Err(ControllerError::Kube(e)),
        }
        let referenced = server
            .spec
            .boot_configuration_ref
            .as_ref()
            .is_some_and(|r| r.name == config_name);
        if referenced {
            let patch = serde_json::json!({
                "spec": { "bootConfigurationRef": serde_json::Value::Null }
            });
            self.server_api
                .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
        }
        Ok(())
    }
}
