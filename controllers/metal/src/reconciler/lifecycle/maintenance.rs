//! Maintenance arbiter
//!
//! Admits at most one ServerMaintenance per Server. Pending tickets queue
//! behind the policy gate; the admitted ticket drains the server into
//! Maintenance, installs the maintenance boot configuration, and releases
//! everything once the requestor marks the ticket Completed or Failed.

use super::super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::{
    ensure_finalizer, name_of, namespace_of, owner_reference, remove_finalizer,
    set_annotation_patch, status_patch,
};
use crds::{
    MaintenancePolicy, MaintenanceState, ObjectRef, Server, ServerBootConfiguration,
    ServerBootConfigurationSpec, ServerMaintenance, ServerMaintenanceStatus, ServerState,
    MAINTENANCE_APPROVAL_ANNOTATION, PREVIOUS_STATE_ANNOTATION,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Resource;
use kube_runtime::controller::Action;
use std::time::Duration;
use tracing::{debug, info};

/// Finalizer releasing the held server before the ticket goes away.
const MAINTENANCE_FINALIZER: &str = "metal.microscaler.io/maintenance-release";

fn state_of(m: &ServerMaintenance) -> MaintenanceState {
    m.status.as_ref().map(|s| s.state).unwrap_or_default()
}

/// Pick the ticket to admit next: oldest creation timestamp, name as the
/// tie-break.
pub(crate) fn pick_next<'a>(pending: &[&'a ServerMaintenance]) -> Option<&'a ServerMaintenance> {
    pending
        .iter()
        .min_by(|a, b| {
            let at = a.meta().creation_timestamp.as_ref().map(|t| t.0);
            let bt = b.meta().creation_timestamp.as_ref().map(|t| t.0);
            at.cmp(&bt).then_with(|| a.meta().name.cmp(&b.meta().name))
        })
        .copied()
}

/// Whether the policy gate lets a ticket through.
///
/// Enforced admits immediately. OwnerApproval admits when the server is
/// Available, or when the approval annotation is present on either the
/// server or the ticket.
pub(crate) fn approval_granted(server: &Server, m: &ServerMaintenance) -> bool {
    match m.spec.policy {
        MaintenancePolicy::Enforced => true,
        MaintenancePolicy::OwnerApproval => {
            let server_state = server.status.as_ref().map(|s| s.state).unwrap_or_default();
            if server_state == ServerState::Available {
                return true;
            }
            let annotated = |meta: &ObjectMeta| {
                meta.annotations
                    .as_ref()
                    .and_then(|a| a.get(MAINTENANCE_APPROVAL_ANNOTATION))
                    .is_some_and(|v| v == "true")
            };
            annotated(server.meta()) || annotated(m.meta())
        }
    }
}

impl Reconciler {
    pub(crate) async fn reconcile_server_maintenance(
        &self,
        m: &ServerMaintenance,
    ) -> Result<Action, ControllerError> {
        let name = name_of(m, "ServerMaintenance")?;
        let namespace = namespace_of(m);

        if crds::is_reconciliation_ignored(m) {
            debug!("ServerMaintenance {}/{} has reconciliation ignored", namespace, name);
            return Ok(Action::await_change());
        }

        if m.metadata.deletion_timestamp.is_some() {
            if state_of(m) == MaintenanceState::InMaintenance {
                self.release_server(m, &name).await?;
            }
            remove_finalizer(&self.maintenance_api, m, MAINTENANCE_FINALIZER).await?;
            return Ok(Action::await_change());
        }
        ensure_finalizer(&self.maintenance_api, m, MAINTENANCE_FINALIZER).await?;

        info!("Reconciling ServerMaintenance {}/{}", namespace, name);

        match state_of(m) {
            MaintenanceState::Pending => self.arbitrate(m, &name).await,
            MaintenanceState::InMaintenance => self.drive_admitted(m, &name).await,
            MaintenanceState::Completed | MaintenanceState::Failed => {
                self.release_server(m, &name).await?;
                Ok(Action::await_change())
            }
        }
    }

    /// Single-writer arbitration for the target server.
    async fn arbitrate(&self, m: &ServerMaintenance, name: &str) -> Result<Action, ControllerError> {
        let server_name = m.spec.server_ref.name.clone();
        let server = self
            .server_api
            .get_opt(&server_name)
            .await?
            .ok_or_else(|| ControllerError::ServerNotFound(server_name.clone()))?;

        let all = self.maintenance_api.list(&ListParams::default()).await?;
        let for_server: Vec<&ServerMaintenance> = all
            .items
            .iter()
            .filter(|other| other.spec.server_ref.name == server_name)
            .collect();

        if for_server
            .iter()
            .any(|other| state_of(other) == MaintenanceState::InMaintenance)
        {
            debug!("ServerMaintenance {}: server {} already held", name, server_name);
            return Ok(Action::await_change());
        }

        let pending: Vec<&ServerMaintenance> = for_server
            .iter()
            .copied()
            .filter(|other| state_of(other) == MaintenanceState::Pending)
            .collect();
        let next = pick_next(&pending);
        if next.and_then(|n| n.meta().name.as_deref()) != Some(name) {
            debug!("ServerMaintenance {}: not first in line for {}", name, server_name);
            return Ok(Action::await_change());
        }

        if !approval_granted(&server, m) {
            debug!("ServerMaintenance {}: waiting for owner approval", name);
            return Ok(Action::requeue(Duration::from_secs(30)));
        }

        self.admit(m, name, &server, &server_name).await
    }

    /// Admit the ticket: record the pre-maintenance state, stamp the server,
    /// install the maintenance boot configuration, flip the ticket to
    /// InMaintenance. The server reconciler performs the state transition
    /// once it observes the stamp.
    async fn admit(
        &self,
        m: &ServerMaintenance,
        name: &str,
        server: &Server,
        server_name: &str,
    ) -> Result<Action, ControllerError> {
        let current_state = server.status.as_ref().map(|s| s.state).unwrap_or_default();
        let previous = match current_state {
            ServerState::Reserved => "Reserved",
            _ => "Available",
        };
        self.server_api
            .patch(
                server_name,
                &PatchParams::default(),
                &Patch::Merge(&set_annotation_patch(PREVIOUS_STATE_ANNOTATION, previous)),
            )
            .await?;

        let mut server_patch = serde_json::json!({
            "spec": { "maintenanceRef": { "name": name } }
        });
        if let Some(template) = &m.spec.server_boot_configuration_template {
            let config_name = self.ensure_maintenance_boot_config(m, name, server_name, template).await?;
            server_patch["spec"]["maintenanceBootConfigurationRef"] =
                serde_json::json!({ "name": config_name });
        }
        self.server_api
            .patch(server_name, &PatchParams::default(), &Patch::Merge(&server_patch))
            .await?;

        let status = ServerMaintenanceStatus {
            state: MaintenanceState::InMaintenance,
        };
        self.maintenance_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        info!("ServerMaintenance {} admitted, holding Server {}", name, server_name);
        Ok(Action::requeue(Duration::ZERO))
    }

    /// Keep the admitted ticket's stamps in place while the requestor works.
    async fn drive_admitted(&self, m: &ServerMaintenance, name: &str) -> Result<Action, ControllerError> {
        let server_name = m.spec.server_ref.name.clone();
        let Some(server) = self.server_api.get_opt(&server_name).await? else {
            // The server vanished under the ticket
            let status = ServerMaintenanceStatus {
                state: MaintenanceState::Failed,
            };
            self.maintenance_api
                .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            return Ok(Action::await_change());
        };

        let stamped = server
            .spec
            .maintenance_ref
            .as_ref()
            .is_some_and(|r| r.name == *name);
        if !stamped {
            let patch = serde_json::json!({
                "spec": { "maintenanceRef": { "name": name } }
            });
            self.server_api
                .patch(&server_name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
        }
        Ok(Action::await_change())
    }

    /// Release the server held by a finished ticket: remove the maintenance
    /// boot configuration and clear the stamps. The server reconciler
    /// restores the pre-maintenance state from its annotation.
    async fn release_server(&self, m: &ServerMaintenance, name: &str) -> Result<(), ControllerError> {
        let server_name = m.spec.server_ref.name.clone();
        let Some(server) = self.server_api.get_opt(&server_name).await? else {
            return Ok(());
        };
        let ours = server
            .spec
            .maintenance_ref
            .as_ref()
            .is_some_and(|r| r.name == *name);
        if !ours {
            return Ok(());
        }

        if let Some(config_ref) = &server.spec.maintenance_boot_configuration_ref {
            match self
                .boot_config_api
                .delete(&config_ref.name, &DeleteParams::default())
                .await
            {
                Ok(_) => {}
                Err(kube::Error::Api(e)) if e.code == 404 => {}
                Err(e) => return Err(ControllerError::Kube(e)),
            }
        }

        let patch = serde_json::json!({
            "spec": {
                "maintenanceRef": serde_json::Value::Null,
                "maintenanceBootConfigurationRef": serde_json::Value::Null,
            }
        });
        self.server_api
            .patch(&server_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!("ServerMaintenance {}: released Server {}", name, server_name);
        Ok(())
    }

    async fn ensure_maintenance_boot_config(
        &self,
        m: &ServerMaintenance,
        name: &str,
        server_name: &str,
        template: &crds::BootConfigurationTemplate,
    ) -> Result<String, ControllerError> {
        let config_name = format!("{name}-{}", template.name);
        if self.boot_config_api.get_opt(&config_name).await?.is_some() {
            return Ok(config_name);
        }
        let config = ServerBootConfiguration {
            metadata: ObjectMeta {
                name: Some(config_name.clone()),
                namespace: m.metadata.namespace.clone(),
                owner_references: Some(vec![owner_reference::<ServerMaintenance>(&m.metadata)?]),
                ..Default::default()
            },
            spec: ServerBootConfigurationSpec {
                server_ref: ObjectRef::new(server_name),
                image: template.image.clone(),
                ignition_secret_ref: template.ignition_secret_ref.clone(),
            },
            status: None,
        };
        match self.boot_config_api.create(&PostParams::default(), &config).await {
            Ok(_) => info!("Created maintenance boot configuration {}", config_name),
            Err(kube::Error::Api(e)) if e.code == 409 => {}
            Err(e) => return Err(ControllerError::Kube(e)),
        }
        Ok(config_name)
    }
}
