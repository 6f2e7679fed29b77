//! ServerBootConfiguration reconciler
//!
//! Stateless glue: the external renderer does the actual PXE work and flips
//! Pending to Ready. The controller only verifies referential integrity and
//! marks broken references as Error.

use super::super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::{name_of, namespace_of, status_patch};
use crds::{
    upsert_condition, BootConfigurationState, Condition, ServerBootConfiguration,
    ServerBootConfigurationStatus,
};
use kube::api::{Patch, PatchParams};
use kube_runtime::controller::Action;
use tracing::{debug, info};

impl Reconciler {
    pub(crate) async fn reconcile_boot_configuration(
        &self,
        config: &ServerBootConfiguration,
    ) -> Result<Action, ControllerError> {
        let name = name_of(config, "ServerBootConfiguration")?;
        let namespace = namespace_of(config);

        if crds::is_reconciliation_ignored(config) {
            debug!("ServerBootConfiguration {}/{} has reconciliation ignored", namespace, name);
            return Ok(Action::await_change());
        }
        if config.metadata.deletion_timestamp.is_some() {
            return Ok(Action::await_change());
        }

        debug!("Reconciling ServerBootConfiguration {}/{}", namespace, name);

        let mut broken = Vec::new();
        if self
            .server_api
            .get_opt(&config.spec.server_ref.name)
            .await?
            .is_none()
        {
            broken.push(format!("serverRef {} not found", config.spec.server_ref.name));
        }
        if let Some(secret_ref) = &config.spec.ignition_secret_ref {
            if self.secret_api.get_opt(&secret_ref.name).await?.is_none() {
                broken.push(format!("ignitionSecretRef {} not found", secret_ref.name));
            }
        }

        let current = config.status.clone().unwrap_or_default();
        if !broken.is_empty() {
            let mut status = current.clone();
            status.state = BootConfigurationState::Error;
            upsert_condition(
                &mut status.conditions,
                Condition::new("BrokenReference", "BrokenReference", broken.join("; "))
                    .with_observed_generation(config.metadata.generation),
            );
            if status != current {
                self.boot_config_api
                    .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                info!("ServerBootConfiguration {}/{} has broken references", namespace, name);
            }
            return Ok(Action::await_change());
        }

        // References intact. Ready is written by the renderer; the controller
        // only seeds Pending and clears a stale Error.
        if config.status.is_none() || current.state == BootConfigurationState::Error {
            let status = ServerBootConfigurationStatus {
                state: BootConfigurationState::Pending,
                conditions: Vec::new(),
            };
            self.boot_config_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
        }
        Ok(Action::await_change())
    }
}
