//! BMCSettings reconciler
//!
//! Applies desired manager attributes to a BMC. The mutation does not span a
//! host reboot, but it is still disruptive: every server behind the BMC is
//! drained into a maintenance window before the patch is issued.

use super::super::Reconciler;
use super::settings_diff;
use crate::error::ControllerError;
use crate::reconcile_helpers::{
    clear_operation_annotation_patch, name_of, namespace_of, status_patch,
};
use crds::{
    upsert_condition, BMCSettings, BMCSettingsStatus, Condition, MaintenanceState, ObjectRef,
    OperationAnnotation, Server, ServerState, SettingsState, UpdateSettingState, BMC,
};
use kube::api::{ListParams, Patch, PatchParams};
use kube_runtime::controller::Action;
use std::time::Duration;
use tracing::{debug, info, warn};

impl Reconciler {
    pub(crate) async fn reconcile_bmc_settings(
        &self,
        settings: &BMCSettings,
    ) -> Result<Action, ControllerError> {
        let name = name_of(settings, "BMCSettings")?;
        let namespace = namespace_of(settings);
        let resource_key = format!("{}/{}", namespace, name);

        if crds::is_reconciliation_ignored(settings) {
            debug!("BMCSettings {}/{} has reconciliation ignored", namespace, name);
            return Ok(Action::await_change());
        }
        if settings.metadata.deletion_timestamp.is_some() {
            return Ok(Action::await_change());
        }

        let mut status = settings.status.clone().unwrap_or_default();

        if status.state == SettingsState::Failed
            && crds::operation_of(settings) == Some(OperationAnnotation::RetryFailedStateResource)
        {
            status = BMCSettingsStatus {
                observed_generation: settings.metadata.generation,
                ..Default::default()
            };
            self.bmc_settings_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            self.bmc_settings_api
                .patch(
                    &name,
                    &PatchParams::default(),
                    &Patch::Merge(&clear_operation_annotation_patch()),
                )
                .await?;
            return Ok(Action::requeue(Duration::ZERO));
        }

        if status.observed_generation != settings.metadata.generation
            && matches!(status.state, SettingsState::Applied | SettingsState::Failed)
        {
            status = BMCSettingsStatus {
                observed_generation: settings.metadata.generation,
                ..Default::default()
            };
            self.bmc_settings_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            return Ok(Action::requeue(Duration::ZERO));
        }

        let bmc = self
            .bmc_api
            .get_opt(&settings.spec.bmc_ref.name)
            .await?
            .ok_or_else(|| ControllerError::BmcNotFound(settings.spec.bmc_ref.name.clone()))?;

        // Settings are declared for one firmware version; hold otherwise
        if let Some(reported) = bmc.status.as_ref().and_then(|s| s.firmware_version.as_deref()) {
            if reported != settings.spec.version {
                upsert_condition(
                    &mut status.conditions,
                    Condition::new(
                        "BmcVersionMismatch",
                        "VersionHeld",
                        format!("BMC runs {}, settings target {}", reported, settings.spec.version),
                    )
                    .with_observed_generation(settings.metadata.generation),
                );
                self.bmc_settings_api
                    .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                return Ok(Action::requeue(self.config.bmc_resync_interval));
            }
        }

        let result = match status.state {
            SettingsState::Pending => self.bmc_settings_pending(settings, &name, &bmc, status).await,
            SettingsState::InProgress => self.bmc_settings_in_progress(settings, &name, &bmc, status).await,
            SettingsState::Applied | SettingsState::Failed => Ok(Action::await_change()),
        };
        match result {
            Ok(action) => {
                self.reset_error(&resource_key);
                Ok(action)
            }
            Err(e) => {
                self.increment_error(&resource_key);
                Err(e)
            }
        }
    }

    async fn bmc_settings_pending(
        &self,
        settings: &BMCSettings,
        name: &str,
        bmc: &BMC,
        mut status: BMCSettingsStatus,
    ) -> Result<Action, ControllerError> {
        let client = self.bmc_client(bmc).await?;
        let manager_id = self.first_manager_id(client.as_ref()).await?;
        let current = client.get_manager_attributes(&manager_id).await?;
        let diff = settings_diff(&current, &settings.spec.settings_map);

        if diff.is_empty() {
            return self.bmc_settings_applied(settings, name, status).await;
        }

        // Drain every server behind this BMC before touching the manager
        let affected = self.servers_behind_bmc(&settings.spec.bmc_ref.name).await?;
        let mut missing = Vec::new();
        for server in &affected {
            let server_name = name_of(server, "Server")?;
            let requested = settings
                .spec
                .server_maintenance_refs
                .iter()
                .any(|r| r.name == format!("{name}-{server_name}-maintenance"));
            if !requested {
                missing.push(server_name);
            }
        }
        if !missing.is_empty() {
            let mut refs: Vec<ObjectRef> = settings.spec.server_maintenance_refs.clone();
            for server_name in missing {
                let maintenance_name = self
                    .request_maintenance(
                        settings,
                        name,
                        &server_name,
                        settings.spec.server_maintenance_policy,
                    )
                    .await?;
                refs.push(ObjectRef::new(maintenance_name));
            }
            let patch = serde_json::json!({ "spec": { "serverMaintenanceRefs": refs } });
            self.bmc_settings_api
                .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            return Ok(Action::requeue(Duration::from_secs(5)));
        }

        let all_drained = affected.iter().all(|server| {
            server
                .status
                .as_ref()
                .map(|s| s.state == ServerState::Maintenance)
                .unwrap_or(false)
        });
        if !all_drained {
            debug!("BMCSettings {}: waiting for {} server(s) to drain", name, affected.len());
            return Ok(Action::requeue(Duration::from_secs(10)));
        }

        status.state = SettingsState::InProgress;
        status.update_setting_state = Some(UpdateSettingState::IssueSettingUpdate);
        status.auto_retries_remaining = Some(settings.spec.failed_auto_retry_count);
        status.observed_generation = settings.metadata.generation;
        self.bmc_settings_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        info!("BMCSettings {}: starting update ({} keys differ)", name, diff.len());
        Ok(Action::requeue(Duration::ZERO))
    }

    async fn bmc_settings_in_progress(
        &self,
        settings: &BMCSettings,
        name: &str,
        bmc: &BMC,
        mut status: BMCSettingsStatus,
    ) -> Result<Action, ControllerError> {
        let client = self.bmc_client(bmc).await?;
        let manager_id = self.first_manager_id(client.as_ref()).await?;
        let step = status
            .update_setting_state
            .unwrap_or(UpdateSettingState::IssueSettingUpdate);

        match step {
            UpdateSettingState::IssueSettingUpdate => {
                let current = client.get_manager_attributes(&manager_id).await?;
                let diff = settings_diff(&current, &settings.spec.settings_map);
                if diff.is_empty() {
                    return self.bmc_settings_applied(settings, name, status).await;
                }
                client.patch_manager_attributes(&manager_id, &diff).await?;
                info!("BMCSettings {}: issued {} attribute(s)", name, diff.len());
                status.update_setting_state = Some(UpdateSettingState::VerifySettingUpdate);
                self.bmc_settings_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                Ok(Action::requeue(self.config.resource_polling_interval))
            }

            UpdateSettingState::VerifySettingUpdate => {
                let current = client.get_manager_attributes(&manager_id).await?;
                let diff = settings_diff(&current, &settings.spec.settings_map);
                if diff.is_empty() {
                    return self.bmc_settings_applied(settings, name, status).await;
                }
                let retries = status
                    .auto_retries_remaining
                    .unwrap_or(settings.spec.failed_auto_retry_count);
                if retries > 0 {
                    warn!("BMCSettings {}: verification failed, {} retries left", name, retries);
                    status.auto_retries_remaining = Some(retries - 1);
                    status.update_setting_state = Some(UpdateSettingState::IssueSettingUpdate);
                    self.bmc_settings_api
                        .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                        .await?;
                    return Ok(Action::requeue(Duration::ZERO));
                }
                status.state = SettingsState::Failed;
                status.update_setting_state = None;
                status.auto_retries_remaining = Some(0);
                upsert_condition(
                    &mut status.conditions,
                    Condition::new(
                        "SettingsVerificationFailed",
                        "RetriesExhausted",
                        format!("{} key(s) still diverge after applying", diff.len()),
                    )
                    .with_observed_generation(settings.metadata.generation),
                );
                self.bmc_settings_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                self.finish_maintenances(&settings.spec.server_maintenance_refs, MaintenanceState::Failed)
                    .await?;
                Ok(Action::await_change())
            }

            // Manager attribute updates do not span a host reboot
            UpdateSettingState::WaitOnServerRebootPowerOff
            | UpdateSettingState::WaitOnServerRebootPowerOn => {
                status.update_setting_state = Some(UpdateSettingState::VerifySettingUpdate);
                self.bmc_settings_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                Ok(Action::requeue(Duration::ZERO))
            }
        }
    }

    async fn bmc_settings_applied(
        &self,
        settings: &BMCSettings,
        name: &str,
        mut status: BMCSettingsStatus,
    ) -> Result<Action, ControllerError> {
        status.state = SettingsState::Applied;
        status.update_setting_state = None;
        status.last_applied_time = Some(chrono::Utc::now());
        status.observed_generation = settings.metadata.generation;
        self.bmc_settings_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        self.finish_maintenances(&settings.spec.server_maintenance_refs, MaintenanceState::Completed)
            .await?;
        info!("BMCSettings {} applied", name);
        Ok(Action::await_change())
    }

    /// The servers managed through a BMC.
    pub(crate) async fn servers_behind_bmc(
        &self,
        bmc_name: &str,
    ) -> Result<Vec<Server>, ControllerError> {
        let servers = self.server_api.list(&ListParams::default()).await?;
        Ok(servers
            .items
            .into_iter()
            .filter(|s| s.spec.bmc_ref.as_ref().is_some_and(|r| r.name == *bmc_name))
            .collect())
    }

    /// The first manager of a BMC, the one its attributes live on.
    pub(crate) async fn first_manager_id(
        &self,
        client: &dyn redfish_client::RedfishClientTrait,
    ) -> Result<String, ControllerError> {
        let managers = client.list_managers().await?;
        managers
            .first()
            .map(|m| m.id.clone())
            .ok_or_else(|| ControllerError::InvalidState("BMC exposes no managers".to_string()))
    }

    /// Mark a batch of maintenance tickets finished.
    pub(crate) async fn finish_maintenances(
        &self,
        refs: &[ObjectRef],
        outcome: MaintenanceState,
    ) -> Result<(), ControllerError> {
        for maintenance_ref in refs {
            self.finish_maintenance(&Some(maintenance_ref.clone()), outcome)
                .await?;
        }
        Ok(())
    }
}
