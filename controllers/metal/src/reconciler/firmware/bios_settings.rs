//! BIOSSettings reconciler
//!
//! Computes the diff between desired and device BIOS attributes, requests a
//! maintenance window when any differing key requires a reboot, then walks
//! the reboot-spanning inner state machine:
//!
//! Pending -> IssueSettingUpdate -> WaitOnServerRebootPowerOff
//!         -> WaitOnServerRebootPowerOn -> VerifySettingUpdate
//!         -> Applied | Failed

use super::super::Reconciler;
use super::{settings_diff, value_matches};
use crate::error::ControllerError;
use crate::reconcile_helpers::{
    clear_operation_annotation_patch, name_of, namespace_of, owner_reference, status_patch,
};
use crds::{
    ordered_flow, upsert_condition, BIOSSettings, BIOSSettingsStatus, Condition, MaintenanceState,
    ObjectRef, OperationAnnotation, Server, ServerMaintenance, ServerMaintenanceSpec,
    ServerMaintenanceStatus, ServerState, SettingsState, UpdateSettingState,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Patch, PatchParams, PostParams};
use kube_runtime::controller::Action;
use redfish_client::{Attributes, AttributeRegistry, PowerState, ResetType};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The union of everything the spec wants on the device: the flat map plus
/// every flow step, later steps overriding earlier keys.
pub(crate) fn desired_settings(settings: &BIOSSettings) -> BTreeMap<String, String> {
    let mut desired = settings.spec.settings_map.clone();
    for step in ordered_flow(&settings.spec.settings_flow) {
        for (key, value) in &step.settings {
            desired.insert(key.clone(), value.clone());
        }
    }
    desired
}

/// The next patch to issue: the first flow step (priority order) that still
/// diverges, or the flat map when no flow is declared. Returns the step name
/// for verification bookkeeping.
pub(crate) fn next_issue(
    settings: &BIOSSettings,
    current: &Attributes,
) -> (Option<String>, Attributes) {
    if !settings.spec.settings_flow.is_empty() {
        for step in ordered_flow(&settings.spec.settings_flow) {
            let diff = settings_diff(current, &step.settings);
            if !diff.is_empty() {
                return (Some(step.name.clone()), diff);
            }
        }
        return (None, Attributes::new());
    }
    (None, settings_diff(current, &settings.spec.settings_map))
}

/// Whether any differing key requires a reboot per the attribute registry.
pub(crate) fn needs_reboot(registry: &AttributeRegistry, diff: &Attributes) -> bool {
    diff.keys().any(|key| registry.reset_required(key))
}

impl Reconciler {
    pub(crate) async fn reconcile_bios_settings(
        &self,
        settings: &BIOSSettings,
    ) -> Result<Action, ControllerError> {
        let name = name_of(settings, "BIOSSettings")?;
        let namespace = namespace_of(settings);
        let resource_key = format!("{}/{}", namespace, name);

        if crds::is_reconciliation_ignored(settings) {
            debug!("BIOSSettings {}/{} has reconciliation ignored", namespace, name);
            return Ok(Action::await_change());
        }
        if settings.metadata.deletion_timestamp.is_some() {
            return Ok(Action::await_change());
        }

        let mut status = settings.status.clone().unwrap_or_default();

        // One-shot operator reset from Failed
        if status.state == SettingsState::Failed
            && crds::operation_of(settings) == Some(OperationAnnotation::RetryFailedStateResource)
        {
            status = BIOSSettingsStatus {
                observed_generation: settings.metadata.generation,
                ..Default::default()
            };
            self.bios_settings_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            self.bios_settings_api
                .patch(
                    &name,
                    &PatchParams::default(),
                    &Patch::Merge(&clear_operation_annotation_patch()),
                )
                .await?;
            info!("BIOSSettings {} reset to Pending on operator request", name);
            return Ok(Action::requeue(Duration::ZERO));
        }

        // A new generation restarts the machine from Pending
        if status.observed_generation != settings.metadata.generation
            && matches!(status.state, SettingsState::Applied | SettingsState::Failed)
        {
            status = BIOSSettingsStatus {
                observed_generation: settings.metadata.generation,
                ..Default::default()
            };
            self.bios_settings_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            return Ok(Action::requeue(Duration::ZERO));
        }

        let server = self
            .server_api
            .get_opt(&settings.spec.server_ref.name)
            .await?
            .ok_or_else(|| ControllerError::ServerNotFound(settings.spec.server_ref.name.clone()))?;

        // Settings are declared for one BIOS version; hold until it matches
        if let Some(reported) = server
            .status
            .as_ref()
            .and_then(|s| s.inventory.as_ref())
            .and_then(|i| i.bios_version.as_deref())
        {
            if reported != settings.spec.version {
                upsert_condition(
                    &mut status.conditions,
                    Condition::new(
                        "BiosVersionMismatch",
                        "VersionHeld",
                        format!("device runs {}, settings target {}", reported, settings.spec.version),
                    )
                    .with_observed_generation(settings.metadata.generation),
                );
                self.bios_settings_api
                    .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                return Ok(Action::requeue(self.config.server_resync_interval));
            }
        }

        let result = match status.state {
            SettingsState::Pending => self.bios_settings_pending(settings, &name, &server, status).await,
            SettingsState::InProgress => self.bios_settings_in_progress(settings, &name, &server, status).await,
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

    /// Pending: diff, classify, and gate behind maintenance when a reboot is
    /// required.
    async fn bios_settings_pending(
        &self,
        settings: &BIOSSettings,
        name: &str,
        server: &Server,
        mut status: BIOSSettingsStatus,
    ) -> Result<Action, ControllerError> {
        let (client, system_id) = self.server_client(server).await?;
        let current = client.get_bios_attributes(&system_id).await?;
        let desired = desired_settings(settings);
        let diff = settings_diff(&current, &desired);

        if diff.is_empty() {
            return self.bios_settings_applied(settings, name, status).await;
        }

        // Unknown registries classify conservatively: everything reboots
        let registry = client
            .get_bios_attribute_registry(&system_id)
            .await
            .unwrap_or_default();
        let reboot = needs_reboot(&registry, &diff);

        if reboot {
            match &settings.spec.server_maintenance_ref {
                None => {
                    let maintenance_name = self
                        .request_maintenance(
                            settings,
                            name,
                            &settings.spec.server_ref.name,
                            settings.spec.server_maintenance_policy,
                        )
                        .await?;
                    let patch = serde_json::json!({
                        "spec": { "serverMaintenanceRef": { "name": maintenance_name } }
                    });
                    self.bios_settings_api
                        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                        .await?;
                    return Ok(Action::requeue(Duration::from_secs(5)));
                }
                Some(_) => {
                    let server_state = server.status.as_ref().map(|s| s.state).unwrap_or_default();
                    if server_state != ServerState::Maintenance {
                        debug!("BIOSSettings {}: waiting for maintenance window", name);
                        return Ok(Action::requeue(Duration::from_secs(10)));
                    }
                }
            }
        }

        status.state = SettingsState::InProgress;
        status.update_setting_state = Some(UpdateSettingState::IssueSettingUpdate);
        status.auto_retries_remaining = Some(settings.spec.failed_auto_retry_count);
        status.observed_generation = settings.metadata.generation;
        self.bios_settings_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        info!("BIOSSettings {}: starting update ({} keys differ)", name, diff.len());
        Ok(Action::requeue(Duration::ZERO))
    }

    /// InProgress: walk the inner steps.
    async fn bios_settings_in_progress(
        &self,
        settings: &BIOSSettings,
        name: &str,
        server: &Server,
        mut status: BIOSSettingsStatus,
    ) -> Result<Action, ControllerError> {
        let (client, system_id) = self.server_client(server).await?;
        let step = status
            .update_setting_state
            .unwrap_or(UpdateSettingState::IssueSettingUpdate);

        match step {
            UpdateSettingState::IssueSettingUpdate => {
                let current = client.get_bios_attributes(&system_id).await?;
                let desired = desired_settings(settings);
                if settings_diff(&current, &desired).is_empty() {
                    return self.bios_settings_applied(settings, name, status).await;
                }
                let (issued_step, patch_map) = next_issue(settings, &current);
                client.patch_bios_attributes(&system_id, &patch_map).await?;
                info!("BIOSSettings {}: issued {} attribute(s)", name, patch_map.len());

                let registry = client
                    .get_bios_attribute_registry(&system_id)
                    .await
                    .unwrap_or_default();
                status.last_issued_flow_step = issued_step;
                if needs_reboot(&registry, &patch_map) {
                    client
                        .reset_system(&system_id, ResetType::GracefulShutdown)
                        .await?;
                    status.update_setting_state = Some(UpdateSettingState::WaitOnServerRebootPowerOff);
                } else {
                    status.update_setting_state = Some(UpdateSettingState::VerifySettingUpdate);
                }
                self.bios_settings_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                Ok(Action::requeue(self.config.power_polling_interval))
            }

            UpdateSettingState::WaitOnServerRebootPowerOff => {
                if client.get_power_state(&system_id).await? != PowerState::Off {
                    return Ok(Action::requeue(self.config.power_polling_interval));
                }
                client.reset_system(&system_id, ResetType::On).await?;
                status.update_setting_state = Some(UpdateSettingState::WaitOnServerRebootPowerOn);
                self.bios_settings_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                Ok(Action::requeue(self.config.power_polling_interval))
            }

            UpdateSettingState::WaitOnServerRebootPowerOn => {
                if client.get_power_state(&system_id).await? != PowerState::On {
                    return Ok(Action::requeue(self.config.power_polling_interval));
                }
                status.update_setting_state = Some(UpdateSettingState::VerifySettingUpdate);
                self.bios_settings_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                Ok(Action::requeue(Duration::ZERO))
            }

            UpdateSettingState::VerifySettingUpdate => {
                let current = client.get_bios_attributes(&system_id).await?;
                let desired = desired_settings(settings);
                let full_diff = settings_diff(&current, &desired);
                if full_diff.is_empty() {
                    return self.bios_settings_applied(settings, name, status).await;
                }

                // Progress check: did the issued round land?
                let issued: BTreeMap<String, String> = match &status.last_issued_flow_step {
                    Some(step_name) => settings
                        .spec
                        .settings_flow
                        .iter()
                        .find(|s| s.name == *step_name)
                        .map(|s| s.settings.clone())
                        .unwrap_or_default(),
                    None => settings.spec.settings_map.clone(),
                };
                let issued_landed = issued
                    .iter()
                    .all(|(key, value)| value_matches(current.get(key), value));
                if issued_landed {
                    // More flow steps remain; start the next round
                    status.update_setting_state = Some(UpdateSettingState::IssueSettingUpdate);
                    status.last_issued_flow_step = None;
                    self.bios_settings_api
                        .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                        .await?;
                    return Ok(Action::requeue(Duration::ZERO));
                }

                let retries = status
                    .auto_retries_remaining
                    .unwrap_or(settings.spec.failed_auto_retry_count);
                if retries > 0 {
                    warn!("BIOSSettings {}: verification failed, {} retries left", name, retries);
                    status.auto_retries_remaining = Some(retries - 1);
                    status.update_setting_state = Some(UpdateSettingState::IssueSettingUpdate);
                    self.bios_settings_api
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
                        format!("{} key(s) still diverge after applying", full_diff.len()),
                    )
                    .with_observed_generation(settings.metadata.generation),
                );
                self.bios_settings_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                self.finish_maintenance(&settings.spec.server_maintenance_ref, MaintenanceState::Failed)
                    .await?;
                warn!("BIOSSettings {} failed, retries exhausted", name);
                Ok(Action::await_change())
            }
        }
    }

    /// Success epilogue: record Applied and release the maintenance window.
    async fn bios_settings_applied(
        &self,
        settings: &BIOSSettings,
        name: &str,
        mut status: BIOSSettingsStatus,
    ) -> Result<Action, ControllerError> {
        status.state = SettingsState::Applied;
        status.update_setting_state = None;
        status.last_issued_flow_step = None;
        status.last_applied_time = Some(chrono::Utc::now());
        status.observed_generation = settings.metadata.generation;
        self.bios_settings_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        self.finish_maintenance(&settings.spec.server_maintenance_ref, MaintenanceState::Completed)
            .await?;
        info!("BIOSSettings {} applied", name);
        Ok(Action::await_change())
    }

    /// Create the maintenance ticket the mutation runs behind.
    pub(crate) async fn request_maintenance<K: kube::Resource<DynamicType = ()>>(
        &self,
        owner: &K,
        owner_name: &str,
        server_name: &str,
        policy: crds::MaintenancePolicy,
    ) -> Result<String, ControllerError>
    where
        K: serde::Serialize,
    {
        let maintenance_name = format!("{owner_name}-{server_name}-maintenance");
        if self.maintenance_api.get_opt(&maintenance_name).await?.is_some() {
            return Ok(maintenance_name);
        }
        let maintenance = ServerMaintenance {
            metadata: ObjectMeta {
                name: Some(maintenance_name.clone()),
                namespace: owner.meta().namespace.clone(),
                owner_references: Some(vec![owner_reference::<K>(owner.meta())?]),
                ..Default::default()
            },
            spec: ServerMaintenanceSpec {
                policy,
                server_ref: ObjectRef::new(server_name),
                server_power: crds::Power::On,
                server_boot_configuration_template: None,
            },
            status: None,
        };
        match self.maintenance_api.create(&PostParams::default(), &maintenance).await {
            Ok(_) => info!("Requested ServerMaintenance {} for {}", maintenance_name, server_name),
            Err(kube::Error::Api(e)) if e.code == 409 => {}
            Err(e) => return Err(ControllerError::Kube(e)),
        }
        Ok(maintenance_name)
    }

    /// Mark the requested maintenance finished so the arbiter releases the
    /// server.
    pub(crate) async fn finish_maintenance(
        &self,
        maintenance_ref: &Option<ObjectRef>,
        outcome: MaintenanceState,
    ) -> Result<(), ControllerError> {
        let Some(maintenance_ref) = maintenance_ref else {
            return Ok(());
        };
        if self.maintenance_api.get_opt(&maintenance_ref.name).await?.is_none() {
            return Ok(());
        }
        let status = ServerMaintenanceStatus { state: outcome };
        self.maintenance_api
            .patch_status(
                &maintenance_ref.name,
                &PatchParams::default(),
                &Patch::Merge(&status_patch(&status)),
            )
            .await?;
        Ok(())
    }
}
