//! BIOSVersion reconciler
//!
//! Drives a BIOS firmware upgrade through the Redfish update service: submit
//! SimpleUpdate, poll the returned task, verify the reported version, retry
//! with a fresh submission up to the configured budget.

use super::super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::{
    clear_operation_annotation_patch, decode_secret_value, name_of, namespace_of, status_patch,
};
use crds::{
    upsert_condition, BIOSVersion, BIOSVersionStatus, Condition, FirmwareImage, MaintenanceState,
    OperationAnnotation, Server, ServerState, UpdatePolicy, UpgradeTask, VersionState,
};
use kube::api::{Patch, PatchParams};
use kube_runtime::controller::Action;
use redfish_client::{SimpleUpdateRequest, TaskState};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Firmware inventory component the BIOS version lives under.
const BIOS_COMPONENT: &str = "BIOS";

/// Whether an upgrade must be submitted.
pub(crate) fn upgrade_needed(current: Option<&str>, target: &str, policy: Option<UpdatePolicy>) -> bool {
    if policy == Some(UpdatePolicy::Force) {
        return true;
    }
    current != Some(target)
}

impl Reconciler {
    pub(crate) async fn reconcile_bios_version(
        &self,
        version: &BIOSVersion,
    ) -> Result<Action, ControllerError> {
        let name = name_of(version, "BIOSVersion")?;
        let namespace = namespace_of(version);
        let resource_key = format!("{}/{}", namespace, name);

        if crds::is_reconciliation_ignored(version) {
            debug!("BIOSVersion {}/{} has reconciliation ignored", namespace, name);
            return Ok(Action::await_change());
        }
        if version.metadata.deletion_timestamp.is_some() {
            return Ok(Action::await_change());
        }

        let mut status = version.status.clone().unwrap_or_default();

        if status.state == VersionState::Failed
            && crds::operation_of(version) == Some(OperationAnnotation::RetryFailedStateResource)
        {
            status = BIOSVersionStatus {
                observed_generation: version.metadata.generation,
                ..Default::default()
            };
            self.bios_version_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            self.bios_version_api
                .patch(
                    &name,
                    &PatchParams::default(),
                    &Patch::Merge(&clear_operation_annotation_patch()),
                )
                .await?;
            info!("BIOSVersion {} reset to Pending on operator request", name);
            return Ok(Action::requeue(Duration::ZERO));
        }

        if status.observed_generation != version.metadata.generation
            && matches!(status.state, VersionState::Completed | VersionState::Failed)
        {
            status = BIOSVersionStatus {
                observed_generation: version.metadata.generation,
                ..Default::default()
            };
            self.bios_version_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            return Ok(Action::requeue(Duration::ZERO));
        }

        let server = self
            .server_api
            .get_opt(&version.spec.server_ref.name)
            .await?
            .ok_or_else(|| ControllerError::ServerNotFound(version.spec.server_ref.name.clone()))?;

        let result = match status.state {
            VersionState::Pending => self.bios_version_pending(version, &name, &server, status).await,
            VersionState::InProgress => self.bios_version_in_progress(version, &name, &server, status).await,
            VersionState::Completed | VersionState::Failed => Ok(Action::await_change()),
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

    async fn bios_version_pending(
        &self,
        version: &BIOSVersion,
        name: &str,
        server: &Server,
        mut status: BIOSVersionStatus,
    ) -> Result<Action, ControllerError> {
        let (client, _system_id) = self.server_client(server).await?;
        let current = client
            .get_firmware_inventory(BIOS_COMPONENT)
            .await
            .ok()
            .and_then(|inv| inv.version);

        if !upgrade_needed(current.as_deref(), &version.spec.version, version.spec.update_policy) {
            status.state = VersionState::Completed;
            status.observed_generation = version.metadata.generation;
            self.bios_version_api
                .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            info!("BIOSVersion {}: device already at {}", name, version.spec.version);
            return Ok(Action::await_change());
        }

        // Flash windows always run behind the arbiter
        match &version.spec.server_maintenance_ref {
            None => {
                let maintenance_name = self
                    .request_maintenance(
                        version,
                        name,
                        &version.spec.server_ref.name,
                        version.spec.server_maintenance_policy,
                    )
                    .await?;
                let patch = serde_json::json!({
                    "spec": { "serverMaintenanceRef": { "name": maintenance_name } }
                });
                self.bios_version_api
                    .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await?;
                return Ok(Action::requeue(Duration::from_secs(5)));
            }
            Some(_) => {
                let server_state = server.status.as_ref().map(|s| s.state).unwrap_or_default();
                if server_state != ServerState::Maintenance {
                    debug!("BIOSVersion {}: waiting for maintenance window", name);
                    return Ok(Action::requeue(Duration::from_secs(10)));
                }
            }
        }

        status.state = VersionState::InProgress;
        status.auto_retries_remaining = Some(version.spec.failed_auto_retry_count);
        status.upgrade_task = None;
        status.observed_generation = version.metadata.generation;
        self.bios_version_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        info!(
            "BIOSVersion {}: upgrading {:?} -> {}",
            name, current, version.spec.version
        );
        Ok(Action::requeue(Duration::ZERO))
    }

    async fn bios_version_in_progress(
        &self,
        version: &BIOSVersion,
        name: &str,
        server: &Server,
        mut status: BIOSVersionStatus,
    ) -> Result<Action, ControllerError> {
        let (client, _system_id) = self.server_client(server).await?;

        // Submit exactly once per round; the recorded task URI is the guard.
        // Each submission consumes one unit of the retry budget.
        let task_uri = match status.upgrade_task.as_ref().and_then(|t| t.uri.clone()) {
            Some(uri) => uri,
            None => {
                let request = self.build_update_request(&version.spec.image).await?;
                let uri = client.simple_update(&request).await?;
                let remaining = status
                    .auto_retries_remaining
                    .unwrap_or(version.spec.failed_auto_retry_count);
                status.auto_retries_remaining = Some(remaining.saturating_sub(1));
                status.upgrade_task = Some(UpgradeTask {
                    uri: Some(uri.clone()),
                    task_state: None,
                    task_status: None,
                    percent_complete: Some(0),
                });
                upsert_condition(
                    &mut status.conditions,
                    Condition::new("UpgradeTaskSubmitted", "TaskSubmitted", uri.clone())
                        .with_observed_generation(version.metadata.generation),
                );
                self.bios_version_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                info!("BIOSVersion {}: submitted update task {}", name, uri);
                return Ok(Action::requeue(self.config.resource_polling_interval));
            }
        };

        let task = client.get_task(&task_uri).await?;
        let task_state = task.task_state;
        status.upgrade_task = Some(UpgradeTask {
            uri: Some(task_uri.clone()),
            task_state: task_state.map(|s| format!("{s:?}")),
            task_status: task.task_status.clone(),
            percent_complete: task.percent_complete,
        });

        match task_state {
            Some(TaskState::Completed) => {
                let flashed = client
                    .get_firmware_inventory(BIOS_COMPONENT)
                    .await
                    .ok()
                    .and_then(|inv| inv.version);
                if flashed.as_deref() == Some(version.spec.version.as_str()) {
                    status.state = VersionState::Completed;
                    self.bios_version_api
                        .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                        .await?;
                    self.finish_maintenance(&version.spec.server_maintenance_ref, MaintenanceState::Completed)
                        .await?;
                    info!("BIOSVersion {} completed at {}", name, version.spec.version);
                    Ok(Action::await_change())
                } else {
                    upsert_condition(
                        &mut status.conditions,
                        Condition::new(
                            "PostUpgradeVersionMismatch",
                            "VersionMismatch",
                            format!("device reports {:?} after task success", flashed),
                        )
                        .with_observed_generation(version.metadata.generation),
                    );
                    self.bios_version_retry(version, name, status).await
                }
            }
            Some(TaskState::Exception) | Some(TaskState::Killed) | Some(TaskState::Cancelled) => {
                upsert_condition(
                    &mut status.conditions,
                    Condition::new(
                        "UpgradeTaskFailed",
                        format!("{:?}", task_state.unwrap_or(TaskState::Exception)),
                        task.task_status.unwrap_or_default(),
                    )
                    .with_observed_generation(version.metadata.generation),
                );
                self.bios_version_retry(version, name, status).await
            }
            _ => {
                // Still running; bound the poll by the resource timeout
                let submitted = status
                    .conditions
                    .iter()
                    .find(|c| c.r#type == "UpgradeTaskSubmitted")
                    .and_then(|c| c.last_transition_time);
                if let Some(submitted) = submitted {
                    let waited = chrono::Utc::now()
                        .signed_duration_since(submitted)
                        .to_std()
                        .unwrap_or_default();
                    if waited > self.config.resource_polling_timeout {
                        warn!("BIOSVersion {}: task {} timed out", name, task_uri);
                        upsert_condition(
                            &mut status.conditions,
                            Condition::new("UpgradeTaskFailed", "Timeout", "task did not finish in time")
                                .with_observed_generation(version.metadata.generation),
                        );
                        return self.bios_version_retry(version, name, status).await;
                    }
                }
                self.bios_version_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                Ok(Action::requeue(self.config.resource_polling_interval))
            }
        }
    }

    /// Queue a fresh submission while budget remains, or fail terminally.
    async fn bios_version_retry(
        &self,
        version: &BIOSVersion,
        name: &str,
        mut status: BIOSVersionStatus,
    ) -> Result<Action, ControllerError> {
        let retries = status.auto_retries_remaining.unwrap_or(0);
        if retries > 0 {
            warn!("BIOSVersion {}: retrying, {} attempt(s) left", name, retries);
            status.upgrade_task = None;
            crds::remove_condition(&mut status.conditions, "UpgradeTaskSubmitted");
            self.bios_version_api
                .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            return Ok(Action::requeue(Duration::ZERO));
        }
        status.state = VersionState::Failed;
        status.auto_retries_remaining = Some(0);
        self.bios_version_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        self.finish_maintenance(&version.spec.server_maintenance_ref, MaintenanceState::Failed)
            .await?;
        warn!("BIOSVersion {} failed, retries exhausted", name);
        Ok(Action::await_change())
    }

    /// Assemble the SimpleUpdate request, resolving image host credentials.
    pub(crate) async fn build_update_request(
        &self,
        image: &FirmwareImage,
    ) -> Result<SimpleUpdateRequest, ControllerError> {
        let mut username = None;
        let mut password = None;
        if let Some(secret_ref) = &image.secret_ref {
            let secret = self.bmc_secret_api.get(&secret_ref.name).await?;
            username = Some(decode_secret_value(&secret.spec.data, crds::SECRET_USERNAME_KEY)?);
            password = Some(decode_secret_value(&secret.spec.data, crds::SECRET_PASSWORD_KEY)?);
        }
        Ok(SimpleUpdateRequest {
            image_uri: image.uri.clone(),
            transfer_protocol: image.transfer_protocol.clone(),
            username,
            password,
        })
    }
}
