//! BMCVersion reconciler
//!
//! Drives a BMC firmware upgrade. Same task-submission machinery as the BIOS
//! upgrade, but the window drains every server behind the BMC first, and the
//! manager is reset after a successful flash so the new firmware boots.

use super::super::Reconciler;
use super::bios_version::upgrade_needed;
use crate::error::ControllerError;
use crate::reconcile_helpers::{
    clear_operation_annotation_patch, name_of, namespace_of, status_patch,
};
use crds::{
    upsert_condition, BMCVersion, BMCVersionStatus, Condition, MaintenanceState, ObjectRef,
    OperationAnnotation, ServerState, UpgradeTask, VersionState, BMC,
};
use kube::api::{Patch, PatchParams};
use kube_runtime::controller::Action;
use redfish_client::TaskState;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Firmware inventory component the BMC version lives under.
const BMC_COMPONENT: &str = "BMC";

impl Reconciler {
    pub(crate) async fn reconcile_bmc_version(
        &self,
        version: &BMCVersion,
    ) -> Result<Action, ControllerError> {
        let name = name_of(version, "BMCVersion")?;
        let namespace = namespace_of(version);
        let resource_key = format!("{}/{}", namespace, name);

        if crds::is_reconciliation_ignored(version) {
            debug!("BMCVersion {}/{} has reconciliation ignored", namespace, name);
            return Ok(Action::await_change());
        }
        if version.metadata.deletion_timestamp.is_some() {
            return Ok(Action::await_change());
        }

        let mut status = version.status.clone().unwrap_or_default();

        if status.state == VersionState::Failed
            && crds::operation_of(version) == Some(OperationAnnotation::RetryFailedStateResource)
        {
            status = BMCVersionStatus {
                observed_generation: version.metadata.generation,
                ..Default::default()
            };
            self.bmc_version_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            self.bmc_version_api
                .patch(
                    &name,
                    &PatchParams::default(),
                    &Patch::Merge(&clear_operation_annotation_patch()),
                )
                .await?;
            return Ok(Action::requeue(Duration::ZERO));
        }

        if status.observed_generation != version.metadata.generation
            && matches!(status.state, VersionState::Completed | VersionState::Failed)
        {
            status = BMCVersionStatus {
                observed_generation: version.metadata.generation,
                ..Default::default()
            };
            self.bmc_version_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            return Ok(Action::requeue(Duration::ZERO));
        }

        let bmc = self
            .bmc_api
            .get_opt(&version.spec.bmc_ref.name)
            .await?
            .ok_or_else(|| ControllerError::BmcNotFound(version.spec.bmc_ref.name.clone()))?;

        let result = match status.state {
            VersionState::Pending => self.bmc_version_pending(version, &name, &bmc, status).await,
            VersionState::InProgress => self.bmc_version_in_progress(version, &name, &bmc, status).await,
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

    async fn bmc_version_pending(
        &self,
        version: &BMCVersion,
        name: &str,
        bmc: &BMC,
        mut status: BMCVersionStatus,
    ) -> Result<Action, ControllerError> {
        let client = self.bmc_client(bmc).await?;
        let current = client
            .get_firmware_inventory(BMC_COMPONENT)
            .await
            .ok()
            .and_then(|inv| inv.version);

        if !upgrade_needed(current.as_deref(), &version.spec.version, version.spec.update_policy) {
            status.state = VersionState::Completed;
            status.observed_generation = version.metadata.generation;
            self.bmc_version_api
                .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            info!("BMCVersion {}: BMC already at {}", name, version.spec.version);
            return Ok(Action::await_change());
        }

        // Drain every server behind the BMC before flashing it
        let affected = self.servers_behind_bmc(&version.spec.bmc_ref.name).await?;
        let mut missing = Vec::new();
        for server in &affected {
            let server_name = name_of(server, "Server")?;
            let requested = version
                .spec
                .server_maintenance_refs
                .iter()
                .any(|r| r.name == format!("{name}-{server_name}-maintenance"));
            if !requested {
                missing.push(server_name);
            }
        }
        if !missing.is_empty() {
            let mut refs: Vec<ObjectRef> = version.spec.server_maintenance_refs.clone();
            for server_name in missing {
                let maintenance_name = self
                    .request_maintenance(
                        version,
                        name,
                        &server_name,
                        version.spec.server_maintenance_policy,
                    )
                    .await?;
                refs.push(ObjectRef::new(maintenance_name));
            }
            let patch = serde_json::json!({ "spec": { "serverMaintenanceRefs": refs } });
            self.bmc_version_api
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
            debug!("BMCVersion {}: waiting for {} server(s) to drain", name, affected.len());
            return Ok(Action::requeue(Duration::from_secs(10)));
        }

        status.state = VersionState::InProgress;
        status.auto_retries_remaining = Some(version.spec.failed_auto_retry_count);
        status.upgrade_task = None;
        status.observed_generation = version.metadata.generation;
        self.bmc_version_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        info!("BMCVersion {}: upgrading {:?} -> {}", name, current, version.spec.version);
        Ok(Action::requeue(Duration::ZERO))
    }

    async fn bmc_version_in_progress(
        &self,
        version: &BMCVersion,
        name: &str,
        bmc: &BMC,
        mut status: BMCVersionStatus,
    ) -> Result<Action, ControllerError> {
        let client = self.bmc_client(bmc).await?;

        // Each submission consumes one unit of the retry budget
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
                self.bmc_version_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                info!("BMCVersion {}: submitted update task {}", name, uri);
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
                    .get_firmware_inventory(BMC_COMPONENT)
                    .await
                    .ok()
                    .and_then(|inv| inv.version);
                if flashed.as_deref() == Some(version.spec.version.as_str()) {
                    // Boot the new firmware
                    let manager_id = self.first_manager_id(client.as_ref()).await?;
                    client.reset_manager(&manager_id).await?;
                    status.state = VersionState::Completed;
                    self.bmc_version_api
                        .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                        .await?;
                    self.finish_maintenances(&version.spec.server_maintenance_refs, MaintenanceState::Completed)
                        .await?;
                    info!("BMCVersion {} completed at {}", name, version.spec.version);
                    Ok(Action::await_change())
                } else {
                    upsert_condition(
                        &mut status.conditions,
                        Condition::new(
                            "PostUpgradeVersionMismatch",
                            "VersionMismatch",
                            format!("BMC reports {:?} after task success", flashed),
                        )
                        .with_observed_generation(version.metadata.generation),
                    );
                    self.bmc_version_retry(version, name, status).await
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
                self.bmc_version_retry(version, name, status).await
            }
            _ => {
                self.bmc_version_api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                    .await?;
                Ok(Action::requeue(self.config.resource_polling_interval))
            }
        }
    }

    async fn bmc_version_retry(
        &self,
        version: &BMCVersion,
        name: &str,
        mut status: BMCVersionStatus,
    ) -> Result<Action, ControllerError> {
        let retries = status.auto_retries_remaining.unwrap_or(0);
        if retries > 0 {
            warn!("BMCVersion {}: retrying, {} attempt(s) left", name, retries);
            status.upgrade_task = None;
            crds::remove_condition(&mut status.conditions, "UpgradeTaskSubmitted");
            self.bmc_version_api
                .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            return Ok(Action::requeue(Duration::ZERO));
        }
        status.state = VersionState::Failed;
        status.auto_retries_remaining = Some(0);
        self.bmc_version_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        self.finish_maintenances(&version.spec.server_maintenance_refs, MaintenanceState::Failed)
            .await?;
        warn!("BMCVersion {} failed, retries exhausted", name);
        Ok(Action::await_change())
    }
}
