//! BIOSSettingsSet reconciler

use super::super::Reconciler;
use super::{aggregate, child_operation, set_is_frozen, ChildPhase};
use crate::error::ControllerError;
use crate::reconcile_helpers::{
    clear_operation_annotation_patch, labels_match, name_of, namespace_of, owned_by,
    owner_reference, set_annotation_patch, status_patch,
};
use crds::{
    BIOSSettings, BIOSSettingsSet, BIOSSettingsSpec, ObjectRef, OperationAnnotation, SettingsState,
    OPERATION_ANNOTATION,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::Resource;
use kube_runtime::controller::Action;
use std::time::Duration;
use tracing::{debug, info};

fn child_phase(child: &BIOSSettings) -> ChildPhase {
    match child.status.as_ref().map(|s| s.state).unwrap_or_default() {
        SettingsState::Pending => ChildPhase::Pending,
        SettingsState::InProgress => ChildPhase::InProgress,
        SettingsState::Applied => ChildPhase::Completed,
        SettingsState::Failed => ChildPhase::Failed,
    }
}

impl Reconciler {
    pub(crate) async fn reconcile_bios_settings_set(
        &self,
        set: &BIOSSettingsSet,
    ) -> Result<Action, ControllerError> {
        let name = name_of(set, "BIOSSettingsSet")?;
        let namespace = namespace_of(set);
        let set_op = crds::operation_of(set);

        if set_is_frozen(set_op) {
            debug!("BIOSSettingsSet {}/{} is frozen", namespace, name);
            return Ok(Action::await_change());
        }
        if set.metadata.deletion_timestamp.is_some() {
            return Ok(Action::await_change());
        }

        debug!("Reconciling BIOSSettingsSet {}/{}", namespace, name);

        let servers = self.server_api.list(&ListParams::default()).await?;
        let targets: Vec<String> = servers
            .items
            .iter()
            .filter(|s| labels_match(s.meta().labels.as_ref(), &set.spec.server_selector))
            .filter_map(|s| s.meta().name.clone())
            .collect();

        let set_uid = set.metadata.uid.clone().unwrap_or_default();
        let all_children = self.bios_settings_api.list(&ListParams::default()).await?;
        let children: Vec<&BIOSSettings> = all_children
            .items
            .iter()
            .filter(|c| owned_by(*c, &set_uid))
            .collect();

        for target in &targets {
            let covered = children
                .iter()
                .any(|c| c.spec.server_ref.name == *target);
            if covered {
                continue;
            }
            let child_name = format!("{name}-{target}");
            let template = &set.spec.template;
            let child = BIOSSettings {
                metadata: ObjectMeta {
                    name: Some(child_name.clone()),
                    namespace: set.metadata.namespace.clone(),
                    owner_references: Some(vec![owner_reference::<BIOSSettingsSet>(&set.metadata)?]),
                    ..Default::default()
                },
                spec: BIOSSettingsSpec {
                    version: template.version.clone(),
                    settings_map: template.settings_map.clone(),
                    settings_flow: template.settings_flow.clone(),
                    server_ref: ObjectRef::new(target.clone()),
                    server_maintenance_policy: template.server_maintenance_policy,
                    server_maintenance_ref: None,
                    failed_auto_retry_count: template.failed_auto_retry_count,
                },
                status: None,
            };
            match self.bios_settings_api.create(&PostParams::default(), &child).await {
                Ok(_) => info!("BIOSSettingsSet {}: created child {}", name, child_name),
                Err(kube::Error::Api(e)) if e.code == 409 => {}
                Err(e) => return Err(ControllerError::Kube(e)),
            }
        }

        for child in &children {
            let child_name = name_of(*child, "BIOSSettings")?;
            let template = &set.spec.template;
            let drifted = child.spec.version != template.version
                || child.spec.settings_map != template.settings_map
                || child.spec.settings_flow != template.settings_flow
                || child.spec.failed_auto_retry_count != template.failed_auto_retry_count;
            if !drifted {
                continue;
            }
            if child_phase(child) == ChildPhase::InProgress {
                debug!("BIOSSettingsSet {}: child {} InProgress, deferring update", name, child_name);
                continue;
            }
            let patch = serde_json::json!({
                "spec": {
                    "version": template.version,
                    "settingsMap": template.settings_map,
                    "settingsFlow": template.settings_flow,
                    "failedAutoRetryCount": template.failed_auto_retry_count,
                }
            });
            self.bios_settings_api
                .patch(&child_name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            info!("BIOSSettingsSet {}: updated child {}", name, child_name);
        }

        if let Some(op) = child_operation(set_op) {
            for child in &children {
                let child_name = name_of(*child, "BIOSSettings")?;
                if op == OperationAnnotation::RetryFailedStateResource
                    && child_phase(child) != ChildPhase::Failed
                {
                    continue;
                }
                self.bios_settings_api
                    .patch(
                        &child_name,
                        &PatchParams::default(),
                        &Patch::Merge(&set_annotation_patch(OPERATION_ANNOTATION, op.as_str())),
                    )
                    .await?;
            }
            if set_op == Some(OperationAnnotation::RetryChildFailedStateResource) {
                self.bios_settings_set_api
                    .patch(
                        &name,
                        &PatchParams::default(),
                        &Patch::Merge(&clear_operation_annotation_patch()),
                    )
                    .await?;
            }
        }

        let phases: Vec<ChildPhase> = children.iter().map(|c| child_phase(c)).collect();
        let status = aggregate(targets.len(), &phases);
        if set.status.as_ref() != Some(&status) {
            self.bios_settings_set_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
        }
        Ok(Action::requeue(Duration::from_secs(30)))
    }
}
