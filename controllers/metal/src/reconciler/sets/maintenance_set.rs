//! ServerMaintenanceSet reconciler

use super::super::Reconciler;
use super::{aggregate, set_is_frozen, ChildPhase};
use crate::error::ControllerError;
use crate::reconcile_helpers::{
    labels_match, name_of, namespace_of, owned_by, owner_reference, status_patch,
};
use crds::{
    MaintenanceState, ObjectRef, ServerMaintenance, ServerMaintenanceSet, ServerMaintenanceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::Resource;
use kube_runtime::controller::Action;
use std::time::Duration;
use tracing::{debug, info};

fn child_phase(child: &ServerMaintenance) -> ChildPhase {
    match child.status.as_ref().map(|s| s.state).unwrap_or_default() {
        MaintenanceState::Pending => ChildPhase::Pending,
        MaintenanceState::InMaintenance => ChildPhase::InProgress,
        MaintenanceState::Completed => ChildPhase::Completed,
        MaintenanceState::Failed => ChildPhase::Failed,
    }
}

impl Reconciler {
    pub(crate) async fn reconcile_server_maintenance_set(
        &self,
        set: &ServerMaintenanceSet,
    ) -> Result<Action, ControllerError> {
        let name = name_of(set, "ServerMaintenanceSet")?;
        let namespace = namespace_of(set);

        if set_is_frozen(crds::operation_of(set)) {
            debug!("ServerMaintenanceSet {}/{} is frozen", namespace, name);
            return Ok(Action::await_change());
        }
        if set.metadata.deletion_timestamp.is_some() {
            return Ok(Action::await_change());
        }

        debug!("Reconciling ServerMaintenanceSet {}/{}", namespace, name);

        let servers = self.server_api.list(&ListParams::default()).await?;
        let targets: Vec<String> = servers
            .items
            .iter()
            .filter(|s| labels_match(s.meta().labels.as_ref(), &set.spec.server_selector))
            .filter_map(|s| s.meta().name.clone())
            .collect();

        let set_uid = set.metadata.uid.clone().unwrap_or_default();
        let all_children = self.maintenance_api.list(&ListParams::default()).await?;
        let children: Vec<&ServerMaintenance> = all_children
            .items
            .iter()
            .filter(|c| owned_by(*c, &set_uid))
            .collect();

        // Maintenance tickets are one-shot; only absence creates, never drift
        for target in &targets {
            let covered = children
                .iter()
                .any(|c| c.spec.server_ref.name == *target);
            if covered {
                continue;
            }
            let child_name = format!("{name}-{target}");
            let template = &set.spec.template;
            let child = ServerMaintenance {
                metadata: ObjectMeta {
                    name: Some(child_name.clone()),
                    namespace: set.metadata.namespace.clone(),
                    owner_references: Some(vec![owner_reference::<ServerMaintenanceSet>(&set.metadata)?]),
                    ..Default::default()
                },
                spec: ServerMaintenanceSpec {
                    policy: template.policy,
                    server_ref: ObjectRef::new(target.clone()),
                    server_power: template.server_power,
                    server_boot_configuration_template: template
                        .server_boot_configuration_template
                        .clone(),
                },
                status: None,
            };
            match self.maintenance_api.create(&PostParams::default(), &child).await {
                Ok(_) => info!("ServerMaintenanceSet {}: created child {}", name, child_name),
                Err(kube::Error::Api(e)) if e.code == 409 => {}
                Err(e) => return Err(ControllerError::Kube(e)),
            }
        }

        let phases: Vec<ChildPhase> = children.iter().map(|c| child_phase(c)).collect();
        let status = aggregate(targets.len(), &phases);
        if set.status.as_ref() != Some(&status) {
            self.maintenance_set_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
        }
        Ok(Action::requeue(Duration::from_secs(30)))
    }
}
