//! ServerClaim reconciler
//!
//! Binds a claim to a server by explicit reference or label selection,
//! stamps the binding on both sides, materializes the tenant boot
//! configuration, and releases everything when the claim goes away.
//! Binding is a compare-and-swap against the Server; a conflict reselects.

use super::super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::{
    ensure_finalizer, labels_match, name_of, namespace_of, remove_finalizer, status_patch,
};
use crds::{
    ClaimPhase, ObjectRef, Server, ServerBootConfiguration, ServerBootConfigurationSpec,
    ServerClaim, ServerClaimStatus, ServerState,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Resource;
use kube_runtime::controller::Action;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Finalizer releasing the bound server before the claim goes away.
const CLAIM_FINALIZER: &str = "metal.microscaler.io/claim-release";

/// Pick the server a claim binds to.
///
/// An explicit `serverRef` must name an Available, unclaimed server. A
/// selector picks deterministically: the lexicographically smallest name
/// among Available, unclaimed, label-matching servers. A server already
/// stamped with this claim is always selectable again, so an interrupted
/// bind converges instead of deadlocking.
pub(crate) fn select_server<'a>(claim: &ServerClaim, servers: &'a [Server]) -> Option<&'a Server> {
    let claim_name = claim.meta().name.as_deref();
    let claimable = |server: &Server| {
        match &server.spec.claim_ref {
            Some(existing) => return Some(existing.name.as_str()) == claim_name,
            None => {}
        }
        server
            .status
            .as_ref()
            .map(|s| s.state == ServerState::Available)
            .unwrap_or(false)
    };

    if let Some(server_ref) = &claim.spec.server_ref {
        return servers
            .iter()
            .find(|s| s.meta().name.as_deref() == Some(server_ref.name.as_str()))
            .filter(|s| claimable(s));
    }

    let selector = claim.spec.server_selector.as_ref()?;
    servers
        .iter()
        .filter(|s| claimable(s))
        .filter(|s| labels_match(s.meta().labels.as_ref(), selector))
        .min_by(|a, b| a.meta().name.cmp(&b.meta().name))
}

impl Reconciler {
    pub(crate) async fn reconcile_server_claim(
        &self,
        claim: &ServerClaim,
    ) -> Result<Action, ControllerError> {
        let name = name_of(claim, "ServerClaim")?;
        let namespace = namespace_of(claim);
        let resource_key = format!("{}/{}", namespace, name);

        if crds::is_reconciliation_ignored(claim) {
            debug!("ServerClaim {}/{} has reconciliation ignored", namespace, name);
            return Ok(Action::await_change());
        }

        if claim.metadata.deletion_timestamp.is_some() {
            return self.finalize_claim(claim, &name).await;
        }
        ensure_finalizer(&self.server_claim_api, claim, CLAIM_FINALIZER).await?;

        info!("Reconciling ServerClaim {}/{}", namespace, name);

        let phase = claim.status.as_ref().map(|s| s.phase).unwrap_or_default();
        if phase == ClaimPhase::Bound {
            return self.reconcile_bound_claim(claim, &name).await;
        }

        // Selection
        let servers = self.server_api.list(&ListParams::default()).await?;
        let Some(server) = select_server(claim, &servers.items) else {
            debug!("ServerClaim {}/{}: no claimable server", namespace, name);
            self.increment_error(&resource_key);
            return Ok(self.requeue_with_backoff(&resource_key));
        };
        let server_name = name_of(server, "Server")?;

        // First CAS leg: stamp the binding and desired power on the Server.
        // A conflict means someone else claimed it first; reselect.
        let server_patch = serde_json::json!({
            "spec": {
                "claimRef": { "name": name },
                "power": claim.spec.power,
            }
        });
        match self
            .server_api
            .patch(&server_name, &PatchParams::default(), &Patch::Merge(&server_patch))
            .await
        {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 409 => {
                warn!("ServerClaim {}: lost race for {}, reselecting", name, server_name);
                return Ok(Action::requeue(Duration::from_secs(1)));
            }
            Err(e) => return Err(ControllerError::Kube(e)),
        }

        // Second leg: record the binding on the claim status
        let status = ServerClaimStatus {
            phase: ClaimPhase::Bound,
            claimed_server_ref: Some(ObjectRef::new(server_name.clone())),
        };
        self.server_claim_api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        info!("ServerClaim {} bound to Server {}", name, server_name);

        self.ensure_claim_boot_config(claim, &name, &server_name).await?;
        self.reset_error(&resource_key);
        Ok(Action::requeue(Duration::ZERO))
    }

    /// Bound steady state: keep the boot configuration present and verify
    /// the binding is still bidirectional.
    async fn reconcile_bound_claim(
        &self,
        claim: &ServerClaim,
        name: &str,
    ) -> Result<Action, ControllerError> {
        let Some(server_ref) = claim.status.as_ref().and_then(|s| s.claimed_server_ref.clone())
        else {
            // Bound without a server recorded; restart selection
            let status = ServerClaimStatus::default();
            self.server_claim_api
                .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            return Ok(Action::requeue(Duration::ZERO));
        };

        let server = self.server_api.get_opt(&server_ref.name).await?;
        let still_ours = server
            .as_ref()
            .and_then(|s| s.spec.claim_ref.as_ref())
            .is_some_and(|r| r.name == *name);
        if !still_ours {
            warn!("ServerClaim {}: binding to {} lost, reselecting", name, server_ref.name);
            let status = ServerClaimStatus::default();
            self.server_claim_api
                .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            return Ok(Action::requeue(Duration::ZERO));
        }

        self.ensure_claim_boot_config(claim, name, &server_ref.name).await?;
        Ok(Action::await_change())
    }

    /// Materialize the tenant boot configuration and point the server at it.
    async fn ensure_claim_boot_config(
        &self,
        claim: &ServerClaim,
        name: &str,
        server_name: &str,
    ) -> Result<(), ControllerError> {
        let config_name = format!("{name}-boot");
        if self.boot_config_api.get_opt(&config_name).await?.is_none() {
            let config = ServerBootConfiguration {
                metadata: ObjectMeta {
                    name: Some(config_name.clone()),
                    namespace: claim.metadata.namespace.clone(),
                    owner_references: Some(vec![crate::reconcile_helpers::owner_reference::<
                        ServerClaim,
                    >(&claim.metadata)?]),
                    ..Default::default()
                },
                spec: ServerBootConfigurationSpec {
                    server_ref: ObjectRef::new(server_name),
                    image: claim.spec.image.clone(),
                    ignition_secret_ref: claim.spec.ignition_secret_ref.clone(),
                },
                status: None,
            };
            match self.boot_config_api.create(&PostParams::default(), &config).await {
                Ok(_) => info!("Created boot configuration {} for claim {}", config_name, name),
                Err(kube::Error::Api(e)) if e.code == 409 => {}
                Err(e) => return Err(ControllerError::Kube(e)),
            }
        }

        let server = self.server_api.get(server_name).await?;
        let already = server
            .spec
            .boot_configuration_ref
            .as_ref()
            .is_some_and(|r| r.name == config_name);
        if !already {
            let patch = serde_json::json!({
                "spec": { "bootConfigurationRef": { "name": config_name } }
            });
            self.server_api
                .patch(server_name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
        }
        Ok(())
    }

    /// Release path: power the server down, clear the binding, drop the boot
    /// configuration, then let the claim go.
    async fn finalize_claim(&self, claim: &ServerClaim, name: &str) -> Result<Action, ControllerError> {
        let bound_server = claim
            .status
            .as_ref()
            .and_then(|s| s.claimed_server_ref.clone());

        if let Some(server_ref) = bound_server {
            if let Some(server) = self.server_api.get_opt(&server_ref.name).await? {
                let ours = server
                    .spec
                    .claim_ref
                    .as_ref()
                    .is_some_and(|r| r.name == *name);
                if ours {
                    // Power down before handing the server back
                    if let Ok((client, system_id)) = self.server_client(&server).await {
                        if client.get_power_state(&system_id).await?
                            != redfish_client::PowerState::Off
                        {
                            client
                                .reset_system(&system_id, redfish_client::ResetType::ForceOff)
                                .await?;
                        }
                    }
                    let patch = serde_json::json!({
                        "spec": {
                            "claimRef": serde_json::Value::Null,
                            "bootConfigurationRef": serde_json::Value::Null,
                            "power": crds::Power::Off,
                        }
                    });
                    self.server_api
                        .patch(&server_ref.name, &PatchParams::default(), &Patch::Merge(&patch))
                        .await?;
                    info!("ServerClaim {}: released Server {}", name, server_ref.name);
                }
            }
        }

        let config_name = format!("{name}-boot");
        match self
            .boot_config_api
            .delete(&config_name, &DeleteParams::default())
            .await
        {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => return Err(ControllerError::Kube(e)),
        }

        remove_finalizer(&self.server_claim_api, claim, CLAIM_FINALIZER).await?;
        Ok(Action::await_change())
    }
}
