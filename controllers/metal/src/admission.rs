//! Validating admission webhook
//!
//! Enforces the invariants the reconcilers rely on: immutable identity
//! fields, exactly-one endpoint source on a BMC, claim reference swaps,
//! settings/version target uniqueness, and the no-mutation-while-InProgress
//! guard with its operation-annotation escape hatches.

use axum::extract::{Json, State};
use axum::routing::post;
use axum::Router;
use crds::{
    canonical_mac, BIOSSettings, BIOSVersion, BMCSecret, BMCSettings, BMCVersion, Endpoint,
    OperationAnnotation, Server, ServerClaim, SettingsState, VersionState, BMC,
    OPERATION_ANNOTATION,
};
use kube::api::ListParams;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use kube::{Api, Resource, ResourceExt};
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::error::ControllerError;

/// APIs the uniqueness checks list against.
#[derive(Clone)]
pub struct AdmissionState {
    bios_settings_api: Api<BIOSSettings>,
    bmc_settings_api: Api<BMCSettings>,
    bios_version_api: Api<BIOSVersion>,
    bmc_version_api: Api<BMCVersion>,
}

impl AdmissionState {
    /// Build the webhook state from the controller's API set.
    pub fn new(apis: &crate::reconciler::ApiSet) -> Self {
        Self {
            bios_settings_api: apis.bios_settings.clone(),
            bmc_settings_api: apis.bmc_settings.clone(),
            bios_version_api: apis.bios_version.clone(),
            bmc_version_api: apis.bmc_version.clone(),
        }
    }
}

/// Build the webhook router.
pub fn router(state: AdmissionState) -> Router {
    Router::new()
        .route("/validate-server", post(validate_server))
        .route("/validate-bmc", post(validate_bmc))
        .route("/validate-bmcsecret", post(validate_bmc_secret))
        .route("/validate-endpoint", post(validate_endpoint))
        .route("/validate-serverclaim", post(validate_server_claim))
        .route("/validate-biossettings", post(validate_bios_settings))
        .route("/validate-bmcsettings", post(validate_bmc_settings))
        .route("/validate-biosversion", post(validate_bios_version))
        .route("/validate-bmcversion", post(validate_bmc_version))
        .with_state(state)
}

/// Bind and serve the webhook until the process exits.
pub async fn serve(state: AdmissionState, addr: SocketAddr) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::InvalidConfig(format!("webhook bind {addr}: {e}")))?;
    info!("Admission webhook listening on {}", addr);
    axum::serve(listener, router(state))
        .await
        .map_err(|e| ControllerError::Watch(format!("webhook server: {e}")))?;
    Ok(())
}

fn respond<K: Resource>(
    request: &AdmissionRequest<K>,
    verdict: Result<(), String>,
) -> Json<AdmissionReview<DynamicObject>> {
    let response = match verdict {
        Ok(()) => AdmissionResponse::from(request),
        Err(message) => {
            warn!("Admission denied: {}", message);
            AdmissionResponse::from(request).deny(message)
        }
    };
    Json(response.into_review())
}

fn parse<K: Resource + Clone>(
    review: AdmissionReview<K>,
) -> Result<AdmissionRequest<K>, Json<AdmissionReview<DynamicObject>>> {
    review.try_into().map_err(|e| {
        warn!("Malformed admission review: {}", e);
        Json(AdmissionResponse::invalid(format!("malformed review: {e}")).into_review())
    })
}

fn has_operation<K: Resource>(object: Option<&K>, value: OperationAnnotation) -> bool {
    object
        .and_then(|o| o.meta().annotations.as_ref())
        .and_then(|a| a.get(OPERATION_ANNOTATION))
        .and_then(|v| OperationAnnotation::parse(v))
        == Some(value)
}

async fn validate_server(
    Json(review): Json<AdmissionReview<Server>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request = match parse(review) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let verdict = (|| {
        if request.operation != Operation::Update {
            return Ok(());
        }
        let (Some(old), Some(new)) = (&request.old_object, &request.object) else {
            return Ok(());
        };
        if old.spec.system_uuid != new.spec.system_uuid {
            return Err("spec.systemUuid is immutable".to_string());
        }
        if let (Some(old_claim), Some(new_claim)) = (&old.spec.claim_ref, &new.spec.claim_ref) {
            if old_claim.name != new_claim.name {
                return Err(format!(
                    "spec.claimRef cannot be swapped ({} -> {}); clear it first",
                    old_claim.name, new_claim.name
                ));
            }
        }
        Ok(())
    })();
    respond(&request, verdict)
}

async fn validate_bmc(
    Json(review): Json<AdmissionReview<BMC>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request = match parse(review) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let verdict = (|| {
        if let Some(new) = &request.object {
            match (new.spec.endpoint_ref.is_some(), new.spec.endpoint.is_some()) {
                (true, true) => {
                    return Err("exactly one of spec.endpointRef and spec.endpoint may be set".to_string())
                }
                (false, false) => {
                    return Err("one of spec.endpointRef or spec.endpoint is required".to_string())
                }
                _ => {}
            }
        }
        if request.operation == Operation::Update {
            if let (Some(old), Some(new)) = (&request.old_object, &request.object) {
                if old.spec.endpoint_ref != new.spec.endpoint_ref {
                    return Err("spec.endpointRef is immutable".to_string());
                }
            }
        }
        Ok(())
    })();
    respond(&request, verdict)
}

async fn validate_bmc_secret(
    Json(review): Json<AdmissionReview<BMCSecret>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request = match parse(review) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let verdict = (|| {
        if request.operation != Operation::Update {
            return Ok(());
        }
        let (Some(old), Some(new)) = (&request.old_object, &request.object) else {
            return Ok(());
        };
        if old.spec.immutable && old.spec.data != new.spec.data {
            return Err("BMCSecret data is immutable".to_string());
        }
        if old.spec.immutable && !new.spec.immutable {
            return Err("the immutable flag cannot be lowered".to_string());
        }
        Ok(())
    })();
    respond(&request, verdict)
}

async fn validate_endpoint(
    Json(review): Json<AdmissionReview<Endpoint>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request = match parse(review) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let verdict = (|| {
        if let Some(new) = &request.object {
            if canonical_mac(&new.spec.mac_address).is_none() {
                return Err(format!("spec.macAddress {} is not a MAC address", new.spec.mac_address));
            }
        }
        if request.operation == Operation::Update {
            if let (Some(old), Some(new)) = (&request.old_object, &request.object) {
                if canonical_mac(&old.spec.mac_address) != canonical_mac(&new.spec.mac_address) {
                    return Err("spec.macAddress is immutable".to_string());
                }
            }
        }
        Ok(())
    })();
    respond(&request, verdict)
}

async fn validate_server_claim(
    Json(review): Json<AdmissionReview<ServerClaim>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request = match parse(review) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let verdict = (|| {
        if let Some(new) = &request.object {
            if new.spec.server_ref.is_some() && new.spec.server_selector.is_some() {
                return Err("spec.serverRef and spec.serverSelector are mutually exclusive".to_string());
            }
        }
        if request.operation != Operation::Update {
            return Ok(());
        }
        let (Some(old), Some(new)) = (&request.old_object, &request.object) else {
            return Ok(());
        };
        // Identity is immutable once set; null -> value and value -> null pass
        if let (Some(old_ref), Some(new_ref)) = (&old.spec.server_ref, &new.spec.server_ref) {
            if old_ref != new_ref {
                return Err("spec.serverRef identity is immutable".to_string());
            }
        }
        if let (Some(old_sel), Some(new_sel)) = (&old.spec.server_selector, &new.spec.server_selector)
        {
            if old_sel != new_sel {
                return Err("spec.serverSelector identity is immutable".to_string());
            }
        }
        Ok(())
    })();
    respond(&request, verdict)
}

/// Shared guard for settings/version objects: immutable target, uniqueness
/// per target, and the InProgress mutation gates.
macro_rules! guarded_validate {
    ($fn_name:ident, $kind:ty, $api:ident, $target:ident, $in_progress:expr, $target_field:literal) => {
        async fn $fn_name(
            State(state): State<AdmissionState>,
            Json(review): Json<AdmissionReview<$kind>>,
        ) -> Json<AdmissionReview<DynamicObject>> {
            let request = match parse(review) {
                Ok(request) => request,
                Err(response) => return response,
            };
            let verdict = (|| async {
                match request.operation {
                    Operation::Create => {
                        let Some(new) = &request.object else { return Ok(()) };
                        // One object per target; the race window is tolerated
                        // because the target reference is immutable
                        let existing = state
                            .$api
                            .list(&ListParams::default())
                            .await
                            .map_err(|e| format!("uniqueness check failed: {e}"))?;
                        let taken = existing.items.iter().any(|other| {
                            other.spec.$target.name == new.spec.$target.name
                                && other.name_any() != new.name_any()
                        });
                        if taken {
                            return Err(format!(
                                "{} {} already has a {} object",
                                $target_field,
                                new.spec.$target.name,
                                stringify!($kind),
                            ));
                        }
                        Ok(())
                    }
                    Operation::Update => {
                        let (Some(old), Some(new)) = (&request.old_object, &request.object) else {
                            return Ok(());
                        };
                        if old.spec.$target != new.spec.$target {
                            return Err(format!("spec.{} is immutable", $target_field));
                        }
                        let spec_changed = serde_json::to_value(&old.spec).ok()
                            != serde_json::to_value(&new.spec).ok();
                        let in_progress: bool = $in_progress(old);
                        if in_progress && spec_changed {
                            let allowed = has_operation(
                                request.object.as_ref(),
                                OperationAnnotation::AllowInProgressUpdate,
                            );
                            if !allowed {
                                return Err(
                                    "spec updates are rejected while InProgress; set the \
                                     allow-in-progress-update operation annotation"
                                        .to_string(),
                                );
                            }
                        }
                        Ok(())
                    }
                    Operation::Delete => {
                        let Some(old) = &request.old_object else { return Ok(()) };
                        let in_progress: bool = $in_progress(old);
                        if in_progress
                            && !has_operation(
                                request.old_object.as_ref(),
                                OperationAnnotation::AllowInProgressDelete,
                            )
                        {
                            return Err(
                                "delete is rejected while InProgress; set the \
                                 allow-in-progress-delete operation annotation"
                                    .to_string(),
                            );
                        }
                        Ok(())
                    }
                    Operation::Connect => Ok(()),
                }
            })()
            .await;
            respond(&request, verdict)
        }
    };
}

guarded_validate!(
    validate_bios_settings,
    BIOSSettings,
    bios_settings_api,
    server_ref,
    |o: &BIOSSettings| o.status.as_ref().map(|s| s.state) == Some(SettingsState::InProgress),
    "serverRef"
);
guarded_validate!(
    validate_bmc_settings,
    BMCSettings,
    bmc_settings_api,
    bmc_ref,
    |o: &BMCSettings| o.status.as_ref().map(|s| s.state) == Some(SettingsState::InProgress),
    "bmcRef"
);
guarded_validate!(
    validate_bios_version,
    BIOSVersion,
    bios_version_api,
    server_ref,
    |o: &BIOSVersion| o.status.as_ref().map(|s| s.state) == Some(VersionState::InProgress),
    "serverRef"
);
guarded_validate!(
    validate_bmc_version,
    BMCVersion,
    bmc_version_api,
    bmc_ref,
    |o: &BMCVersion| o.status.as_ref().map(|s| s.state) == Some(VersionState::InProgress),
    "bmcRef"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_operation_reads_the_annotation() {
        let mut server = Server::new("s-a", crds::ServerSpec {
            system_uuid: "uuid-1".to_string(),
            ..Default::default()
        });
        assert!(!has_operation(Some(&server), OperationAnnotation::AllowInProgressUpdate));
        server.metadata.annotations = Some(
            [(OPERATION_ANNOTATION.to_string(), "allow-in-progress-update".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(has_operation(Some(&server), OperationAnnotation::AllowInProgressUpdate));
    }
}
