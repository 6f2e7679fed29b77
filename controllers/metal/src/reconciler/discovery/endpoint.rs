//! Endpoint reconciler
//!
//! Resolves a discovered (MAC, IP) pair into a BMC object by matching the
//! MAC OUI against the prefix database, creating the credential secret with
//! factory defaults when none exists yet. Repeating the reconcile yields no
//! further mutations.

use super::super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::{encode_secret_value, name_of, namespace_of, owner_reference, status_patch};
use crds::{
    canonical_mac, upsert_condition, BMCSecret, BMCSecretSpec, BMCSpec, Condition, ConsoleProtocol,
    Endpoint, EndpointState, EndpointStatus, ObjectRef, Protocol, ProtocolName, SecretRef, BMC,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Patch, PatchParams, PostParams};
use kube_runtime::controller::Action;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

fn protocol_name_from(db_protocol: &str) -> Option<ProtocolName> {
    match db_protocol {
        "Redfish" => Some(ProtocolName::Redfish),
        "RedfishLocal" => Some(ProtocolName::RedfishLocal),
        "RedfishKube" => Some(ProtocolName::RedfishKube),
        "IPMI" => Some(ProtocolName::IPMI),
        "SSH" => Some(ProtocolName::SSH),
        _ => None,
    }
}

impl Reconciler {
    pub(crate) async fn reconcile_endpoint(
        &self,
        endpoint: &Endpoint,
    ) -> Result<Action, ControllerError> {
        let name = name_of(endpoint, "Endpoint")?;
        let namespace = namespace_of(endpoint);
        let resource_key = format!("{}/{}", namespace, name);

        if crds::is_reconciliation_ignored(endpoint) {
            debug!("Endpoint {}/{} has reconciliation ignored", namespace, name);
            return Ok(Action::await_change());
        }

        info!("Reconciling Endpoint {}/{}", namespace, name);

        let Some(mac) = canonical_mac(&endpoint.spec.mac_address) else {
            self.endpoint_pending(endpoint, &name, "InvalidMacAddress", "MAC address is not parseable")
                .await?;
            return Ok(Action::await_change());
        };

        let entry = match self.macdb.lookup(&mac) {
            Ok(entry) => entry.clone(),
            Err(e) => {
                warn!("Endpoint {}/{}: {}", namespace, name, e);
                self.endpoint_pending(endpoint, &name, "UnknownMacPrefix", &e.to_string())
                    .await?;
                self.increment_error(&resource_key);
                return Ok(self.requeue_with_backoff(&resource_key));
            }
        };

        let Some(protocol_name) = protocol_name_from(&entry.protocol) else {
            self.endpoint_pending(
                endpoint,
                &name,
                "UnknownProtocol",
                &format!("prefix database names unsupported protocol {}", entry.protocol),
            )
            .await?;
            return Ok(Action::await_change());
        };

        // The secret and the BMC carry the endpoint's name
        self.ensure_bmc_secret(endpoint, &name, &entry).await?;
        self.ensure_bmc(endpoint, &name, &entry, protocol_name).await?;

        let status = EndpointStatus {
            state: EndpointState::Resolved,
            conditions: Vec::new(),
        };
        if endpoint.status.as_ref().map(|s| s.state) != Some(EndpointState::Resolved) {
            self.endpoint_api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
                .await?;
            info!("Endpoint {}/{} resolved to BMC {}", namespace, name, name);
        }
        self.reset_error(&resource_key);
        Ok(Action::await_change())
    }

    async fn endpoint_pending(
        &self,
        endpoint: &Endpoint,
        name: &str,
        reason: &str,
        message: &str,
    ) -> Result<(), ControllerError> {
        let mut conditions = endpoint
            .status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default();
        upsert_condition(
            &mut conditions,
            Condition::new(reason, reason, message)
                .with_observed_generation(endpoint.metadata.generation),
        );
        let status = EndpointStatus {
            state: EndpointState::Pending,
            conditions,
        };
        self.endpoint_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(&status)))
            .await?;
        Ok(())
    }

    /// Create the BMCSecret with factory-default credentials if absent.
    /// An existing secret is adopted as-is.
    async fn ensure_bmc_secret(
        &self,
        endpoint: &Endpoint,
        name: &str,
        entry: &macdb::MacPrefixEntry,
    ) -> Result<(), ControllerError> {
        match self.bmc_secret_api.get_opt(name).await? {
            Some(_) => {
                debug!("BMCSecret {} already exists, adopting", name);
                Ok(())
            }
            None => {
                let credentials = entry.default_credentials.first().ok_or_else(|| {
                    ControllerError::InvalidConfig(format!(
                        "prefix {} has no default credentials",
                        entry.mac_prefix
                    ))
                })?;
                let mut data = BTreeMap::new();
                data.insert(
                    crds::SECRET_USERNAME_KEY.to_string(),
                    encode_secret_value(&credentials.username),
                );
                data.insert(
                    crds::SECRET_PASSWORD_KEY.to_string(),
                    encode_secret_value(&credentials.password),
                );
                let secret = BMCSecret {
                    metadata: ObjectMeta {
                        name: Some(name.to_string()),
                        namespace: endpoint.metadata.namespace.clone(),
                        owner_references: Some(vec![owner_reference::<Endpoint>(&endpoint.metadata)?]),
                        ..Default::default()
                    },
                    spec: BMCSecretSpec {
                        data,
                        immutable: false,
                    },
                };
                match self.bmc_secret_api.create(&PostParams::default(), &secret).await {
                    Ok(_) => {
                        info!("Created BMCSecret {} with default credentials", name);
                        Ok(())
                    }
                    // Lost the race to another reconcile; tolerated
                    Err(kube::Error::Api(e)) if e.code == 409 => Ok(()),
                    Err(e) => Err(ControllerError::Kube(e)),
                }
            }
        }
    }

    /// Create the BMC referencing the endpoint and secret if absent.
    async fn ensure_bmc(
        &self,
        endpoint: &Endpoint,
        name: &str,
        entry: &macdb::MacPrefixEntry,
        protocol_name: ProtocolName,
    ) -> Result<(), ControllerError> {
        if self.bmc_api.get_opt(name).await?.is_some() {
            debug!("BMC {} already exists", name);
            return Ok(());
        }

        let bmc = BMC {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: endpoint.metadata.namespace.clone(),
                owner_references: Some(vec![owner_reference::<Endpoint>(&endpoint.metadata)?]),
                ..Default::default()
            },
            spec: BMCSpec {
                endpoint_ref: Some(ObjectRef::new(name)),
                endpoint: None,
                bmc_secret_ref: SecretRef::new(name),
                protocol: Protocol {
                    name: protocol_name,
                    port: entry.port,
                    scheme: None,
                },
                console_protocol: entry.console.as_ref().map(|c| ConsoleProtocol {
                    name: c.r#type.clone(),
                    port: c.port,
                }),
                bmc_settings_ref: None,
                hostname: None,
            },
            status: None,
        };
        match self.bmc_api.create(&PostParams::default(), &bmc).await {
            Ok(_) => {
                info!("Created BMC {} ({} via {:?})", name, entry.manufacturer, protocol_name);
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(()),
            Err(e) => Err(ControllerError::Kube(e)),
        }
    }
}
