//! Reconciliation logic for MetalOps CRDs.
//!
//! This module is organized by controller area:
//! - `discovery`: Endpoint resolution and BMC reconciliation
//! - `lifecycle`: Server state machine, claims, maintenance, boot configs
//! - `firmware`: BIOS/BMC settings and version reconcilers
//! - `sets`: selector-based fan-out controllers

pub mod discovery;
pub mod lifecycle;
pub mod firmware;
pub mod sets;

use crate::backoff::FibonacciBackoff;
use crate::config::Config;
use crate::error::ControllerError;
use crate::reconcile_helpers::decode_secret_value;
use crds::{
    BIOSSettings, BIOSSettingsSet, BIOSVersion, BIOSVersionSet, BMCSecret, BMCSettings,
    BMCSettingsSet, BMCVersion, BMCVersionSet, Endpoint, ProtocolName, Server,
    ServerBootConfiguration, ServerClaim, ServerMaintenance, ServerMaintenanceSet, BMC,
    SECRET_PASSWORD_KEY, SECRET_USERNAME_KEY,
};
use discovery_registry::InventoryStore;
use k8s_openapi::api::core::v1::Secret;
use kube::Api;
use kube_runtime::controller::Action;
use macdb::MacPrefixDatabase;
use redfish_client::{BmcProtocol, RedfishClientPool, RedfishClientTrait, RedfishError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Seam between reconcilers and the Redfish transport.
///
/// Production wires the session pool; tests wire a mock client.
pub trait RedfishConnector: Send + Sync {
    /// Resolve a protocol + endpoint + credentials into a client.
    fn connect(
        &self,
        protocol: BmcProtocol,
        address: &str,
        username: &str,
        password: &str,
    ) -> Result<Arc<dyn RedfishClientTrait>, RedfishError>;
}

/// Connector backed by the bounded session pool.
#[derive(Debug)]
pub struct PoolConnector {
    pool: RedfishClientPool,
}

impl PoolConnector {
    /// Wrap a session pool.
    pub fn new(pool: RedfishClientPool) -> Self {
        Self { pool }
    }
}

impl RedfishConnector for PoolConnector {
    fn connect(
        &self,
        protocol: BmcProtocol,
        address: &str,
        username: &str,
        password: &str,
    ) -> Result<Arc<dyn RedfishClientTrait>, RedfishError> {
        redfish_client::connect(&self.pool, protocol, address, username, password)
    }
}

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::for_reconcile(),
            error_count: 0,
        }
    }
}

/// Reconciles all MetalOps resources.
pub struct Reconciler {
    pub(crate) redfish: Arc<dyn RedfishConnector>,
    pub(crate) endpoint_api: Api<Endpoint>,
    pub(crate) bmc_api: Api<BMC>,
    pub(crate) bmc_secret_api: Api<BMCSecret>,
    pub(crate) server_api: Api<Server>,
    pub(crate) server_claim_api: Api<ServerClaim>,
    pub(crate) boot_config_api: Api<ServerBootConfiguration>,
    pub(crate) maintenance_api: Api<ServerMaintenance>,
    pub(crate) bios_settings_api: Api<BIOSSettings>,
    pub(crate) bmc_settings_api: Api<BMCSettings>,
    pub(crate) bios_version_api: Api<BIOSVersion>,
    pub(crate) bmc_version_api: Api<BMCVersion>,
    pub(crate) bios_settings_set_api: Api<BIOSSettingsSet>,
    pub(crate) bios_version_set_api: Api<BIOSVersionSet>,
    pub(crate) bmc_settings_set_api: Api<BMCSettingsSet>,
    pub(crate) bmc_version_set_api: Api<BMCVersionSet>,
    pub(crate) maintenance_set_api: Api<ServerMaintenanceSet>,
    pub(crate) secret_api: Api<Secret>,
    pub(crate) registry: Arc<InventoryStore>,
    pub(crate) macdb: Arc<MacPrefixDatabase>,
    pub(crate) config: Config,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

/// Everything the Reconciler needs besides its API handles.
pub struct ReconcilerDeps {
    /// Redfish transport seam
    pub redfish: Arc<dyn RedfishConnector>,
    /// Shared inventory store
    pub registry: Arc<InventoryStore>,
    /// MAC prefix database
    pub macdb: Arc<MacPrefixDatabase>,
    /// Runtime configuration
    pub config: Config,
}

/// API handles for every managed kind.
#[derive(Clone)]
pub struct ApiSet {
    /// Endpoint API
    pub endpoint: Api<Endpoint>,
    /// BMC API
    pub bmc: Api<BMC>,
    /// BMCSecret API
    pub bmc_secret: Api<BMCSecret>,
    /// Server API
    pub server: Api<Server>,
    /// ServerClaim API
    pub server_claim: Api<ServerClaim>,
    /// ServerBootConfiguration API
    pub boot_config: Api<ServerBootConfiguration>,
    /// ServerMaintenance API
    pub maintenance: Api<ServerMaintenance>,
    /// BIOSSettings API
    pub bios_settings: Api<BIOSSettings>,
    /// BMCSettings API
    pub bmc_settings: Api<BMCSettings>,
    /// BIOSVersion API
    pub bios_version: Api<BIOSVersion>,
    /// BMCVersion API
    pub bmc_version: Api<BMCVersion>,
    /// BIOSSettingsSet API
    pub bios_settings_set: Api<BIOSSettingsSet>,
    /// BIOSVersionSet API
    pub bios_version_set: Api<BIOSVersionSet>,
    /// BMCSettingsSet API
    pub bmc_settings_set: Api<BMCSettingsSet>,
    /// BMCVersionSet API
    pub bmc_version_set: Api<BMCVersionSet>,
    /// ServerMaintenanceSet API
    pub maintenance_set: Api<ServerMaintenanceSet>,
    /// Core Secret API (ignition payloads)
    pub secret: Api<Secret>,
}

impl ApiSet {
    /// Build namespaced API handles from a client.
    pub fn namespaced(client: kube::Client, namespace: &str) -> Self {
        Self {
            endpoint: Api::namespaced(client.clone(), namespace),
            bmc: Api::namespaced(client.clone(), namespace),
            bmc_secret: Api::namespaced(client.clone(), namespace),
            server: Api::namespaced(client.clone(), namespace),
            server_claim: Api::namespaced(client.clone(), namespace),
            boot_config: Api::namespaced(client.clone(), namespace),
            maintenance: Api::namespaced(client.clone(), namespace),
            bios_settings: Api::namespaced(client.clone(), namespace),
            bmc_settings: Api::namespaced(client.clone(), namespace),
            bios_version: Api::namespaced(client.clone(), namespace),
            bmc_version: Api::namespaced(client.clone(), namespace),
            bios_settings_set: Api::namespaced(client.clone(), namespace),
            bios_version_set: Api::namespaced(client.clone(), namespace),
            bmc_settings_set: Api::namespaced(client.clone(), namespace),
            bmc_version_set: Api::namespaced(client.clone(), namespace),
            maintenance_set: Api::namespaced(client.clone(), namespace),
            secret: Api::namespaced(client, namespace),
        }
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(apis: ApiSet, deps: ReconcilerDeps) -> Self {
        Self {
            redfish: deps.redfish,
            endpoint_api: apis.endpoint,
            bmc_api: apis.bmc,
            bmc_secret_api: apis.bmc_secret,
            server_api: apis.server,
            server_claim_api: apis.server_claim,
            boot_config_api: apis.boot_config,
            maintenance_api: apis.maintenance,
            bios_settings_api: apis.bios_settings,
            bmc_settings_api: apis.bmc_settings,
            bios_version_api: apis.bios_version,
            bmc_version_api: apis.bmc_version,
            bios_settings_set_api: apis.bios_settings_set,
            bios_version_set_api: apis.bios_version_set,
            bmc_settings_set_api: apis.bmc_settings_set,
            bmc_version_set_api: apis.bmc_version_set,
            maintenance_set_api: apis.maintenance_set,
            secret_api: apis.secret,
            registry: deps.registry,
            macdb: deps.macdb,
            config: deps.config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Map a protocol declaration onto the connector's protocol type.
    pub(crate) fn protocol_of(name: ProtocolName) -> BmcProtocol {
        match name {
            ProtocolName::Redfish => BmcProtocol::Redfish,
            ProtocolName::RedfishLocal => BmcProtocol::RedfishLocal,
            ProtocolName::RedfishKube => BmcProtocol::RedfishKube,
            ProtocolName::IPMI => BmcProtocol::Ipmi,
            ProtocolName::SSH => BmcProtocol::Ssh,
        }
    }

    /// Resolve a BMC's endpoint (reference or inline) into (mac, ip).
    pub(crate) async fn resolve_bmc_endpoint(
        &self,
        bmc: &BMC,
    ) -> Result<(String, String), ControllerError> {
        if let Some(endpoint_ref) = &bmc.spec.endpoint_ref {
            let endpoint = self.endpoint_api.get(&endpoint_ref.name).await?;
            return Ok((endpoint.spec.mac_address.clone(), endpoint.spec.ip.clone()));
        }
        if let Some(inline) = &bmc.spec.endpoint {
            return Ok((inline.mac_address.clone(), inline.ip.clone()));
        }
        Err(ControllerError::InvalidConfig(
            "BMC has neither endpointRef nor inline endpoint".to_string(),
        ))
    }

    /// Read and decode the credentials of a BMC.
    pub(crate) async fn resolve_bmc_credentials(
        &self,
        secret_name: &str,
    ) -> Result<(String, String), ControllerError> {
        let secret: BMCSecret = self.bmc_secret_api.get(secret_name).await?;
        let username = decode_secret_value(&secret.spec.data, SECRET_USERNAME_KEY)?;
        let password = decode_secret_value(&secret.spec.data, SECRET_PASSWORD_KEY)?;
        Ok((username, password))
    }

    /// Open (or reuse) the Redfish session for a BMC.
    pub(crate) async fn bmc_client(
        &self,
        bmc: &BMC,
    ) -> Result<Arc<dyn RedfishClientTrait>, ControllerError> {
        let (_mac, ip) = self.resolve_bmc_endpoint(bmc).await?;
        let (username, password) = self
            .resolve_bmc_credentials(&bmc.spec.bmc_secret_ref.name)
            .await?;
        let scheme = bmc.spec.protocol.scheme.as_deref().unwrap_or("https");
        let address = format!("{}://{}:{}", scheme, ip, bmc.spec.protocol.port);
        let client = self.redfish.connect(
            Self::protocol_of(bmc.spec.protocol.name),
            &address,
            &username,
            &password,
        )?;
        Ok(client)
    }

    /// Resolve the Redfish client and system id for a Server.
    pub(crate) async fn server_client(
        &self,
        server: &Server,
    ) -> Result<(Arc<dyn RedfishClientTrait>, String), ControllerError> {
        let client = if let Some(bmc_ref) = &server.spec.bmc_ref {
            let bmc = self
                .bmc_api
                .get(&bmc_ref.name)
                .await
                .map_err(|_| ControllerError::BmcNotFound(bmc_ref.name.clone()))?;
            self.bmc_client(&bmc).await?
        } else if let Some(inline) = &server.spec.bmc {
            let (username, password) = self
                .resolve_bmc_credentials(&inline.bmc_secret_ref.name)
                .await?;
            self.redfish.connect(
                Self::protocol_of(inline.protocol.name),
                &inline.address,
                &username,
                &password,
            )?
        } else {
            return Err(ControllerError::InvalidConfig(
                "Server has neither bmcRef nor inline BMC access".to_string(),
            ));
        };

        let system_id = Self::system_id_of(server);
        Ok((client, system_id))
    }

    /// The Redfish system identifier of a Server: the last segment of the
    /// system URI, falling back to the system UUID.
    pub(crate) fn system_id_of(server: &Server) -> String {
        server
            .spec
            .system_uri
            .as_deref()
            .and_then(|uri| uri.trim_end_matches('/').rsplit('/').next())
            .map(str::to_string)
            .unwrap_or_else(|| server.spec.system_uuid.clone())
    }

    /// Requeue action honoring the resource's Fibonacci backoff.
    pub(crate) fn requeue_with_backoff(&self, resource_key: &str) -> Action {
        Action::requeue(self.backoff_delay(resource_key))
    }

    /// The next backoff delay for a resource based on its error history.
    pub fn backoff_delay(&self, resource_key: &str) -> Duration {
        match self.backoff_states.lock() {
            Ok(mut states) => states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::new)
                .backoff
                .next_delay(),
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                Duration::from_secs(60)
            }
        }
    }

    /// Increment error count for a resource
    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::new)
                .error_count += 1;
        }
    }

    /// Reset error count for a resource (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.error_count = 0;
                state.backoff.reset();
            }
        }
    }
}
