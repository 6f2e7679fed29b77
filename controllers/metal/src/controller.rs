//! Main controller implementation.
//!
//! This module contains the `Controller` struct that orchestrates
//! reconciliation and resource watching for the unified MetalOps controller,
//! plus the two HTTP surfaces: the discovery registry (inventory, events,
//! metrics, probes) and the validating admission webhook.

use crate::admission::{self, AdmissionState};
use crate::config::Config;
use crate::error::ControllerError;
use crate::events::CriticalEventConditionSink;
use crate::reconciler::{ApiSet, PoolConnector, Reconciler, ReconcilerDeps};
use crate::watcher::Watcher;
use discovery_registry::{AppState, InventoryStore, RegistryMetrics};
use kube::Client;
use macdb::MacPrefixDatabase;
use redfish_client::RedfishClientPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Main controller for MetalOps resource management.
pub struct Controller {
    tasks: Vec<(&'static str, JoinHandle<Result<(), ControllerError>>)>,
}

impl Controller {
    /// Creates a new controller instance: Kubernetes client, Redfish pool,
    /// MAC database, inventory registry, reconciler, and all watchers.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing MetalOps controller");

        let kube_client = Client::try_default().await.map_err(ControllerError::Kube)?;
        let namespace = config
            .manager_namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let apis = ApiSet::namespaced(kube_client, &namespace);

        let macdb = Arc::new(MacPrefixDatabase::load(&config.mac_prefixes_file)?);
        info!("Loaded {} MAC prefix entries from {}", macdb.len(), config.mac_prefixes_file);

        let registry_store = Arc::new(InventoryStore::new());
        let redfish = Arc::new(PoolConnector::new(RedfishClientPool::new(config.insecure)));

        let reconciler = Arc::new(Reconciler::new(
            apis.clone(),
            ReconcilerDeps {
                redfish,
                registry: Arc::clone(&registry_store),
                macdb,
                config: config.clone(),
            },
        ));

        let watcher = Arc::new(Watcher::new(
            Arc::clone(&reconciler),
            apis.clone(),
            config.server_max_concurrent_reconciles,
        ));

        let mut tasks: Vec<(&'static str, JoinHandle<Result<(), ControllerError>>)> = Vec::new();
        macro_rules! spawn_watcher {
            ($label:literal, $method:ident) => {{
                let watcher = Arc::clone(&watcher);
                tasks.push(($label, tokio::spawn(async move { watcher.$method().await })));
            }};
        }
        spawn_watcher!("Endpoint", watch_endpoints);
        spawn_watcher!("BMC", watch_bmcs);
        spawn_watcher!("Server", watch_servers);
        spawn_watcher!("ServerClaim", watch_server_claims);
        spawn_watcher!("ServerBootConfiguration", watch_boot_configurations);
        spawn_watcher!("ServerMaintenance", watch_server_maintenances);
        spawn_watcher!("BIOSSettings", watch_bios_settings);
        spawn_watcher!("BMCSettings", watch_bmc_settings);
        spawn_watcher!("BIOSVersion", watch_bios_versions);
        spawn_watcher!("BMCVersion", watch_bmc_versions);
        spawn_watcher!("BIOSSettingsSet", watch_bios_settings_sets);
        spawn_watcher!("BIOSVersionSet", watch_bios_version_sets);
        spawn_watcher!("BMCSettingsSet", watch_bmc_settings_sets);
        spawn_watcher!("BMCVersionSet", watch_bmc_version_sets);
        spawn_watcher!("ServerMaintenanceSet", watch_server_maintenance_sets);

        // Registry + metrics + probes HTTP surface
        let metrics_addr: SocketAddr = config.metrics_bind_address.parse().map_err(|e| {
            ControllerError::InvalidConfig(format!(
                "METRICS_BIND_ADDRESS {}: {e}",
                config.metrics_bind_address
            ))
        })?;
        let prometheus_registry = prometheus::Registry::new();
        let metrics = RegistryMetrics::new(&prometheus_registry)
            .map_err(|e| ControllerError::InvalidConfig(format!("metrics registration: {e}")))?;
        let sink = Arc::new(CriticalEventConditionSink::new(
            apis.bmc.clone(),
            apis.server.clone(),
        ));
        let registry_state = AppState {
            store: Arc::clone(&registry_store),
            sink,
            metrics,
            registry: prometheus_registry,
        };
        tasks.push((
            "registry-http",
            tokio::spawn(async move {
                discovery_registry::serve(registry_state, metrics_addr)
                    .await
                    .map_err(|e| ControllerError::Watch(format!("registry server: {e}")))
            }),
        ));

        // Stale inventory purge
        let purge_store = Arc::clone(&registry_store);
        let purge_interval = config.registry_resync_interval;
        tasks.push((
            "registry-purge",
            tokio::spawn(async move {
                discovery_registry::spawn_purge_task(purge_store, purge_interval * 3, purge_interval)
                    .await
                    .map_err(|e| ControllerError::Watch(format!("purge task: {e}")))
            }),
        ));

        // Validating admission webhook
        let webhook_addr: SocketAddr = ([0, 0, 0, 0], config.webhook_port).into();
        let admission_state = AdmissionState::new(&apis);
        tasks.push((
            "admission-webhook",
            tokio::spawn(async move { admission::serve(admission_state, webhook_addr).await }),
        ));

        Ok(Self { tasks })
    }

    /// Runs the controller until the first task exits.
    ///
    /// Watchers run forever; any exit is a failure worth restarting the
    /// process over (the write lease holder must never limp along).
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("MetalOps controller running ({} tasks)", self.tasks.len());

        let (labels, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let (result, index, _rest) = futures::future::select_all(handles).await;
        let label = labels.get(index).copied().unwrap_or("unknown");

        match result {
            Ok(Ok(())) => {
                error!("{} task exited unexpectedly", label);
                Err(ControllerError::Watch(format!("{label} task exited")))
            }
            Ok(Err(e)) => {
                error!("{} task failed: {}", label, e);
                Err(e)
            }
            Err(join_error) => {
                error!("{} task panicked: {}", label, join_error);
                Err(ControllerError::Watch(format!("{label} task panicked: {join_error}")))
            }
        }
    }
}
