//! Kubernetes resource watchers.
//!
//! This module handles watching Kubernetes resources for changes
//! and triggering reconciliation using kube_runtime::Controller.
//!
//! All watchers use a generic `watch_resource()` helper that properly handles
//! the reconcile loop with automatic reconnection and retry logic. The Server
//! watcher runs with its own configurable concurrency; everything else is a
//! small fixed pool.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{
    BIOSSettings, BIOSSettingsSet, BIOSVersion, BIOSVersionSet, BMCSettings, BMCSettingsSet,
    BMCVersion, BMCVersionSet, Endpoint, Server, ServerBootConfiguration, ServerClaim,
    ServerMaintenance, ServerMaintenanceSet, BMC,
};
use futures::StreamExt;
use kube::Api;
use kube_runtime::{
    controller::{Action, Config as ControllerConfig, Controller},
    watcher,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Generic watcher helper that uses kube_runtime::Controller.
///
/// The Controller handles reconnection, retry scheduling, and event
/// deduplication; the reconcile closure simply forwards into the shared
/// [`Reconciler`].
async fn watch_resource<K, F>(
    api: Api<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    resource_name: &str,
    concurrency: u16,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + std::cmp::Eq + std::hash::Hash + Clone + std::fmt::Debug + Unpin,
    F: Fn(Arc<Reconciler>, Arc<K>) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Action, ControllerError>> + Send>>
        + Send
        + Sync
        + Clone
        + 'static,
{
    info!("Starting {} watcher", resource_name);

    // Error policy: requeue with the resource's backoff; CAS conflicts
    // requeue fast because re-deriving is cheap and side-effect free
    let error_policy = |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        if error.is_conflict() {
            return Action::requeue(Duration::from_secs(1));
        }
        let key = format!(
            "{}/{}",
            obj.meta().namespace.as_deref().unwrap_or("default"),
            obj.meta().name.as_deref().unwrap_or("?"),
        );
        error!("Reconciliation error for {} {}: {}", std::any::type_name::<K>(), key, error);
        Action::requeue(ctx.backoff_delay(&key))
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        let resource_name = resource_name.to_string();
        async move {
            debug!("Reconciling {} {:?}", resource_name, obj.meta().name);
            reconcile_fn(ctx, obj).await
        }
    };

    // Debounce batches bursts of status updates; concurrency bounds the
    // per-kind worker pool
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(1))
        .concurrency(concurrency);

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error: {}", e);
            }
        })
        .await;

    Ok(())
}

macro_rules! watch_method {
    ($fn_name:ident, $kind:ty, $api:ident, $reconcile:ident, $label:literal) => {
        /// Watch loop for the named resource kind.
        pub async fn $fn_name(&self) -> Result<(), ControllerError> {
            let reconciler = Arc::clone(&self.reconciler);
            let api = self.$api.clone();
            watch_resource(
                api,
                reconciler,
                |ctx: Arc<Reconciler>, obj: Arc<$kind>| {
                    Box::pin(async move { ctx.$reconcile(&obj).await })
                },
                $label,
                1,
            )
            .await
        }
    };
}

/// Watches Kubernetes resources for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    endpoint_api: Api<Endpoint>,
    bmc_api: Api<BMC>,
    server_api: Api<Server>,
    server_claim_api: Api<ServerClaim>,
    boot_config_api: Api<ServerBootConfiguration>,
    maintenance_api: Api<ServerMaintenance>,
    bios_settings_api: Api<BIOSSettings>,
    bmc_settings_api: Api<BMCSettings>,
    bios_version_api: Api<BIOSVersion>,
    bmc_version_api: Api<BMCVersion>,
    bios_settings_set_api: Api<BIOSSettingsSet>,
    bios_version_set_api: Api<BIOSVersionSet>,
    bmc_settings_set_api: Api<BMCSettingsSet>,
    bmc_version_set_api: Api<BMCVersionSet>,
    maintenance_set_api: Api<ServerMaintenanceSet>,
    server_concurrency: u16,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        apis: crate::reconciler::ApiSet,
        server_concurrency: u16,
    ) -> Self {
        Self {
            reconciler,
            endpoint_api: apis.endpoint,
            bmc_api: apis.bmc,
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
            server_concurrency,
        }
    }

    /// Watch loop for Servers, with the configurable reconcile pool.
    pub async fn watch_servers(&self) -> Result<(), ControllerError> {
        let reconciler = Arc::clone(&self.reconciler);
        let api = self.server_api.clone();
        watch_resource(
            api,
            reconciler,
            |ctx: Arc<Reconciler>, obj: Arc<Server>| {
                Box::pin(async move { ctx.reconcile_server(&obj).await })
            },
            "Server",
            self.server_concurrency,
        )
        .await
    }

    watch_method!(watch_endpoints, Endpoint, endpoint_api, reconcile_endpoint, "Endpoint");
    watch_method!(watch_bmcs, BMC, bmc_api, reconcile_bmc, "BMC");
    watch_method!(watch_server_claims, ServerClaim, server_claim_api, reconcile_server_claim, "ServerClaim");
    watch_method!(watch_boot_configurations, ServerBootConfiguration, boot_config_api, reconcile_boot_configuration, "ServerBootConfiguration");
    watch_method!(watch_server_maintenances, ServerMaintenance, maintenance_api, reconcile_server_maintenance, "ServerMaintenance");
    watch_method!(watch_bios_settings, BIOSSettings, bios_settings_api, reconcile_bios_settings, "BIOSSettings");
    watch_method!(watch_bmc_settings, BMCSettings, bmc_settings_api, reconcile_bmc_settings, "BMCSettings");
    watch_method!(watch_bios_versions, BIOSVersion, bios_version_api, reconcile_bios_version, "BIOSVersion");
    watch_method!(watch_bmc_versions, BMCVersion, bmc_version_api, reconcile_bmc_version, "BMCVersion");
    watch_method!(watch_bios_settings_sets, BIOSSettingsSet, bios_settings_set_api, reconcile_bios_settings_set, "BIOSSettingsSet");
    watch_method!(watch_bios_version_sets, BIOSVersionSet, bios_version_set_api, reconcile_bios_version_set, "BIOSVersionSet");
    watch_method!(watch_bmc_settings_sets, BMCSettingsSet, bmc_settings_set_api, reconcile_bmc_settings_set, "BMCSettingsSet");
    watch_method!(watch_bmc_version_sets, BMCVersionSet, bmc_version_set_api, reconcile_bmc_version_set, "BMCVersionSet");
    watch_method!(watch_server_maintenance_sets, ServerMaintenanceSet, maintenance_set_api, reconcile_server_maintenance_set, "ServerMaintenanceSet");
}
