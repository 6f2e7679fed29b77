//! MetalOps Controller
//!
//! Unified controller for the bare-metal lifecycle CRDs:
//! - Endpoint/BMC: discovery of manageable controllers and their servers
//! - Server: the per-machine lifecycle state machine
//! - ServerClaim: tenant binding
//! - ServerMaintenance: arbitration of disruptive operations
//! - BIOS/BMC Settings and Versions (and their Sets): declarative firmware
//!   configuration driven over Redfish
//!
//! Also hosts the discovery registry HTTP surface and the validating
//! admission webhook.

mod admission;
mod backoff;
mod config;
mod controller;
mod error;
mod events;
mod reconcile_helpers;
mod reconciler;
mod test_utils;
mod watcher;

use crate::config::Config;
use crate::controller::Controller;
use crate::error::ControllerError;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting MetalOps controller");

    let config = Config::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.manager_namespace.as_deref().unwrap_or("default"));
    info!("  Registry: {}", config.registry_url);
    info!("  MAC prefixes: {}", config.mac_prefixes_file);
    info!("  Discovery timeout: {:?}", config.discovery_timeout);
    info!("  Server reconciles: {}", config.server_max_concurrent_reconciles);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
