//! Discovery registry and event collector
//!
//! Hosts the in-memory inventory registry populated by probe OS instances
//! during server discovery, and the Redfish event collector that forwards
//! critical alerts back to the controller. Both share one axum HTTP surface
//! together with Prometheus exposition and health probes.

pub mod error;
pub mod events;
pub mod http;
pub mod inventory;
pub mod metrics;

pub use error::RegistryError;
pub use events::{EventSink, NullEventSink};
pub use http::{router, serve, AppState};
pub use inventory::{
    DiskReport, DmiInfo, InventoryReport, InventoryStore, LldpNeighborReport, NicReport,
    ProcessorReport,
};
pub use metrics::RegistryMetrics;

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Spawn the periodic purge of stale inventory entries.
///
/// Entries older than `ttl` are dropped each `interval`.
pub fn spawn_purge_task(
    store: Arc<InventoryStore>,
    ttl: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let purged = store.purge_older_than(ttl);
            if purged > 0 {
                debug!("Purged {} stale inventory entries", purged);
            }
        }
    })
}
