//! HTTP surface of the registry
//!
//! Exposes the inventory post endpoint for the probe OS, the Redfish event
//! receivers, Prometheus exposition, and liveness/readiness probes.

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use redfish_client::{EventPayload, MetricReportPayload};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::RegistryError;
use crate::events::{process_alerts, process_metric_report, EventSink};
use crate::inventory::{InventoryReport, InventoryStore};
use crate::metrics::RegistryMetrics;

/// Shared state of the registry HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Inventory store shared with the Server reconciler
    pub store: Arc<InventoryStore>,

    /// Critical-event receiver wired in by the controller
    pub sink: Arc<dyn EventSink>,

    /// Counters
    pub metrics: RegistryMetrics,

    /// Prometheus registry rendered at /metrics
    pub registry: Registry,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("stored_inventories", &self.store.len())
            .finish()
    }
}

/// Build the registry router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/inventory/{uuid}", post(post_inventory).get(get_inventory))
        .route("/serverevents/alerts/{hostname}", post(post_alerts))
        .route("/serverevents/metricsreport/{hostname}", post(post_metric_report))
        .route("/metrics", get(get_metrics))
        .route("/healthz", get(healthz))
        .route("/readyz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the registry until the process exits.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<(), RegistryError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Discovery registry listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn post_inventory(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Json(report): Json<InventoryReport>,
) -> impl IntoResponse {
    let Ok(system_uuid) = Uuid::parse_str(&uuid) else {
        warn!("Rejecting inventory post with invalid UUID {}", uuid);
        return StatusCode::BAD_REQUEST;
    };
    state.store.insert(system_uuid, report);
    state.metrics.inventory_posts_total.inc();
    StatusCode::NO_CONTENT
}

async fn get_inventory(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> impl IntoResponse {
    let Ok(system_uuid) = Uuid::parse_str(&uuid) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match state.store.get(&system_uuid) {
        Some(report) => Json(report).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn post_alerts(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
    Json(payload): Json<EventPayload>,
) -> impl IntoResponse {
    for event in &payload.events {
        let severity = event.severity.as_deref().unwrap_or("Unknown");
        state
            .metrics
            .events_total
            .with_label_values(&[hostname.as_str(), severity])
            .inc();
    }
    process_alerts(state.sink.as_ref(), &hostname, &payload).await;
    StatusCode::OK
}

async fn post_metric_report(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
    Json(payload): Json<MetricReportPayload>,
) -> impl IntoResponse {
    state
        .metrics
        .metric_reports_total
        .with_label_values(&[hostname.as_str()])
        .inc();
    process_metric_report(&hostname, &payload);
    StatusCode::OK
}

async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
