//! Redfish event collection
//!
//! BMCs deliver alert and metric-report payloads to the registry's HTTP
//! surface. Critical alerts are forwarded to an [`EventSink`] registered by
//! the controller, which maps the sending hostname back to its Servers.

use redfish_client::{EventPayload, MetricReportPayload, RedfishEvent};
use tracing::{debug, info};

/// Receiver of critical events, wired in by the controller.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    /// Called once per event with severity Critical.
    async fn critical_event(&self, hostname: &str, event: &RedfishEvent);
}

/// A sink that drops everything; used when no controller is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

#[async_trait::async_trait]
impl EventSink for NullEventSink {
    async fn critical_event(&self, _hostname: &str, _event: &RedfishEvent) {}
}

/// Split an alert payload into (total, critical) and forward critical events.
pub async fn process_alerts(
    sink: &dyn EventSink,
    hostname: &str,
    payload: &EventPayload,
) -> (usize, usize) {
    let total = payload.events.len();
    let mut critical = 0;
    for event in &payload.events {
        if event.severity.as_deref() == Some("Critical") {
            critical += 1;
            info!(
                "Critical event from {}: {} ({})",
                hostname,
                event.message.as_deref().unwrap_or("<no message>"),
                event.event_id.as_deref().unwrap_or("<no id>"),
            );
            sink.critical_event(hostname, event).await;
        }
    }
    debug!("Processed {} events ({} critical) from {}", total, critical, hostname);
    (total, critical)
}

/// Count the metric values carried by a report payload.
pub fn process_metric_report(hostname: &str, payload: &MetricReportPayload) -> usize {
    let count = payload.metric_values.len();
    debug!("Received metric report with {} values from {}", count, hostname);
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingSink {
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl EventSink for RecordingSink {
        async fn critical_event(&self, hostname: &str, event: &RedfishEvent) {
            self.seen.lock().unwrap().push((
                hostname.to_string(),
                event.event_id.clone().unwrap_or_default(),
            ));
        }
    }

    fn event(severity: &str, id: &str) -> RedfishEvent {
        RedfishEvent {
            event_id: Some(id.to_string()),
            severity: Some(severity.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_only_critical_events_reach_the_sink() {
        let sink = Arc::new(RecordingSink {
            seen: Mutex::new(Vec::new()),
        });
        let payload = EventPayload {
            events: vec![event("OK", "e1"), event("Critical", "e2"), event("Warning", "e3")],
        };
        let (total, critical) = process_alerts(sink.as_ref(), "bmc-1", &payload).await;
        assert_eq!(total, 3);
        assert_eq!(critical, 1);
        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[("bmc-1".to_string(), "e2".to_string())]);
    }
}
