//! Prometheus metrics for the registry surface

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

use crate::error::RegistryError;

/// Counters exposed at `GET /metrics`
#[derive(Debug, Clone)]
pub struct RegistryMetrics {
    /// Inventory posts accepted
    pub inventory_posts_total: IntCounter,

    /// Redfish events received, labeled by BMC hostname and severity
    pub events_total: IntCounterVec,

    /// Metric reports received, labeled by BMC hostname
    pub metric_reports_total: IntCounterVec,
}

impl RegistryMetrics {
    /// Create the counters and register them.
    pub fn new(registry: &Registry) -> Result<Self, RegistryError> {
        let inventory_posts_total = IntCounter::with_opts(Opts::new(
            "metalops_inventory_posts_total",
            "Inventory reports posted by probe OS instances",
        ))?;
        let events_total = IntCounterVec::new(
            Opts::new(
                "metalops_redfish_events_total",
                "Redfish events received per BMC and severity",
            ),
            &["hostname", "severity"],
        )?;
        let metric_reports_total = IntCounterVec::new(
            Opts::new(
                "metalops_redfish_metric_reports_total",
                "Redfish metric reports received per BMC",
            ),
            &["hostname"],
        )?;

        registry.register(Box::new(inventory_posts_total.clone()))?;
        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(metric_reports_total.clone()))?;

        Ok(Self {
            inventory_posts_total,
            events_total,
            metric_reports_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        let registry = Registry::new();
        let metrics = RegistryMetrics::new(&registry).unwrap();
        metrics.inventory_posts_total.inc();
        metrics.events_total.with_label_values(&["bmc-1", "Critical"]).inc();
        let families = registry.gather();
        assert_eq!(families.len(), 2);
    }
}
