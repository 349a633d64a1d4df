use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

// ============================================================================
// Metrics Module - Prometheus metrics for the order service
// ============================================================================
//
// Provides metrics for:
// - Command throughput and outcome, by command name
// - Command latency
// - Optimistic concurrency conflicts that forced a re-run
// - Checkouts and fulfillment requests
//
// Metrics live in a private registry owned by the service and are exported
// in the Prometheus text format via `render`.
// ============================================================================

pub struct OrderMetrics {
    registry: Registry,

    // Command Metrics
    pub commands_total: IntCounterVec,
    pub command_duration: HistogramVec,
    pub version_conflicts: IntCounterVec,

    // Lifecycle Metrics
    pub orders_checked_out: IntCounter,
    pub fulfillment_requests: IntCounterVec,
}

impl OrderMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let commands_total = IntCounterVec::new(
            Opts::new("order_commands_total", "Total order commands handled"),
            &["command", "outcome"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let command_duration = HistogramVec::new(
            HistogramOpts::new("order_command_duration_seconds", "Order command handling duration")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        let version_conflicts = IntCounterVec::new(
            Opts::new("order_version_conflicts_total", "Writes rejected by the optimistic version check"),
            &["command"],
        )?;
        registry.register(Box::new(version_conflicts.clone()))?;

        let orders_checked_out = IntCounter::new(
            "orders_checked_out_total",
            "Total orders that completed checkout",
        )?;
        registry.register(Box::new(orders_checked_out.clone()))?;

        let fulfillment_requests = IntCounterVec::new(
            Opts::new("fulfillment_requests_total", "Fulfillment requests by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(fulfillment_requests.clone()))?;

        Ok(Self {
            registry,
            commands_total,
            command_duration,
            version_conflicts,
            orders_checked_out,
            fulfillment_requests,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record a finished command. `outcome` is "ok" or an error kind.
    pub fn record_command(&self, command: &str, outcome: &str, duration_secs: f64) {
        self.commands_total.with_label_values(&[command, outcome]).inc();
        self.command_duration.with_label_values(&[command]).observe(duration_secs);
    }

    pub fn record_conflict(&self, command: &str) {
        self.version_conflicts.with_label_values(&[command]).inc();
    }

    pub fn record_checkout(&self) {
        self.orders_checked_out.inc();
    }

    /// `outcome` is one of "dispatched", "fulfilled", "failed".
    pub fn record_fulfillment(&self, outcome: &str) {
        self.fulfillment_requests.with_label_values(&[outcome]).inc();
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = OrderMetrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_record_command() {
        let metrics = OrderMetrics::new().unwrap();
        metrics.record_command("add_item", "ok", 0.002);
        metrics.record_command("add_item", "validation", 0.001);

        assert_eq!(metrics.commands_total.with_label_values(&["add_item", "ok"]).get(), 1);
        assert_eq!(metrics.commands_total.with_label_values(&["add_item", "validation"]).get(), 1);
        assert_eq!(metrics.command_duration.with_label_values(&["add_item"]).get_sample_count(), 2);
    }

    #[test]
    fn test_render_contains_metric_names() {
        let metrics = OrderMetrics::new().unwrap();
        metrics.record_checkout();
        metrics.record_conflict("checkout");
        metrics.record_fulfillment("dispatched");

        let text = metrics.render().unwrap();
        assert!(text.contains("orders_checked_out_total 1"));
        assert!(text.contains("order_version_conflicts_total"));
        assert!(text.contains("fulfillment_requests_total"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = OrderMetrics::new().unwrap();
        let b = OrderMetrics::new().unwrap();
        a.record_checkout();
        assert_eq!(a.orders_checked_out.get(), 1);
        assert_eq!(b.orders_checked_out.get(), 0);
    }
}
