//! Metrics recording implementation using Prometheus.

use prometheus::{
    register_counter_vec_with_registry, register_int_counter_with_registry, CounterVec, Encoder,
    IntCounter, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Trait for recording application metrics.
pub trait MetricsRecorder: Clone + Send + Sync + 'static {
    /// Records a snapshot delivered by an identity source.
    fn record_source_event(&self, source: &str, connected: bool);

    /// Records a false -> true transition of full authentication.
    fn record_full_transition(&self);

    /// Records an access decision.
    fn record_decision(&self, requirement: &str, decision: &str);

    /// Records a failed store operation.
    fn record_persistence_failure(&self, operation: &str);

    /// Records the outcome of a staleness check.
    fn record_staleness_check(&self, stale: bool);
}

/// Prometheus metrics collector.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Reconciler metrics
    source_events_total: CounterVec,
    full_transitions_total: IntCounter,

    // Gate metrics
    decisions_total: CounterVec,

    // Persistence metrics
    persistence_failures_total: CounterVec,
    staleness_checks_total: CounterVec,
}

impl Metrics {
    /// Creates a new metrics instance with a Prometheus registry.
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let source_events_total = register_counter_vec_with_registry!(
            Opts::new(
                "auth_source_events_total",
                "Snapshots received from identity sources"
            ),
            &["source", "connected"],
            registry.clone()
        )
        .expect("Failed to register auth_source_events_total");

        let full_transitions_total = register_int_counter_with_registry!(
            Opts::new(
                "auth_full_transitions_total",
                "Times authentication became complete"
            ),
            registry.clone()
        )
        .expect("Failed to register auth_full_transitions_total");

        let decisions_total = register_counter_vec_with_registry!(
            Opts::new("auth_decisions_total", "Access decisions by outcome"),
            &["requirement", "decision"],
            registry.clone()
        )
        .expect("Failed to register auth_decisions_total");

        let persistence_failures_total = register_counter_vec_with_registry!(
            Opts::new(
                "auth_persistence_failures_total",
                "Failed auth record store operations"
            ),
            &["operation"],
            registry.clone()
        )
        .expect("Failed to register auth_persistence_failures_total");

        let staleness_checks_total = register_counter_vec_with_registry!(
            Opts::new(
                "auth_staleness_checks_total",
                "Staleness checks of the persisted auth record"
            ),
            &["result"],
            registry.clone()
        )
        .expect("Failed to register auth_staleness_checks_total");

        Metrics {
            registry,
            source_events_total,
            full_transitions_total,
            decisions_total,
            persistence_failures_total,
            staleness_checks_total,
        }
    }

    /// Renders all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder for Metrics {
    fn record_source_event(&self, source: &str, connected: bool) {
        let connected = if connected { "true" } else { "false" };
        self.source_events_total
            .with_label_values(&[source, connected])
            .inc();
    }

    fn record_full_transition(&self) {
        self.full_transitions_total.inc();
    }

    fn record_decision(&self, requirement: &str, decision: &str) {
        self.decisions_total
            .with_label_values(&[requirement, decision])
            .inc();
    }

    fn record_persistence_failure(&self, operation: &str) {
        self.persistence_failures_total
            .with_label_values(&[operation])
            .inc();
    }

    fn record_staleness_check(&self, stale: bool) {
        let result = if stale { "stale" } else { "fresh" };
        self.staleness_checks_total
            .with_label_values(&[result])
            .inc();
    }
}
