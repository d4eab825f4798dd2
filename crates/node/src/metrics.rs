//! Prometheus counters for admission control and ingestion.
//!
//! - `admission_allowed_total`: requests that passed both limiters on first check
//! - `admission_throttled_total`: requests paused (or cancelled) by the gate
//! - `admission_resumed_total`: throttled requests released by the retry loop
//! - `ingest_consistency_warnings_total`: blocks or roots missing after the engine reported them
//! - `ingest_root_updates_total`: validated root updates emitted downstream

use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

/// Shared handles onto the core's counters. Clones observe the same values.
#[derive(Clone, Debug, Default)]
pub struct CoreMetrics {
    pub admission_allowed: Counter,
    pub admission_throttled: Counter,
    pub admission_resumed: Counter,
    pub ingest_consistency_warnings: Counter,
    pub ingest_root_updates: Counter,
}

impl CoreMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = Self::default();

        registry.register(
            "admission_allowed",
            "Outgoing pull requests admitted without throttling",
            metrics.admission_allowed.clone(),
        );
        registry.register(
            "admission_throttled",
            "Outgoing pull requests throttled by the rate limiter",
            metrics.admission_throttled.clone(),
        );
        registry.register(
            "admission_resumed",
            "Throttled pull requests resumed after a successful re-check",
            metrics.admission_resumed.clone(),
        );
        registry.register(
            "ingest_consistency_warnings",
            "Blocks or roots reported by the exchange but absent from the store",
            metrics.ingest_consistency_warnings.clone(),
        );
        registry.register(
            "ingest_root_updates",
            "Validated root updates emitted downstream",
            metrics.ingest_root_updates.clone(),
        );

        metrics
    }
}
