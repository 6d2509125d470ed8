// src/core/metrics.rs

//! In-process metrics, mirroring the teacher's `core::metrics` module in
//! spirit but scoped to what this core actually measures. There is no HTTP
//! `/metrics` endpoint -- that's the outer surface's job, out of scope here
//! -- but `gather()` makes the registry usable from tests.

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntGauge, Registry};

pub struct Metrics {
    pub registry: Registry,
    pub commands_processed: IntCounter,
    pub expired_keys: IntCounter,
    pub aof_queue_depth: IntGauge,
    pub active_subscriptions: IntGauge,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let commands_processed = IntCounter::new(
            "ferrokv_commands_processed_total",
            "Total commands dispatched through Exec",
        )
        .expect("metric construction is infallible for static names");
        let expired_keys = IntCounter::new(
            "ferrokv_expired_keys_total",
            "Total keys removed by lazy expiry or the reaper",
        )
        .expect("metric construction is infallible for static names");
        let aof_queue_depth = IntGauge::new(
            "ferrokv_aof_queue_depth",
            "Approximate number of frames currently queued for the AOF writer",
        )
        .expect("metric construction is infallible for static names");
        let active_subscriptions = IntGauge::new(
            "ferrokv_active_subscriptions",
            "Total live channel subscriptions across all connections",
        )
        .expect("metric construction is infallible for static names");

        for metric in [&commands_processed, &expired_keys] {
            registry
                .register(Box::new(metric.clone()))
                .expect("metric names are unique within this registry");
        }
        for gauge in [&aof_queue_depth, &active_subscriptions] {
            registry
                .register(Box::new(gauge.clone()))
                .expect("metric names are unique within this registry");
        }

        Self {
            registry,
            commands_processed,
            expired_keys,
            aof_queue_depth,
            active_subscriptions,
        }
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);
