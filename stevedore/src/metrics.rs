//! Prometheus metrics for container launches.
//!
//! Compiled only with the `metrics` feature flag.
//!
//! # Metrics
//!
//! ## Counters
//! - `stevedore_launches_started_total` - Launch workers that began running
//! - `stevedore_launches_finished_total` - Finished launches by outcome
//! - `stevedore_spawn_rejected_total` - Spawn requests turned away
//!
//! ## Gauges
//! - `stevedore_live_workers` - Workers currently running
//!
//! ## Histograms
//! - `stevedore_launch_duration_seconds` - Time from worker start to finish
#![cfg(feature = "metrics")]

use prometheus::{
    exponential_buckets, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts,
    Registry,
};
use std::sync::LazyLock;

/// Global Prometheus registry for stevedore metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Labels: `role`.
pub static LAUNCHES_STARTED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "stevedore_launches_started_total",
        "Total number of launch workers started",
    );
    CounterVec::new(opts, &["role"])
        .expect("stevedore_launches_started_total metric creation failed")
});

/// Labels: `role`, `status` (submitted, failed, abandoned).
pub static LAUNCHES_FINISHED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "stevedore_launches_finished_total",
        "Total number of launch workers finished",
    );
    CounterVec::new(opts, &["role", "status"])
        .expect("stevedore_launches_finished_total metric creation failed")
});

/// Labels: `role`, `reason` (unknown_role, shutting_down).
pub static SPAWN_REJECTED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "stevedore_spawn_rejected_total",
        "Total number of launch requests rejected before a worker started",
    );
    CounterVec::new(opts, &["role", "reason"])
        .expect("stevedore_spawn_rejected_total metric creation failed")
});

pub static LIVE_WORKERS: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new("stevedore_live_workers", "Launch workers currently running")
        .expect("stevedore_live_workers metric creation failed")
});

/// Labels: `role`, `status`.
pub static LAUNCH_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let buckets =
        exponential_buckets(0.001, 2.0, 15).expect("bucket creation failed");
    let opts = HistogramOpts::new(
        "stevedore_launch_duration_seconds",
        "Launch duration from worker start to finish in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["role", "status"])
        .expect("stevedore_launch_duration_seconds metric creation failed")
});

/// Register all metrics with the global registry.
///
/// Idempotent: duplicate registrations are ignored.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(LAUNCHES_STARTED_TOTAL.clone())
            as Box<dyn prometheus::core::Collector>,
        Box::new(LAUNCHES_FINISHED_TOTAL.clone()),
        Box::new(SPAWN_REJECTED_TOTAL.clone()),
        Box::new(LIVE_WORKERS.clone()),
        Box::new(LAUNCH_DURATION_SECONDS.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            if !matches!(e, prometheus::Error::AlreadyReg) {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

pub fn record_launch_started(role: &str) {
    LAUNCHES_STARTED_TOTAL.with_label_values(&[role]).inc();
}

pub fn record_launch_finished(role: &str, status: &str) {
    LAUNCHES_FINISHED_TOTAL
        .with_label_values(&[role, status])
        .inc();
}

pub fn record_spawn_rejected(role: &str, reason: &str) {
    SPAWN_REJECTED_TOTAL.with_label_values(&[role, reason]).inc();
}

pub fn set_live_workers(count: f64) {
    LIVE_WORKERS.set(count);
}

pub fn observe_launch_duration(role: &str, status: &str, duration_secs: f64) {
    LAUNCH_DURATION_SECONDS
        .with_label_values(&[role, status])
        .observe(duration_secs);
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization_is_idempotent() {
        init_metrics().expect("metrics initialization should succeed");
        init_metrics().expect("second initialization should succeed");
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().expect("metrics initialization should succeed");

        record_launch_started("worker");
        record_launch_finished("worker", "submitted");
        record_spawn_rejected("thrift", "unknown_role");
        observe_launch_duration("worker", "submitted", 0.25);
        set_live_workers(3.0);

        let output = gather_metrics().expect("gather should succeed");
        assert!(output.contains("stevedore_launches_started_total"));
        assert!(output.contains("stevedore_launches_finished_total"));
        assert!(output.contains("stevedore_spawn_rejected_total"));
        assert!(output.contains("stevedore_live_workers"));
        assert!(output.contains("stevedore_launch_duration_seconds"));
    }
}
