//! Tracing and telemetry instrumentation for stevedore.
//!
//! Helpers for creating launch spans and recording launch lifecycle events.
//! All functions work both with and without the `metrics` feature flag; with
//! it enabled they also update the Prometheus collectors in
//! [`crate::metrics`].
//!
//! # Example
//!
//! ```ignore
//! use stevedore::telemetry::{launch_span, record_launch_started};
//!
//! let span = launch_span(worker_id, "c-007", "worker");
//! let _enter = span.enter();
//! record_launch_started("worker");
//! ```

use std::time::{Duration, Instant};

use tracing::{info_span, Span};

/// Create the span a launch worker runs under.
///
/// Every log line of the launch carries the worker, container and role.
#[must_use]
pub fn launch_span(
    worker_id: impl AsRef<str>,
    container_id: impl AsRef<str>,
    role: impl AsRef<str>,
) -> Span {
    info_span!(
        "stevedore.launch",
        worker_id = %worker_id.as_ref(),
        container_id = %container_id.as_ref(),
        role = %role.as_ref(),
    )
}

/// Create a span for one stage of a launch.
#[must_use]
pub fn stage_span(stage: impl AsRef<str>) -> Span {
    info_span!("stevedore.stage", stage = %stage.as_ref())
}

/// Create a span for supervisor shutdown.
#[must_use]
pub fn shutdown_span(live_workers: usize) -> Span {
    info_span!("stevedore.shutdown", live_workers = live_workers)
}

/// Record that a worker started launching `role`.
pub fn record_launch_started(role: impl AsRef<str>) {
    tracing::info!(role = %role.as_ref(), "launch started");

    #[cfg(feature = "metrics")]
    crate::metrics::record_launch_started(role.as_ref());
}

/// Record a finished launch.
///
/// `status` is the outcome label: submitted, failed or abandoned.
pub fn record_launch_finished(role: impl AsRef<str>, status: impl AsRef<str>) {
    tracing::info!(
        role = %role.as_ref(),
        status = %status.as_ref(),
        "launch finished"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_launch_finished(role.as_ref(), status.as_ref());
}

/// Record a spawn request turned away before a worker existed.
pub fn record_spawn_rejected(role: impl AsRef<str>, reason: impl AsRef<str>) {
    tracing::warn!(
        role = %role.as_ref(),
        reason = %reason.as_ref(),
        "launch rejected"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_spawn_rejected(role.as_ref(), reason.as_ref());
}

pub fn observe_launch_duration(
    role: impl AsRef<str>,
    status: impl AsRef<str>,
    duration_secs: f64,
) {
    tracing::debug!(
        role = %role.as_ref(),
        status = %status.as_ref(),
        duration_secs = duration_secs,
        "launch duration observed"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::observe_launch_duration(
        role.as_ref(),
        status.as_ref(),
        duration_secs,
    );
}

/// Update the live worker gauge.
pub fn set_live_workers(count: usize) {
    tracing::debug!(live_workers = count, "live workers updated");

    #[cfg(feature = "metrics")]
    crate::metrics::set_live_workers(count as f64);
}

/// Start timing a launch; pass the handle to [`record_launch_end`].
pub fn record_launch_start(worker_id: impl AsRef<str>) -> LaunchTimingHandle {
    LaunchTimingHandle {
        worker_id: worker_id.as_ref().to_string(),
        start: Instant::now(),
    }
}

/// Finish timing a launch and record its outcome.
pub fn record_launch_end(
    handle: LaunchTimingHandle,
    role: impl AsRef<str>,
    status: impl AsRef<str>,
) {
    let duration_secs = handle.elapsed().as_secs_f64();
    record_launch_finished(role.as_ref(), status.as_ref());
    observe_launch_duration(role, status, duration_secs);
}

/// Handle for tracking launch duration.
#[derive(Debug)]
pub struct LaunchTimingHandle {
    worker_id: String,
    start: Instant,
}

impl LaunchTimingHandle {
    #[must_use]
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
