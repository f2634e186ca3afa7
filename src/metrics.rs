//! Lightweight metrics helpers for the dataselect proxy.
//!
//! This module exposes a small set of convenience functions and RAII timers
//! wrapping the `metrics` crate macros. No exporter is bundled; the embedding
//! application may install any compatible recorder. Without one, every call
//! below is a no-op.
//!
//! Provided metrics (labels vary by family):
//! * `dataselect_requests_total` (counter: dataset, mode, status)
//! * `dataselect_request_duration_seconds` (histogram: dataset, mode)
//! * `dataselect_backend_requests_total` (counter: backend, status)
//! * `dataselect_backend_request_duration_seconds` (histogram: backend)
//! * `dataselect_token_fetch_failures_total` (counter)
//!
//! The `*Timer` structs leverage `Drop` to record durations even when early
//! returns or errors occur.
use std::time::{Duration, Instant};

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::Lazy;

pub const DATASELECT_REQUESTS_TOTAL: &str = "dataselect_requests_total";
pub const DATASELECT_REQUEST_DURATION_SECONDS: &str = "dataselect_request_duration_seconds";
pub const DATASELECT_BACKEND_REQUESTS_TOTAL: &str = "dataselect_backend_requests_total";
pub const DATASELECT_BACKEND_REQUEST_DURATION_SECONDS: &str =
    "dataselect_backend_request_duration_seconds";
pub const DATASELECT_TOKEN_FETCH_FAILURES_TOTAL: &str = "dataselect_token_fetch_failures_total";

/// Status label used when the backend never answered.
pub const STATUS_NO_RESPONSE: u16 = 599;

static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        DATASELECT_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of dataset requests answered by the proxy."
    );
    describe_histogram!(
        DATASELECT_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of dataset requests until the response headers were produced."
    );
    describe_counter!(
        DATASELECT_BACKEND_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of requests sent to the search and export backends."
    );
    describe_histogram!(
        DATASELECT_BACKEND_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Time until a backend returned its response headers."
    );
    describe_counter!(
        DATASELECT_TOKEN_FETCH_FAILURES_TOTAL,
        Unit::Count,
        "Backend token fetches that failed."
    );
});

/// Increment the total request counter for an inbound dataset request.
pub fn increment_request_total(dataset: &str, mode: &str, status: u16) {
    counter!(
        DATASELECT_REQUESTS_TOTAL,
        "dataset" => dataset.to_string(),
        "mode" => mode.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed inbound request's duration.
pub fn record_request_duration(dataset: &str, mode: &str, duration: Duration) {
    histogram!(
        DATASELECT_REQUEST_DURATION_SECONDS,
        "dataset" => dataset.to_string(),
        "mode" => mode.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Increment total count of backend requests.
pub fn increment_backend_request_total(backend: &str, status: u16) {
    counter!(
        DATASELECT_BACKEND_REQUESTS_TOTAL,
        "backend" => backend.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed backend request duration.
pub fn record_backend_request_duration(backend: &str, duration: Duration) {
    histogram!(
        DATASELECT_BACKEND_REQUEST_DURATION_SECONDS,
        "backend" => backend.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn increment_token_fetch_failures() {
    counter!(DATASELECT_TOKEN_FETCH_FAILURES_TOTAL).increment(1);
}

/// RAII helper measuring inbound request duration.
pub struct RequestTimer {
    start: Instant,
    dataset: String,
    mode: &'static str,
}

impl RequestTimer {
    pub fn new(dataset: &str, mode: &'static str) -> Self {
        Self {
            start: Instant::now(),
            dataset: dataset.to_string(),
            mode,
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.dataset, self.mode, self.start.elapsed());
    }
}

/// RAII helper measuring backend request duration.
pub struct BackendRequestTimer {
    start: Instant,
    backend: &'static str,
}

impl BackendRequestTimer {
    pub fn new(backend: &'static str) -> Self {
        Self {
            start: Instant::now(),
            backend,
        }
    }
}

impl Drop for BackendRequestTimer {
    fn drop(&mut self) {
        record_backend_request_duration(self.backend, self.start.elapsed());
    }
}

/// Initialize metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    Lazy::force(&DESCRIPTIONS);
    tracing::info!("Dataselect metrics described");
    Ok(())
}
