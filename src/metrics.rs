//! Metrics emitted by the fetch engine.
//!
//! Everything goes through the `metrics` facade; nothing is recorded until the application
//! installs a recorder (a Prometheus exporter, for example). Metric names:
//!
//! - **Counters**: `volley_attempts_total{outcome}`, `volley_retries_total{outcome}`,
//!   `volley_results_total{status, kind}`
//! - **Gauges**: `volley_requests_in_flight`
//! - **Histograms**: `volley_fetch_duration_seconds{status}`

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use crate::request::FetchResult;

pub const ATTEMPTS_TOTAL: &str = "volley_attempts_total";
pub const RETRIES_TOTAL: &str = "volley_retries_total";
pub const RESULTS_TOTAL: &str = "volley_results_total";
pub const REQUESTS_IN_FLIGHT: &str = "volley_requests_in_flight";
pub const FETCH_DURATION_SECONDS: &str = "volley_fetch_duration_seconds";

/// Register metric descriptions with the installed recorder.
///
/// Call once after installing a recorder; recording works without it.
pub fn describe_metrics() {
    describe_counter!(ATTEMPTS_TOTAL, "HTTP attempts made, by outcome class");
    describe_counter!(
        RETRIES_TOTAL,
        "Retries scheduled, by the outcome class of the failed attempt"
    );
    describe_counter!(RESULTS_TOTAL, "Requests finished, by final status");
    describe_gauge!(REQUESTS_IN_FLIGHT, "Requests currently being executed");
    describe_histogram!(
        FETCH_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Time from first attempt to final result, including backoff"
    );
}

/// `class` is [`AttemptOutcome::class`](crate::request::AttemptOutcome::class) of the attempt.
pub(crate) fn record_attempt(class: &'static str) {
    counter!(ATTEMPTS_TOTAL, "outcome" => class).increment(1);
}

pub(crate) fn record_retry(class: &'static str) {
    counter!(RETRIES_TOTAL, "outcome" => class).increment(1);
}

pub(crate) fn record_result(result: &FetchResult, duration: Duration) {
    let kind = result.error().map(|e| e.kind().as_str()).unwrap_or("none");
    counter!(RESULTS_TOTAL, "status" => result.status(), "kind" => kind).increment(1);
    histogram!(FETCH_DURATION_SECONDS, "status" => result.status()).record(duration.as_secs_f64());
}

pub(crate) fn request_started() {
    gauge!(REQUESTS_IN_FLIGHT).increment(1.0);
}

pub(crate) fn request_finished() {
    gauge!(REQUESTS_IN_FLIGHT).decrement(1.0);
}
