// =============================================================================
// METRICS MODULE
// =============================================================================
// Prometheus metrics for the booking service.
//
// METRIC TYPES USED:
// - Counter:   booking attempts, retries, scans, releases, confirmations
// - Histogram: HTTP, booking, store and cache latency
//
// Without an installed recorder (unit tests) every call is a no-op.
// =============================================================================

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// METRIC NAMES
// =============================================================================

/// Labels: method, endpoint, status
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// Labels: method, endpoint
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Labels: outcome (reserved / SEAT_UNAVAILABLE / ...)
pub const BOOKING_ATTEMPTS_TOTAL: &str = "booking_attempts_total";

/// CreateBooking latency including retries
pub const BOOKING_DURATION_SECONDS: &str = "booking_duration_seconds";

/// Reservation attempts repeated after a serialization conflict
pub const BOOKING_CONFLICT_RETRIES_TOTAL: &str = "booking_conflict_retries_total";

/// Labels: result (accepted / ticket_already_used / ...)
pub const TICKET_SCANS_TOTAL: &str = "ticket_scans_total";

/// Pending bookings cancelled by hold expiry
pub const HOLDS_RELEASED_TOTAL: &str = "holds_released_total";

/// Expired holds whose release failed; retried on the next sweep
pub const HOLD_RELEASE_FAILURES_TOTAL: &str = "hold_release_failures_total";

/// Labels: outcome, applied
pub const PAYMENT_CONFIRMATIONS_TOTAL: &str = "payment_confirmations_total";

/// Labels: operation
pub const STORE_OPERATION_DURATION_SECONDS: &str = "store_operation_duration_seconds";

/// Labels: operation (get / setex)
pub const CACHE_OPERATION_DURATION_SECONDS: &str = "cache_operation_duration_seconds";

// =============================================================================
// SETUP FUNCTION
// =============================================================================
/// Install the Prometheus recorder and return the handle used by /metrics.
pub fn setup_metrics() -> Result<PrometheusHandle> {
    let latency_buckets = &[
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(BOOKING_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(STORE_OPERATION_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(CACHE_OPERATION_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request latency in seconds");
    describe_counter!(BOOKING_ATTEMPTS_TOTAL, "CreateBooking calls by outcome");
    describe_histogram!(BOOKING_DURATION_SECONDS, "CreateBooking latency in seconds");
    describe_counter!(
        BOOKING_CONFLICT_RETRIES_TOTAL,
        "Reservation attempts retried after a serialization conflict"
    );
    describe_counter!(TICKET_SCANS_TOTAL, "Door scans by result");
    describe_counter!(HOLDS_RELEASED_TOTAL, "Pending bookings released by hold expiry");
    describe_counter!(HOLD_RELEASE_FAILURES_TOTAL, "Expired holds that failed to release");
    describe_counter!(
        PAYMENT_CONFIRMATIONS_TOTAL,
        "Payment confirmations by outcome and whether they changed state"
    );
    describe_histogram!(STORE_OPERATION_DURATION_SECONDS, "Store operation latency in seconds");
    describe_histogram!(CACHE_OPERATION_DURATION_SECONDS, "Cache operation latency in seconds");

    Ok(handle)
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}

pub fn record_booking_attempt(outcome: &str, duration_secs: f64) {
    counter!(BOOKING_ATTEMPTS_TOTAL, "outcome" => outcome.to_string()).increment(1);
    histogram!(BOOKING_DURATION_SECONDS).record(duration_secs);
}

pub fn record_conflict_retry() {
    counter!(BOOKING_CONFLICT_RETRIES_TOTAL).increment(1);
}

pub fn record_scan(result: &str) {
    counter!(TICKET_SCANS_TOTAL, "result" => result.to_string()).increment(1);
}

pub fn record_holds_released(count: u64) {
    counter!(HOLDS_RELEASED_TOTAL).increment(count);
}

pub fn record_hold_release_failures(count: u64) {
    counter!(HOLD_RELEASE_FAILURES_TOTAL).increment(count);
}

pub fn record_payment_confirmation(outcome: &str, applied: bool) {
    counter!(
        PAYMENT_CONFIRMATIONS_TOTAL,
        "outcome" => outcome.to_string(),
        "applied" => applied.to_string()
    )
    .increment(1);
}

pub fn record_store_operation(operation: &str, duration_secs: f64) {
    histogram!(
        STORE_OPERATION_DURATION_SECONDS,
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

pub fn record_cache_operation(operation: &str, duration_secs: f64) {
    histogram!(
        CACHE_OPERATION_DURATION_SECONDS,
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}
