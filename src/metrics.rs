// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the identity engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `identity_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - gauges carry no suffix
//!
//! # Labels
//! - `kind`: resolution, pixel
//! - `outcome`: success, no_data, failure, unparsed, withheld, opted_out, live_sync_off
//! - `path`: cached, response, timeout, skipped
//! - pixel `outcome`: sent, failed, throttled, skipped

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record an outbound request
pub fn record_request(kind: &str) {
    counter!(
        "identity_sync_requests_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record how a resolution cycle ended
pub fn record_outcome(outcome: &str) {
    counter!(
        "identity_sync_outcomes_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record which path delivered the completion callback
pub fn record_callback(path: &str) {
    counter!(
        "identity_sync_callbacks_total",
        "path" => path.to_string()
    )
    .increment(1);
}

/// Record a completion timeout
pub fn record_timeout() {
    counter!("identity_sync_timeouts_total").increment(1);
}

/// Record a refresh decision
pub fn record_decision(decision: &str) {
    counter!(
        "identity_sync_decisions_total",
        "decision" => decision.to_string()
    )
    .increment(1);
}

/// Record a persisted value that could not be decoded
pub fn record_decode_failure(what: &str) {
    counter!(
        "identity_sync_decode_failures_total",
        "what" => what.to_string()
    )
    .increment(1);
}

/// Record a storage backend error
pub fn record_storage_error(operation: &str) {
    counter!(
        "identity_sync_storage_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a transport failure
pub fn record_transport_error(kind: &str) {
    counter!(
        "identity_sync_transport_errors_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a sync-pixel attempt
pub fn record_pixel_sync(outcome: &str) {
    counter!(
        "identity_sync_pixel_syncs_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set the number of eids found in the decrypted cache
pub fn set_cached_eids(count: usize) {
    gauge!("identity_sync_cached_eids").set(count as f64);
}

/// Record request latency
pub fn record_latency(kind: &str, duration: Duration) {
    histogram!(
        "identity_sync_request_seconds",
        "kind" => kind.to_string()
    )
    .record(duration.as_secs_f64());
}

/// RAII timer that records latency on drop
pub struct LatencyTimer {
    kind: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            start: Instant::now(),
        }
    }

    /// Time elapsed since the timer started
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.kind, self.start.elapsed());
    }
}
