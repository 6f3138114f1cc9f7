//! Metrics definitions for the conference client.
//!
//! All metrics follow Prometheus naming conventions:
//! - `client_` prefix
//! - `_total` suffix for counters
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `ownership`: 2 values (local, remote)
//! - `kind`: bounded by `ClientError::kind_label` (~11 values)
//! - `operation`: bounded by cleanup steps (detach, dispose, unpublish, leave, disconnect)
//! - `status`: success, error, stale
//!
//! No recorder is installed by the library; without one every call is a
//! no-op.

use metrics::{counter, gauge};

// ============================================================================
// Gauges
// ============================================================================

/// Set the number of registered tracks for one ownership.
///
/// Metric: `client_tracks_active`
/// Labels: `ownership`
pub fn set_tracks_active(ownership: &'static str, count: usize) {
    // usize to f64 conversion is safe for realistic track counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("client_tracks_active", "ownership" => ownership).set(count as f64);
}

/// Set the number of known remote participants.
///
/// Metric: `client_participants_active`
pub fn set_participants_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("client_participants_active").set(count as f64);
}

/// Set the number of live rendering surfaces.
///
/// Metric: `client_surfaces_active`
pub fn set_surfaces_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("client_surfaces_active").set(count as f64);
}

// ============================================================================
// Counters
// ============================================================================

/// Record an engine event dropped for breaking an invariant.
///
/// Metric: `client_contract_violations_total`
/// Labels: `kind`
pub fn record_contract_violation(kind: &'static str) {
    counter!("client_contract_violations_total", "kind" => kind).increment(1);
}

/// Record a local track submitted to the session.
///
/// Metric: `client_publish_total`
pub fn record_publish() {
    counter!("client_publish_total").increment(1);
}

/// Record a swallowed cleanup failure.
///
/// Metric: `client_cleanup_failures_total`
/// Labels: `operation`
pub fn record_cleanup_failure(operation: &'static str) {
    counter!("client_cleanup_failures_total", "operation" => operation).increment(1);
}

/// Record the outcome of a capture request.
///
/// Metric: `client_capture_requests_total`
/// Labels: `status` (success, error, stale)
pub fn record_capture(status: &'static str) {
    counter!("client_capture_requests_total", "status" => status).increment(1);
}
