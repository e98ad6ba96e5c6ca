//! Prometheus metrics for the Room Controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rc_` prefix for Room Controller
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `event_type`: 5 client event names
//! - `reason`: `malformed`, `unknown_connection`, `draining`
//! - `actor_type`: 2 values (controller, connection)
//!
//! Room and connection ids are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// Must be called before any metric is recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Event handling is in-memory; most events finish well under 1ms
        .set_buckets_for_metric(
            Matcher::Prefix("rc_event_latency".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250,
            ],
        )
        .map_err(|e| format!("Failed to set event latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Set the number of rooms held in the registry.
///
/// Metric: `rc_rooms_active`
pub fn set_rooms_active(count: usize) {
    // usize to f64 conversion is safe for realistic room counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_rooms_active").set(count as f64);
}

/// Set the number of open WebSocket connections.
///
/// Metric: `rc_connections_active`
pub fn set_connections_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_connections_active").set(count as f64);
}

/// Set the mailbox depth for an actor type.
///
/// Metric: `rc_actor_mailbox_depth`
/// Labels: `actor_type`
pub fn set_actor_mailbox_depth(actor_type: &str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_actor_mailbox_depth", "actor_type" => actor_type.to_string()).set(depth as f64);
}

// ============================================================================
// Event Metrics
// ============================================================================

/// Record a client event accepted by the controller.
///
/// Metric: `rc_events_total`
/// Labels: `event_type`
pub fn record_event(event_type: &str) {
    counter!("rc_events_total", "event_type" => event_type.to_string()).increment(1);
}

/// Record a client frame that was dropped without reaching the coordinator.
///
/// Metric: `rc_events_rejected_total`
/// Labels: `reason`
pub fn record_event_rejected(reason: &str) {
    counter!("rc_events_rejected_total", "reason" => reason.to_string()).increment(1);
}

/// Record time from frame receipt to fan-out completion.
///
/// Metric: `rc_event_latency_seconds`
/// Labels: `event_type`
pub fn record_event_latency(event_type: &str, duration: Duration) {
    histogram!("rc_event_latency_seconds", "event_type" => event_type.to_string())
        .record(duration.as_secs_f64());
}

// ============================================================================
// Operational Metrics
// ============================================================================

/// Record outbound messages dropped because a connection mailbox was full or
/// already closed.
///
/// Metric: `rc_messages_dropped_total`
pub fn record_messages_dropped(count: usize) {
    counter!("rc_messages_dropped_total").increment(count as u64);
}

/// Record rooms removed by idle eviction.
///
/// Metric: `rc_rooms_evicted_total`
pub fn record_rooms_evicted(count: usize) {
    counter!("rc_rooms_evicted_total").increment(count as u64);
}

/// Record an actor panic.
///
/// Metric: `rc_actor_panics_total`
/// Labels: `actor_type`
///
/// ALERT: Any non-zero value indicates a bug.
pub fn record_actor_panic(actor_type: &str) {
    counter!("rc_actor_panics_total", "actor_type" => actor_type.to_string()).increment(1);
}
