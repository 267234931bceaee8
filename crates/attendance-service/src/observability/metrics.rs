//! Metrics definitions for the Attendance Service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `att_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle used to
/// render `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Store latency buckets - internal DB calls
        .set_buckets_for_metric(
            Matcher::Prefix("att_store".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500,
            ],
        )
        .map_err(|e| format!("Failed to set store latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Metric: `att_sessions_active`
pub fn set_sessions_active(count: usize) {
    // usize to f64 conversion is safe for realistic session counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("att_sessions_active").set(count as f64);
}

/// Metric: `att_connections_active`
pub fn set_connections_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("att_connections_active").set(count as f64);
}

// ============================================================================
// Session lifecycle (Counters)
// ============================================================================

/// Metric: `att_sessions_started_total`
pub fn record_session_started() {
    counter!("att_sessions_started_total").increment(1);
}

/// Record a session termination.
///
/// Metric: `att_sessions_terminated_total`
/// Labels: `reason` (timeout, ended_by_teacher, owner_disconnected,
/// replaced, shutdown)
pub fn record_session_terminated(reason: &str) {
    counter!("att_sessions_terminated_total", "reason" => reason.to_string()).increment(1);
}

/// Record a token submission.
///
/// Metric: `att_join_attempts_total`
/// Labels: `outcome` (accepted, already_pending, invalid_token,
/// session_not_active, rejected)
///
/// Invalid tokens are routine near rotation boundaries; watch the ratio,
/// not the count.
pub fn record_join_attempt(outcome: &str) {
    counter!("att_join_attempts_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a commit of attendees to the store.
///
/// Metric: `att_commits_total`
/// Labels: `result` (success, error)
///
/// ALERT: any `error` means attendance for a session is not durable.
pub fn record_commit(result: &str) {
    counter!("att_commits_total", "result" => result.to_string()).increment(1);
}

/// Metric: `att_tokens_issued_total`
pub fn record_token_issued() {
    counter!("att_tokens_issued_total").increment(1);
}

// ============================================================================
// Latency (Histograms)
// ============================================================================

/// Record persistence gateway latency.
///
/// Metric: `att_store_latency_seconds`
/// Labels: `operation` (course_owner, create_active_record, complete_record)
pub fn record_store_latency(operation: &str, duration: Duration) {
    histogram!("att_store_latency_seconds", "operation" => operation.to_string())
        .record(duration.as_secs_f64());
}

// ============================================================================
// Errors
// ============================================================================

/// Record an error by category.
///
/// Metric: `att_errors_total`
/// Labels: `operation`, `error_type`
pub fn record_error(operation: &str, error_type: &str) {
    counter!("att_errors_total",
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use metrics_util::MetricKind;

    // Without an installed recorder these go to the global no-op recorder.
    #[test]
    fn test_recording_without_recorder_is_noop() {
        set_sessions_active(3);
        set_connections_active(10);
        record_session_started();
        record_session_terminated("timeout");
        record_join_attempt("accepted");
        record_commit("success");
        record_token_issued();
        record_store_latency("complete_record", Duration::from_millis(4));
        record_error("start_session", "database");
    }

    #[test]
    fn test_metrics_are_recorded_with_bounded_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            set_sessions_active(2);
            record_session_started();
            record_session_terminated("timeout");
            record_session_terminated("owner_disconnected");
            record_join_attempt("accepted");
            record_join_attempt("invalid_token");
            record_commit("success");
            record_token_issued();
            record_token_issued();
            record_store_latency("complete_record", Duration::from_millis(4));
            record_error("commit", "database");
        });

        let metrics = snapshotter.snapshot().into_vec();

        let tokens_issued = metrics
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "att_tokens_issued_total")
            .map(|(_, _, _, value)| value.clone())
            .unwrap();
        assert_eq!(tokens_issued, DebugValue::Counter(2));

        let terminated: Vec<_> = metrics
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == "att_sessions_terminated_total")
            .collect();
        assert_eq!(terminated.len(), 2);
        assert!(terminated
            .iter()
            .all(|(key, _, _, _)| key.kind() == MetricKind::Counter));

        assert!(metrics
            .iter()
            .any(|(key, _, _, _)| key.key().name() == "att_store_latency_seconds"));
        assert!(metrics
            .iter()
            .all(|(key, _, _, _)| key.key().name().starts_with("att_")));
    }
}
