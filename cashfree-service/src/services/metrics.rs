//! Prometheus metrics for cashfree-service.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder.
///
/// Calling this more than once is harmless; only the first recorder is kept.
pub fn init_metrics() -> Result<(), BuildError> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Record an authenticated webhook and how its projection went.
pub fn record_webhook_event(event_type: &str, outcome: &str) {
    counter!(
        "cashfree_webhook_events_total",
        "event_type" => event_type.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a webhook refused before any side effect.
pub fn record_webhook_rejection(reason: &str) {
    counter!("cashfree_webhook_rejections_total", "reason" => reason.to_string()).increment(1);
}

/// Record one call to the Cashfree API.
pub fn record_api_request(operation: &str, status: &str, duration_secs: f64) {
    counter!(
        "cashfree_api_requests_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "cashfree_api_request_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// Observes database query latency when dropped.
pub struct QueryTimer {
    operation: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        histogram!("cashfree_db_query_duration_seconds", "operation" => self.operation)
            .record(self.start.elapsed().as_secs_f64());
    }
}
