//! Prometheus metrics for the relay.
//!
//! Handlers record through the `metrics` facade; [`init`] installs a global
//! Prometheus recorder once per process and hands out its render handle.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder (first call only) and return its handle.
pub fn init() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if metrics::set_global_recorder(recorder).is_err() {
                warn!("A global metrics recorder was already installed");
            }
            handle
        })
        .clone()
}

/// Count a finished request by endpoint and status.
pub fn record_request(endpoint: &'static str, status: u16) {
    counter!(
        "relay_requests_total",
        "endpoint" => endpoint,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record time spent handling a request up to its response headers.
pub fn record_duration(endpoint: &'static str, start: Instant) {
    histogram!("relay_request_duration_seconds", "endpoint" => endpoint)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_origin_error(kind: &'static str) {
    counter!("relay_origin_errors_total", "kind" => kind).increment(1);
}

pub fn record_bytes_relayed(bytes: u64) {
    counter!("relay_bytes_total").increment(bytes);
}

pub fn set_active_relays(active: usize) {
    gauge!("relay_active_streams").set(active as f64);
}
