//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dashboard_requests_total` (counter): requests by method, route, status
//! - `dashboard_request_duration_seconds` (histogram): latency distribution
//!
//! # Design Decisions
//! - Handlers opt out per route; the route label is the metrics alias when
//!   one is set, otherwise the registered route pattern
//! - Without an installed recorder every call is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Name of the counter tracking finished requests.
pub const REQUESTS_TOTAL: &str = "dashboard_requests_total";
/// Name of the histogram tracking request latency.
pub const REQUEST_DURATION: &str = "dashboard_request_duration_seconds";

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one finished request.
pub fn record_request(method: &str, route: &str, status: u16, started: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    counter!(REQUESTS_TOTAL, &labels).increment(1);
    histogram!(REQUEST_DURATION, &labels).record(started.elapsed().as_secs_f64());
}
