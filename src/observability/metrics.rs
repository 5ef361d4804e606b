//! Metrics collection and exposition.
//!
//! # Metrics
//! - `replay_proxy_requests_total` (counter): requests by verb and outcome
//! - `replay_proxy_cache_hits_total` / `replay_proxy_cache_misses_total`
//! - `replay_proxy_cache_errors_total` (counter): store failures by operation
//! - `replay_proxy_cache_entries` (gauge): entries after the last write
//! - `replay_proxy_fetch_duration_seconds` (histogram): origin latency
//! - `replay_proxy_fetch_failures_total` (counter): failures by kind
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with an HTTP scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(verb: &'static str, outcome: &'static str) {
    counter!("replay_proxy_requests_total", "verb" => verb, "outcome" => outcome).increment(1);
}

pub fn record_cache_hit() {
    counter!("replay_proxy_cache_hits_total").increment(1);
}

pub fn record_cache_miss() {
    counter!("replay_proxy_cache_misses_total").increment(1);
}

pub fn record_cache_error(op: &'static str) {
    counter!("replay_proxy_cache_errors_total", "op" => op).increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!("replay_proxy_cache_entries").set(entries as f64);
}

pub fn record_fetch(started: Instant, ok: bool) {
    let ok = if ok { "true" } else { "false" };
    histogram!("replay_proxy_fetch_duration_seconds", "ok" => ok).record(started.elapsed().as_secs_f64());
}

pub fn record_fetch_failure(kind: &'static str) {
    counter!("replay_proxy_fetch_failures_total", "kind" => kind).increment(1);
}
