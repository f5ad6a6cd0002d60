// ABOUTME: Prometheus metrics for event dispatch, handler runs and invite admission
// ABOUTME: Thin wrappers over the metrics facade so call sites stay one-liners

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with an HTTP listener on `listen`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(listen: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .context("Failed to install Prometheus exporter")?;
    tracing::info!(%listen, "Prometheus metrics listener started");
    Ok(())
}

/// Count an inbound event by kind ("message", "membership")
pub fn record_event_received(kind: &'static str) {
    metrics::counter!("nixbot_events_total", "kind" => kind).increment(1);
}

/// Count an event dropped before dispatch ("own", "stale", "no_match")
pub fn record_event_filtered(reason: &'static str) {
    metrics::counter!("nixbot_events_filtered_total", "reason" => reason).increment(1);
}

/// Count a finished handler run ("ok", "error")
pub fn record_handler_run(outcome: &'static str) {
    metrics::counter!("nixbot_handler_runs_total", "outcome" => outcome).increment(1);
}

/// Count an invite decision ("accept", "reject")
pub fn record_invite(decision: &'static str) {
    metrics::counter!("nixbot_invites_total", "decision" => decision).increment(1);
}

/// Current number of handler tasks not yet reaped
pub fn set_handlers_in_flight(count: usize) {
    metrics::gauge!("nixbot_handlers_in_flight").set(count as f64);
}
