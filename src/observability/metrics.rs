//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pigeon_config_reloads_total` (counter): reload attempts by outcome
//! - `pigeon_active_sites` (gauge): sites with a live Pigeon
//! - `pigeon_subscriptions` (gauge): topics subscribed across all sites
//! - `pigeon_messages_total` (counter): messages received, by site
//! - `pigeon_broker_restarts_total` / `pigeon_database_restarts_total` (counter)
//! - `pigeon_writes_dropped_total` (counter): records dropped on a full queue, by site
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Outcome of one pass through the reload cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Applied,
    Rejected,
    Skipped,
    Blocked,
}

impl ReloadOutcome {
    fn as_str(self) -> &'static str {
        match self {
            ReloadOutcome::Applied => "applied",
            ReloadOutcome::Rejected => "rejected",
            ReloadOutcome::Skipped => "skipped",
            ReloadOutcome::Blocked => "blocked",
        }
    }
}

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_reload(outcome: ReloadOutcome) {
    counter!("pigeon_config_reloads_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_flock(active_sites: usize, subscriptions: usize) {
    gauge!("pigeon_active_sites").set(active_sites as f64);
    gauge!("pigeon_subscriptions").set(subscriptions as f64);
}

pub fn record_message(site: &str) {
    counter!("pigeon_messages_total", "site" => site.to_string()).increment(1);
}

pub fn record_broker_restart() {
    counter!("pigeon_broker_restarts_total").increment(1);
}

pub fn record_database_restart() {
    counter!("pigeon_database_restarts_total").increment(1);
}

pub fn record_write_dropped(site: &str) {
    counter!("pigeon_writes_dropped_total", "site" => site.to_string()).increment(1);
}
