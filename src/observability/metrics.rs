//! Metrics collection and exposition.
//!
//! # Metrics
//! - `payment_monitor_rpc_requests_total` (counter): RPC calls by method, outcome
//! - `payment_monitor_verifications_total` (counter): verification results by outcome
//! - `payment_monitor_transfers_observed_total` (counter): inbound transfers by mode
//! - `payment_monitor_active_subscriptions` (gauge): listeners currently registered
//! - `payment_monitor_subscription_reconnects_total` (counter)
//! - `payment_monitor_donations_recorded_total` (counter)
//! - `payment_monitor_chain_health` (gauge): 1=reachable, 0=unreachable

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rpc_call(method: &'static str, outcome: &'static str) {
    counter!("payment_monitor_rpc_requests_total", "method" => method, "outcome" => outcome).increment(1);
}

pub fn record_verification(outcome: &'static str) {
    counter!("payment_monitor_verifications_total", "outcome" => outcome).increment(1);
}

pub fn record_transfer_observed(mode: &'static str) {
    counter!("payment_monitor_transfers_observed_total", "mode" => mode).increment(1);
}

pub fn record_active_subscriptions(count: usize) {
    gauge!("payment_monitor_active_subscriptions").set(count as f64);
}

pub fn record_reconnect() {
    counter!("payment_monitor_subscription_reconnects_total").increment(1);
}

pub fn record_donation_recorded() {
    counter!("payment_monitor_donations_recorded_total").increment(1);
}

pub fn record_chain_health(network: &'static str, healthy: bool) {
    gauge!("payment_monitor_chain_health", "network" => network).set(if healthy { 1.0 } else { 0.0 });
}
