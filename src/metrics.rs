//! Prometheus metrics for the bridge warden
//!
//! Exposed on the /metrics endpoint for scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec,
};

lazy_static! {
    pub static ref EVENTS_DISCOVERED: CounterVec = register_counter_vec!(
        "warden_events_discovered_total",
        "Total bridge events discovered by the watchers",
        &["chain", "kind"]
    )
    .unwrap();

    pub static ref RELAYS_ADMITTED: CounterVec = register_counter_vec!(
        "warden_relays_admitted_total",
        "Events admitted for relay (first observation)",
        &["direction"]
    )
    .unwrap();

    pub static ref RELAYS_SKIPPED: CounterVec = register_counter_vec!(
        "warden_relays_skipped_total",
        "Events skipped as already handled",
        &["direction"]
    )
    .unwrap();

    pub static ref RELAYS_CONFIRMED: CounterVec = register_counter_vec!(
        "warden_relays_confirmed_total",
        "Relays confirmed on the opposite chain",
        &["direction"]
    )
    .unwrap();

    pub static ref RELAYS_FAILED: CounterVec = register_counter_vec!(
        "warden_relays_failed_total",
        "Relays that exhausted their retry budget",
        &["direction"]
    )
    .unwrap();

    pub static ref SCAN_CURSOR: GaugeVec = register_gauge_vec!(
        "warden_scan_cursor",
        "Highest fully scanned block per chain and event kind",
        &["chain", "kind"]
    )
    .unwrap();

    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "warden_errors_total",
        "Errors by origin and class",
        &["origin", "class"]
    )
    .unwrap();

    pub static ref UP: Gauge = register_gauge!(
        "warden_up",
        "Whether the warden is up and running"
    )
    .unwrap();
}

pub fn record_discovered(chain: &str, kind: &str, count: usize) {
    if count > 0 {
        EVENTS_DISCOVERED
            .with_label_values(&[chain, kind])
            .inc_by(count as f64);
    }
}

pub fn record_admitted(direction: &str) {
    RELAYS_ADMITTED.with_label_values(&[direction]).inc();
}

pub fn record_skipped(direction: &str) {
    RELAYS_SKIPPED.with_label_values(&[direction]).inc();
}

pub fn record_confirmed(direction: &str) {
    RELAYS_CONFIRMED.with_label_values(&[direction]).inc();
}

pub fn record_failed(direction: &str) {
    RELAYS_FAILED.with_label_values(&[direction]).inc();
}

pub fn set_cursor(chain: &str, kind: &str, block: u64) {
    SCAN_CURSOR
        .with_label_values(&[chain, kind])
        .set(block as f64);
}

pub fn record_error(origin: &str, class: &str) {
    ERRORS.with_label_values(&[origin, class]).inc();
}
