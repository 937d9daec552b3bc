//! Prometheus metrics for the quoting engine.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec,
    register_int_gauge, Counter, CounterVec, Gauge, HistogramVec, IntGauge,
};

/// Completed refresh cycles.
pub static CYCLES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("hlmm_cycles_total", "Completed refresh cycles").unwrap()
});

/// Refresh cycles skipped before any order action.
/// Labels: reason (stale_price/invalid_reference_price/account_unavailable)
pub static CYCLES_SKIPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hlmm_cycles_skipped_total",
        "Refresh cycles skipped",
        &["reason"]
    )
    .unwrap()
});

/// Orders submitted to the venue.
pub static ORDERS_SUBMITTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hlmm_orders_submitted_total",
        "Orders submitted to the venue",
        &["side"]
    )
    .unwrap()
});

/// Cancel requests sent to the venue.
pub static CANCELS_SENT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hlmm_cancels_sent_total",
        "Cancel requests sent to the venue",
        &["side"]
    )
    .unwrap()
});

/// Orders reaching a terminal state.
/// Labels: state (FILLED/CANCELLED/REJECTED)
pub static ORDERS_TERMINAL_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hlmm_orders_terminal_total",
        "Orders reaching a terminal state",
        &["state"]
    )
    .unwrap()
});

/// Quote sides vetoed by the risk governor.
pub static VETOES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hlmm_vetoes_total",
        "Quote sides vetoed by the risk governor",
        &["side", "reason"]
    )
    .unwrap()
});

/// Reconciliations against the venue's open orders.
pub static RECONCILIATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hlmm_reconciliations_total",
        "Reconciliations against venue open orders",
        &["reason"]
    )
    .unwrap()
});

/// Reconciliations that changed the local view.
pub static RECONCILE_MISMATCH_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "hlmm_reconcile_mismatch_total",
        "Reconciliations that dropped or adopted orders"
    )
    .unwrap()
});

/// Venue requests that exhausted their retries.
pub static REQUEST_TIMEOUTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "hlmm_request_timeouts_total",
        "Venue requests that exhausted their retries",
        &["request"]
    )
    .unwrap()
});

/// Venue request latency in milliseconds.
pub static REQUEST_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "hlmm_request_latency_ms",
        "Venue request latency in milliseconds",
        &["request"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 3000.0]
    )
    .unwrap()
});

/// Fills applied to the inventory.
pub static FILLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("hlmm_fills_total", "Fills applied to inventory", &["side"]).unwrap()
});

/// Signed position in base units.
pub static POSITION_BASE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("hlmm_position_base", "Signed position in base units").unwrap()
});

/// Tracked non-terminal orders.
pub static LIVE_ORDERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("hlmm_live_orders", "Tracked non-terminal orders").unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn cycle_completed() {
        CYCLES_TOTAL.inc();
    }

    pub fn cycle_skipped(reason: &str) {
        CYCLES_SKIPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn order_submitted(side: &str) {
        ORDERS_SUBMITTED_TOTAL.with_label_values(&[side]).inc();
    }

    pub fn cancel_sent(side: &str) {
        CANCELS_SENT_TOTAL.with_label_values(&[side]).inc();
    }

    pub fn order_terminal(state: &str) {
        ORDERS_TERMINAL_TOTAL.with_label_values(&[state]).inc();
    }

    pub fn veto(side: &str, reason: &str) {
        VETOES_TOTAL.with_label_values(&[side, reason]).inc();
    }

    pub fn reconciliation(reason: &str) {
        RECONCILIATIONS_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn reconcile_mismatch() {
        RECONCILE_MISMATCH_TOTAL.inc();
    }

    pub fn request_timeout(request: &str) {
        REQUEST_TIMEOUTS_TOTAL.with_label_values(&[request]).inc();
    }

    pub fn request_latency(request: &str, latency_ms: f64) {
        REQUEST_LATENCY_MS
            .with_label_values(&[request])
            .observe(latency_ms);
    }

    pub fn fill(side: &str) {
        FILLS_TOTAL.with_label_values(&[side]).inc();
    }

    pub fn position_set(base: f64) {
        POSITION_BASE.set(base);
    }

    pub fn live_orders_set(count: i64) {
        LIVE_ORDERS.set(count);
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn gather_text() -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder
            .encode(&prometheus::gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
