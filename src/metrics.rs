//! Prometheus metrics collection for strangerd.
//!
//! Tracks matchmaking throughput, relay traffic, lock contention, and store
//! health, exposed on an HTTP endpoint for scraping.

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use prometheus::Encoder;
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Total pairs matched by engines in this process.
pub static MATCHES_MADE: OnceLock<IntCounter> = OnceLock::new();

/// Total users enqueued through this process.
pub static USERS_ENQUEUED: OnceLock<IntCounter> = OnceLock::new();

/// Total chat messages relayed to peers through this process.
pub static MESSAGES_RELAYED: OnceLock<IntCounter> = OnceLock::new();

/// Lock acquisition attempts that found the lock held.
pub static LOCK_RETRIES: OnceLock<IntCounter> = OnceLock::new();

/// Store operation failures by error code.
pub static STORE_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges and histograms
// ========================================================================

/// Users currently in the waiting queue, as last observed by an engine.
pub static WAITING_USERS: OnceLock<IntGauge> = OnceLock::new();

/// Time from winning the lock to releasing it after a match.
pub static MATCH_CYCLE_SECONDS: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(
        MATCHES_MADE,
        IntCounter::new("stranger_matches_total", "Pairs matched")
    );
    register!(
        USERS_ENQUEUED,
        IntCounter::new("stranger_enqueued_total", "Users enqueued")
    );
    register!(
        MESSAGES_RELAYED,
        IntCounter::new("stranger_messages_relayed_total", "Chat messages relayed")
    );
    register!(
        LOCK_RETRIES,
        IntCounter::new(
            "stranger_lock_retries_total",
            "Lock acquisition attempts that found the lock held"
        )
    );
    register!(
        STORE_ERRORS,
        IntCounterVec::new(
            Opts::new("stranger_store_errors_total", "Store failures by code"),
            &["code"]
        )
    );
    register!(
        WAITING_USERS,
        IntGauge::new("stranger_waiting_users", "Users currently queued")
    );
    register!(
        MATCH_CYCLE_SECONDS,
        Histogram::with_opts(
            HistogramOpts::new(
                "stranger_match_cycle_seconds",
                "Lock-held duration of one match cycle"
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0])
        )
    );
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates
// ============================================================================

/// Record a completed match and its lock-held duration.
#[inline]
pub fn record_match(cycle_secs: f64) {
    if let Some(c) = MATCHES_MADE.get() {
        c.inc();
    }
    if let Some(h) = MATCH_CYCLE_SECONDS.get() {
        h.observe(cycle_secs);
    }
}

/// Record one enqueue.
#[inline]
pub fn record_enqueue() {
    if let Some(c) = USERS_ENQUEUED.get() {
        c.inc();
    }
}

/// Record one relayed chat message.
#[inline]
pub fn record_relayed() {
    if let Some(c) = MESSAGES_RELAYED.get() {
        c.inc();
    }
}

/// Record a contended lock acquisition attempt.
#[inline]
pub fn record_lock_retry() {
    if let Some(c) = LOCK_RETRIES.get() {
        c.inc();
    }
}

/// Record a store failure by error code.
#[inline]
pub fn record_store_error(code: &str) {
    if let Some(c) = STORE_ERRORS.get() {
        c.with_label_values(&[code]).inc();
    }
}

/// Update the last observed waiting-queue depth.
#[inline]
pub fn set_waiting_users(count: i64) {
    if let Some(g) = WAITING_USERS.get() {
        g.set(count);
    }
}
