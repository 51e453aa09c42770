//! Prometheus metrics for chat-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Chat turn counter by terminal outcome.
pub static CHAT_TURNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "chat_turns_total",
        "Total number of chat turns by outcome",
        &["outcome"] // completed, failed, partial
    )
    .expect("Failed to register chat_turns_total")
});

/// End-to-end turn duration by model (catalog-bounded cardinality).
pub static TURN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "chat_turn_duration_seconds",
        "Chat turn duration in seconds",
        &["model"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("Failed to register chat_turn_duration")
});

/// Credit movements through the ledger.
pub static CREDITS_MOVED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "chat_credits_moved_total",
        "Credits reserved and refunded by the ledger",
        &["direction"] // reserved, refunded
    )
    .expect("Failed to register chat_credits_moved")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "chat_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&CHAT_TURNS_TOTAL);
    Lazy::force(&TURN_DURATION);
    Lazy::force(&CREDITS_MOVED);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
