//! Prometheus metrics for the generation transport.
//!
//! This module provides metrics for:
//! - Job submission and finalization
//! - Poll channel requests
//! - Realtime channel connections and fallbacks

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Task Lifecycle Metrics
// =============================================================================

/// Job submissions by result.
pub static TASKS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("posegen_tasks_submitted_total", "Total generation job submissions"),
        &["result"], // "accepted", "rejected"
    )
    .unwrap()
});

/// Finalized generations by outcome and the channel that delivered it.
pub static TASKS_FINALIZED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "posegen_tasks_finalized_total",
            "Total generations that reached a terminal outcome",
        ),
        &["outcome", "source"],
    )
    .unwrap()
});

/// Time from submission to finalization, in seconds.
pub static GENERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "posegen_generation_duration_seconds",
            "Duration from job submission to terminal outcome",
        )
        .buckets(vec![1.0, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Channel events dropped because they belonged to a superseded generation.
pub static STALE_MESSAGES_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "posegen_stale_messages_dropped_total",
        "Channel events discarded after their generation was superseded",
    )
    .unwrap()
});

// =============================================================================
// Channel Metrics
// =============================================================================

/// Status polls by outcome.
pub static POLL_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("posegen_poll_requests_total", "Total status poll requests"),
        &["outcome"], // "ok", "rate_limited", "transient", "terminal_error"
    )
    .unwrap()
});

/// Realtime connection attempts by result.
pub static REALTIME_CONNECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "posegen_realtime_connections_total",
            "Total realtime connection attempts",
        ),
        &["result"], // "open", "failed"
    )
    .unwrap()
});

/// Scheduled realtime reconnects.
pub static REALTIME_RECONNECTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "posegen_realtime_reconnects_total",
        "Total realtime reconnect attempts",
    )
    .unwrap()
});

/// Poll channel activations by reason.
pub static FALLBACK_ACTIVATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "posegen_fallback_activations_total",
            "Times polling was engaged as a fallback",
        ),
        &["reason"],
    )
    .unwrap()
});

/// Get all metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Lifecycle
        Box::new(TASKS_SUBMITTED.clone()),
        Box::new(TASKS_FINALIZED.clone()),
        Box::new(GENERATION_DURATION.clone()),
        Box::new(STALE_MESSAGES_DROPPED.clone()),
        // Channels
        Box::new(POLL_REQUESTS.clone()),
        Box::new(REALTIME_CONNECTIONS.clone()),
        Box::new(REALTIME_RECONNECTS.clone()),
        Box::new(FALLBACK_ACTIVATIONS.clone()),
    ]
}
