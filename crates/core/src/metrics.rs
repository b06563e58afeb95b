//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Forum session (logins, probes, renewal)
//! - Discovery and expansion (threads found, releases parsed)
//! - Episode tracker and reconciliation
//! - End-to-end search latency

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Forum Session Metrics
// =============================================================================

/// Login attempts by result.
pub static LOGIN_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("forumdex_login_attempts_total", "Total forum login attempts"),
        &["result"], // "success", "transient", "rejected"
    )
    .unwrap()
});

/// Authenticated-state probes by result.
pub static SESSION_PROBES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "forumdex_session_probes_total",
            "Total authenticated-state probes",
        ),
        &["result"], // "authenticated", "unauthenticated", "error"
    )
    .unwrap()
});

/// Background renewal cycles by outcome.
pub static RENEWAL_CYCLES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "forumdex_renewal_cycles_total",
            "Total background session renewal cycles",
        ),
        &["outcome"], // "still_valid", "renewed", "failed"
    )
    .unwrap()
});

// =============================================================================
// Discovery / Expansion Metrics
// =============================================================================

/// Forum searches by result.
pub static DISCOVERY_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("forumdex_discovery_requests_total", "Total forum searches"),
        &["result"], // "ok", "error"
    )
    .unwrap()
});

/// Thread candidates returned by forum searches.
pub static THREADS_DISCOVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "forumdex_threads_discovered_total",
        "Total thread candidates found by forum searches",
    )
    .unwrap()
});

/// Release links expanded, by which source yielded episode info.
pub static RELEASES_EXTRACTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "forumdex_releases_extracted_total",
            "Total release links expanded from threads",
        ),
        &["outcome"], // "context", "display_name", "unparsable"
    )
    .unwrap()
});

// =============================================================================
// Tracker / Reconciliation Metrics
// =============================================================================

/// Episode tracker requests.
pub static TRACKER_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "forumdex_tracker_requests_total",
            "Total episode tracker requests",
        ),
        &["endpoint", "status"], // status: HTTP code or "error"
    )
    .unwrap()
});

/// Reconciliation runs by outcome.
pub static RECONCILIATION_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "forumdex_reconciliation_outcomes_total",
            "Total reconciliation runs",
        ),
        &["outcome"], // "filtered", "nothing_wanted", "unreachable"
    )
    .unwrap()
});

// =============================================================================
// Search Metrics
// =============================================================================

/// Search duration in seconds.
pub static SEARCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "forumdex_search_duration_seconds",
            "Duration of a full search",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["source"], // "cache", "forum"
    )
    .unwrap()
});

/// Records returned per search.
pub static SEARCH_RESULTS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "forumdex_search_results",
            "Number of episode records returned per search",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Session
        Box::new(LOGIN_ATTEMPTS.clone()),
        Box::new(SESSION_PROBES.clone()),
        Box::new(RENEWAL_CYCLES.clone()),
        // Discovery / expansion
        Box::new(DISCOVERY_REQUESTS.clone()),
        Box::new(THREADS_DISCOVERED.clone()),
        Box::new(RELEASES_EXTRACTED.clone()),
        // Tracker
        Box::new(TRACKER_REQUESTS.clone()),
        Box::new(RECONCILIATION_OUTCOMES.clone()),
        // Search
        Box::new(SEARCH_DURATION.clone()),
        Box::new(SEARCH_RESULTS.clone()),
    ]
}
