//! Prometheus metrics for the HTTP surface.
//!
//! Request latency and counts, API key failures, Torznab function calls and
//! forum session gauges that are refreshed on every scrape. Core pipeline
//! metrics are registered into the same registry.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "forumdex_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("forumdex_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "forumdex_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// API key failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "forumdex_auth_failures_total",
            "Total API authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

/// Torznab calls by `t=` function.
pub static TORZNAB_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("forumdex_torznab_requests_total", "Total Torznab API calls"),
        &["function"], // "caps", "search", "tvsearch", "test", "unknown"
    )
    .unwrap()
});

// =============================================================================
// Forum Session Metrics (collected dynamically)
// =============================================================================

/// Forum session state (1 = authenticated, 0 = not).
pub static FORUM_AUTHENTICATED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "forumdex_forum_authenticated",
        "Whether the forum session was authenticated at the last check",
    )
    .unwrap()
});

/// Consecutive failed renewal cycles.
pub static RENEWAL_FAILURES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "forumdex_renewal_consecutive_failures",
        "Consecutive failed background renewal cycles",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(TORZNAB_REQUESTS.clone()))
        .unwrap();

    // Session
    registry
        .register(Box::new(FORUM_AUTHENTICATED.clone()))
        .unwrap();
    registry
        .register(Box::new(RENEWAL_FAILURES.clone()))
        .unwrap();

    // Core metrics (session, discovery, tracker, search)
    for metric in forumdex_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Refresh gauges from the current session snapshot before a scrape.
pub async fn collect_dynamic_metrics(state: &AppState) {
    let status = state.session().status().await;
    FORUM_AUTHENTICATED.set(if status.authenticated { 1 } else { 0 });
    RENEWAL_FAILURES.set(i64::from(status.consecutive_renewal_failures));
}

static HASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9a-fA-F]{40}").unwrap());
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = HASH_RE.replace_all(path, "{hash}");
    // a match consumes its trailing slash, so run twice for adjacent ids
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    result.into_owned()
}
