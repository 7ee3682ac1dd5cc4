//! Prometheus metrics for the catalog server.
//!
//! This module provides:
//! - HTTP request metrics (count, latency)
//! - Cache metrics (hits, misses, errors, failed invalidations)
//! - Change-event metrics (published, failed, dropped)

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ERRORS_TOTAL: &str = "cache_errors_total";
    pub const CACHE_INVALIDATION_FAILURES_TOTAL: &str = "cache_invalidation_failures_total";

    // Change-event metrics
    pub const EVENTS_PUBLISHED_TOTAL: &str = "events_published_total";
    pub const EVENTS_FAILED_TOTAL: &str = "events_failed_total";
    pub const EVENTS_DROPPED_TOTAL: &str = "events_dropped_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: /metrics is served by the app itself
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }

            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// =============================================================================
// HTTP Metrics
// =============================================================================

/// Record an HTTP request. `route` is the matched route template, so ids
/// never become label values.
pub fn record_http_request(method: &str, route: &str, status: u16, duration: Duration) {
    let status_class = match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    };

    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string(),
        "status_class" => status_class
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Cache Metrics
// =============================================================================

/// Record a cache hit. `kind` is "collection" or "entity".
pub fn record_cache_hit(kind: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "kind" => kind).increment(1);
}

pub fn record_cache_miss(kind: &'static str) {
    counter!(names::CACHE_MISSES_TOTAL, "kind" => kind).increment(1);
}

/// Record a failed cache call. `op` is "get", "set" or "delete".
pub fn record_cache_error(op: &'static str) {
    counter!(names::CACHE_ERRORS_TOTAL, "op" => op).increment(1);
}

/// Record an invalidation that failed on every attempt.
pub fn record_invalidation_failure(kind: &'static str) {
    counter!(names::CACHE_INVALIDATION_FAILURES_TOTAL, "kind" => kind).increment(1);
}

// =============================================================================
// Event Metrics
// =============================================================================

pub fn record_event_published(action: &'static str) {
    counter!(names::EVENTS_PUBLISHED_TOTAL, "action" => action).increment(1);
}

/// Record a publish that failed. `reason` is "error", "timeout" or "serialize".
pub fn record_event_failed(action: &'static str, reason: &'static str) {
    counter!(names::EVENTS_FAILED_TOTAL, "action" => action, "reason" => reason).increment(1);
}

pub fn record_event_dropped(action: &'static str) {
    counter!(names::EVENTS_DROPPED_TOTAL, "action" => action).increment(1);
}
