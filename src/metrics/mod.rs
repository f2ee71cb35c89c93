//! Prometheus metrics for the scrape engine and daemon
//!
//! This module provides metrics tracking for:
//! - Runs: users, posts, media and like totals, run duration
//! - Users: pipeline outcomes (completed, skipped, failed, cancelled)
//! - Daemon: cycle executions and failures, next scheduled run
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization has not happened, every recording function is a no-op.

use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec, Encoder,
    Gauge, Histogram, IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

use crate::engine::context::Stats;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all engine metrics
struct EngineMetrics {
    runs: IntCounter,
    run_duration: Histogram,
    users: IntCounterVec,
    posts_found: IntCounter,
    media: IntCounterVec,
    likes: IntCounterVec,
    errors: IntCounter,
    daemon_cycles: IntCounterVec,
    next_run_timestamp: Gauge,
}

static ENGINE_METRICS: OnceLock<EngineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers anything.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = EngineMetrics {
        runs: register_int_counter!("scrapeflow_runs_total", "Total orchestrator runs completed")?,
        run_duration: register_histogram!(
            "scrapeflow_run_duration_seconds",
            "Wall-clock duration of orchestrator runs in seconds",
            vec![1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0]
        )?,
        users: register_int_counter_vec!(
            "scrapeflow_users_total",
            "User pipelines by outcome",
            &["outcome"]
        )?,
        posts_found: register_int_counter!("scrapeflow_posts_found_total", "Total posts found")?,
        media: register_int_counter_vec!(
            "scrapeflow_media_total",
            "Media items by state",
            &["state"]
        )?,
        likes: register_int_counter_vec!(
            "scrapeflow_likes_total",
            "Like operations by result",
            &["result"]
        )?,
        errors: register_int_counter!("scrapeflow_errors_total", "Total per-user errors")?,
        daemon_cycles: register_int_counter_vec!(
            "scrapeflow_daemon_cycles_total",
            "Daemon cycles by status",
            &["status"]
        )?,
        next_run_timestamp: register_gauge!(
            "scrapeflow_daemon_next_run_timestamp_seconds",
            "Unix timestamp of the next scheduled daemon cycle"
        )?,
    };

    ENGINE_METRICS
        .set(metrics)
        .map_err(|_| "Engine metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    ENGINE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the totals of a finished run
pub fn record_run(stats: &Stats, duration_secs: f64) {
    let Some(m) = ENGINE_METRICS.get() else {
        return;
    };

    m.runs.inc();
    m.run_duration.observe(duration_secs);
    m.posts_found.inc_by(stats.posts_found);
    m.errors.inc_by(stats.errors);

    for (state, value) in [
        ("found", stats.media_found),
        ("downloaded", stats.media_downloaded),
        ("skipped", stats.media_skipped),
        ("failed", stats.media_failed),
    ] {
        if value > 0 {
            m.media.with_label_values(&[state]).inc_by(value);
        }
    }

    let failed_likes = stats.likes_attempted.saturating_sub(stats.likes_succeeded);
    if stats.likes_succeeded > 0 {
        m.likes.with_label_values(&["succeeded"]).inc_by(stats.likes_succeeded);
    }
    if failed_likes > 0 {
        m.likes.with_label_values(&["failed"]).inc_by(failed_likes);
    }
}

/// Record one user pipeline outcome
pub fn record_user_outcome(outcome: &str) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.users.with_label_values(&[outcome]).inc();
    }
}

/// Record a daemon cycle
pub fn record_daemon_cycle(success: bool) {
    if let Some(m) = ENGINE_METRICS.get() {
        let status = if success { "success" } else { "failure" };
        m.daemon_cycles.with_label_values(&[status]).inc();
    }
}

/// Publish when the daemon will next run
pub fn set_next_run(unix_secs: i64) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.next_run_timestamp.set(unix_secs as f64);
    }
}
