/// Metrics and telemetry for Converso
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Admin logins and refresh-token rotations
/// - Ban signal fan-out and admin command traffic
/// - Background job execution

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========== Admin Auth Metrics ==========

    /// Admin login attempts by outcome
    pub static ref ADMIN_LOGINS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "admin_logins_total",
        "Admin login attempts by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Refresh-token exchanges by outcome
    pub static ref TOKEN_REFRESHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "admin_token_refreshes_total",
        "Admin refresh-token exchanges by outcome",
        &["outcome"]
    )
    .unwrap();

    // ========== Moderation Metrics ==========

    /// Ban signals by status and which fan-out step handled them
    pub static ref BAN_SIGNALS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ban_signals_total",
        "Ban signals by status and delivery result",
        &["status", "delivery"]
    )
    .unwrap();

    /// Open server-sent event streams
    pub static ref EVENT_STREAMS_ACTIVE: IntGauge = register_int_gauge!(
        "event_streams_active",
        "Number of open server-sent event streams"
    )
    .unwrap();

    // ========== Command Queue Metrics ==========

    /// Admin commands by operation
    pub static ref ADMIN_COMMANDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "admin_commands_total",
        "Admin commands enqueued, delivered and acknowledged",
        &["operation"]
    )
    .unwrap();

    // ========== Summarizer Metrics ==========

    /// Session recaps by producing backend
    pub static ref RECAPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "session_recaps_total",
        "Session recaps generated by backend",
        &["backend"]
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record an admin login attempt
pub fn record_admin_login(outcome: &str) {
    ADMIN_LOGINS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a refresh-token exchange
pub fn record_token_refresh(outcome: &str) {
    TOKEN_REFRESHES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record one step of a ban signal's fan-out
pub fn record_ban_signal(status: &str, delivery: &str) {
    BAN_SIGNALS_TOTAL.with_label_values(&[status, delivery]).inc();
}

/// Record admin command traffic
pub fn record_admin_command(operation: &str, count: u64) {
    ADMIN_COMMANDS_TOTAL.with_label_values(&[operation]).inc_by(count);
}

/// Record which backend produced a recap
pub fn record_recap(backend: &str) {
    RECAPS_TOTAL.with_label_values(&[backend]).inc();
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}

/// Request metrics middleware. Labels by route template, not raw path.
pub async fn track_http_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}
