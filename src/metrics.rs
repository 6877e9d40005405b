use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;
use tracing::info;

/// Metric name prefix for all metrics of this daemon
const PREFIX: &str = "devbyte";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Work scheduler metrics
    pub static ref WORK_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_work_runs_total"), "Total number of periodic work runs"),
        &["work_name", "outcome"]
    ).expect("Failed to create work_runs_total metric");

    pub static ref WORK_RUN_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_work_run_duration_seconds"),
            "Periodic work run duration in seconds"
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0]),
        &["work_name"]
    ).expect("Failed to create work_run_duration_seconds metric");

    pub static ref WORK_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_work_running"), "Whether periodic work is currently running"),
        &["work_name"]
    ).expect("Failed to create work_running metric");

    pub static ref WORK_CONSTRAINT_DEFERRALS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            format!("{PREFIX}_work_constraint_deferrals_total"),
            "Times due work was held back by unmet constraints"
        ),
        &["work_name"]
    ).expect("Failed to create work_constraint_deferrals_total metric");

    // Refresh metrics
    pub static ref VIDEOS_REFRESHED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_videos_refreshed_total"),
        "Total number of videos written by refreshes"
    ).expect("Failed to create videos_refreshed_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(WORK_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WORK_RUN_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(WORK_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(WORK_CONSTRAINT_DEFERRALS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(VIDEOS_REFRESHED_TOTAL.clone()));

    info!("Metrics initialized");
}

/// Record a finished work run
pub fn record_work_run(work_name: &str, outcome: &str, duration: Duration) {
    WORK_RUNS_TOTAL
        .with_label_values(&[work_name, outcome])
        .inc();

    WORK_RUN_DURATION_SECONDS
        .with_label_values(&[work_name])
        .observe(duration.as_secs_f64());
}

pub fn set_work_running(work_name: &str, running: bool) {
    WORK_RUNNING
        .with_label_values(&[work_name])
        .set(if running { 1.0 } else { 0.0 });
}

pub fn record_constraint_deferral(work_name: &str) {
    WORK_CONSTRAINT_DEFERRALS_TOTAL
        .with_label_values(&[work_name])
        .inc();
}

pub fn record_videos_refreshed(count: usize) {
    VIDEOS_REFRESHED_TOTAL.inc_by(count as f64);
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve `/metrics` on localhost until the task is dropped.
pub async fn run_metrics_server(port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", port))?;

    Ok(axum::serve(listener, metrics_router()).await?)
}
