use std::net::SocketAddr;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use lazy_static::lazy_static;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
    TextEncoder,
};
use tokio::net::TcpListener;

lazy_static! {
    pub static ref BYTES_READ: IntCounter = register_int_counter!(
        "fiostream_bytes_read_total",
        "Bytes read from the benchmark output"
    )
    .unwrap();
    pub static ref RECORDS_FRAMED: IntCounter = register_int_counter!(
        "fiostream_records_framed_total",
        "Complete records extracted from the benchmark output"
    )
    .unwrap();
    pub static ref METRICS_WRITTEN: IntCounter = register_int_counter!(
        "fiostream_metrics_written_total",
        "Canonical metrics accepted by the sink"
    )
    .unwrap();
    pub static ref RECORDS_SKIPPED: IntCounterVec = register_int_counter_vec!(
        "fiostream_records_skipped_total",
        "Records or points skipped without aborting the run",
        &["reason"]
    )
    .unwrap();
    pub static ref DELIVERY_FAILURES: IntCounter = register_int_counter!(
        "fiostream_delivery_failures_total",
        "Sink writes that failed and were kept for retry"
    )
    .unwrap();
    pub static ref PIPELINE_STATE: IntGauge = register_int_gauge!(
        "fiostream_pipeline_state",
        "Current pipeline state (0 starting, 1 streaming, 2 draining, 3 done, 4 failed)"
    )
    .unwrap();
    pub static ref LAST_READ_METRIC: GaugeVec = register_gauge_vec!(
        "fiostream_last_read",
        "Most recent read-side value per field",
        &["field"]
    )
    .unwrap();
    pub static ref COMPLETION_LATENCY: Histogram = register_histogram!(
        "fiostream_read_completion_latency_ms",
        "Mean read completion latency per status report",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 100.0] // Buckets spanning NVMe to HDD
    )
    .unwrap();
}

/// Router exposing the registry in Prometheus text format on `/metrics`.
pub fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Bind the metrics endpoint and serve it in a background task.
///
/// Binding happens up front so a port that is already taken fails the
/// command before the benchmark starts.
pub async fn start_metrics_server(port: u16) -> std::io::Result<SocketAddr> {
    // Force initialization of metrics
    lazy_static::initialize(&BYTES_READ);
    lazy_static::initialize(&RECORDS_FRAMED);
    lazy_static::initialize(&METRICS_WRITTEN);
    lazy_static::initialize(&RECORDS_SKIPPED);
    lazy_static::initialize(&DELIVERY_FAILURES);
    lazy_static::initialize(&PIPELINE_STATE);
    lazy_static::initialize(&LAST_READ_METRIC);
    lazy_static::initialize(&COMPLETION_LATENCY);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Serving Prometheus metrics on /metrics");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router()).await {
            tracing::error!(error = %e, "Metrics server stopped");
        }
    });

    Ok(addr)
}

async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => (
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
