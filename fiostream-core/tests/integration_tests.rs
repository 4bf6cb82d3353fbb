// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! End-to-end integration tests for fiostream.
//!
//! These tests drive the pipeline with real child processes (`sh -c`
//! standing in for fio) and a mock InfluxDB v2 server.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use fiostream_core::{
    BenchmarkProcess, BucketName, ConfigLoader, CsvExporter, FioStreamError, FrameError,
    InfluxSink, MemorySink, MetricSink, Pipeline, PipelineSettings, PipelineState, ProcessError,
    ProvisionOutcome, RecordFormat, SinkConfig, SinkError, SkipReason,
};

const FIXTURE: &str = include_str!("fixtures/fio_status.json");

// =============================================================================
// Mock InfluxDB
// =============================================================================

#[derive(Debug, Default)]
struct MockInflux {
    buckets: HashSet<String>,
    writes: Vec<(HashMap<String, String>, String)>,
    auth: Vec<String>,
    /// Number of upcoming writes to reject with 503.
    fail_writes: usize,
    /// Response for every bucket create, when set.
    reject_buckets: Option<(StatusCode, Value)>,
}

type Shared = Arc<Mutex<MockInflux>>;

async fn orgs(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    match params.get("org").map(String::as_str) {
        Some("Solidigm") => Json(json!({"orgs": [{"id": "0a1b2c3d", "name": "Solidigm"}]})),
        // Servers filter loosely; the caller must match the name itself.
        Some("Soli") => Json(json!({"orgs": [{"id": "ffffffff", "name": "Solidigm Labs"}]})),
        _ => Json(json!({"orgs": []})),
    }
}

async fn create_bucket(
    State(state): State<Shared>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let name = body["name"].as_str().unwrap_or_default().to_string();
    assert_eq!(body["orgID"], "0a1b2c3d");
    assert_eq!(body["retentionRules"], json!([]));

    let mut state = state.lock().unwrap();
    if let Some((status, body)) = state.reject_buckets.clone() {
        return (status, Json(body));
    }
    if state.buckets.insert(name.clone()) {
        (StatusCode::CREATED, Json(json!({"id": "b1", "name": name})))
    } else {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"code": "conflict", "message": format!("bucket with name {} already exists", name)})),
        )
    }
}

async fn write(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let mut state = state.lock().unwrap();
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        state.auth.push(auth.to_string());
    }
    if state.fail_writes > 0 {
        state.fail_writes -= 1;
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    state.writes.push((params, body));
    StatusCode::NO_CONTENT
}

async fn start_mock_influx() -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(MockInflux::default()));
    let app = Router::new()
        .route("/api/v2/orgs", get(orgs))
        .route("/api/v2/buckets", post(create_bucket))
        .route("/api/v2/write", post(write))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

fn sink_config(url: &str, org: &str, batch_size: usize) -> SinkConfig {
    let yaml = format!(
        "sink:\n  url: {}\n  org: {}\n  bucket: fio\n  token: test-token\n  batch_size: {}\n",
        url, org, batch_size
    );
    ConfigLoader::load_string(&yaml).unwrap().sink
}

// =============================================================================
// Helpers
// =============================================================================

fn settings() -> PipelineSettings {
    PipelineSettings::from_config(&ConfigLoader::defaults().unwrap())
}

/// A compact copy of the fixture with a different job name.
fn record(jobname: &str) -> String {
    let mut value: Value = serde_json::from_str(FIXTURE).unwrap();
    value["jobs"][0]["jobname"] = json!(jobname);
    serde_json::to_string(&value).unwrap()
}

/// Write `stream` to a file and return a process that prints it, then runs
/// `after` (shell syntax).
fn fake_fio(dir: &Path, stream: &str, after: &str) -> BenchmarkProcess {
    let path = dir.join("stream.out");
    std::fs::write(&path, stream).unwrap();
    BenchmarkProcess::new(
        "sh",
        vec![
            "-c".to_string(),
            format!("cat '{}'; {}", path.display(), after),
        ],
        Duration::from_millis(500),
        1000,
    )
}

// =============================================================================
// Sink
// =============================================================================

#[tokio::test]
async fn test_provision_is_idempotent() {
    let (url, state) = start_mock_influx().await;
    let mut sink = InfluxSink::new(&sink_config(&url, "Solidigm", 1)).unwrap();
    let bucket = BucketName::new("fio").unwrap();

    assert_eq!(
        sink.provision(&bucket).await.unwrap(),
        ProvisionOutcome::Created
    );
    assert_eq!(
        sink.provision(&bucket).await.unwrap(),
        ProvisionOutcome::AlreadyExists
    );
    assert_eq!(state.lock().unwrap().buckets.len(), 1);
}

#[tokio::test]
async fn test_provision_unknown_org_is_fatal() {
    let (url, _state) = start_mock_influx().await;
    let mut sink = InfluxSink::new(&sink_config(&url, "Nobody", 1)).unwrap();

    let err = sink
        .provision(&BucketName::new("fio").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, SinkError::Provision { .. }));
    assert!(err.to_string().contains("Nobody"));
    assert!(!FioStreamError::from(err).is_recoverable());
}

#[tokio::test]
async fn test_provision_requires_exact_org_name() {
    let (url, state) = start_mock_influx().await;
    let mut sink = InfluxSink::new(&sink_config(&url, "Soli", 1)).unwrap();

    let err = sink
        .provision(&BucketName::new("fio").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, SinkError::Provision { .. }));
    assert!(err.to_string().contains("organization 'Soli' not found"));
    assert!(state.lock().unwrap().buckets.is_empty());
}

#[tokio::test]
async fn test_provision_rejection_is_not_already_exists() {
    let (url, state) = start_mock_influx().await;
    state.lock().unwrap().reject_buckets = Some((
        StatusCode::UNPROCESSABLE_ENTITY,
        json!({"code": "invalid", "message": "retention policy is invalid"}),
    ));
    let mut sink = InfluxSink::new(&sink_config(&url, "Solidigm", 1)).unwrap();

    let err = sink
        .provision(&BucketName::new("fio").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, SinkError::Provision { .. }));
    assert!(err.to_string().contains("retention policy is invalid"));
}

#[tokio::test]
async fn test_provision_conflict_code_is_already_exists() {
    let (url, state) = start_mock_influx().await;
    state.lock().unwrap().reject_buckets = Some((
        StatusCode::CONFLICT,
        json!({"code": "conflict", "message": "bucket name is taken"}),
    ));
    let mut sink = InfluxSink::new(&sink_config(&url, "Solidigm", 1)).unwrap();

    assert_eq!(
        sink.provision(&BucketName::new("fio").unwrap())
            .await
            .unwrap(),
        ProvisionOutcome::AlreadyExists
    );
}

#[tokio::test]
async fn test_pipeline_writes_line_protocol() {
    let (url, state) = start_mock_influx().await;
    let temp_dir = TempDir::new().unwrap();
    let stream = format!("{}\n{}\n", record("seqread"), record("seqread"));
    let source = fake_fio(temp_dir.path(), &stream, "exit 0");
    let sink = InfluxSink::new(&sink_config(&url, "Solidigm", 1)).unwrap();

    let mut pipeline = Pipeline::new(source, sink, settings());
    let summary = pipeline.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.state, PipelineState::Done);
    assert_eq!(summary.metrics_delivered(), 2);
    assert_eq!(pipeline.sink().delivered(), 2);

    let state = state.lock().unwrap();
    assert_eq!(state.writes.len(), 2);
    let (params, body) = &state.writes[0];
    assert_eq!(params["org"], "Solidigm");
    assert_eq!(params["bucket"], "fio");
    assert_eq!(params["precision"], "ns");
    assert!(state.auth.iter().all(|a| a == "Token test-token"));

    let line = body.lines().next().unwrap();
    assert!(line.starts_with("FIO,hostname=unknown,runId=seqread "));
    assert!(line.contains("Read_bandwidth_(MB/s)=3328.0"));
    assert!(line.contains("Read_Block_Size_(B)=131072.0"));
    assert!(line.contains("Read_Latency_Completion_mean=1.201"));
    assert!(line.contains("Read_Latency_Completion_p99=1.859584"));
    assert!(line.contains("Write_IOPS_Percentage=0.0"));
    assert!(line.contains("CPU\\ User=2.341"));
    assert!(line.contains("IOdepthdist32=99.9"));
}

#[tokio::test]
async fn test_failed_write_is_retried_in_order() {
    let (url, state) = start_mock_influx().await;
    state.lock().unwrap().fail_writes = 1;

    let temp_dir = TempDir::new().unwrap();
    let stream = format!("{}{}", record("first"), record("second"));
    let source = fake_fio(temp_dir.path(), &stream, "exit 0");
    let sink = InfluxSink::new(&sink_config(&url, "Solidigm", 1)).unwrap();

    let mut pipeline = Pipeline::new(source, sink, settings());
    let summary = pipeline.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.delivery_failures, 1);
    assert_eq!(summary.skipped_total(), 0);
    assert_eq!(summary.metrics_delivered(), 2);

    let state = state.lock().unwrap();
    assert_eq!(state.writes.len(), 1);
    let lines: Vec<&str> = state.writes[0].1.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("runId=first"));
    assert!(lines[1].contains("runId=second"));
}

#[tokio::test]
async fn test_unflushable_sink_fails_the_run() {
    let (url, state) = start_mock_influx().await;
    state.lock().unwrap().fail_writes = usize::MAX;

    let temp_dir = TempDir::new().unwrap();
    let source = fake_fio(temp_dir.path(), &record("seqread"), "exit 0");
    let sink = InfluxSink::new(&sink_config(&url, "Solidigm", 10)).unwrap();
    let mut settings = settings();
    settings.flush_retries = 1;

    let mut pipeline = Pipeline::new(source, sink, settings);
    let err = pipeline.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        FioStreamError::Sink(SinkError::Flush { points: 1, .. })
    ));
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

// =============================================================================
// Pipeline with a real child process
// =============================================================================

#[tokio::test]
async fn test_malformed_record_between_valid_ones() {
    let temp_dir = TempDir::new().unwrap();
    let stream = format!(
        "{}\n{{\"fio version\":\"fio-3.28\",\"jobs\":[{{\"jobname\":\"broken\"}}]}}\n{}\n",
        record("one"),
        record("two")
    );
    let source = fake_fio(temp_dir.path(), &stream, "exit 0");

    let mut pipeline = Pipeline::new(source, MemorySink::new(), settings());
    let summary = pipeline.run(CancellationToken::new()).await.unwrap();

    assert_eq!(summary.state, PipelineState::Done);
    assert_eq!(summary.records_framed, 3);
    assert_eq!(summary.metrics_delivered(), 2);
    assert_eq!(summary.skipped_for(SkipReason::SchemaMismatch), 1);

    let runs: Vec<&str> = pipeline
        .sink()
        .points()
        .iter()
        .map(|m| m.run_id().as_str())
        .collect();
    assert_eq!(runs, vec!["one", "two"]);
}

#[tokio::test]
async fn test_multi_job_record_is_unsupported() {
    let temp_dir = TempDir::new().unwrap();
    let mut value: Value = serde_json::from_str(FIXTURE).unwrap();
    let job = value["jobs"][0].clone();
    value["jobs"].as_array_mut().unwrap().push(job);
    let source = fake_fio(temp_dir.path(), &value.to_string(), "exit 0");

    let mut pipeline = Pipeline::new(source, MemorySink::new(), settings());
    let summary = pipeline.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.skipped_for(SkipReason::UnsupportedLayout), 1);
    assert!(pipeline.sink().points().is_empty());
}

#[tokio::test]
async fn test_unclosed_record_overflows() {
    let temp_dir = TempDir::new().unwrap();
    let stream = format!("{{\"jobs\": [\"{}", "x".repeat(64 * 1024));
    let source = fake_fio(temp_dir.path(), &stream, "sleep 30");
    let mut settings = settings();
    settings.max_frame_bytes = 16 * 1024;

    let started = Instant::now();
    let mut pipeline = Pipeline::new(source, MemorySink::new(), settings);
    let err = pipeline.run(CancellationToken::new()).await.unwrap_err();

    assert!(matches!(
        err,
        FioStreamError::Frame(FrameError::Overflow { limit: 16384, .. })
    ));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    // The child was terminated rather than waited out.
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_cancellation_terminates_child_and_flushes() {
    let temp_dir = TempDir::new().unwrap();
    let source = fake_fio(temp_dir.path(), &record("long"), "sleep 30");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let mut pipeline = Pipeline::new(source, MemorySink::new(), settings());
    let summary = pipeline.run(cancel).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(summary.cancelled);
    assert_eq!(summary.state, PipelineState::Done);
    assert_eq!(
        summary.history,
        vec![
            PipelineState::Starting,
            PipelineState::Streaming,
            PipelineState::Draining,
            PipelineState::Done
        ]
    );
    assert_eq!(pipeline.sink().points().len(), 1);
    assert_eq!(pipeline.sink().flush_count(), 1);
    assert!(pipeline.source().status().is_some());
}

#[tokio::test]
async fn test_process_failure_carries_stderr() {
    let temp_dir = TempDir::new().unwrap();
    let source = fake_fio(
        temp_dir.path(),
        "",
        "echo 'fio: failed parsing ioengine=nope' >&2; exit 1",
    );

    let mut pipeline = Pipeline::new(source, MemorySink::new(), settings());
    let err = pipeline.run(CancellationToken::new()).await.unwrap_err();

    match err {
        FioStreamError::Process(ProcessError::Failure { diagnostics, .. }) => {
            assert!(diagnostics.contains("failed parsing ioengine"));
        }
        other => panic!("expected process failure, got {:?}", other),
    }
    assert_eq!(pipeline.state(), PipelineState::Failed);
    // Draining was reached before the exit code was reconciled.
    assert_eq!(
        pipeline.summary().history,
        vec![
            PipelineState::Starting,
            PipelineState::Streaming,
            PipelineState::Draining,
            PipelineState::Failed
        ]
    );
}

#[tokio::test]
async fn test_csv_export_matches_delivered_metrics() {
    let temp_dir = TempDir::new().unwrap();
    let csv_path: PathBuf = temp_dir.path().join("fio_output.csv");
    let stream = format!("{}{}{}", record("a"), record("b"), record("c"));
    let source = fake_fio(temp_dir.path(), &stream, "exit 0");

    let mut pipeline = Pipeline::new(source, MemorySink::new(), settings())
        .with_csv(CsvExporter::create(&csv_path).unwrap());
    let summary = pipeline.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.csv_rows, 3);

    let content = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        "Timestamp,Sequential Read Speed (MB/s),Completion Latency (ms)"
    );
    assert!(lines[1].ends_with(",3328.00,1.20"));
}

#[tokio::test]
async fn test_terse_stream_from_process() {
    let temp_dir = TempDir::new().unwrap();
    let mut fields = vec!["0".to_string(); 130];
    fields[0] = "3".to_string();
    fields[1] = "fio-3.28".to_string();
    fields[2] = "randread".to_string();
    fields[6] = "40960".to_string();
    fields[7] = "10240".to_string();
    for base in [17, 58] {
        for i in 0..20 {
            fields[base + i] = "99.000000%=2048".to_string();
        }
    }
    let line = fields.join(";");
    let stream = format!("{}\r\n{}\n", line, line);
    let source = fake_fio(temp_dir.path(), &stream, "exit 0");

    let mut settings = settings();
    settings.format = RecordFormat::Terse;
    let mut pipeline = Pipeline::new(source, MemorySink::new(), settings);
    let summary = pipeline.run(CancellationToken::new()).await.unwrap();

    assert_eq!(summary.metrics_delivered(), 2);
    let metric = &pipeline.sink().points()[0];
    assert_eq!(metric.field("Read_Block_Size_(B)"), Some(4096.0));
    assert_eq!(metric.field("Read_Latency_Completion_p99"), Some(2.048));
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_config_loading_and_validation() {
    let temp_dir = TempDir::new().unwrap();
    let job_path = temp_dir.path().join("seqread.fio");
    std::fs::write(&job_path, "[seqread]\nrw=read\nbs=128k\n").unwrap();

    let config_path = temp_dir.path().join("fiostream.yaml");
    std::fs::write(
        &config_path,
        format!(
            r#"
sink:
  url: http://localhost:8086
  org: Solidigm
  bucket: fio
  token: abc

benchmark:
  job_file: {}
  status_interval_secs: 1

pipeline:
  csv_path: {}
"#,
            job_path.display(),
            temp_dir.path().join("out.csv").display()
        ),
    )
    .unwrap();

    let config = ConfigLoader::load_file(&config_path).unwrap();
    assert_eq!(
        config.benchmark.args(),
        vec![
            "--output-format=json".to_string(),
            "--status-interval=1".to_string(),
            job_path.display().to_string()
        ]
    );
    assert!(config.pipeline.csv_path.is_some());
}

#[test]
fn test_invalid_config_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("bad.yaml");
    std::fs::write(&config_path, "sink:\n  bucket: \"\"\n").unwrap();

    assert!(matches!(
        ConfigLoader::load_file(&config_path),
        Err(FioStreamError::HardValidation(_))
    ));
}
