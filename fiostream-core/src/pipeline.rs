// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Pipeline driver.
//!
//! Owns one run end to end: provision the bucket, start the source, then
//! pull chunks, frame them, normalize each record and hand the metric to the
//! sink (and optional CSV exporter), in stream order. Per-record problems
//! are counted and skipped; process failure, frame overflow and
//! provisioning failure end the run.
//!
//! ```text
//! Starting ──► Streaming ──► Draining ──► Done
//!     │            │             │
//!     └────────────┴─────────────┴──► Failed
//! ```
//!
//! Cancellation is observed at the chunk-pull boundary: the source is
//! terminated and the run moves straight to `Draining`, so buffered points
//! are still flushed.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{FioStreamError, FioStreamResult, FrameError, NormalizeError, SinkError};
use crate::framer::{RawRecord, RecordFormat, RecordFramer};
use crate::metric::CanonicalMetric;
use crate::normalize::MetricNormalizer;
use crate::sink::{CsvExporter, MetricSink, ProvisionOutcome};
use crate::source::ChunkSource;
use crate::state::{PipelineState, PipelineStateMachine};
use crate::types::BucketName;

/// Base delay between final flush attempts; doubled each retry.
const FLUSH_BACKOFF: Duration = Duration::from_millis(200);

/// Why a record (or point) never reached the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipReason {
    SchemaMismatch,
    UnsupportedLayout,
    /// A partial record was left in the buffer at end of stream.
    Truncated,
    /// Points the sink gave up on after repeated delivery failures.
    SinkDropped,
}

impl SkipReason {
    /// Skip category of a recoverable error. `None` for errors that cost
    /// nothing, such as a failed write whose points are still queued.
    pub fn classify(err: &FioStreamError) -> Option<Self> {
        match err {
            FioStreamError::Normalize(e) => Some(Self::from(e)),
            FioStreamError::Frame(FrameError::Truncated { .. }) => Some(Self::Truncated),
            FioStreamError::Sink(SinkError::Dropped { .. }) => Some(Self::SinkDropped),
            _ => None,
        }
    }

    /// Label used in logs and metrics.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SchemaMismatch => "schema_mismatch",
            Self::UnsupportedLayout => "unsupported_layout",
            Self::Truncated => "truncated",
            Self::SinkDropped => "sink_dropped",
        }
    }
}

impl From<&NormalizeError> for SkipReason {
    fn from(err: &NormalizeError) -> Self {
        match err {
            NormalizeError::SchemaMismatch { .. } => Self::SchemaMismatch,
            NormalizeError::UnsupportedLayout { .. } => Self::UnsupportedLayout,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hooks for progress reporting. Every method defaults to a no-op.
pub trait PipelineObserver: Send {
    fn on_state(&mut self, _state: PipelineState) {}

    fn on_chunk(&mut self, _bytes: usize) {}

    fn on_record(&mut self, _record: &RawRecord) {}

    /// A metric was accepted by the sink.
    fn on_metric(&mut self, _metric: &CanonicalMetric) {}

    fn on_skip(&mut self, _reason: SkipReason, _count: u64, _error: &FioStreamError) {}

    /// A delivery attempt failed; the points are still queued.
    fn on_delivery_failure(&mut self, _error: &SinkError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Run parameters taken from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub bucket: BucketName,
    pub format: RecordFormat,
    pub max_frame_bytes: usize,
    pub host_tag: Option<String>,
    /// Upper bound for a single sink write or flush.
    pub write_timeout: Duration,
    pub flush_retries: u32,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bucket: config.sink.bucket.clone(),
            format: config.benchmark.format,
            max_frame_bytes: config.pipeline.max_frame_bytes,
            host_tag: config.pipeline.host_tag.clone(),
            write_timeout: config.sink.write_timeout,
            flush_retries: config.sink.flush_retries,
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub state: PipelineState,
    pub history: Vec<PipelineState>,
    pub elapsed: Duration,
    pub cancelled: bool,
    pub provision: Option<ProvisionOutcome>,
    pub bytes_read: u64,
    pub discarded_bytes: u64,
    pub records_framed: u64,
    /// Metrics the sink accepted (delivered or queued).
    pub metrics_written: u64,
    pub csv_rows: u64,
    /// Failed delivery attempts whose points stayed queued.
    pub delivery_failures: u64,
    pub skipped: BTreeMap<SkipReason, u64>,
}

impl RunSummary {
    pub fn skipped_total(&self) -> u64 {
        self.skipped.values().sum()
    }

    pub fn skipped_for(&self, reason: SkipReason) -> u64 {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }

    /// Points known to have reached the sink, assuming the run completed.
    pub fn metrics_delivered(&self) -> u64 {
        self.metrics_written
            .saturating_sub(self.skipped_for(SkipReason::SinkDropped))
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {:.1}s: {} records framed, {} metrics delivered, {} skipped",
            self.state,
            self.elapsed.as_secs_f64(),
            self.records_framed,
            self.metrics_delivered(),
            self.skipped_total()
        )?;
        if self.skipped_total() > 0 {
            let parts: Vec<String> = self
                .skipped
                .iter()
                .map(|(reason, n)| format!("{}={}", reason, n))
                .collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        if self.cancelled {
            write!(f, " [cancelled]")?;
        }
        Ok(())
    }
}

/// One benchmark-to-sink run.
pub struct Pipeline<S, K> {
    source: S,
    sink: K,
    settings: PipelineSettings,
    framer: RecordFramer,
    normalizer: MetricNormalizer,
    csv: Option<CsvExporter>,
    observer: Box<dyn PipelineObserver>,
    machine: PipelineStateMachine,
    provision: Option<ProvisionOutcome>,
    cancelled: bool,
    bytes_read: u64,
    metrics_written: u64,
    delivery_failures: u64,
    skipped: BTreeMap<SkipReason, u64>,
}

impl<S: ChunkSource, K: MetricSink> Pipeline<S, K> {
    pub fn new(source: S, sink: K, settings: PipelineSettings) -> Self {
        Self {
            framer: RecordFramer::new(settings.format, settings.max_frame_bytes),
            normalizer: MetricNormalizer::new(settings.host_tag.clone()),
            source,
            sink,
            settings,
            csv: None,
            observer: Box::new(NoopObserver),
            machine: PipelineStateMachine::new(),
            provision: None,
            cancelled: false,
            bytes_read: 0,
            metrics_written: 0,
            delivery_failures: 0,
            skipped: BTreeMap::new(),
        }
    }

    pub fn with_csv(mut self, csv: CsvExporter) -> Self {
        self.csv = Some(csv);
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.machine.state()
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Snapshot of the counters. Valid at any point, including after a
    /// failed run.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            state: self.machine.state(),
            history: self.machine.history().to_vec(),
            elapsed: self.machine.elapsed(),
            cancelled: self.cancelled,
            provision: self.provision,
            bytes_read: self.bytes_read,
            discarded_bytes: self.framer.discarded_bytes(),
            records_framed: self.framer.records_emitted(),
            metrics_written: self.metrics_written,
            csv_rows: self.csv.as_ref().map(CsvExporter::rows).unwrap_or(0),
            delivery_failures: self.delivery_failures,
            skipped: self.skipped.clone(),
        }
    }

    /// Drive the run to `Done` or `Failed`.
    ///
    /// On failure the error is returned and [`Pipeline::summary`] still
    /// reports what was processed.
    pub async fn run(&mut self, cancel: CancellationToken) -> FioStreamResult<RunSummary> {
        match self.drive(&cancel).await {
            Ok(()) => {
                self.enter(PipelineState::Done)?;
                let summary = self.summary();
                tracing::info!(
                    records = summary.records_framed,
                    delivered = summary.metrics_delivered(),
                    skipped = summary.skipped_total(),
                    cancelled = summary.cancelled,
                    "Pipeline finished"
                );
                Ok(summary)
            }
            Err(e) => {
                self.machine.fail();
                self.observer.on_state(PipelineState::Failed);
                tracing::error!(
                    error = %e,
                    records = self.framer.records_emitted(),
                    "Pipeline failed"
                );
                Err(e)
            }
        }
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> FioStreamResult<()> {
        // Starting
        let outcome = self.sink.provision(&self.settings.bucket).await?;
        tracing::info!(
            bucket = %self.settings.bucket,
            sink = self.sink.name(),
            outcome = outcome.name(),
            "Bucket provisioned"
        );
        self.provision = Some(outcome);

        self.source.start().await?;
        self.enter(PipelineState::Streaming)?;

        if let Err(e) = self.stream(cancel).await {
            self.abandon_source().await;
            return Err(e);
        }

        self.enter(PipelineState::Draining)?;
        self.drain().await
    }

    async fn stream(&mut self, cancel: &CancellationToken) -> FioStreamResult<()> {
        tracing::info!(
            source = %self.source.describe(),
            format = %self.settings.format,
            "Streaming"
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                chunk = self.source.next_chunk() => Some(chunk),
            };

            let Some(chunk) = next else {
                tracing::info!("Cancellation requested, terminating source");
                self.cancelled = true;
                self.source.terminate().await?;
                break;
            };

            let Some(chunk) = chunk? else {
                tracing::debug!(bytes = self.bytes_read, "End of stream");
                break;
            };

            self.bytes_read += chunk.len() as u64;
            self.observer.on_chunk(chunk.len());

            for record in self.framer.push(&chunk)? {
                self.deliver(record).await?;
            }
        }

        match self.framer.finish() {
            Ok(Some(record)) => self.deliver(record).await,
            Ok(None) => Ok(()),
            Err(e) => self.absorb(e.into()),
        }
    }

    /// Normalize one record and hand it to the sinks.
    async fn deliver(&mut self, record: RawRecord) -> FioStreamResult<()> {
        self.observer.on_record(&record);

        let metric = match self.normalizer.normalize(&record, Utc::now()) {
            Ok(metric) => metric,
            Err(e) => return self.absorb(e.into()),
        };

        let written =
            match tokio::time::timeout(self.settings.write_timeout, self.sink.write(&metric)).await {
                Ok(result) => result,
                Err(_) => Err(SinkError::Write {
                    pending: self.sink.pending(),
                    reason: format!(
                        "write timed out after {}ms",
                        self.settings.write_timeout.as_millis()
                    ),
                }),
            };
        if let Err(e) = written {
            self.absorb(e.into())?;
        }

        self.metrics_written += 1;
        if let Some(csv) = self.csv.as_mut() {
            csv.append(&metric)?;
        }
        self.observer.on_metric(&metric);
        Ok(())
    }

    async fn drain(&mut self) -> FioStreamResult<()> {
        let flushed = self.flush_sink().await;

        let csv_flushed = match self.csv.as_mut() {
            Some(csv) => csv.flush(),
            None => Ok(()),
        };

        let finished = self.source.finish().await;

        finished?;
        flushed?;
        csv_flushed?;
        Ok(())
    }

    /// Flush the sink, retrying with backoff. A flush that never succeeds is
    /// fatal: the queued points would otherwise be lost silently.
    async fn flush_sink(&mut self) -> Result<(), SinkError> {
        let attempts = self.settings.flush_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result =
                match tokio::time::timeout(self.settings.write_timeout, self.sink.flush()).await {
                    Ok(result) => result,
                    Err(_) => Err(SinkError::Flush {
                        points: self.sink.pending(),
                        reason: format!(
                            "flush timed out after {}ms",
                            self.settings.write_timeout.as_millis()
                        ),
                    }),
                };

            match result {
                Ok(()) => {
                    tracing::debug!(sink = self.sink.name(), attempt, "Sink flushed");
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    let delay = FLUSH_BACKOFF * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        error = %e,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        "Flush failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Best-effort stop of the source after a fatal error.
    async fn abandon_source(&mut self) {
        if let Err(e) = self.source.terminate().await {
            tracing::warn!(error = %e, "Failed to terminate source");
        }
        if let Err(e) = self.source.finish().await {
            tracing::debug!(error = %e, "Source ended with error after failure");
        }
    }

    /// Count a recoverable error and carry on, or hand a fatal one back.
    fn absorb(&mut self, err: FioStreamError) -> FioStreamResult<()> {
        if !err.is_recoverable() {
            return Err(err);
        }

        match SkipReason::classify(&err) {
            Some(reason) => {
                let count = match &err {
                    FioStreamError::Sink(e) => e.lost_points() as u64,
                    _ => 1,
                };
                self.skip(reason, count, &err);
            }
            None => {
                tracing::warn!(error = %err, "Delivery failed, points kept for retry");
                self.delivery_failures += 1;
                if let FioStreamError::Sink(e) = &err {
                    self.observer.on_delivery_failure(e);
                }
            }
        }
        Ok(())
    }

    fn skip(&mut self, reason: SkipReason, count: u64, error: &FioStreamError) {
        tracing::warn!(reason = reason.name(), count, error = %error, "Skipping record");
        *self.skipped.entry(reason).or_insert(0) += count;
        self.observer.on_skip(reason, count, error);
    }

    fn enter(&mut self, state: PipelineState) -> FioStreamResult<()> {
        self.machine.transition_to(state)?;
        self.observer.on_state(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;
    use crate::error::ProcessError;
    use crate::sink::MemorySink;
    use crate::source::ReaderSource;
    use std::sync::{Arc, Mutex};

    fn settings(format: RecordFormat, max_frame_bytes: usize) -> PipelineSettings {
        let mut settings = PipelineSettings::from_config(&ConfigLoader::defaults().unwrap());
        settings.format = format;
        settings.max_frame_bytes = max_frame_bytes;
        settings
    }

    fn record(job: &str, bw: u64) -> String {
        format!(
            concat!(
                r#"{{"jobs":[{{"jobname":"{}","#,
                r#""read":{{"bw":{},"iops":10.0,"clat_ns":{{"min":1,"max":2,"mean":1000000.0,"stddev":0.5}}}},"#,
                r#""write":{{"bw":0,"iops":0.0,"clat_ns":{{"min":0,"max":0,"mean":0.0,"stddev":0.0}}}}}}]}}"#
            ),
            job, bw
        )
    }

    fn source(data: String, chunk: usize) -> ReaderSource<std::io::Cursor<Vec<u8>>> {
        ReaderSource::new("test", std::io::Cursor::new(data.into_bytes()), chunk)
    }

    #[derive(Default)]
    struct Recorder {
        states: Arc<Mutex<Vec<PipelineState>>>,
    }

    impl PipelineObserver for Recorder {
        fn on_state(&mut self, state: PipelineState) {
            self.states.lock().unwrap().push(state);
        }
    }

    #[tokio::test]
    async fn test_streams_records_in_order() {
        let data = format!("{}\n{}\n{}", record("a", 1024), record("b", 2048), record("c", 3072));
        let mut pipeline = Pipeline::new(
            source(data, 7),
            MemorySink::new(),
            settings(RecordFormat::Json, 4096),
        );

        let summary = pipeline.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.state, PipelineState::Done);
        assert_eq!(summary.records_framed, 3);
        assert_eq!(summary.metrics_delivered(), 3);
        assert_eq!(summary.provision, Some(ProvisionOutcome::Created));

        let runs: Vec<&str> = pipeline
            .sink()
            .points()
            .iter()
            .map(|m| m.run_id().as_str())
            .collect();
        assert_eq!(runs, vec!["a", "b", "c"]);
        assert_eq!(pipeline.sink().flush_count(), 1);
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_skipped() {
        let data = format!("{}{{\"jobs\":[]}}{}", record("a", 1), record("b", 1));
        let mut pipeline = Pipeline::new(
            source(data, 5),
            MemorySink::new(),
            settings(RecordFormat::Json, 4096),
        );

        let summary = pipeline.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.state, PipelineState::Done);
        assert_eq!(summary.metrics_delivered(), 2);
        assert_eq!(summary.skipped_for(SkipReason::SchemaMismatch), 1);
    }

    #[tokio::test]
    async fn test_truncated_tail_is_skipped() {
        let data = format!("{}{{\"jobs\":[{{", record("a", 1));
        let mut pipeline = Pipeline::new(
            source(data, 64),
            MemorySink::new(),
            settings(RecordFormat::Json, 4096),
        );

        let summary = pipeline.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.metrics_delivered(), 1);
        assert_eq!(summary.skipped_for(SkipReason::Truncated), 1);
    }

    #[tokio::test]
    async fn test_overflow_fails_the_run() {
        let data = format!("{{\"jobs\":\"{}", "x".repeat(5000));
        let states = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new(
            source(data, 256),
            MemorySink::new(),
            settings(RecordFormat::Json, 1024),
        )
        .with_observer(Box::new(Recorder {
            states: states.clone(),
        }));

        let err = pipeline.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, FioStreamError::Frame(FrameError::Overflow { .. })));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert_eq!(
            *states.lock().unwrap(),
            vec![PipelineState::Streaming, PipelineState::Failed]
        );
    }

    #[tokio::test]
    async fn test_record_ahead_of_overflow_is_delivered() {
        let data = format!("{}{{\"jobs\":\"{}", record("a", 1024), "x".repeat(5000));
        let mut pipeline = Pipeline::new(
            source(data, 8192),
            MemorySink::new(),
            settings(RecordFormat::Json, 1024),
        );

        let err = pipeline.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, FioStreamError::Frame(FrameError::Overflow { .. })));

        let summary = pipeline.summary();
        assert_eq!(summary.records_framed, 1);
        assert_eq!(summary.metrics_written, 1);
        assert_eq!(pipeline.sink().points()[0].run_id().as_str(), "a");
    }

    #[test]
    fn test_classify_follows_recoverability() {
        let dropped: FioStreamError = SinkError::Dropped {
            dropped: 3,
            reason: "down".to_string(),
        }
        .into();
        assert!(dropped.is_recoverable());
        assert_eq!(SkipReason::classify(&dropped), Some(SkipReason::SinkDropped));

        let queued: FioStreamError = SinkError::Write {
            pending: 1,
            reason: "down".to_string(),
        }
        .into();
        assert!(queued.is_recoverable());
        assert_eq!(SkipReason::classify(&queued), None);

        let truncated: FioStreamError = FrameError::Truncated {
            buffered: 4,
            preview: "{\"jo".to_string(),
        }
        .into();
        assert!(truncated.is_recoverable());
        assert_eq!(SkipReason::classify(&truncated), Some(SkipReason::Truncated));
    }

    #[tokio::test]
    async fn test_fatal_sink_error_during_write_fails_the_run() {
        let mut pipeline = Pipeline::new(
            source(record("a", 1), 64),
            RejectingSink,
            settings(RecordFormat::Json, 4096),
        );

        let err = pipeline.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, FioStreamError::Sink(SinkError::Client { .. })));
        assert_eq!(pipeline.summary().metrics_written, 0);
    }

    struct RejectingSink;

    #[async_trait::async_trait]
    impl MetricSink for RejectingSink {
        async fn provision(&mut self, _bucket: &BucketName) -> Result<ProvisionOutcome, SinkError> {
            Ok(ProvisionOutcome::AlreadyExists)
        }
        async fn write(&mut self, _metric: &CanonicalMetric) -> Result<(), SinkError> {
            Err(SinkError::Client {
                reason: "token revoked".to_string(),
            })
        }
        async fn flush(&mut self) -> Result<(), SinkError> {
            Ok(())
        }
        fn pending(&self) -> usize {
            0
        }
        fn name(&self) -> &str {
            "rejecting"
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_first_chunk() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut pipeline = Pipeline::new(
            source(record("a", 1), 16),
            MemorySink::new(),
            settings(RecordFormat::Json, 4096),
        );

        let summary = pipeline.run(cancel).await.unwrap();
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
        assert_eq!(pipeline.sink().flush_count(), 1);
    }

    #[tokio::test]
    async fn test_terse_stream() {
        let line = {
            let mut f = vec!["0".to_string(); 100];
            f[0] = "3".into();
            f[2] = "terse-job".into();
            for base in [17, 58] {
                for i in 0..20 {
                    f[base + i] = "50.000000%=100".into();
                }
            }
            f.join(";")
        };
        let data = format!("{}\n\n{}", line, line);
        let mut pipeline = Pipeline::new(
            source(data, 33),
            MemorySink::new(),
            settings(RecordFormat::Terse, 4096),
        );

        let summary = pipeline.run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.records_framed, 2);
        assert_eq!(summary.metrics_delivered(), 2);
        assert_eq!(pipeline.sink().points()[0].run_id().as_str(), "terse-job");
    }

    struct FailingSource;

    #[async_trait::async_trait]
    impl ChunkSource for FailingSource {
        async fn start(&mut self) -> Result<(), ProcessError> {
            Err(ProcessError::SpawnFailed {
                program: "fio".to_string(),
                reason: "not found".to_string(),
            })
        }
        async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ProcessError> {
            Ok(None)
        }
        async fn terminate(&mut self) -> Result<(), ProcessError> {
            Ok(())
        }
        async fn finish(&mut self) -> Result<(), ProcessError> {
            Ok(())
        }
        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_is_fatal() {
        let mut pipeline = Pipeline::new(
            FailingSource,
            MemorySink::new(),
            settings(RecordFormat::Json, 4096),
        );
        let err = pipeline.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            FioStreamError::Process(ProcessError::SpawnFailed { .. })
        ));
        assert_eq!(
            pipeline.summary().history,
            vec![PipelineState::Starting, PipelineState::Failed]
        );
    }

    #[test]
    fn test_summary_display() {
        let mut skipped = BTreeMap::new();
        skipped.insert(SkipReason::SchemaMismatch, 2);
        let summary = RunSummary {
            state: PipelineState::Done,
            history: Vec::new(),
            elapsed: Duration::from_millis(1500),
            cancelled: true,
            provision: None,
            bytes_read: 0,
            discarded_bytes: 0,
            records_framed: 5,
            metrics_written: 3,
            csv_rows: 0,
            delivery_failures: 0,
            skipped,
        };
        assert_eq!(
            summary.to_string(),
            "Done after 1.5s: 5 records framed, 3 metrics delivered, 2 skipped \
             (schema_mismatch=2) [cancelled]"
        );
    }
}
