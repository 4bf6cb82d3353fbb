// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Live progress line and Prometheus counters for a running pipeline.

use std::io::Write;

use fiostream_core::metric::fields;
use fiostream_core::{
    CanonicalMetric, FioStreamError, PipelineObserver, PipelineState, RawRecord, SinkError,
    SkipReason,
};

use crate::metrics;

/// Prints one rewriting status line to stderr and mirrors every pipeline
/// event into the metrics registry.
#[derive(Debug, Default)]
pub struct ProgressObserver {
    records: u64,
    written: u64,
    skipped: u64,
    failures: u64,
    last_bandwidth: Option<f64>,
    last_latency: Option<f64>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn line(&self) -> String {
        let mut line = format!(
            "  records: {} | written: {} | skipped: {}",
            self.records, self.written, self.skipped
        );
        if self.failures > 0 {
            line.push_str(&format!(" | retries: {}", self.failures));
        }
        if let Some(bw) = self.last_bandwidth {
            line.push_str(&format!(" | read: {:.2} MB/s", bw));
        }
        if let Some(lat) = self.last_latency {
            line.push_str(&format!(" | clat: {:.3} ms", lat));
        }
        line
    }

    fn redraw(&self) {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r{}", self.line());
        let _ = stderr.flush();
    }
}

fn state_code(state: PipelineState) -> i64 {
    match state {
        PipelineState::Starting => 0,
        PipelineState::Streaming => 1,
        PipelineState::Draining => 2,
        PipelineState::Done => 3,
        PipelineState::Failed => 4,
    }
}

impl PipelineObserver for ProgressObserver {
    fn on_state(&mut self, state: PipelineState) {
        metrics::PIPELINE_STATE.set(state_code(state));
    }

    fn on_chunk(&mut self, bytes: usize) {
        metrics::BYTES_READ.inc_by(bytes as u64);
    }

    fn on_record(&mut self, _record: &RawRecord) {
        self.records += 1;
        metrics::RECORDS_FRAMED.inc();
    }

    fn on_metric(&mut self, metric: &CanonicalMetric) {
        self.written += 1;
        metrics::METRICS_WRITTEN.inc();

        if let Some(bw) = metric.field(fields::READ_BANDWIDTH_MBS) {
            self.last_bandwidth = Some(bw);
            metrics::LAST_READ_METRIC
                .with_label_values(&["bandwidth_mbs"])
                .set(bw);
        }
        if let Some(lat) = metric.field(fields::READ_COMPLETION_MEAN_MS) {
            self.last_latency = Some(lat);
            metrics::LAST_READ_METRIC
                .with_label_values(&["completion_mean_ms"])
                .set(lat);
            metrics::COMPLETION_LATENCY.observe(lat);
        }
        self.redraw();
    }

    fn on_skip(&mut self, reason: SkipReason, count: u64, _error: &FioStreamError) {
        self.skipped += count;
        metrics::RECORDS_SKIPPED
            .with_label_values(&[reason.name()])
            .inc_by(count);
        self.redraw();
    }

    fn on_delivery_failure(&mut self, _error: &SinkError) {
        self.failures += 1;
        metrics::DELIVERY_FAILURES.inc();
    }
}
