// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Local CSV record of a run.
//!
//! One row per delivered metric: capture time, sequential read speed and
//! read completion latency, both to two decimals.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::SinkError;
use crate::metric::{fields, CanonicalMetric};

pub const CSV_HEADER: &str = "Timestamp,Sequential Read Speed (MB/s),Completion Latency (ms)";

/// Secondary sink writing a CSV file.
pub struct CsvExporter {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: u64,
}

impl CsvExporter {
    /// Create (or truncate) `path` and write the header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "{}", CSV_HEADER)?;

        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn append(&mut self, metric: &CanonicalMetric) -> Result<(), SinkError> {
        writeln!(self.writer, "{}", Self::row(metric))?;
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }

    fn row(metric: &CanonicalMetric) -> String {
        // Both fields are present for every metric the normalizer builds.
        let speed = metric.field(fields::READ_BANDWIDTH_MBS).unwrap_or(0.0);
        let latency = metric.field(fields::READ_COMPLETION_MEAN_MS).unwrap_or(0.0);
        format!(
            "{},{:.2},{:.2}",
            metric.timestamp().format("%Y-%m-%d %H:%M:%S"),
            speed,
            latency
        )
    }
}
