// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fiostream run` command - Launch fio and stream its status reports.

use std::path::PathBuf;

use fiostream_core::{BenchmarkProcess, HardValidationError, RecordFormat};

use super::Overrides;
use crate::StreamArgs;

pub async fn execute(
    overrides: &Overrides,
    job_file: Option<String>,
    format: Option<RecordFormat>,
    args: &StreamArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = overrides.load()?;

    if let Some(job) = job_file {
        let path = PathBuf::from(job);
        if !path.exists() {
            return Err(HardValidationError::JobFileNotFound { path }.into());
        }
        config.benchmark.job_file = Some(path);
    }
    if let Some(format) = format {
        config.benchmark.format = format;
    }

    if config.benchmark.job_file.is_none() {
        return Err(HardValidationError::MissingRequiredField {
            field: "job_file",
            context: "benchmark (pass a job file or set benchmark.job_file)".to_string(),
        }
        .into());
    }

    let process = BenchmarkProcess::from_config(&config.benchmark, config.pipeline.read_chunk_bytes);
    tracing::info!(
        binary = %config.benchmark.binary,
        args = ?config.benchmark.args(),
        "Launching benchmark"
    );

    super::stream(config, Box::new(process), args).await
}
