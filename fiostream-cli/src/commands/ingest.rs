// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fiostream ingest` command - Stream fio output piped on stdin.

use fiostream_core::{RecordFormat, ReaderSource};

use super::Overrides;
use crate::StreamArgs;

pub async fn execute(
    overrides: &Overrides,
    format: Option<RecordFormat>,
    args: &StreamArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = overrides.load()?;
    if let Some(format) = format {
        config.benchmark.format = format;
    }

    tracing::info!(format = %config.benchmark.format, "Reading fio output from stdin");
    let source = ReaderSource::stdin(config.pipeline.read_chunk_bytes);

    super::stream(config, Box::new(source), args).await
}
