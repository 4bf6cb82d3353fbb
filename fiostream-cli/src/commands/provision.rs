// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fiostream provision` command - Create the configured bucket.

use fiostream_core::{InfluxSink, MetricSink};

use super::Overrides;

pub async fn execute(overrides: &Overrides) -> Result<(), Box<dyn std::error::Error>> {
    let config = overrides.load()?;
    let mut sink = InfluxSink::new(&config.sink)?;

    tracing::info!(
        url = %config.sink.url,
        org = %config.sink.org,
        bucket = %config.sink.bucket,
        "Provisioning bucket"
    );

    match sink.provision(&config.sink.bucket).await {
        Ok(outcome) => {
            println!("✓ Bucket '{}' {}", config.sink.bucket, outcome.name());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Provisioning failed:");
            eprintln!("  {}", e);
            Err(e.into())
        }
    }
}
