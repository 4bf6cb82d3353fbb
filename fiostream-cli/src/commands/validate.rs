// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `fiostream validate` command - Validate configuration file.

use fiostream_core::ConfigLoader;

use super::DEFAULT_CONFIG;

pub async fn execute(file: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let file = file.unwrap_or(DEFAULT_CONFIG);
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Sink:");
            println!("  URL:            {}", config.sink.url);
            println!("  Organization:   {}", config.sink.org);
            println!("  Bucket:         {}", config.sink.bucket);
            println!(
                "  Token:          {}",
                if config.sink.token.is_some() {
                    "set"
                } else {
                    "not set (use FIOSTREAM_TOKEN)"
                }
            );
            println!(
                "  Write Timeout:  {}ms",
                config.sink.write_timeout.as_millis()
            );
            println!("  Batch Size:     {}", config.sink.batch_size);
            println!();
            println!("Benchmark:");
            println!("  Binary:         {}", config.benchmark.binary);
            match &config.benchmark.job_file {
                Some(job) => println!("  Job File:       {}", job.display()),
                None => println!("  Job File:       (none)"),
            }
            println!("  Format:         {}", config.benchmark.format);
            println!(
                "  Status Every:   {}s",
                config.benchmark.status_interval.as_secs()
            );
            println!();
            println!("Pipeline:");
            println!(
                "  Max Frame Size: {} bytes",
                config.pipeline.max_frame_bytes
            );
            if let Some(csv) = &config.pipeline.csv_path {
                println!("  CSV Export:     {}", csv.display());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
