// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod ingest;
pub mod provision;
pub mod run;
pub mod validate;

use std::path::{Path, PathBuf};

use fiostream_core::{
    ChunkSource, Config, ConfigLoader, CsvExporter, InfluxSink, MemorySink, MetricSink, Pipeline,
    PipelineSettings,
};
use tokio_util::sync::CancellationToken;

use crate::progress::ProgressObserver;
use crate::StreamArgs;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG: &str = "fiostream.yaml";

/// Global flags that adjust the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config: Option<String>,
    pub token: Option<String>,
}

impl Overrides {
    /// Load the configuration and apply command-line overrides.
    ///
    /// An explicit `--config` must exist. Without one, `fiostream.yaml` is
    /// used when present and built-in defaults otherwise.
    pub fn load(&self) -> Result<Config, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => ConfigLoader::load_file(path)?,
            None if Path::new(DEFAULT_CONFIG).exists() => ConfigLoader::load_file(DEFAULT_CONFIG)?,
            None => {
                tracing::info!("No configuration file, using defaults");
                ConfigLoader::defaults()?
            }
        };

        if let Some(token) = self.token.as_ref().filter(|t| !t.trim().is_empty()) {
            config.sink.token = Some(token.clone());
        }

        Ok(config)
    }
}

impl StreamArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(csv) = &self.csv {
            config.pipeline.csv_path = Some(PathBuf::from(csv));
        }
        if let Some(tag) = self.host_tag.as_ref().filter(|t| !t.trim().is_empty()) {
            config.pipeline.host_tag = Some(tag.clone());
        }
    }
}

/// Run one pipeline from `source` to the configured sink and print the
/// outcome.
pub async fn stream(
    mut config: Config,
    source: Box<dyn ChunkSource>,
    args: &StreamArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    args.apply(&mut config);

    let sink: Box<dyn MetricSink> = if args.dry_run {
        tracing::info!("Dry run: metrics are kept in memory");
        Box::new(MemorySink::new())
    } else {
        Box::new(InfluxSink::new(&config.sink)?)
    };

    if let Some(port) = args.metrics_port {
        crate::metrics::start_metrics_server(port).await?;
    }

    let mut pipeline = Pipeline::new(source, sink, PipelineSettings::from_config(&config))
        .with_observer(Box::new(ProgressObserver::new()));

    if let Some(path) = &config.pipeline.csv_path {
        let exporter = CsvExporter::create(path)?;
        println!("▶ Writing CSV to {}", exporter.path().display());
        pipeline = pipeline.with_csv(exporter);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            tracing::info!("Interrupt received, stopping benchmark");
            on_interrupt.cancel();
        }
    });

    println!(
        "▶ Streaming to {} (bucket: {}, org: {})",
        if args.dry_run {
            "memory".to_string()
        } else {
            config.sink.url.to_string()
        },
        config.sink.bucket,
        config.sink.org
    );

    let result = pipeline.run(cancel).await;
    let summary = pipeline.summary();

    // Finish the progress line.
    eprintln!();

    match result {
        Ok(_) => {
            println!("✓ {}", summary);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ {}", summary);
            eprintln!("  {}", e);
            Err(e.into())
        }
    }
}
