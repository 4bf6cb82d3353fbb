// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Validates sink, benchmark and pipeline settings before anything is
//! launched. Any invalid field results in a HardValidationError that
//! prevents startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{FioStreamError, FioStreamResult, HardValidationError};
use crate::framer::RecordFormat;
use crate::types::{BucketName, OrgName};

/// Raw sink section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSinkConfig {
    #[serde(default = "default_url")]
    url: String,
    #[serde(default = "default_org")]
    org: String,
    #[serde(default = "default_bucket")]
    bucket: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default = "default_write_timeout_ms")]
    write_timeout_ms: u64,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default = "default_max_pending_points")]
    max_pending_points: usize,
    #[serde(default = "default_flush_retries")]
    flush_retries: u32,
}

fn default_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_org() -> String {
    "Solidigm".to_string()
}

fn default_bucket() -> String {
    "fio".to_string()
}

fn default_write_timeout_ms() -> u64 {
    5000
}

fn default_batch_size() -> usize {
    1 // one point per status interval
}

fn default_max_pending_points() -> usize {
    10_000
}

/// Upper bound for final flush retries; backoff doubles per attempt.
const MAX_FLUSH_RETRIES: u32 = 10;

/// fio flags that change what stdout carries.
fn redirects_output(arg: &str) -> bool {
    let flag = arg.split('=').next().unwrap_or(arg);
    matches!(flag, "--output-format" | "--output" | "--minimal")
}

fn default_flush_retries() -> u32 {
    3
}

impl Default for RawSinkConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            org: default_org(),
            bucket: default_bucket(),
            token: None,
            write_timeout_ms: default_write_timeout_ms(),
            batch_size: default_batch_size(),
            max_pending_points: default_max_pending_points(),
            flush_retries: default_flush_retries(),
        }
    }
}

/// Raw benchmark section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBenchmarkConfig {
    #[serde(default = "default_binary")]
    binary: String,
    #[serde(default)]
    job_file: Option<PathBuf>,
    #[serde(default = "default_status_interval")]
    status_interval_secs: u64,
    #[serde(default)]
    format: RecordFormat,
    #[serde(default)]
    extra_args: Vec<String>,
    #[serde(default = "default_terminate_grace_ms")]
    terminate_grace_ms: u64,
}

fn default_binary() -> String {
    "fio".to_string()
}

fn default_status_interval() -> u64 {
    1
}

fn default_terminate_grace_ms() -> u64 {
    3000
}

impl Default for RawBenchmarkConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            job_file: None,
            status_interval_secs: default_status_interval(),
            format: RecordFormat::default(),
            extra_args: Vec::new(),
            terminate_grace_ms: default_terminate_grace_ms(),
        }
    }
}

/// Raw pipeline section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPipelineConfig {
    #[serde(default = "default_max_frame_bytes")]
    max_frame_bytes: usize,
    #[serde(default = "default_read_chunk_bytes")]
    read_chunk_bytes: usize,
    #[serde(default)]
    host_tag: Option<String>,
    #[serde(default)]
    csv_path: Option<PathBuf>,
}

fn default_max_frame_bytes() -> usize {
    16 * 1024 * 1024 // 16MB
}

fn default_read_chunk_bytes() -> usize {
    8192
}

impl Default for RawPipelineConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
            read_chunk_bytes: default_read_chunk_bytes(),
            host_tag: None,
            csv_path: None,
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    sink: RawSinkConfig,
    #[serde(default)]
    benchmark: RawBenchmarkConfig,
    #[serde(default)]
    pipeline: RawPipelineConfig,
}

/// Validated InfluxDB sink configuration.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub url: reqwest::Url,
    pub org: OrgName,
    pub bucket: BucketName,
    /// Opaque API token. May be supplied later from the environment.
    pub token: Option<String>,
    pub write_timeout: Duration,
    pub batch_size: usize,
    /// Undelivered points kept for retry before the oldest are dropped.
    pub max_pending_points: usize,
    /// Extra attempts for the final flush on drain.
    pub flush_retries: u32,
}

/// Validated benchmark launch configuration.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub binary: String,
    pub job_file: Option<PathBuf>,
    pub status_interval: Duration,
    pub format: RecordFormat,
    pub extra_args: Vec<String>,
    pub terminate_grace: Duration,
}

impl BenchmarkConfig {
    /// fio arguments for this configuration, job file last.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.extra_args.len() + 3);
        match self.format {
            RecordFormat::Json => args.push("--output-format=json".to_string()),
            RecordFormat::Terse => args.push("--minimal".to_string()),
        }
        args.push(format!(
            "--status-interval={}",
            self.status_interval.as_secs()
        ));
        args.extend(self.extra_args.iter().cloned());
        if let Some(job) = &self.job_file {
            args.push(job.display().to_string());
        }
        args
    }
}

/// Validated pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_frame_bytes: usize,
    pub read_chunk_bytes: usize,
    pub host_tag: Option<String>,
    pub csv_path: Option<PathBuf>,
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub sink: SinkConfig,
    pub benchmark: BenchmarkConfig,
    pub pipeline: PipelineConfig,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    /// Returns HardValidationError for any invalid fields.
    pub fn load_file(path: impl AsRef<Path>) -> FioStreamResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(FioStreamError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| FioStreamError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    /// An empty document yields the defaults.
    pub fn load_string(content: &str) -> FioStreamResult<Config> {
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| FioStreamError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?
        };

        Self::validate(raw)
    }

    /// All defaults; equivalent to an empty file.
    pub fn defaults() -> FioStreamResult<Config> {
        Self::validate(RawConfig::default())
    }

    fn validate(raw: RawConfig) -> FioStreamResult<Config> {
        Ok(Config {
            sink: Self::validate_sink(raw.sink)?,
            benchmark: Self::validate_benchmark(raw.benchmark)?,
            pipeline: Self::validate_pipeline(raw.pipeline)?,
        })
    }

    fn validate_sink(raw: RawSinkConfig) -> FioStreamResult<SinkConfig> {
        let url = reqwest::Url::parse(&raw.url).map_err(|e| {
            HardValidationError::InvalidFieldValue {
                field: "sink.url",
                value: raw.url.clone(),
                reason: e.to_string(),
            }
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(HardValidationError::InvalidFieldValue {
                field: "sink.url",
                value: raw.url,
                reason: "Only http and https endpoints are supported".to_string(),
            }
            .into());
        }

        if raw.write_timeout_ms == 0 || raw.write_timeout_ms > 300_000 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "sink.write_timeout_ms",
                value: raw.write_timeout_ms.to_string(),
                reason: "Must be between 1 and 300000".to_string(),
            }
            .into());
        }

        if raw.batch_size == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "sink.batch_size",
                value: "0".to_string(),
                reason: "Batch size must be at least 1".to_string(),
            }
            .into());
        }

        if raw.max_pending_points < raw.batch_size {
            return Err(HardValidationError::InvalidFieldValue {
                field: "sink.max_pending_points",
                value: raw.max_pending_points.to_string(),
                reason: format!("Must be at least batch_size ({})", raw.batch_size),
            }
            .into());
        }

        if raw.flush_retries > MAX_FLUSH_RETRIES {
            return Err(HardValidationError::InvalidFieldValue {
                field: "sink.flush_retries",
                value: raw.flush_retries.to_string(),
                reason: format!("Must be at most {}", MAX_FLUSH_RETRIES),
            }
            .into());
        }

        let token = raw.token.filter(|t| !t.trim().is_empty());

        Ok(SinkConfig {
            url,
            org: OrgName::new(raw.org)?,
            bucket: BucketName::new(raw.bucket)?,
            token,
            write_timeout: Duration::from_millis(raw.write_timeout_ms),
            batch_size: raw.batch_size,
            max_pending_points: raw.max_pending_points,
            flush_retries: raw.flush_retries,
        })
    }

    fn validate_benchmark(raw: RawBenchmarkConfig) -> FioStreamResult<BenchmarkConfig> {
        if raw.binary.trim().is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "benchmark.binary",
                value: raw.binary,
                reason: "Benchmark binary cannot be empty".to_string(),
            }
            .into());
        }

        if raw.status_interval_secs == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "benchmark.status_interval_secs",
                value: "0".to_string(),
                reason: "Status interval must be at least 1 second".to_string(),
            }
            .into());
        }

        if let Some(job) = &raw.job_file {
            if !job.exists() {
                return Err(HardValidationError::JobFileNotFound { path: job.clone() }.into());
            }
        }

        if let Some(arg) = raw.extra_args.iter().find(|a| redirects_output(a)) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "benchmark.extra_args",
                value: arg.clone(),
                reason: "Output format and destination are controlled by benchmark.format"
                    .to_string(),
            }
            .into());
        }

        Ok(BenchmarkConfig {
            binary: raw.binary,
            job_file: raw.job_file,
            status_interval: Duration::from_secs(raw.status_interval_secs),
            format: raw.format,
            extra_args: raw.extra_args,
            terminate_grace: Duration::from_millis(raw.terminate_grace_ms),
        })
    }

    fn validate_pipeline(raw: RawPipelineConfig) -> FioStreamResult<PipelineConfig> {
        // Validate frame bound (min 1KB, max 1GB)
        const MIN_FRAME: usize = 1024;
        const MAX_FRAME: usize = 1024 * 1024 * 1024;

        if raw.max_frame_bytes < MIN_FRAME || raw.max_frame_bytes > MAX_FRAME {
            return Err(HardValidationError::InvalidFieldValue {
                field: "pipeline.max_frame_bytes",
                value: raw.max_frame_bytes.to_string(),
                reason: format!("Must be between {} and {} bytes", MIN_FRAME, MAX_FRAME),
            }
            .into());
        }

        if raw.read_chunk_bytes == 0 || raw.read_chunk_bytes > raw.max_frame_bytes {
            return Err(HardValidationError::InvalidFieldValue {
                field: "pipeline.read_chunk_bytes",
                value: raw.read_chunk_bytes.to_string(),
                reason: "Must be between 1 and max_frame_bytes".to_string(),
            }
            .into());
        }

        Ok(PipelineConfig {
            max_frame_bytes: raw.max_frame_bytes,
            read_chunk_bytes: raw.read_chunk_bytes,
            host_tag: raw.host_tag.filter(|h| !h.trim().is_empty()),
            csv_path: raw.csv_path,
        })
    }
}
