// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Metric sinks.
//!
//! A sink is provisioned once (its bucket created idempotently), then fed
//! canonical metrics in framing order. `flush` is called explicitly on
//! drain; no sink relies on `Drop` to deliver buffered points.
//!
//! - [`InfluxSink`]: InfluxDB v2 over HTTP, line protocol, batched.
//! - [`MemorySink`]: keeps points in memory (dry runs and tests).
//! - [`CsvExporter`]: secondary local record of read speed and latency.

mod csv;
mod influx;
pub mod line_protocol;
mod memory;

pub use csv::CsvExporter;
pub use influx::InfluxSink;
pub use memory::MemorySink;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::metric::CanonicalMetric;
use crate::types::BucketName;

/// Result of an idempotent bucket create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created,
    AlreadyExists,
}

impl ProvisionOutcome {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AlreadyExists => "already exists",
        }
    }
}

/// Destination for canonical metrics.
#[async_trait]
pub trait MetricSink: Send {
    /// Ensure `bucket` exists. "Already exists" is success.
    async fn provision(&mut self, bucket: &BucketName) -> Result<ProvisionOutcome, SinkError>;

    /// Accept one metric. May buffer; a failed delivery keeps the point
    /// for the next attempt and returns a recoverable error.
    async fn write(&mut self, metric: &CanonicalMetric) -> Result<(), SinkError>;

    /// Deliver everything buffered.
    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Points accepted but not yet delivered.
    fn pending(&self) -> usize;

    fn name(&self) -> &str;
}

#[async_trait]
impl<S: MetricSink + ?Sized> MetricSink for Box<S> {
    async fn provision(&mut self, bucket: &BucketName) -> Result<ProvisionOutcome, SinkError> {
        (**self).provision(bucket).await
    }

    async fn write(&mut self, metric: &CanonicalMetric) -> Result<(), SinkError> {
        (**self).write(metric).await
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush().await
    }

    fn pending(&self) -> usize {
        (**self).pending()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
