// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

use std::collections::HashSet;

use async_trait::async_trait;

use super::{MetricSink, ProvisionOutcome};
use crate::error::SinkError;
use crate::metric::CanonicalMetric;
use crate::types::BucketName;

/// In-memory sink. Every write is delivered immediately.
///
/// Used by `--dry-run` and by tests that need to inspect what would have
/// been written.
#[derive(Debug, Default)]
pub struct MemorySink {
    buckets: HashSet<String>,
    points: Vec<CanonicalMetric>,
    flushes: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered metrics, in write order.
    pub fn points(&self) -> &[CanonicalMetric] {
        &self.points
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

#[async_trait]
impl MetricSink for MemorySink {
    async fn provision(&mut self, bucket: &BucketName) -> Result<ProvisionOutcome, SinkError> {
        if self.buckets.insert(bucket.as_str().to_string()) {
            Ok(ProvisionOutcome::Created)
        } else {
            Ok(ProvisionOutcome::AlreadyExists)
        }
    }

    async fn write(&mut self, metric: &CanonicalMetric) -> Result<(), SinkError> {
        self.points.push(metric.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.flushes += 1;
        Ok(())
    }

    fn pending(&self) -> usize {
        0
    }

    fn name(&self) -> &str {
        "memory"
    }
}
