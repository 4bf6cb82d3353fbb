// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! The canonical metric delivered to sinks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::NormalizeError;
use crate::types::RunId;

/// Host tag used when neither the record nor the configuration names one.
pub const UNKNOWN_HOST: &str = "unknown";

/// Field names shared by both record layouts.
pub mod fields {
    pub const READ_BANDWIDTH_MBS: &str = "Read_bandwidth_(MB/s)";
    pub const READ_COMPLETION_MEAN_MS: &str = "Read_Latency_Completion_mean";
    pub const CPU_USER: &str = "CPU User";
    pub const CPU_SYSTEM: &str = "CPU System";

    /// fio io depth buckets and their field names.
    pub const IODEPTH_BUCKETS: [(&str, &str); 7] = [
        ("1", "IOdepthdist01"),
        ("2", "IOdepthdist02"),
        ("4", "IOdepthdist04"),
        ("8", "IOdepthdist08"),
        ("16", "IOdepthdist16"),
        ("32", "IOdepthdist32"),
        (">=64", "IOdepthdist64"),
    ];
}

/// One normalized status sample.
///
/// `fields` is never empty and every value is finite; both are checked at
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalMetric {
    timestamp: DateTime<Utc>,
    run_id: RunId,
    host: String,
    fields: BTreeMap<String, f64>,
}

impl CanonicalMetric {
    pub fn new(
        timestamp: DateTime<Utc>,
        run_id: RunId,
        host: impl Into<String>,
        fields: BTreeMap<String, f64>,
    ) -> Result<Self, NormalizeError> {
        if fields.is_empty() {
            return Err(NormalizeError::mismatch(
                "fields",
                "record yielded no numeric fields",
            ));
        }

        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(NormalizeError::mismatch(
                name.clone(),
                format!("non-finite value {}", value),
            ));
        }

        Ok(Self {
            timestamp,
            run_id,
            host: host.into(),
            fields,
        })
    }

    /// Capture time of the source record.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn fields(&self) -> &BTreeMap<String, f64> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }
}
