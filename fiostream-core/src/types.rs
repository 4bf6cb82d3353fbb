// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Bucket and organization names are checked once at configuration time so
//! the sink never builds a request from an empty or oversized name.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// InfluxDB rejects bucket names longer than this.
const MAX_BUCKET_NAME_LEN: usize = 255;

/// Validated bucket name.
/// Must be non-empty, at most 255 bytes, and must not start with `_`
/// (reserved for system buckets).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketName(String);

impl BucketName {
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "bucket",
                value: name,
                reason: "Bucket name cannot be empty".to_string(),
            });
        }

        if name.len() > MAX_BUCKET_NAME_LEN {
            return Err(HardValidationError::InvalidFieldValue {
                field: "bucket",
                value: name.clone(),
                reason: format!(
                    "Bucket name too long: {} bytes (max {})",
                    name.len(),
                    MAX_BUCKET_NAME_LEN
                ),
            });
        }

        if name.starts_with('_') {
            return Err(HardValidationError::InvalidFieldValue {
                field: "bucket",
                value: name,
                reason: "Bucket names starting with '_' are reserved".to_string(),
            });
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for BucketName {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BucketName> for String {
    fn from(name: BucketName) -> Self {
        name.0
    }
}

/// Validated organization name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrgName(String);

impl OrgName {
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "org",
                value: name,
                reason: "Organization name cannot be empty".to_string(),
            });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for OrgName {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OrgName> for String {
    fn from(name: OrgName) -> Self {
        name.0
    }
}

/// Benchmark run identifier (the fio job name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Create a run id. Returns `None` for blank names.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
