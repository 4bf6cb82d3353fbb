// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for fiostream.
//!
//! Every failure is an explicit enum variant. Recoverable errors (a single
//! bad record, a single failed delivery) and fatal errors (process failure,
//! frame overflow, bucket provisioning) share one top-level type so the
//! pipeline driver decides with a `match`, not a caught exception.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for fiostream.
#[derive(Debug, Error)]
pub enum FioStreamError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Pipeline State Machine
    // =========================================================================
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(#[from] StateTransitionError),

    // =========================================================================
    // Benchmark Process
    // =========================================================================
    #[error("Benchmark process error: {0}")]
    Process(#[from] ProcessError),

    // =========================================================================
    // Record Framing
    // =========================================================================
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    // =========================================================================
    // Metric Normalization
    // =========================================================================
    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    // =========================================================================
    // Sink
    // =========================================================================
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl FioStreamError {
    /// Whether the pipeline may skip the offending record and keep streaming.
    ///
    /// Process failures, frame overflow and provisioning failures are fatal.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Normalize(_) => true,
            Self::Frame(e) => e.is_recoverable(),
            Self::Sink(e) => e.is_recoverable(),
            _ => false,
        }
    }
}

/// Configuration errors that prevent startup.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Job file does not exist: {path}")]
    JobFileNotFound { path: PathBuf },
}

/// Pipeline state transition errors.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition pipeline from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Pipeline is in terminal state: {state}")]
    TerminalState { state: &'static str },
}

/// Errors raised by the benchmark process boundary.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Benchmark exited with {status}: {diagnostics}")]
    Failure { status: String, diagnostics: String },

    #[error("Failed to read benchmark output: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to signal benchmark process {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    #[error("Benchmark source used before start")]
    NotStarted,
}

/// Errors raised by the record framer.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error(
        "Frame buffer exceeded {limit} bytes without a complete record \
         (last decode: {last_reason}); buffer starts with: {preview}"
    )]
    Overflow {
        limit: usize,
        last_reason: String,
        preview: String,
    },

    #[error("Stream ended inside a record ({buffered} bytes buffered): {preview}")]
    Truncated { buffered: usize, preview: String },
}

impl FrameError {
    /// A truncated trailing record is skipped; overflow is fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}

/// Errors raised while mapping a decoded record to a canonical metric.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Schema mismatch at {field}: {reason}")]
    SchemaMismatch { field: String, reason: String },

    #[error("Unsupported record layout: {reason}")]
    UnsupportedLayout { reason: String },
}

impl NormalizeError {
    pub(crate) fn mismatch(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Sink errors. Provisioning and final flush failures are fatal; a failed
/// batch is retried on the next write.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to provision bucket '{bucket}': {reason}")]
    Provision { bucket: String, reason: String },

    #[error("Failed to deliver {pending} pending points (kept for retry): {reason}")]
    Write { pending: usize, reason: String },

    #[error("Dropped {dropped} points after repeated delivery failures: {reason}")]
    Dropped { dropped: usize, reason: String },

    #[error("Failed to flush {points} points on drain: {reason}")]
    Flush { points: usize, reason: String },

    #[error("Sink client error: {reason}")]
    Client { reason: String },

    #[error("Secondary sink IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::Dropped { .. })
    }

    /// Points that will never reach the sink because of this error.
    pub fn lost_points(&self) -> usize {
        match self {
            Self::Dropped { dropped, .. } => *dropped,
            Self::Flush { points, .. } => *points,
            _ => 0,
        }
    }
}

/// Result type alias using FioStreamError.
pub type FioStreamResult<T> = Result<T, FioStreamError>;

/// Truncate diagnostic text to at most `max` bytes on a char boundary.
pub(crate) fn truncate_diagnostic(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes total)", &text[..end], text.len())
}
