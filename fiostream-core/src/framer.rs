// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Streaming record framer.
//!
//! fio emits its periodic status reports back-to-back on stdout with no
//! framing beyond the structure of the records themselves. The framer
//! accumulates raw chunks (of any size, on any alignment) and hands out one
//! complete record at a time.
//!
//! Two record formats are supported:
//!
//! - **Json**: self-describing JSON objects. A trial decode is attempted only
//!   when the buffer starts with `{` and a `}` has arrived since the last
//!   attempt; the decode result is an explicit [`DecodeOutcome`], so
//!   "incomplete" and "malformed" are branches rather than caught errors.
//! - **Terse**: one `--minimal` record per `\n`-terminated line.
//!
//! Both formats are bounded by `max_bytes`; a record that never resolves
//! within the bound is a [`FrameError::Overflow`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{truncate_diagnostic, FrameError};

/// Record-open marker for the JSON format.
const RECORD_OPEN: u8 = b'{';

/// Record-close marker for the JSON format.
const RECORD_CLOSE: u8 = b'}';

/// Bytes of buffer shown in overflow and truncation diagnostics.
const PREVIEW_BYTES: usize = 256;

/// Output format of the benchmark stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// `--output-format=json`
    #[default]
    Json,
    /// `--minimal` / `--output-format=terse`
    #[serde(alias = "minimal")]
    Terse,
}

impl RecordFormat {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Terse => "terse",
        }
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "terse" | "minimal" => Ok(Self::Terse),
            other => Err(format!(
                "unknown record format '{}' (expected json or terse)",
                other
            )),
        }
    }
}

/// One complete decoded record.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    /// A JSON status report.
    Structured(serde_json::Value),
    /// A terse (minimal) status line, without its terminator.
    Flat(String),
}

/// Result of one trial decode of the frame buffer.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// A full record was decoded from the first `consumed` bytes.
    Complete { record: RawRecord, consumed: usize },
    /// The buffer is a prefix of a record; more bytes are needed.
    Incomplete,
    /// The buffer cannot be decoded as-is. Not fatal: the framer keeps the
    /// bytes and the overflow bound decides when to give up.
    Malformed(String),
}

/// Trial-decode the first JSON value in `buf`.
pub fn decode_json(buf: &[u8]) -> DecodeOutcome {
    let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<serde_json::Value>();

    match stream.next() {
        Some(Ok(value)) => DecodeOutcome::Complete {
            consumed: stream.byte_offset(),
            record: RawRecord::Structured(value),
        },
        Some(Err(e)) if e.is_eof() => DecodeOutcome::Incomplete,
        Some(Err(e)) => DecodeOutcome::Malformed(e.to_string()),
        None => DecodeOutcome::Incomplete,
    }
}

/// Accumulates stream bytes and emits complete records in stream order.
#[derive(Debug)]
pub struct RecordFramer {
    format: RecordFormat,
    buffer: Vec<u8>,
    max_bytes: usize,
    /// Terse: offset up to which the buffer is known to hold no newline.
    scan_from: usize,
    last_reason: Option<String>,
    /// Overflow detected in a push that also completed records; reported
    /// on the next push or at finish.
    overflow: Option<FrameError>,
    discarded_bytes: u64,
    records_emitted: u64,
}

impl RecordFramer {
    pub fn new(format: RecordFormat, max_bytes: usize) -> Self {
        Self {
            format,
            buffer: Vec::new(),
            max_bytes,
            scan_from: 0,
            last_reason: None,
            overflow: None,
            discarded_bytes: 0,
            records_emitted: 0,
        }
    }

    pub fn format(&self) -> RecordFormat {
        self.format
    }

    /// Bytes currently held for the record in progress.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Non-record bytes dropped while looking for the start of a record.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_bytes
    }

    pub fn records_emitted(&self) -> u64 {
        self.records_emitted
    }

    /// Append one chunk and return every record it completed, in order.
    ///
    /// Records completed ahead of an overflow are still returned; the
    /// overflow is then reported by the next call to `push` or `finish`.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<RawRecord>, FrameError> {
        if let Some(err) = self.overflow.take() {
            return Err(err);
        }
        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        self.buffer.extend_from_slice(chunk);

        let records = match self.format {
            RecordFormat::Json => self.drain_json(chunk.contains(&RECORD_CLOSE)),
            RecordFormat::Terse => self.drain_lines(),
        };

        if let Err(err) = self.check_bound() {
            if records.is_empty() {
                return Err(err);
            }
            self.overflow = Some(err);
        }

        self.records_emitted += records.len() as u64;
        Ok(records)
    }

    /// Signal end of stream.
    ///
    /// A trailing terse line without a terminator is returned as a record.
    /// A partial JSON record is reported as [`FrameError::Truncated`].
    pub fn finish(&mut self) -> Result<Option<RawRecord>, FrameError> {
        if let Some(err) = self.overflow.take() {
            return Err(err);
        }

        let rest = std::mem::take(&mut self.buffer);
        self.scan_from = 0;

        let trimmed = rest.trim_ascii();
        if trimmed.is_empty() {
            return Ok(None);
        }

        match self.format {
            RecordFormat::Terse => {
                self.records_emitted += 1;
                Ok(Some(RawRecord::Flat(
                    String::from_utf8_lossy(trimmed).into_owned(),
                )))
            }
            RecordFormat::Json => Err(FrameError::Truncated {
                buffered: rest.len(),
                preview: preview(&rest),
            }),
        }
    }

    fn drain_json(&mut self, close_marker_arrived: bool) -> Vec<RawRecord> {
        let mut records = Vec::new();

        // A record can only complete once its closing brace has arrived.
        if !close_marker_arrived {
            self.skip_to_record_start();
            return records;
        }

        loop {
            self.skip_to_record_start();
            if self.buffer.is_empty() {
                break;
            }

            match decode_json(&self.buffer) {
                DecodeOutcome::Complete { record, consumed } => {
                    self.buffer.drain(..consumed);
                    self.last_reason = None;
                    records.push(record);
                }
                DecodeOutcome::Incomplete => {
                    tracing::trace!(buffered = self.buffer.len(), "Record incomplete");
                    self.last_reason = Some("incomplete record".to_string());
                    break;
                }
                DecodeOutcome::Malformed(reason) => {
                    tracing::debug!(
                        buffered = self.buffer.len(),
                        reason = %reason,
                        "Trial decode failed, retaining buffer"
                    );
                    self.last_reason = Some(reason);
                    break;
                }
            }
        }

        records
    }

    /// Drop anything ahead of the next record-open marker.
    fn skip_to_record_start(&mut self) {
        let start = self
            .buffer
            .iter()
            .position(|&b| b == RECORD_OPEN)
            .unwrap_or(self.buffer.len());

        if start == 0 {
            return;
        }

        let dropped = &self.buffer[..start];
        if !dropped.trim_ascii().is_empty() {
            tracing::debug!(
                bytes = start,
                text = %truncate_diagnostic(&String::from_utf8_lossy(dropped), 80),
                "Discarding bytes outside a record"
            );
            self.discarded_bytes += start as u64;
        }
        self.buffer.drain(..start);
    }

    fn drain_lines(&mut self) -> Vec<RawRecord> {
        let mut records = Vec::new();

        while let Some(offset) = self.buffer[self.scan_from..]
            .iter()
            .position(|&b| b == b'\n')
        {
            let end = self.scan_from + offset;
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            self.scan_from = 0;

            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            records.push(RawRecord::Flat(String::from_utf8_lossy(line).into_owned()));
        }

        self.scan_from = self.buffer.len();
        records
    }

    fn check_bound(&mut self) -> Result<(), FrameError> {
        if self.buffer.len() <= self.max_bytes {
            return Ok(());
        }

        let err = FrameError::Overflow {
            limit: self.max_bytes,
            last_reason: self
                .last_reason
                .clone()
                .unwrap_or_else(|| "no closing marker seen".to_string()),
            preview: preview(&self.buffer),
        };
        self.buffer.clear();
        self.scan_from = 0;
        Err(err)
    }
}

fn preview(bytes: &[u8]) -> String {
    truncate_diagnostic(&String::from_utf8_lossy(bytes), PREVIEW_BYTES)
}
