// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! InfluxDB line protocol encoding.
//!
//! `measurement,tag=value,... field=value,... timestamp_ns`

use std::fmt::Write;

use crate::metric::CanonicalMetric;

/// Measurement every fio point is written under.
pub const MEASUREMENT: &str = "FIO";

pub const TAG_RUN_ID: &str = "runId";
pub const TAG_HOSTNAME: &str = "hostname";

/// Escape a measurement name (commas and spaces).
pub fn escape_measurement(name: &str) -> String {
    escape(name, &[',', ' '])
}

/// Escape a tag key, tag value or field key (commas, equals signs, spaces).
pub fn escape_key(key: &str) -> String {
    escape(key, &[',', '=', ' '])
}

/// Line protocol has no escape for line breaks; they become escaped spaces
/// so a point can never span two lines.
fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '\n' || c == '\r' {
            out.push_str("\\ ");
            continue;
        }
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Encode one metric as a single line (no trailing newline).
pub fn encode(metric: &CanonicalMetric) -> String {
    let mut line = String::with_capacity(64 + metric.fields().len() * 40);

    line.push_str(&escape_measurement(MEASUREMENT));
    let _ = write!(
        line,
        ",{}={},{}={} ",
        TAG_HOSTNAME,
        escape_key(metric.host()),
        TAG_RUN_ID,
        escape_key(metric.run_id().as_str())
    );

    for (i, (name, value)) in metric.fields().iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        // Floats always carry a decimal point so integral values are not
        // mistaken for integer fields.
        let _ = write!(line, "{}={:?}", escape_key(name), value);
    }

    let ts = metric
        .timestamp()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| metric.timestamp().timestamp_micros().saturating_mul(1000));
    let _ = write!(line, " {}", ts);

    line
}
