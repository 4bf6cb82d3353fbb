// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Metric normalizer.
//!
//! Maps one [`RawRecord`] onto one [`CanonicalMetric`]. Two layouts are
//! understood:
//!
//! - **Structured** (`--output-format=json`): a `jobs` list holding exactly
//!   one job with `read` and `write` sections. Latency units are taken from
//!   the key suffix (`clat_ns`, `clat_us`, or bare `clat` in microseconds).
//! - **Flat** (`--minimal`, terse version 3): a `;`-separated line read at
//!   fixed offsets. Latencies are microseconds.
//!
//! All latencies are emitted in milliseconds, bandwidth in MB/s. Block size
//! and IOPS share are derived here rather than read from the record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::NormalizeError;
use crate::framer::RawRecord;
use crate::metric::{fields, CanonicalMetric, UNKNOWN_HOST};
use crate::types::RunId;

/// The only terse layout version with known offsets.
const TERSE_VERSION: &str = "3";

/// Highest terse offset read, plus one.
const TERSE_MIN_FIELDS: usize = 99;

/// Completion latency percentiles forwarded to the sink.
const PERCENTILES: [(f64, &str); 3] = [(50.0, "p50"), (95.0, "p95"), (99.0, "p99")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

impl Direction {
    const fn key(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Read => "Read",
            Self::Write => "Write",
        }
    }
}

/// Latency summary in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LatencyStats {
    min: f64,
    max: f64,
    mean: f64,
    deviation: f64,
}

/// Everything extracted for one direction, already in canonical units.
#[derive(Debug, Clone, PartialEq)]
struct DirectionStats {
    iops: f64,
    bw_kib: f64,
    total_io_kib: Option<f64>,
    bw_share_pct: Option<f64>,
    submission: Option<LatencyStats>,
    completion: LatencyStats,
    total: Option<LatencyStats>,
    completion_percentiles: Vec<(&'static str, f64)>,
}

/// Stateless record-to-metric mapper. One per pipeline.
#[derive(Debug, Clone)]
pub struct MetricNormalizer {
    host_fallback: String,
}

impl MetricNormalizer {
    /// `host_tag` is used for records that do not name their host.
    pub fn new(host_tag: Option<String>) -> Self {
        let host_fallback = host_tag
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_HOST.to_string());
        Self { host_fallback }
    }

    pub fn normalize(
        &self,
        record: &RawRecord,
        captured_at: DateTime<Utc>,
    ) -> Result<CanonicalMetric, NormalizeError> {
        match record {
            RawRecord::Structured(value) => self.normalize_structured(value, captured_at),
            RawRecord::Flat(line) => self.normalize_flat(line, captured_at),
        }
    }

    fn normalize_structured(
        &self,
        value: &Value,
        captured_at: DateTime<Utc>,
    ) -> Result<CanonicalMetric, NormalizeError> {
        let jobs = value
            .get("jobs")
            .and_then(Value::as_array)
            .ok_or_else(|| NormalizeError::mismatch("jobs", "record has no jobs list"))?;

        let job = match jobs.as_slice() {
            [] => return Err(NormalizeError::mismatch("jobs", "jobs list is empty")),
            [job] => job,
            many => {
                return Err(NormalizeError::UnsupportedLayout {
                    reason: format!(
                        "record holds {} jobs; only single-job records are supported \
                         (use group_reporting)",
                        many.len()
                    ),
                })
            }
        };

        let run_id = job
            .get("jobname")
            .and_then(Value::as_str)
            .and_then(RunId::new)
            .ok_or_else(|| NormalizeError::mismatch("jobs[0].jobname", "missing or empty"))?;

        let host = job
            .get("hostname")
            .and_then(Value::as_str)
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(&self.host_fallback)
            .to_string();

        let read = structured_direction(job, Direction::Read)?;
        let write = structured_direction(job, Direction::Write)?;

        let mut out = BTreeMap::new();
        emit_direction(&mut out, Direction::Read, &read);
        emit_direction(&mut out, Direction::Write, &write);
        emit_derived(&mut out, &read, &write);

        if let Some(usr) = job.get("usr_cpu").and_then(Value::as_f64) {
            out.insert(fields::CPU_USER.to_string(), usr);
        }
        if let Some(sys) = job.get("sys_cpu").and_then(Value::as_f64) {
            out.insert(fields::CPU_SYSTEM.to_string(), sys);
        }
        if let Some(levels) = job.get("iodepth_level").and_then(Value::as_object) {
            for (bucket, name) in fields::IODEPTH_BUCKETS {
                if let Some(pct) = levels.get(bucket).and_then(Value::as_f64) {
                    out.insert(name.to_string(), pct);
                }
            }
        }

        CanonicalMetric::new(captured_at, run_id, host, out)
    }

    fn normalize_flat(
        &self,
        line: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<CanonicalMetric, NormalizeError> {
        let terse = TerseLine::parse(line)?;

        let run_id = RunId::new(terse.raw(2))
            .ok_or_else(|| NormalizeError::mismatch("terse[2] jobname", "empty job name"))?;

        let read = terse.direction(Direction::Read)?;
        let write = terse.direction(Direction::Write)?;

        let mut out = BTreeMap::new();
        emit_direction(&mut out, Direction::Read, &read);
        emit_direction(&mut out, Direction::Write, &write);
        emit_derived(&mut out, &read, &write);

        out.insert(fields::CPU_USER.to_string(), terse.num(87, "cpu user")?);
        out.insert(fields::CPU_SYSTEM.to_string(), terse.num(88, "cpu system")?);
        for (offset, (_, name)) in (92..).zip(fields::IODEPTH_BUCKETS) {
            out.insert(name.to_string(), terse.num(offset, name)?);
        }

        CanonicalMetric::new(captured_at, run_id, self.host_fallback.clone(), out)
    }
}

fn structured_direction(job: &Value, dir: Direction) -> Result<DirectionStats, NormalizeError> {
    let path = format!("jobs[0].{}", dir.key());
    let section = job
        .get(dir.key())
        .and_then(Value::as_object)
        .ok_or_else(|| NormalizeError::mismatch(&path, "missing section"))?;

    let (completion, percentile_map) = structured_latency(section, "clat", &path)?
        .ok_or_else(|| {
            NormalizeError::mismatch(
                format!("{}.clat", path),
                "no completion latency (clat_ns, clat_us or clat)",
            )
        })?;

    let completion_percentiles = match percentile_map {
        Some((map, divisor)) => structured_percentiles(map, divisor, &path)?,
        None => Vec::new(),
    };

    Ok(DirectionStats {
        iops: required_number(section, "iops", &path)?,
        bw_kib: required_number(section, "bw", &path)?,
        total_io_kib: section.get("io_kbytes").and_then(Value::as_f64),
        bw_share_pct: section.get("bw_agg").and_then(Value::as_f64),
        submission: structured_latency(section, "slat", &path)?.map(|(stats, _)| stats),
        completion,
        total: structured_latency(section, "lat", &path)?.map(|(stats, _)| stats),
        completion_percentiles,
    })
}

type PercentileSource<'a> = Option<(&'a Map<String, Value>, f64)>;

/// Find a latency group by name, reading its unit from the key suffix.
fn structured_latency<'a>(
    section: &'a Map<String, Value>,
    name: &str,
    path: &str,
) -> Result<Option<(LatencyStats, PercentileSource<'a>)>, NormalizeError> {
    const UNITS: [(&str, f64); 3] = [("_ns", 1_000_000.0), ("_us", 1_000.0), ("", 1_000.0)];

    for (suffix, divisor) in UNITS {
        let key = format!("{}{}", name, suffix);
        let Some(group) = section.get(&key) else {
            continue;
        };

        let group_path = format!("{}.{}", path, key);
        let group = group
            .as_object()
            .ok_or_else(|| NormalizeError::mismatch(&group_path, "latency group is not an object"))?;

        let stats = LatencyStats {
            min: required_number(group, "min", &group_path)? / divisor,
            max: required_number(group, "max", &group_path)? / divisor,
            mean: required_number(group, "mean", &group_path)? / divisor,
            deviation: required_number(group, "stddev", &group_path)? / divisor,
        };
        let percentiles = group
            .get("percentile")
            .and_then(Value::as_object)
            .map(|map| (map, divisor));

        return Ok(Some((stats, percentiles)));
    }

    Ok(None)
}

fn structured_percentiles(
    map: &Map<String, Value>,
    divisor: f64,
    path: &str,
) -> Result<Vec<(&'static str, f64)>, NormalizeError> {
    let mut found = Vec::new();
    for (key, value) in map {
        let Ok(pct) = key.parse::<f64>() else {
            return Err(NormalizeError::mismatch(
                format!("{}.clat.percentile", path),
                format!("percentile key '{}' is not a number", key),
            ));
        };
        if let Some((_, label)) = PERCENTILES.iter().find(|(p, _)| *p == pct) {
            let latency = value.as_f64().ok_or_else(|| {
                NormalizeError::mismatch(
                    format!("{}.clat.percentile.{}", path, key),
                    "not a number",
                )
            })?;
            found.push((*label, latency / divisor));
        }
    }
    found.sort_by_key(|(label, _)| *label);
    Ok(found)
}

fn required_number(obj: &Map<String, Value>, key: &str, path: &str) -> Result<f64, NormalizeError> {
    match obj.get(key) {
        Some(v) => v.as_f64().ok_or_else(|| {
            NormalizeError::mismatch(format!("{}.{}", path, key), format!("not a number: {}", v))
        }),
        None => Err(NormalizeError::mismatch(
            format!("{}.{}", path, key),
            "missing",
        )),
    }
}

/// A terse line split into fields, validated for version and length.
struct TerseLine<'a> {
    parts: Vec<&'a str>,
}

impl<'a> TerseLine<'a> {
    fn parse(line: &'a str) -> Result<Self, NormalizeError> {
        // Anything after the first comma is not part of the positional record.
        let record = line.split(',').next().unwrap_or_default();
        let parts: Vec<&str> = record.split(';').collect();

        let version = parts[0].trim();
        if version != TERSE_VERSION {
            return Err(NormalizeError::UnsupportedLayout {
                reason: format!(
                    "terse version '{}' (only version {} offsets are known)",
                    version, TERSE_VERSION
                ),
            });
        }

        if parts.len() < TERSE_MIN_FIELDS {
            return Err(NormalizeError::mismatch(
                "terse",
                format!(
                    "{} fields, at least {} required",
                    parts.len(),
                    TERSE_MIN_FIELDS
                ),
            ));
        }

        Ok(Self { parts })
    }

    fn raw(&self, offset: usize) -> &'a str {
        self.parts[offset].trim()
    }

    fn num(&self, offset: usize, name: &str) -> Result<f64, NormalizeError> {
        let raw = self.raw(offset);
        raw.trim_end_matches('%').parse::<f64>().map_err(|_| {
            NormalizeError::mismatch(
                format!("terse[{}] {}", offset, name),
                format!("not a number: '{}'", raw),
            )
        })
    }

    /// min/max/mean/deviation at four consecutive offsets, microseconds.
    fn latency(&self, start: usize, name: &str) -> Result<LatencyStats, NormalizeError> {
        Ok(LatencyStats {
            min: self.num(start, name)? / 1_000.0,
            max: self.num(start + 1, name)? / 1_000.0,
            mean: self.num(start + 2, name)? / 1_000.0,
            deviation: self.num(start + 3, name)? / 1_000.0,
        })
    }

    /// Twenty `P%=V` entries starting at `start`.
    fn percentiles(&self, start: usize) -> Result<Vec<(&'static str, f64)>, NormalizeError> {
        let mut found = Vec::new();
        for offset in start..start + 20 {
            let raw = self.raw(offset);
            let parsed = raw
                .split_once("%=")
                .and_then(|(p, v)| Some((p.parse::<f64>().ok()?, v.parse::<f64>().ok()?)));
            let Some((pct, usec)) = parsed else {
                return Err(NormalizeError::mismatch(
                    format!("terse[{}] clat percentile", offset),
                    format!("expected P%=V, got '{}'", raw),
                ));
            };
            if let Some((_, label)) = PERCENTILES.iter().find(|(p, _)| *p == pct) {
                found.push((*label, usec / 1_000.0));
            }
        }
        found.sort_by_key(|(label, _)| *label);
        found.dedup_by_key(|(label, _)| *label);
        Ok(found)
    }

    fn direction(&self, dir: Direction) -> Result<DirectionStats, NormalizeError> {
        // Write offsets mirror read offsets shifted by 41.
        let base = match dir {
            Direction::Read => 0,
            Direction::Write => 41,
        };

        Ok(DirectionStats {
            total_io_kib: Some(self.num(base + 5, "total io")?),
            bw_kib: self.num(base + 6, "bandwidth")?,
            iops: self.num(base + 7, "iops")?,
            submission: Some(self.latency(base + 9, "submission latency")?),
            completion: self.latency(base + 13, "completion latency")?,
            completion_percentiles: self.percentiles(base + 17)?,
            total: Some(self.latency(base + 37, "total latency")?),
            bw_share_pct: Some(self.num(base + 43, "bandwidth share")?),
        })
    }
}

fn emit_direction(out: &mut BTreeMap<String, f64>, dir: Direction, stats: &DirectionStats) {
    let d = dir.label();

    out.insert(format!("{}_IOPS", d), stats.iops);
    out.insert(format!("{}_bandwidth_(MB/s)", d), stats.bw_kib / 1024.0);

    if let Some(total) = stats.total_io_kib {
        out.insert(format!("{}_Total_I/O_(MB)", d), total / 1024.0);
    }
    if let Some(pct) = stats.bw_share_pct {
        out.insert(format!("{}_Percentage", d), pct);
    }

    let groups = [
        ("Submission", stats.submission),
        ("Completion", Some(stats.completion)),
        ("Total", stats.total),
    ];
    for (group, latency) in groups {
        let Some(l) = latency else { continue };
        out.insert(format!("{}_Latency_{}_min", d, group), l.min);
        out.insert(format!("{}_Latency_{}_max", d, group), l.max);
        out.insert(format!("{}_Latency_{}_mean", d, group), l.mean);
        out.insert(format!("{}_Latency_{}_deviation", d, group), l.deviation);
    }

    for (label, value) in &stats.completion_percentiles {
        out.insert(format!("{}_Latency_Completion_{}", d, label), *value);
    }
}

fn emit_derived(out: &mut BTreeMap<String, f64>, read: &DirectionStats, write: &DirectionStats) {
    let total_iops = read.iops + write.iops;

    for (dir, stats) in [(Direction::Read, read), (Direction::Write, write)] {
        let d = dir.label();
        out.insert(
            format!("{}_Block_Size_(B)", d),
            block_size_bytes(stats.bw_kib, stats.iops),
        );
        out.insert(
            format!("{}_IOPS_Percentage", d),
            share(stats.iops, total_iops),
        );
    }
}

/// Average IO size in bytes from KiB/s and IOPS, two decimals; 0 when idle.
pub fn block_size_bytes(bw_kib: f64, iops: f64) -> f64 {
    if iops == 0.0 {
        return 0.0;
    }
    round2(bw_kib / iops * 1024.0)
}

fn share(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        part / total
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
