// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! InfluxDB v2 sink.
//!
//! Points are encoded to line protocol as they arrive and kept in a pending
//! queue. The queue is sent when it reaches `batch_size` and on `flush`.
//! A failed send leaves the queue intact, so the next write retries it in
//! order; once the queue exceeds `max_pending_points` the oldest points
//! are dropped and reported.

use std::collections::VecDeque;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::{json, Value};

use super::line_protocol;
use super::{MetricSink, ProvisionOutcome};
use crate::config::SinkConfig;
use crate::error::{truncate_diagnostic, SinkError};
use crate::metric::CanonicalMetric;
use crate::types::{BucketName, OrgName};

/// Longest response body carried into an error message.
const MAX_BODY_DIAGNOSTIC: usize = 512;

pub struct InfluxSink {
    name: String,
    client: reqwest::Client,
    base: String,
    org: OrgName,
    bucket: BucketName,
    token: String,
    batch_size: usize,
    max_pending: usize,
    pending: VecDeque<String>,
    delivered: u64,
}

impl InfluxSink {
    /// Build a sink from validated configuration. Requires a token.
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(config.write_timeout)
            .build()
            .map_err(|e| SinkError::Client {
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Self::with_client(config, client)
    }

    /// Create with an injected reqwest client.
    pub fn with_client(config: &SinkConfig, client: reqwest::Client) -> Result<Self, SinkError> {
        let token = config.token.clone().ok_or_else(|| SinkError::Client {
            reason: "no API token configured (sink.token or FIOSTREAM_TOKEN)".to_string(),
        })?;

        Ok(Self {
            name: format!("influxdb({})", config.url),
            client,
            base: config.url.as_str().trim_end_matches('/').to_string(),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token,
            batch_size: config.batch_size,
            max_pending: config.max_pending_points,
            pending: VecDeque::new(),
            delivered: 0,
        })
    }

    /// Points acknowledged by the server so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, SinkError> {
        let raw = format!("{}{}", self.base, path);
        Url::parse_with_params(&raw, params).map_err(|e| SinkError::Client {
            reason: format!("invalid endpoint {}: {}", raw, e),
        })
    }

    fn auth(&self) -> String {
        format!("Token {}", self.token)
    }

    async fn lookup_org_id(&self, bucket: &BucketName) -> Result<String, SinkError> {
        let provision_err = |reason: String| SinkError::Provision {
            bucket: bucket.to_string(),
            reason,
        };

        let url = self.endpoint("/api/v2/orgs", &[("org", self.org.as_str())])?;
        let response = self
            .client
            .get(url)
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| provision_err(format!("organization lookup failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(provision_err(format!(
                "organization lookup returned {}: {}",
                status,
                truncate_diagnostic(&body, MAX_BODY_DIAGNOSTIC)
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| provision_err(format!("unreadable organization list: {}", e)))?;

        body.get("orgs")
            .and_then(Value::as_array)
            .and_then(|orgs| {
                orgs.iter()
                    .find(|o| o.get("name").and_then(Value::as_str) == Some(self.org.as_str()))
            })
            .and_then(|o| o.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| provision_err(format!("organization '{}' not found", self.org)))
    }

    /// Send every pending point in one request. On success the queue is
    /// emptied; on failure it is left untouched.
    async fn send_pending(&mut self) -> Result<(), String> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut body = String::new();
        for line in &self.pending {
            body.push_str(line);
            body.push('\n');
        }

        let url = self
            .endpoint(
                "/api/v2/write",
                &[
                    ("org", self.org.as_str()),
                    ("bucket", self.bucket.as_str()),
                    ("precision", "ns"),
                ],
            )
            .map_err(|e| e.to_string())?;

        let response = self
            .client
            .post(url)
            .header("Authorization", self.auth())
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| format!("write request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!(
                "write returned {}: {}",
                status,
                truncate_diagnostic(&text, MAX_BODY_DIAGNOSTIC)
            ));
        }

        let sent = self.pending.len();
        self.pending.clear();
        self.delivered += sent as u64;

        tracing::debug!(sink = %self.name, points = sent, "Delivered batch");
        Ok(())
    }
}

/// Whether a failed bucket create means the bucket is already there.
/// Only an explicit "already exists" message or a 409 with code `conflict`
/// qualifies; every other rejection is a real failure.
fn bucket_exists(status: StatusCode, body: &str) -> bool {
    if body.contains("already exists") {
        return true;
    }
    status == StatusCode::CONFLICT
        && serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("code").and_then(Value::as_str).map(|c| c == "conflict"))
            .unwrap_or(false)
}

#[async_trait]
impl MetricSink for InfluxSink {
    async fn provision(&mut self, bucket: &BucketName) -> Result<ProvisionOutcome, SinkError> {
        let org_id = self.lookup_org_id(bucket).await?;

        let url = self.endpoint("/api/v2/buckets", &[])?;
        let response = self
            .client
            .post(url)
            .header("Authorization", self.auth())
            .json(&json!({
                "name": bucket.as_str(),
                "orgID": org_id,
                "retentionRules": [],
            }))
            .send()
            .await
            .map_err(|e| SinkError::Provision {
                bucket: bucket.to_string(),
                reason: format!("bucket create failed: {}", e),
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(bucket = %bucket, org = %self.org, "Bucket created");
            return Ok(ProvisionOutcome::Created);
        }

        let body = response.text().await.unwrap_or_default();
        if bucket_exists(status, &body) {
            tracing::info!(bucket = %bucket, org = %self.org, "Bucket already exists");
            return Ok(ProvisionOutcome::AlreadyExists);
        }

        Err(SinkError::Provision {
            bucket: bucket.to_string(),
            reason: format!(
                "bucket create returned {}: {}",
                status,
                truncate_diagnostic(&body, MAX_BODY_DIAGNOSTIC)
            ),
        })
    }

    async fn write(&mut self, metric: &CanonicalMetric) -> Result<(), SinkError> {
        self.pending.push_back(line_protocol::encode(metric));

        if self.pending.len() < self.batch_size {
            return Ok(());
        }

        let Err(reason) = self.send_pending().await else {
            return Ok(());
        };

        if self.pending.len() > self.max_pending {
            let dropped = self.pending.len() - self.max_pending;
            self.pending.drain(..dropped);
            return Err(SinkError::Dropped { dropped, reason });
        }

        Err(SinkError::Write {
            pending: self.pending.len(),
            reason,
        })
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        let points = self.pending.len();
        self.send_pending()
            .await
            .map_err(|reason| SinkError::Flush { points, reason })
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
