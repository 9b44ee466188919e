//! Snapshot assembly: fetch, pool disambiguation, parse, staleness tracking.
//!
//! A snapshot is the JSON-friendly view of one poll of the metrics endpoint.
//! The builder owns the polling state (how long the endpoint has been serving
//! nothing) so consecutive snapshots can be honest about data age.

use crate::error::Error;
use crate::exposition;
use crate::fetch::FetchClient;
use chrono::{DateTime, Local};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Endpoint path serving the Prometheus exposition body.
pub const METRICS_PATH: &str = "api/v1/metrics";

/// Endpoint path for the liveness probe.
pub const PING_PATH: &str = "api/system/ping";

/// Family-name fragment shared by every connection-pool metric.
pub const POOL_FAMILY_MARKER: &str = "app_http_connections";

/// Timestamp format for the dashboard header.
pub const CAPTURED_AT_FORMAT: &str = "%Y.%m.%d %H:%M:%S";

/// Exposition lines per pool block; one block describes one pool.
pub const POOL_BLOCK_LINES: usize = 16;

/// Metric family type as declared by `# TYPE` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricKind {
    Counter,
    Gauge,
    Untyped,
    Histogram,
    Summary,
}

/// One sample row within a family.
///
/// The value is kept as the exact string from the wire so high-precision
/// readings survive the JSON round trip untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub labels: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp_ms: Option<i64>,

    pub value: String,
}

/// One metric family: name, help text, type, and its samples in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(rename = "metrics")]
    pub samples: Vec<SampleRecord>,
}

/// Parsed result of one poll, stamped with its effective capture time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub families: Vec<MetricFamily>,
    pub captured_at: DateTime<Local>,
    pub poll_offset_seconds: u64,
}

impl Snapshot {
    /// Timestamp shown in the dashboard header.
    pub fn captured_at_display(&self) -> String {
        self.captured_at.format(CAPTURED_AT_FORMAT).to_string()
    }
}

/// Prefixes repeated connection-pool family names so each pool block keeps a
/// distinct identity through parsing.
///
/// The endpoint emits one block of [`POOL_BLOCK_LINES`] lines per pool, all
/// reusing the same family names. Every pool line gets a `p<N>` prefix, with
/// `N` advancing when a block boundary is crossed. Text without pool families
/// passes through unchanged.
pub fn disambiguate_pool_families(text: &str) -> String {
    if !text.contains(POOL_FAMILY_MARKER) {
        return text.to_string();
    }

    let mut pool = 0usize;
    let mut lines_in_block = 0usize;

    let rewritten: Vec<String> = text
        .split('\n')
        .map(|line| {
            if line.contains(POOL_FAMILY_MARKER) {
                if lines_in_block == POOL_BLOCK_LINES {
                    lines_in_block = 0;
                    pool += 1;
                }
                lines_in_block += 1;
                line.replace(
                    POOL_FAMILY_MARKER,
                    &format!("p{pool}{POOL_FAMILY_MARKER}"),
                )
            } else {
                line.to_string()
            }
        })
        .collect();

    rewritten.join("\n")
}

/// Fetches and assembles [`Snapshot`]s from one server target.
pub struct MetricsSnapshotBuilder {
    client: FetchClient,
    base_url: String,
    poll_interval_seconds: u64,
    offset_seconds: u64,
}

impl MetricsSnapshotBuilder {
    pub fn new(client: FetchClient, base_url: &str, poll_interval_seconds: u64) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval_seconds,
            offset_seconds: 0,
        }
    }

    /// Probes the server liveness endpoint; anything but an exact "OK" body
    /// is a failed health check.
    pub async fn ping(&self) -> Result<(), Error> {
        let url = format!("{}/{}", self.base_url, PING_PATH);
        let outcome = self.client.fetch(Method::GET, &url, &[]).await?;
        let body = String::from_utf8_lossy(&outcome.body);

        if body != "OK" {
            return Err(Error::HealthCheck {
                url,
                detail: format!("expected body \"OK\", got \"{}\"", body),
            });
        }

        Ok(())
    }

    /// Returns the exposition body exactly as served.
    pub async fn raw_bytes(&self) -> Result<Vec<u8>, Error> {
        let url = format!("{}/{}", self.base_url, METRICS_PATH);
        let outcome = self.client.fetch(Method::GET, &url, &[]).await?;
        Ok(outcome.body)
    }

    /// Returns the parsed families as a JSON document.
    pub async fn families_json(&self, pretty: bool) -> Result<String, Error> {
        let raw = self.raw_bytes().await?;
        let text = String::from_utf8_lossy(&raw);
        let rewritten = disambiguate_pool_families(&text);
        let families = exposition::parse(&rewritten);

        let encoded = if pretty {
            serde_json::to_string_pretty(&families)?
        } else {
            serde_json::to_string(&families)?
        };
        Ok(encoded)
    }

    /// Polls the endpoint and assembles a snapshot.
    ///
    /// When the endpoint serves an empty or fully unparsable body, the
    /// snapshot is backdated by the accumulated gap (one poll interval per
    /// consecutive miss) so the dashboard shows how old its data is. The
    /// first non-empty poll resets the gap.
    pub async fn build_snapshot(&mut self) -> Result<Snapshot, Error> {
        let raw = self.raw_bytes().await?;
        let text = String::from_utf8_lossy(&raw);
        let rewritten = disambiguate_pool_families(&text);

        let mut families = Vec::new();
        let mut rx = exposition::parse_streaming(rewritten);
        while let Some(family) = rx.recv().await {
            families.push(family);
        }

        // Round-trip through the JSON schema so the dashboard and the
        // metrics command observe identical data.
        let encoded = serde_json::to_string(&families)?;
        let families: Vec<MetricFamily> = serde_json::from_str(&encoded)?;

        let now = Local::now();
        if families.is_empty() {
            self.offset_seconds += self.poll_interval_seconds;
            let captured_at = now - chrono::Duration::seconds(self.offset_seconds as i64);
            warn!(
                "no metrics parsed, showing data {} seconds old",
                self.offset_seconds
            );
            return Ok(Snapshot {
                families,
                captured_at,
                poll_offset_seconds: self.offset_seconds,
            });
        }

        self.offset_seconds = 0;
        Ok(Snapshot {
            families,
            captured_at: now,
            poll_offset_seconds: 0,
        })
    }
}
