//! Tolerant Prometheus text-format parsing.
//!
//! Parsing is delegated to the prometheus-parse crate, which reduces sample
//! values to f64. The dashboard and the JSON output promise the exact value
//! strings from the wire, so this module pre-scans the body, queues the raw
//! value text of every line the library will accept, and re-attaches those
//! strings when grouping samples into families. The pre-scan applies the same
//! acceptance rules as the library so the queues never drift out of step.

use crate::snapshot::{MetricFamily, MetricKind, SampleRecord};
use ahash::AHashMap;
use once_cell::sync::Lazy;
use prometheus_parse::{Scrape, Value};
use regex::Regex;
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Bound on buffered families between the parse worker and its consumer.
pub const PARSE_CHANNEL_CAPACITY: usize = 1024;

// Same shape the parsing library matches sample lines against. No trailing
// anchor: junk after the timestamp column is tolerated.
static SAMPLE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>\w+)(\{(?P<labels>[^}]*)\})?\s+(?P<value>\S+)(\s+(?P<timestamp>\S+))?")
        .expect("sample line regex")
});

static TYPE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#\s+TYPE\s+(?P<name>\w+)\s+(?P<type>\w+)").expect("type line regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregated {
    Histogram,
    Summary,
}

/// Accepts the value vocabulary of the exposition format: decimal floats plus
/// case-insensitive nan/inf spellings.
fn parse_exposition_float(s: &str) -> Option<f64> {
    match s.to_lowercase().as_str() {
        "nan" => Some(f64::NAN),
        "+inf" | "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => s.parse::<f64>().ok(),
    }
}

fn format_exposition_value(v: f64) -> String {
    if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else if v.is_nan() {
        "NaN".to_string()
    } else if v == v.trunc() {
        format!("{v:.0}")
    } else {
        format!("{v}")
    }
}

fn extract_label(labels: &str, key: &str) -> Option<String> {
    for pair in labels.split(',') {
        let mut kv = pair.splitn(2, '=');
        let name = kv.next().unwrap_or("").trim();
        if name == key {
            let value = kv.next().unwrap_or("").trim().trim_matches('"');
            return Some(value.to_string());
        }
    }
    None
}

fn kind_of(value: &Value) -> MetricKind {
    match value {
        Value::Counter(_) => MetricKind::Counter,
        Value::Gauge(_) => MetricKind::Gauge,
        Value::Untyped(_) => MetricKind::Untyped,
        Value::Histogram(_) => MetricKind::Histogram,
        Value::Summary(_) => MetricKind::Summary,
    }
}

/// Parses an exposition body into metric families.
///
/// Never fails: malformed lines and unparsable values are dropped with a
/// debug log, everything salvageable is returned. Families appear in source
/// order, except histogram and summary aggregates which the library emits
/// after all scalar samples. A missing trailing newline is harmless.
pub fn parse(text: &str) -> Vec<MetricFamily> {
    // Family names whose sample lines aggregate instead of standing alone.
    // A histogram declaration covers its `_bucket` lines only; `_sum` and
    // `_count` stay plain scalars.
    let mut aggregated: AHashMap<String, Aggregated> = AHashMap::new();

    let mut kept: Vec<String> = Vec::new();
    let mut queues: AHashMap<String, VecDeque<(String, Option<i64>)>> = AHashMap::new();

    for line in text.split('\n') {
        if line.starts_with('#') {
            if let Some(caps) = TYPE_LINE.captures(line) {
                let name = &caps["name"];
                match &caps["type"] {
                    "histogram" => {
                        aggregated.insert(format!("{name}_bucket"), Aggregated::Histogram);
                    }
                    "summary" => {
                        aggregated.insert(name.to_string(), Aggregated::Summary);
                    }
                    _ => {}
                }
            }
            kept.push(line.to_string());
            continue;
        }

        let Some(caps) = SAMPLE_LINE.captures(line) else {
            if !line.trim().is_empty() {
                debug!("dropping malformed exposition line: {line}");
            }
            continue;
        };

        let name = &caps["name"];
        let value = &caps["value"];

        if parse_exposition_float(value).is_none() {
            debug!("dropping sample with unparsable value: {line}");
            continue;
        }

        match aggregated.get(name) {
            Some(Aggregated::Histogram) => {
                let le = caps
                    .name("labels")
                    .and_then(|l| extract_label(l.as_str(), "le"));
                match le.as_deref().and_then(parse_exposition_float) {
                    Some(_) => kept.push(line.to_string()),
                    None => debug!("dropping histogram bucket without usable le: {line}"),
                }
            }
            Some(Aggregated::Summary) => {
                let quantile = caps
                    .name("labels")
                    .and_then(|l| extract_label(l.as_str(), "quantile"));
                match quantile.as_deref().and_then(parse_exposition_float) {
                    Some(_) => kept.push(line.to_string()),
                    None => debug!("dropping summary sample without usable quantile: {line}"),
                }
            }
            None => {
                let timestamp_ms = caps
                    .name("timestamp")
                    .and_then(|t| t.as_str().parse::<i64>().ok());
                queues
                    .entry(name.to_string())
                    .or_default()
                    .push_back((value.to_string(), timestamp_ms));
                kept.push(line.to_string());
            }
        }
    }

    let scrape = match Scrape::parse(kept.into_iter().map(Ok)) {
        Ok(scrape) => scrape,
        Err(e) => {
            warn!("exposition parse failed: {e}");
            return Vec::new();
        }
    };

    let mut families: Vec<MetricFamily> = Vec::new();
    let mut index: AHashMap<String, usize> = AHashMap::new();

    for sample in scrape.samples {
        let name = sample.metric.clone();
        let kind = kind_of(&sample.value);

        let slot = *index.entry(name.clone()).or_insert_with(|| {
            families.push(MetricFamily {
                name: name.clone(),
                help: scrape.docs.get(&name).cloned().unwrap_or_default(),
                kind,
                samples: Vec::new(),
            });
            families.len() - 1
        });

        let labels: BTreeMap<String, String> = sample
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        match sample.value {
            Value::Counter(v) | Value::Gauge(v) | Value::Untyped(v) => {
                let (value, timestamp_ms) =
                    match queues.get_mut(&name).and_then(|q| q.pop_front()) {
                        Some(entry) => entry,
                        None => {
                            debug!("no raw value queued for {name}, formatting parsed value");
                            (format_exposition_value(v), None)
                        }
                    };
                families[slot].samples.push(SampleRecord {
                    labels,
                    timestamp_ms,
                    value,
                });
            }
            Value::Histogram(counts) => {
                for bucket in counts {
                    let mut labels = labels.clone();
                    labels.insert("le".to_string(), format_exposition_value(bucket.less_than));
                    families[slot].samples.push(SampleRecord {
                        labels,
                        timestamp_ms: None,
                        value: format_exposition_value(bucket.count),
                    });
                }
            }
            Value::Summary(counts) => {
                for entry in counts {
                    let mut labels = labels.clone();
                    labels.insert(
                        "quantile".to_string(),
                        format_exposition_value(entry.quantile),
                    );
                    families[slot].samples.push(SampleRecord {
                        labels,
                        timestamp_ms: None,
                        value: format_exposition_value(entry.count),
                    });
                }
            }
        }
    }

    families
}

/// Runs [`parse`] on a blocking worker and streams families through a bounded
/// channel, keeping large bodies off the async executor.
pub fn parse_streaming(text: String) -> mpsc::Receiver<MetricFamily> {
    let (tx, rx) = mpsc::channel(PARSE_CHANNEL_CAPACITY);

    tokio::task::spawn_blocking(move || {
        for family in parse(&text) {
            if tx.blocking_send(family).is_err() {
                // receiver dropped, stop early
                return;
            }
        }
    });

    rx
}
