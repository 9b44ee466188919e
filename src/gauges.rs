//! Derived gauge computation.
//!
//! One pass over a snapshot's families feeds a set of accumulators through a
//! dispatch table keyed by exact family name, plus a substring classifier for
//! the per-pool connection families. Bad numeric data degrades to documented
//! defaults with a warning; computation never fails.

use crate::series::PoolSeriesBank;
use crate::snapshot::{MetricFamily, Snapshot, POOL_FAMILY_MARKER};
use ahash::AHashMap;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use tracing::warn;

pub const CPU_TOTAL_TIME: &str = "app_cpu_totaltime_seconds";
pub const HEAP_MAX: &str = "app_runtime_heap_maxmemory_bytes";
pub const HEAP_FREE: &str = "app_runtime_heap_freememory_bytes";
pub const HEAP_TOTAL: &str = "app_runtime_heap_totalmemory_bytes";
pub const HEAP_PROCESSORS: &str = "app_runtime_heap_processors_total";
pub const DISK_FREE: &str = "app_disk_free_bytes";
pub const DISK_TOTAL: &str = "app_disk_total_bytes";
pub const DB_ACTIVE: &str = "app_db_connections_active_total";
pub const DB_MAX_ACTIVE: &str = "app_db_connections_max_active_total";
pub const DB_IDLE: &str = "app_db_connections_idle_total";
pub const DB_MIN_IDLE: &str = "app_db_connections_min_idle_total";
pub const GC_DURATION: &str = "app_gc_duration_seconds";
pub const GC_BINARIES: &str = "app_gc_binaries_total";
pub const GC_SIZE_CLEANED: &str = "app_gc_size_cleaned_bytes";
pub const GC_CURRENT_SIZE: &str = "app_gc_current_size_bytes";

/// Role of one per-pool connection family, read from its help text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolCategory {
    Leased,
    Pending,
    Max,
    Available,
    Other,
}

/// One list row for a per-pool connection family.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolRow {
    pub pool: String,
    pub family: String,
    pub category: PoolCategory,
    pub value: i64,
    pub display: String,
}

/// Connection counts summed across all pools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolTotals {
    pub leased: i64,
    pub pending: i64,
    pub max: i64,
    pub available: i64,
}

impl PoolTotals {
    pub fn display(&self) -> String {
        format!(
            "Leased: {}  Pending: {}  Max: {}  Available: {}",
            self.leased, self.pending, self.max, self.available
        )
    }
}

/// Last garbage-collection run as reported by the endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcActivity {
    pub duration_seconds: String,
    pub window_start_ms: Option<i64>,
    pub window_end_ms: Option<i64>,
    pub kind: String,
    pub status: String,
    pub binaries_cleaned: i64,
    pub bytes_cleaned: f64,
    pub current_size_bytes: f64,
}

/// Everything the dashboard renders for one tick. Recomputed from scratch on
/// every poll, never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedGauges {
    pub free_storage_percent: f64,
    pub free_heap_percent: f64,
    pub db_active_percent: i64,

    pub cpu_total_time_seconds: String,
    pub processors: String,

    pub heap_free_bytes: f64,
    pub heap_max_bytes: f64,
    pub heap_total_bytes: f64,
    pub disk_free_bytes: f64,
    pub disk_total_bytes: f64,

    pub db_active: i64,
    pub db_max: i64,
    pub db_idle: i64,
    pub db_min_idle: i64,

    pub gc: GcActivity,

    pub pool_rows: Vec<PoolRow>,
    pub pool_totals: PoolTotals,
}

#[derive(Debug, Default)]
struct Accumulators {
    cpu_total_time: Option<String>,
    heap_max: Option<String>,
    heap_free: Option<String>,
    heap_total: Option<String>,
    processors: Option<String>,
    disk_free: Option<String>,
    disk_total: Option<String>,
    db_active: Option<String>,
    db_max: Option<String>,
    db_idle: Option<String>,
    db_min_idle: Option<String>,
    gc_duration: Option<String>,
    gc_window_start_ms: Option<i64>,
    gc_window_end_ms: Option<i64>,
    gc_kind: Option<String>,
    gc_status: Option<String>,
    gc_binaries: Option<String>,
    gc_bytes_cleaned: Option<String>,
    gc_current_size: Option<String>,
}

fn first_value(family: &MetricFamily) -> Option<String> {
    family.samples.first().map(|s| s.value.clone())
}

type Apply = fn(&mut Accumulators, &MetricFamily);

static DISPATCH: Lazy<AHashMap<&'static str, Apply>> = Lazy::new(|| {
    let mut table: AHashMap<&'static str, Apply> = AHashMap::new();

    table.insert(CPU_TOTAL_TIME, |acc, family| {
        acc.cpu_total_time = first_value(family);
    });
    table.insert(HEAP_MAX, |acc, family| {
        acc.heap_max = first_value(family);
    });
    table.insert(HEAP_FREE, |acc, family| {
        acc.heap_free = first_value(family);
    });
    table.insert(HEAP_TOTAL, |acc, family| {
        acc.heap_total = first_value(family);
    });
    table.insert(HEAP_PROCESSORS, |acc, family| {
        acc.processors = first_value(family);
    });
    table.insert(DISK_FREE, |acc, family| {
        acc.disk_free = first_value(family);
    });
    table.insert(DISK_TOTAL, |acc, family| {
        acc.disk_total = first_value(family);
    });
    table.insert(DB_ACTIVE, |acc, family| {
        acc.db_active = first_value(family);
    });
    table.insert(DB_MAX_ACTIVE, |acc, family| {
        acc.db_max = first_value(family);
    });
    table.insert(DB_IDLE, |acc, family| {
        acc.db_idle = first_value(family);
    });
    table.insert(DB_MIN_IDLE, |acc, family| {
        acc.db_min_idle = first_value(family);
    });
    table.insert(GC_DURATION, |acc, family| {
        if let Some(sample) = family.samples.first() {
            acc.gc_duration = Some(sample.value.clone());
            acc.gc_window_start_ms = sample.labels.get("start").and_then(|v| v.parse().ok());
            acc.gc_window_end_ms = sample.labels.get("end").and_then(|v| v.parse().ok());
            acc.gc_kind = sample.labels.get("type").cloned();
            acc.gc_status = sample.labels.get("status").cloned();
        }
    });
    table.insert(GC_BINARIES, |acc, family| {
        acc.gc_binaries = first_value(family);
    });
    table.insert(GC_SIZE_CLEANED, |acc, family| {
        acc.gc_bytes_cleaned = first_value(family);
    });
    table.insert(GC_CURRENT_SIZE, |acc, family| {
        acc.gc_current_size = first_value(family);
    });

    table
});

/// Integer reading with a fallback. Absent families stay quiet, a present but
/// non-numeric value warns once per tick.
fn parse_count(name: &str, raw: Option<&str>, default: i64) -> i64 {
    let Some(text) = raw else { return default };

    if let Ok(v) = text.parse::<i64>() {
        return v;
    }
    if let Ok(v) = text.parse::<f64>() {
        return v.trunc() as i64;
    }

    warn!("value '{}' for {} is not numeric, using {}", text, name, default);
    default
}

fn parse_measure(name: &str, raw: Option<&str>, default: f64) -> f64 {
    let Some(text) = raw else { return default };

    match text.parse::<f64>() {
        Ok(v) => v,
        Err(_) => {
            warn!("value '{}' for {} is not numeric, using {}", text, name, default);
            default
        }
    }
}

/// Uniform fallback policy for ratios: a zero, negative or NaN denominator
/// becomes 1 so no gauge ever divides by zero.
fn safe_denominator(value: f64) -> f64 {
    if value > 0.0 {
        value
    } else {
        1.0
    }
}

fn safe_denominator_i64(value: i64) -> i64 {
    if value > 0 {
        value
    } else {
        1
    }
}

fn classify_text(text: &str) -> PoolCategory {
    if text.contains("leased") {
        PoolCategory::Leased
    } else if text.contains("pending") {
        PoolCategory::Pending
    } else if text.contains("max") {
        PoolCategory::Max
    } else if text.contains("available") {
        PoolCategory::Available
    } else {
        PoolCategory::Other
    }
}

/// Classifies a pool family by its help text, falling back to the family
/// name when the help line is empty or unrecognized.
fn classify_pool_family(help: &str, name: &str) -> PoolCategory {
    match classify_text(&help.to_lowercase()) {
        PoolCategory::Other => classify_text(&name.to_lowercase()),
        category => category,
    }
}

/// Pool identity for the rolling series: the `pool` label when present,
/// otherwise the disambiguation prefix ahead of the shared family name.
fn pool_identity(family_name: &str, labels: &BTreeMap<String, String>) -> String {
    if let Some(pool) = labels.get("pool") {
        return pool.clone();
    }
    match family_name.find(POOL_FAMILY_MARKER) {
        Some(0) | None => "default".to_string(),
        Some(idx) => family_name[..idx].to_string(),
    }
}

/// Derives all dashboard gauges from one snapshot.
///
/// `second_of_minute` selects the series slot the per-pool leased counts are
/// written to. The bank keeps its own history; pools absent from several
/// consecutive snapshots are evicted here.
pub fn compute(
    snapshot: &Snapshot,
    bank: &mut PoolSeriesBank,
    second_of_minute: usize,
) -> DerivedGauges {
    let mut acc = Accumulators::default();
    let mut pool_rows: Vec<PoolRow> = Vec::new();
    let mut pool_totals = PoolTotals::default();

    bank.begin_tick();

    for family in &snapshot.families {
        if let Some(apply) = DISPATCH.get(family.name.as_str()) {
            apply(&mut acc, family);
            continue;
        }

        if family.name.contains(POOL_FAMILY_MARKER) {
            let Some(sample) = family.samples.first() else {
                continue;
            };

            let value = parse_count(&family.name, Some(sample.value.as_str()), 0);
            let category = classify_pool_family(&family.help, &family.name);
            let pool = pool_identity(&family.name, &sample.labels);

            match category {
                PoolCategory::Leased => {
                    pool_totals.leased += value;
                    bank.record(&pool, second_of_minute, value);
                }
                PoolCategory::Pending => pool_totals.pending += value,
                PoolCategory::Max => pool_totals.max += value,
                PoolCategory::Available => pool_totals.available += value,
                PoolCategory::Other => {}
            }

            pool_rows.push(PoolRow {
                pool,
                family: family.name.clone(),
                category,
                value,
                display: format!("{} {}", family.name, sample.value),
            });
        }
    }

    bank.evict_stale();

    let disk_free = parse_measure(DISK_FREE, acc.disk_free.as_deref(), 1.0);
    let disk_total = parse_measure(DISK_TOTAL, acc.disk_total.as_deref(), 100.0);
    let free_storage_percent = 100.0 - (100.0 * disk_free / safe_denominator(disk_total));

    let heap_free = parse_measure(HEAP_FREE, acc.heap_free.as_deref(), 1.0);
    let heap_max = parse_measure(HEAP_MAX, acc.heap_max.as_deref(), 100.0);
    let free_heap_percent = 100.0 * heap_free / safe_denominator(heap_max);

    let heap_total = parse_measure(HEAP_TOTAL, acc.heap_total.as_deref(), 0.0);

    let db_active = parse_count(DB_ACTIVE, acc.db_active.as_deref(), 0);
    let db_max = parse_count(DB_MAX_ACTIVE, acc.db_max.as_deref(), 1);
    let db_idle = parse_count(DB_IDLE, acc.db_idle.as_deref(), 0);
    let db_min_idle = parse_count(DB_MIN_IDLE, acc.db_min_idle.as_deref(), 0);

    // Integer division, and deliberately unclamped: an overloaded pool shows
    // more than 100 percent instead of hiding behind a cap.
    let db_active_percent = 100 * db_active / safe_denominator_i64(db_max);

    let gc = GcActivity {
        duration_seconds: acc.gc_duration.unwrap_or_default(),
        window_start_ms: acc.gc_window_start_ms,
        window_end_ms: acc.gc_window_end_ms,
        kind: acc.gc_kind.unwrap_or_default(),
        status: acc.gc_status.unwrap_or_default(),
        binaries_cleaned: parse_count(GC_BINARIES, acc.gc_binaries.as_deref(), 0),
        bytes_cleaned: parse_measure(GC_SIZE_CLEANED, acc.gc_bytes_cleaned.as_deref(), 0.0),
        current_size_bytes: parse_measure(GC_CURRENT_SIZE, acc.gc_current_size.as_deref(), 0.0),
    };

    DerivedGauges {
        free_storage_percent,
        free_heap_percent,
        db_active_percent,
        cpu_total_time_seconds: acc.cpu_total_time.unwrap_or_default(),
        processors: acc.processors.unwrap_or_default(),
        heap_free_bytes: heap_free,
        heap_max_bytes: heap_max,
        heap_total_bytes: heap_total,
        disk_free_bytes: disk_free,
        disk_total_bytes: disk_total,
        db_active,
        db_max,
        db_idle,
        db_min_idle,
        gc,
        pool_rows,
        pool_totals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{MetricKind, SampleRecord};
    use chrono::Local;

    fn family(name: &str, help: &str, value: &str) -> MetricFamily {
        family_with_labels(name, help, value, &[])
    }

    fn family_with_labels(
        name: &str,
        help: &str,
        value: &str,
        labels: &[(&str, &str)],
    ) -> MetricFamily {
        let labels: BTreeMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MetricFamily {
            name: name.to_string(),
            help: help.to_string(),
            kind: MetricKind::Gauge,
            samples: vec![SampleRecord {
                labels,
                timestamp_ms: None,
                value: value.to_string(),
            }],
        }
    }

    fn snapshot_of(families: Vec<MetricFamily>) -> Snapshot {
        Snapshot {
            families,
            captured_at: Local::now(),
            poll_offset_seconds: 0,
        }
    }

    #[test]
    fn test_db_active_percent_uses_integer_division() {
        let snapshot = snapshot_of(vec![
            family(DB_ACTIVE, "Active connections", "7"),
            family(DB_MAX_ACTIVE, "Max active connections", "10"),
        ]);
        let mut bank = PoolSeriesBank::new();

        let gauges = compute(&snapshot, &mut bank, 0);
        assert_eq!(gauges.db_active_percent, 70);
        assert_eq!(gauges.db_active, 7);
        assert_eq!(gauges.db_max, 10);
    }

    #[test]
    fn test_db_active_percent_missing_max_is_not_clamped() {
        let snapshot = snapshot_of(vec![family(DB_ACTIVE, "Active connections", "7")]);
        let mut bank = PoolSeriesBank::new();

        // The denominator falls back to 1, so 7 active reads as 700 percent.
        let gauges = compute(&snapshot, &mut bank, 0);
        assert_eq!(gauges.db_active_percent, 700);
    }

    #[test]
    fn test_db_active_percent_zero_max_is_guarded() {
        let snapshot = snapshot_of(vec![
            family(DB_ACTIVE, "Active connections", "3"),
            family(DB_MAX_ACTIVE, "Max active connections", "0"),
        ]);
        let mut bank = PoolSeriesBank::new();

        let gauges = compute(&snapshot, &mut bank, 0);
        assert_eq!(gauges.db_active_percent, 300);
    }

    #[test]
    fn test_free_storage_percent_survives_missing_disk_total() {
        let snapshot = snapshot_of(vec![family(DISK_FREE, "Free bytes", "50")]);
        let mut bank = PoolSeriesBank::new();

        let gauges = compute(&snapshot, &mut bank, 0);
        assert!(gauges.free_storage_percent.is_finite());
        assert_eq!(gauges.free_storage_percent, 50.0);
    }

    #[test]
    fn test_free_storage_percent_defaults_on_empty_snapshot() {
        let snapshot = snapshot_of(Vec::new());
        let mut bank = PoolSeriesBank::new();

        let gauges = compute(&snapshot, &mut bank, 0);
        assert!(gauges.free_storage_percent.is_finite());
        assert_eq!(gauges.free_storage_percent, 99.0);
    }

    #[test]
    fn test_free_heap_percent_with_unparsable_max() {
        let snapshot = snapshot_of(vec![
            family(HEAP_FREE, "Free heap", "512"),
            family(HEAP_MAX, "Max heap", "not-a-number"),
        ]);
        let mut bank = PoolSeriesBank::new();

        let gauges = compute(&snapshot, &mut bank, 0);
        assert!(gauges.free_heap_percent.is_finite());
        assert_eq!(gauges.free_heap_percent, 512.0);
    }

    #[test]
    fn test_meta_statistics_keep_raw_value_text() {
        let snapshot = snapshot_of(vec![
            family(CPU_TOTAL_TIME, "Total CPU time", "12345.678"),
            family(HEAP_PROCESSORS, "Available processors", "16"),
        ]);
        let mut bank = PoolSeriesBank::new();

        let gauges = compute(&snapshot, &mut bank, 0);
        assert_eq!(gauges.cpu_total_time_seconds, "12345.678");
        assert_eq!(gauges.processors, "16");
    }

    #[test]
    fn test_gc_window_and_counters_are_captured() {
        let snapshot = snapshot_of(vec![
            family_with_labels(
                GC_DURATION,
                "Last GC duration",
                "2.5",
                &[
                    ("start", "1724577000000"),
                    ("end", "1724577002500"),
                    ("type", "FULL"),
                    ("status", "COMPLETED"),
                ],
            ),
            family(GC_BINARIES, "Binaries removed", "42"),
            family(GC_SIZE_CLEANED, "Bytes reclaimed", "1048576"),
            family(GC_CURRENT_SIZE, "Current data size", "2097152"),
        ]);
        let mut bank = PoolSeriesBank::new();

        let gauges = compute(&snapshot, &mut bank, 0);
        assert_eq!(gauges.gc.duration_seconds, "2.5");
        assert_eq!(gauges.gc.window_start_ms, Some(1724577000000));
        assert_eq!(gauges.gc.window_end_ms, Some(1724577002500));
        assert_eq!(gauges.gc.kind, "FULL");
        assert_eq!(gauges.gc.status, "COMPLETED");
        assert_eq!(gauges.gc.binaries_cleaned, 42);
        assert_eq!(gauges.gc.bytes_cleaned, 1048576.0);
        assert_eq!(gauges.gc.current_size_bytes, 2097152.0);
    }

    #[test]
    fn test_pool_rows_totals_and_series() {
        let snapshot = snapshot_of(vec![
            family(
                "p0app_http_connections_leased_total",
                "Leased connections for pool",
                "3",
            ),
            family(
                "p0app_http_connections_pending_total",
                "Pending connections for pool",
                "1",
            ),
            family(
                "p1app_http_connections_leased_total",
                "Leased connections for pool",
                "5",
            ),
            family(
                "p1app_http_connections_max_total",
                "Max connections for pool",
                "50",
            ),
            family(
                "p1app_http_connections_available_total",
                "Available connections for pool",
                "45",
            ),
        ]);
        let mut bank = PoolSeriesBank::new();

        let gauges = compute(&snapshot, &mut bank, 10);

        assert_eq!(gauges.pool_rows.len(), 5);
        assert_eq!(gauges.pool_totals.leased, 8);
        assert_eq!(gauges.pool_totals.pending, 1);
        assert_eq!(gauges.pool_totals.max, 50);
        assert_eq!(gauges.pool_totals.available, 45);
        assert_eq!(
            gauges.pool_totals.display(),
            "Leased: 8  Pending: 1  Max: 50  Available: 45"
        );

        // Only leased families feed the rolling series, one per pool.
        let charts = bank.charts();
        assert_eq!(charts.len(), 2);
        assert_eq!(charts[0].0, "p0");
        assert_eq!(charts[0].1[10], (10.0, 3.0));
        assert_eq!(charts[1].0, "p1");
        assert_eq!(charts[1].1[10], (10.0, 5.0));
    }

    #[test]
    fn test_pool_label_wins_over_name_prefix() {
        let snapshot = snapshot_of(vec![family_with_labels(
            "p0app_http_connections_leased_total",
            "Leased connections for pool",
            "2",
            &[("pool", "deploys")],
        )]);
        let mut bank = PoolSeriesBank::new();

        let gauges = compute(&snapshot, &mut bank, 0);
        assert_eq!(gauges.pool_rows[0].pool, "deploys");
        assert_eq!(bank.charts()[0].0, "deploys");
    }

    #[test]
    fn test_unparsable_pool_value_defaults_to_zero() {
        let snapshot = snapshot_of(vec![family(
            "p0app_http_connections_leased_total",
            "Leased connections for pool",
            "unknown",
        )]);
        let mut bank = PoolSeriesBank::new();

        let gauges = compute(&snapshot, &mut bank, 0);
        assert_eq!(gauges.pool_rows[0].value, 0);
        assert_eq!(gauges.pool_totals.leased, 0);
    }

    #[test]
    fn test_pools_are_evicted_after_quiet_snapshots() {
        let with_pool = snapshot_of(vec![family(
            "p0app_http_connections_leased_total",
            "Leased connections for pool",
            "3",
        )]);
        let without_pool = snapshot_of(vec![family(DISK_FREE, "Free bytes", "1")]);
        let mut bank = PoolSeriesBank::new();

        compute(&with_pool, &mut bank, 0);
        assert_eq!(bank.len(), 1);

        for second in 1..=3 {
            compute(&without_pool, &mut bank, second);
        }
        assert!(bank.is_empty());
    }
}
