//! Fixed-width time series for per-pool activity charts.
//!
//! Each connection pool gets one minute of history, indexed by second of the
//! minute. Slots wrap in place, so a series never reallocates and the chart
//! x-axis stays pinned to 0..59.

use ahash::AHashMap;

/// Slots per series, one per second of the minute.
pub const SERIES_SLOTS: usize = 60;

/// Consecutive refresh ticks a pool may miss before its series is dropped.
pub const POOL_EVICT_AFTER_MISSES: u32 = 3;

/// One minute of readings for a single pool.
#[derive(Debug, Clone)]
pub struct PoolSeries {
    slots: [i64; SERIES_SLOTS],
}

impl PoolSeries {
    fn new() -> Self {
        Self {
            slots: [0; SERIES_SLOTS],
        }
    }

    /// Records a reading at the given second of the minute.
    pub fn record(&mut self, second: usize, value: i64) {
        self.slots[second % SERIES_SLOTS] = value;
    }

    pub fn slots(&self) -> &[i64; SERIES_SLOTS] {
        &self.slots
    }

    /// Chart-friendly (second, value) points.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, v)| (i as f64, *v as f64))
            .collect()
    }
}

#[derive(Debug)]
struct PoolEntry {
    series: PoolSeries,
    misses: u32,
}

/// Keeps one series per connection pool and evicts pools that stop reporting.
#[derive(Debug, Default)]
pub struct PoolSeriesBank {
    pools: AHashMap<String, PoolEntry>,
}

impl PoolSeriesBank {
    pub fn new() -> Self {
        Self {
            pools: AHashMap::new(),
        }
    }

    /// Marks the start of a refresh tick. Pools not recorded before the next
    /// tick accumulate misses.
    pub fn begin_tick(&mut self) {
        for entry in self.pools.values_mut() {
            entry.misses += 1;
        }
    }

    /// Stores a reading for a pool, reviving its miss counter.
    pub fn record(&mut self, pool: &str, second: usize, value: i64) {
        let entry = self
            .pools
            .entry(pool.to_string())
            .or_insert_with(|| PoolEntry {
                series: PoolSeries::new(),
                misses: 0,
            });
        entry.misses = 0;
        entry.series.record(second, value);
    }

    /// Drops pools that have missed [`POOL_EVICT_AFTER_MISSES`] ticks in a row.
    pub fn evict_stale(&mut self) {
        self.pools
            .retain(|_, entry| entry.misses < POOL_EVICT_AFTER_MISSES);
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Chart data per pool, sorted by pool name for stable rendering.
    pub fn charts(&self) -> Vec<(String, Vec<(f64, f64)>)> {
        let mut charts: Vec<(String, Vec<(f64, f64)>)> = self
            .pools
            .iter()
            .map(|(name, entry)| (name.clone(), entry.series.points()))
            .collect();
        charts.sort_by(|a, b| a.0.cmp(&b.0));
        charts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_lands_in_second_slot() {
        let mut series = PoolSeries::new();
        series.record(10, 5);
        series.record(59, 7);

        assert_eq!(series.slots()[10], 5);
        assert_eq!(series.slots()[59], 7);
        assert_eq!(series.slots()[0], 0);
    }

    #[test]
    fn test_record_wraps_past_a_minute() {
        let mut series = PoolSeries::new();
        series.record(10, 5);
        series.record(70, 9);

        assert_eq!(series.slots()[10], 9);
    }

    #[test]
    fn test_same_second_overwrites_and_leaves_the_rest_zero() {
        let mut series = PoolSeries::new();
        series.record(10, 3);
        series.record(10, 7);
        series.record(40, 2);

        assert_eq!(series.slots()[10], 7);
        assert_eq!(series.slots()[40], 2);
        let untouched = series
            .slots()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 10 && *i != 40)
            .all(|(_, v)| *v == 0);
        assert!(untouched);
    }

    #[test]
    fn test_points_cover_the_whole_minute() {
        let mut series = PoolSeries::new();
        series.record(3, 42);

        let points = series.points();
        assert_eq!(points.len(), SERIES_SLOTS);
        assert_eq!(points[3], (3.0, 42.0));
        assert_eq!(points[0], (0.0, 0.0));
    }

    #[test]
    fn test_bank_evicts_after_consecutive_misses() {
        let mut bank = PoolSeriesBank::new();
        bank.record("deploys", 0, 1);

        for _ in 0..POOL_EVICT_AFTER_MISSES {
            bank.begin_tick();
        }
        bank.evict_stale();

        assert!(bank.is_empty());
    }

    #[test]
    fn test_recording_resets_the_miss_counter() {
        let mut bank = PoolSeriesBank::new();
        bank.record("deploys", 0, 1);

        for second in 1..=10 {
            bank.begin_tick();
            bank.record("deploys", second, 1);
            bank.evict_stale();
        }

        assert_eq!(bank.len(), 1);
    }

    #[test]
    fn test_charts_are_sorted_by_pool_name() {
        let mut bank = PoolSeriesBank::new();
        bank.record("zeta", 0, 1);
        bank.record("alpha", 0, 2);

        let charts = bank.charts();
        assert_eq!(charts[0].0, "alpha");
        assert_eq!(charts[1].0, "zeta");
    }
}
