//! Diagnostic statistics snapshots.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Snapshot of one series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesStatistics {
    /// Samples currently queryable (archive plus live buffer).
    pub point_count: usize,
    /// Samples held in the archive.
    pub archived_count: usize,
    /// Lifetime count of samples offered to `add_point`.
    pub total_received: u64,
    /// Lifetime count of samples stored or merged into an existing sample.
    pub total_accepted: u64,
    /// Lifetime count of samples refused by ordering, duplicate or `x` checks.
    pub total_rejected: u64,
    /// Lifetime count of samples permanently discarded.
    pub total_evicted: u64,
    /// Lifetime count of archived samples dropped by downsampling.
    pub total_condensed: u64,
    /// Arrival rate over the configured window, in samples per second.
    pub ingest_rate_hz: f64,
    /// Approximate heap footprint of the series.
    pub memory_estimate_bytes: usize,
    /// Smallest and largest `x`, if the series holds any sample.
    pub x_range: Option<(f64, f64)>,
}

/// Sums over every series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsTotals {
    /// Number of series.
    pub series_count: usize,
    /// Samples currently queryable.
    pub point_count: usize,
    /// Lifetime received samples.
    pub total_received: u64,
    /// Lifetime rejected samples.
    pub total_rejected: u64,
    /// Lifetime evicted samples.
    pub total_evicted: u64,
    /// Combined arrival rate in samples per second.
    pub ingest_rate_hz: f64,
    /// Combined memory estimate.
    pub memory_estimate_bytes: usize,
}

impl StatisticsTotals {
    /// Adds one series to the totals.
    pub fn accumulate(&mut self, series: &SeriesStatistics) {
        self.series_count += 1;
        self.point_count += series.point_count;
        self.total_received += series.total_received;
        self.total_rejected += series.total_rejected;
        self.total_evicted += series.total_evicted;
        self.ingest_rate_hz += series.ingest_rate_hz;
        self.memory_estimate_bytes += series.memory_estimate_bytes;
    }
}

/// Snapshot of a whole controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveStatistics {
    /// Per-series statistics, ordered by series name.
    pub per_series: BTreeMap<String, SeriesStatistics>,
    /// Sums over `per_series`.
    pub totals: StatisticsTotals,
    /// Whether the consumer has paused auto-scrolling.
    pub paused: bool,
    /// Repaint notifications fired so far.
    pub notifications_fired: u64,
    /// Dirty marks folded into an already pending notification.
    pub marks_absorbed: u64,
}

impl LiveStatistics {
    /// Builds a snapshot from per-series entries, computing the totals.
    pub fn from_series<I>(series: I) -> Self
    where
        I: IntoIterator<Item = (String, SeriesStatistics)>,
    {
        let per_series: BTreeMap<_, _> = series.into_iter().collect();
        let mut totals = StatisticsTotals::default();
        for stats in per_series.values() {
            totals.accumulate(stats);
        }
        Self {
            per_series,
            totals,
            ..Self::default()
        }
    }
}

impl fmt::Display for LiveStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} series, {} points, {:.1} Hz, ~{} bytes{}",
            self.totals.series_count,
            self.totals.point_count,
            self.totals.ingest_rate_hz,
            self.totals.memory_estimate_bytes,
            if self.paused { " (paused)" } else { "" },
        )?;
        writeln!(
            f,
            "received {}, rejected {}, evicted {}, notifications {} ({} marks absorbed)",
            self.totals.total_received,
            self.totals.total_rejected,
            self.totals.total_evicted,
            self.notifications_fired,
            self.marks_absorbed,
        )?;

        for (name, series) in &self.per_series {
            write!(
                f,
                "  {name}: {} points ({} archived), {:.1} Hz, evicted {}",
                series.point_count,
                series.archived_count,
                series.ingest_rate_hz,
                series.total_evicted,
            )?;
            match series.x_range {
                Some((min, max)) => writeln!(f, ", x in [{min}, {max}]")?,
                None => writeln!(f)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: usize, evicted: u64, rate: f64) -> SeriesStatistics {
        SeriesStatistics {
            point_count: points,
            total_received: points as u64 + evicted,
            total_evicted: evicted,
            ingest_rate_hz: rate,
            memory_estimate_bytes: 100,
            x_range: Some((0.0, 1.0)),
            ..SeriesStatistics::default()
        }
    }

    #[test]
    fn test_totals_sum_series() {
        let stats = LiveStatistics::from_series([
            ("cpu".to_string(), series(10, 2, 4.0)),
            ("mem".to_string(), series(5, 0, 1.5)),
        ]);

        assert_eq!(stats.totals.series_count, 2);
        assert_eq!(stats.totals.point_count, 15);
        assert_eq!(stats.totals.total_received, 17);
        assert_eq!(stats.totals.total_evicted, 2);
        assert_eq!(stats.totals.memory_estimate_bytes, 200);
        assert!((stats.totals.ingest_rate_hz - 5.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_display_lists_series() {
        let stats = LiveStatistics::from_series([("cpu".to_string(), series(3, 0, 0.0))]);
        let text = stats.to_string();

        assert!(text.starts_with("1 series, 3 points"));
        assert!(text.contains("cpu: 3 points"));
        assert!(text.contains("x in [0, 1]"));
    }

    #[test]
    fn test_json_shape() {
        let stats = LiveStatistics::from_series([("cpu".to_string(), series(1, 0, 0.0))]);
        let json = serde_json::to_value(&stats).unwrap();

        assert_eq!(json["per_series"]["cpu"]["point_count"], 1);
        assert_eq!(json["totals"]["series_count"], 1);
        assert_eq!(json["paused"], false);
    }
}
