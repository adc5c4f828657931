//! Event processing latency statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Latency thresholds in nanoseconds (0.1, 0.2, 0.3, 0.4, 0.5, 1, 5, 10 ms)
pub const THRESHOLDS_NS: [u64; 8] = [
    100_000, 200_000, 300_000, 400_000, 500_000, 1_000_000, 5_000_000, 10_000_000,
];

/// Lock-free latency counters shared by the processing threads
#[derive(Debug, Default)]
pub struct LatencyStats {
    count: AtomicU64,
    sum_ns: AtomicU64,
    max_ns: AtomicU64,
    over: [AtomicU64; THRESHOLDS_NS.len()],
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, latency: Duration) {
        let ns = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ns.fetch_add(ns, Ordering::Relaxed);
        self.max_ns.fetch_max(ns, Ordering::Relaxed);
        for (threshold, counter) in THRESHOLDS_NS.iter().zip(&self.over) {
            if ns > *threshold {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Current values, counters keep running
    pub fn snapshot(&self) -> LatencyReport {
        LatencyReport::from_raw(
            self.count.load(Ordering::Relaxed),
            self.sum_ns.load(Ordering::Relaxed),
            self.max_ns.load(Ordering::Relaxed),
            self.over.each_ref().map(|c| c.load(Ordering::Relaxed)),
        )
    }

    /// Current values; counters restart from zero for the next period
    pub fn snapshot_and_reset(&self) -> LatencyReport {
        LatencyReport::from_raw(
            self.count.swap(0, Ordering::Relaxed),
            self.sum_ns.swap(0, Ordering::Relaxed),
            self.max_ns.swap(0, Ordering::Relaxed),
            self.over.each_ref().map(|c| c.swap(0, Ordering::Relaxed)),
        )
    }
}

/// Aggregated latencies of one measurement period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyReport {
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: f64,
    /// `(threshold_ms, share of events slower than it)`
    pub slower_than: Vec<(f64, f64)>,
}

impl LatencyReport {
    fn from_raw(count: u64, sum_ns: u64, max_ns: u64, over: [u64; THRESHOLDS_NS.len()]) -> Self {
        let share = |n: u64| if count == 0 { 0.0 } else { n as f64 / count as f64 };
        Self {
            count,
            avg_ms: if count == 0 {
                0.0
            } else {
                sum_ns as f64 / count as f64 / 1e6
            },
            max_ms: max_ns as f64 / 1e6,
            slower_than: THRESHOLDS_NS
                .iter()
                .zip(over)
                .map(|(t, n)| (*t as f64 / 1e6, share(n)))
                .collect(),
        }
    }
}

impl std::fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Events: {}, Avg: {:.4} ms, Max: {:.4} ms",
            self.count, self.avg_ms, self.max_ms
        )?;
        for (threshold, share) in &self.slower_than {
            write!(f, ", >{}ms: {:.4}", threshold, share)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report() {
        let report = LatencyStats::new().snapshot();
        assert_eq!(report.count, 0);
        assert_eq!(report.avg_ms, 0.0);
        assert!(report.slower_than.iter().all(|(_, s)| *s == 0.0));
    }

    #[test]
    fn test_buckets_and_reset() {
        let stats = LatencyStats::new();
        stats.record(Duration::from_micros(50));
        stats.record(Duration::from_micros(250));
        stats.record(Duration::from_millis(2));
        stats.record(Duration::from_millis(20));

        let report = stats.snapshot_and_reset();
        assert_eq!(report.count, 4);
        assert!((report.max_ms - 20.0).abs() < 1e-9);
        let shares: Vec<f64> = report.slower_than.iter().map(|(_, s)| *s).collect();
        assert_eq!(shares, vec![0.75, 0.75, 0.5, 0.5, 0.5, 0.5, 0.25, 0.25]);
        assert!((report.avg_ms - (0.05 + 0.25 + 2.0 + 20.0) / 4.0).abs() < 1e-9);

        assert_eq!(stats.snapshot().count, 0);
        assert!(report.to_string().starts_with("Events: 4"));
    }
}
