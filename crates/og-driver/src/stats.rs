//! Running statistics
//!
//! Atomic counters by operation and status-code class plus a latency
//! histogram. One instance is shared between the dispatch task and the
//! summary printed at the end of the run.

use og_common::Operation;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Histogram bucket boundaries in microseconds
const LATENCY_BUCKETS_US: [u64; 12] = [
    100,
    500,
    1_000,
    5_000,
    10_000,
    25_000,
    50_000,
    100_000,
    250_000,
    500_000,
    1_000_000,
    5_000_000,
];

/// Latency histogram with fixed buckets
#[derive(Debug, Default)]
pub struct LatencyHistogram {
    /// One count per boundary plus an overflow bucket
    buckets: [AtomicU64; LATENCY_BUCKETS_US.len() + 1],
    count: AtomicU64,
    sum_us: AtomicU64,
    max_us: AtomicU64,
}

impl LatencyHistogram {
    pub fn record(&self, latency_us: u64) {
        let slot = LATENCY_BUCKETS_US
            .iter()
            .position(|bound| latency_us <= *bound)
            .unwrap_or(LATENCY_BUCKETS_US.len());
        self.buckets[slot].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.max_us.fetch_max(latency_us, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_us(&self) -> u64 {
        let count = self.count();
        if count == 0 {
            0
        } else {
            self.sum_us.load(Ordering::Relaxed) / count
        }
    }

    pub fn max_us(&self) -> u64 {
        self.max_us.load(Ordering::Relaxed)
    }

    /// Upper bound of the bucket containing the given percentile
    pub fn percentile_us(&self, percentile: f64) -> u64 {
        let count = self.count();
        if count == 0 {
            return 0;
        }
        let target = ((percentile / 100.0) * count as f64).ceil() as u64;
        let mut seen = 0u64;
        for (slot, bucket) in self.buckets.iter().enumerate() {
            seen += bucket.load(Ordering::Relaxed);
            if seen >= target {
                return LATENCY_BUCKETS_US
                    .get(slot)
                    .copied()
                    .unwrap_or_else(|| self.max_us());
            }
        }
        self.max_us()
    }
}

/// Per-operation counters
#[derive(Debug, Default)]
struct OpCounters {
    requests: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

/// Shared run statistics
#[derive(Debug, Default)]
pub struct Statistics {
    per_op: [OpCounters; Operation::ALL.len()],
    status_counts: RwLock<BTreeMap<u16, u64>>,
    total: AtomicU64,
    success: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    /// Requests that never produced an HTTP status (transport failures)
    transport_errors: AtomicU64,
    /// Requests dropped because the population had no name to offer
    skips: AtomicU64,
    latency: LatencyHistogram,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed exchange
    ///
    /// A status code of zero marks a transport failure.
    pub fn record(
        &self,
        operation: Operation,
        status_code: u16,
        bytes_sent: u64,
        bytes_received: u64,
        latency_us: u64,
    ) {
        let slot = Operation::ALL
            .iter()
            .position(|op| *op == operation)
            .expect("operation is part of the closed set");
        let counters = &self.per_op[slot];
        counters.requests.fetch_add(1, Ordering::Relaxed);
        counters.bytes_sent.fetch_add(bytes_sent, Ordering::Relaxed);
        counters
            .bytes_received
            .fetch_add(bytes_received, Ordering::Relaxed);

        self.total.fetch_add(1, Ordering::Relaxed);
        match status_code {
            0 => {
                self.transport_errors.fetch_add(1, Ordering::Relaxed);
            }
            200..=299 => {
                self.success.fetch_add(1, Ordering::Relaxed);
            }
            400..=499 => {
                self.client_errors.fetch_add(1, Ordering::Relaxed);
            }
            500..=599 => {
                self.server_errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        *self.status_counts.write().entry(status_code).or_insert(0) += 1;
        self.latency.record(latency_us);
    }

    pub fn record_skip(&self) {
        self.skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn skips(&self) -> u64 {
        self.skips.load(Ordering::Relaxed)
    }

    pub fn transport_errors(&self) -> u64 {
        self.transport_errors.load(Ordering::Relaxed)
    }

    pub fn status_count(&self, status_code: u16) -> u64 {
        self.status_counts
            .read()
            .get(&status_code)
            .copied()
            .unwrap_or(0)
    }

    pub fn status_counts(&self) -> BTreeMap<u16, u64> {
        self.status_counts.read().clone()
    }

    pub fn operation_count(&self, operation: Operation) -> u64 {
        let slot = Operation::ALL
            .iter()
            .position(|op| *op == operation)
            .expect("operation is part of the closed set");
        self.per_op[slot].requests.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.per_op
            .iter()
            .map(|c| c.bytes_sent.load(Ordering::Relaxed))
            .sum()
    }

    pub fn bytes_received(&self) -> u64 {
        self.per_op
            .iter()
            .map(|c| c.bytes_received.load(Ordering::Relaxed))
            .sum()
    }

    pub fn latency(&self) -> &LatencyHistogram {
        &self.latency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_classifies_status() {
        let stats = Statistics::new();
        stats.record(Operation::Write, 200, 100, 0, 1000);
        stats.record(Operation::Read, 404, 0, 0, 500);
        stats.record(Operation::Read, 503, 0, 0, 500);
        stats.record(Operation::Delete, 0, 0, 0, 500);

        assert_eq!(stats.total(), 4);
        assert_eq!(stats.status_count(200), 1);
        assert_eq!(stats.status_count(404), 1);
        assert_eq!(stats.transport_errors(), 1);
        assert_eq!(stats.operation_count(Operation::Read), 2);
        assert_eq!(stats.bytes_sent(), 100);
    }

    #[test]
    fn test_histogram_percentiles() {
        let histogram = LatencyHistogram::default();
        for _ in 0..99 {
            histogram.record(800);
        }
        histogram.record(400_000);

        assert_eq!(histogram.count(), 100);
        // 99 samples land in the 1ms bucket.
        assert_eq!(histogram.percentile_us(50.0), 1_000);
        assert_eq!(histogram.percentile_us(99.0), 1_000);
        assert_eq!(histogram.percentile_us(100.0), 500_000);
    }

    #[test]
    fn test_empty_histogram() {
        let histogram = LatencyHistogram::default();
        assert_eq!(histogram.percentile_us(99.0), 0);
        assert_eq!(histogram.mean_us(), 0);
    }
}
