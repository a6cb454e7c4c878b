//! Stress tests for concurrent writers.
//!
//! Every writer thread opens its own store on the same location, the way
//! independent processes would.

use crate::fixtures::TestStores;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tristore_core::{CoreError, CoreResult, RangeQuery};

/// Key written by the stress runs.
pub const STRESS_KEY: &str = "contended";

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Operations refused with a timestamp collision.
    pub rejected_ops: usize,
    /// Operations that failed for any other reason.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(successful: usize, rejected: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + rejected + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            rejected_ops: rejected,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent writer threads.
    pub threads: usize,
    /// Operations per thread.
    pub operations: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            operations: 50,
        }
    }
}

#[derive(Default)]
struct Counters {
    successful: AtomicUsize,
    rejected: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn record<T>(&self, result: Result<T, CoreError>) {
        let counter = match result {
            Ok(_) => &self.successful,
            Err(CoreError::StoreIntegrity { .. }) => &self.rejected,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(self, start: Instant) -> StressTestResult {
        StressTestResult::new(
            self.successful.into_inner(),
            self.rejected.into_inner(),
            self.failed.into_inner(),
            start.elapsed(),
        )
    }
}

/// Every thread applies one event at each of the timestamps
/// `0..operations` of [`STRESS_KEY`].
///
/// Exactly one writer must win each timestamp: a correct backend yields
/// `operations` successes and `(threads - 1) * operations` rejections.
pub fn stress_concurrent_appends(stores: &TestStores, config: &StressConfig) -> StressTestResult {
    stores.writable().close().expect("Failed to create namespace");
    let counters = Counters::default();
    let start = Instant::now();

    thread::scope(|scope| {
        for writer in 0..config.threads {
            let counters = &counters;
            scope.spawn(move || {
                let store = stores.writable();
                let writer = i64::try_from(writer).expect("thread index fits in i64");
                for t in 0..config.operations {
                    let t = i64::try_from(t).expect("timestamp fits in i64");
                    counters.record(store.events().apply(STRESS_KEY, [("writer", writer)], Some(t)));
                }
            });
        }
    });

    counters.finish(start)
}

/// Every thread extends [`STRESS_KEY`] with its own disjoint timestamps.
///
/// All points must be readable afterwards.
pub fn stress_concurrent_extends(stores: &TestStores, config: &StressConfig) -> StressTestResult {
    stores.writable().close().expect("Failed to create namespace");
    let counters = Counters::default();
    let start = Instant::now();

    thread::scope(|scope| {
        for writer in 0..config.threads {
            let counters = &counters;
            scope.spawn(move || {
                let store = stores.writable();
                for i in 0..config.operations {
                    let t = i64::try_from(i * config.threads + writer).expect("timestamp fits in i64");
                    counters.record(store.timeseries().extend(STRESS_KEY, [(t, t)]));
                }
            });
        }
    });

    counters.finish(start)
}

/// Counts the points of [`STRESS_KEY`] through a fresh reader.
pub fn stored_points(stores: &TestStores) -> CoreResult<usize> {
    let store = stores.read_only()?;
    let points = store.timeseries().range(STRESS_KEY, RangeQuery::new())?;
    Ok(points.len())
}
