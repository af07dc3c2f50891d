//! Aggregation of request outcomes, grouped by request name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use sketches_ddsketch::DDSketch;

use crate::request::Outcome;

/// Thread-safe sink for the outcomes of all simulated users.
#[derive(Debug, Default)]
pub struct Stats {
    requests: Mutex<BTreeMap<String, RequestStats>>,
}

impl Stats {
    /// Records one completed request under its display name.
    pub fn record(&self, name: &str, outcome: &Outcome, elapsed: Duration) {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        match requests.get_mut(name) {
            Some(stats) => stats.add(outcome, elapsed),
            None => {
                let mut stats = RequestStats::default();
                stats.add(outcome, elapsed);
                requests.insert(name.to_owned(), stats);
            }
        }
    }

    /// Drains all recorded aggregates.
    pub fn take(&self) -> BTreeMap<String, RequestStats> {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut requests)
    }
}

/// Aggregated results of all requests sharing a name.
#[derive(Default)]
pub struct RequestStats {
    /// Response times in seconds, including failed requests.
    pub timing: DDSketch,
    /// Number of successful requests.
    pub successes: u64,
    /// Number of failed requests per failure reason.
    pub failures: BTreeMap<String, u64>,
}

impl RequestStats {
    fn add(&mut self, outcome: &Outcome, elapsed: Duration) {
        self.timing.add(elapsed.as_secs_f64());
        match outcome {
            Outcome::Success => self.successes += 1,
            Outcome::Failure(reason) => *self.failures.entry(reason.clone()).or_default() += 1,
        }
    }

    /// Total number of requests.
    pub fn count(&self) -> u64 {
        self.successes + self.failure_count()
    }

    /// Number of failed requests across all reasons.
    pub fn failure_count(&self) -> u64 {
        self.failures.values().sum()
    }

    /// Adds all results of `other` to this aggregate.
    pub fn merge(&mut self, other: &RequestStats) {
        // Sketches created with the default config always merge.
        self.timing.merge(&other.timing).ok();
        self.successes += other.successes;
        for (reason, count) in &other.failures {
            *self.failures.entry(reason.clone()).or_default() += count;
        }
    }

    /// Average and p50, p90 and p99 response times, if any request was recorded.
    pub fn percentiles(&self) -> Option<Percentiles> {
        let count = self.timing.count();
        if count == 0 {
            return None;
        }

        let quantile = |q| {
            let secs = self.timing.quantile(q).ok().flatten().unwrap_or_default();
            Duration::from_secs_f64(secs.max(0.0))
        };
        let avg = self.timing.sum().unwrap_or_default() / count as f64;

        Some(Percentiles {
            avg: Duration::from_secs_f64(avg.max(0.0)),
            p50: quantile(0.5),
            p90: quantile(0.9),
            p99: quantile(0.99),
        })
    }
}

impl fmt::Debug for RequestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestStats")
            .field("count", &self.timing.count())
            .field("successes", &self.successes)
            .field("failures", &self.failures)
            .finish()
    }
}

/// Response time summary of a [`RequestStats`].
#[derive(Clone, Copy, Debug)]
pub struct Percentiles {
    /// Mean response time.
    pub avg: Duration,
    /// Median response time.
    pub p50: Duration,
    /// 90th percentile.
    pub p90: Duration,
    /// 99th percentile.
    pub p99: Duration,
}
