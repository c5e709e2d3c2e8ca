//! Simulation metrics.

use std::collections::VecDeque;
use std::time::Duration;

/// Simulation metrics.
#[derive(Debug, Clone)]
pub struct SimulationMetrics {
    /// Rate lookups issued.
    pub total_queries: u64,
    /// Lookups that produced a rate.
    pub resolved_queries: u64,
    /// Lookups that resolved through more than one edge.
    pub inferred_queries: u64,
    /// Lookups with no rate.
    pub unresolved_queries: u64,
    /// Conversions that fell back to 1:1.
    pub fallback_conversions: u64,
    /// Expectations checked.
    pub expectations_passed: u64,
    pub expectations_failed: u64,
    /// Latency samples (µs).
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_queries: 0,
            resolved_queries: 0,
            inferred_queries: 0,
            unresolved_queries: 0,
            fallback_conversions: 0,
            expectations_passed: 0,
            expectations_failed: 0,
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    /// Record a lookup that found a rate.
    pub fn record_resolved(&mut self, inferred: bool, latency: Duration) {
        self.total_queries += 1;
        self.resolved_queries += 1;
        if inferred {
            self.inferred_queries += 1;
        }
        self.record_latency(latency);
    }

    /// Record a lookup that found nothing.
    pub fn record_unresolved(&mut self, latency: Duration) {
        self.total_queries += 1;
        self.unresolved_queries += 1;
        self.record_latency(latency);
    }

    pub fn record_fallback(&mut self) {
        self.fallback_conversions += 1;
    }

    pub fn record_expectation(&mut self, passed: bool) {
        if passed {
            self.expectations_passed += 1;
        } else {
            self.expectations_failed += 1;
        }
    }

    fn record_latency(&mut self, latency: Duration) {
        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples
            .push_back(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX));
    }

    /// Get average latency in µs.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    /// Get p99 latency.
    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    /// Get percentile latency.
    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Share of lookups that produced a rate.
    pub fn hit_rate(&self) -> f64 {
        if self.total_queries == 0 {
            return 0.0;
        }

        self.resolved_queries as f64 / self.total_queries as f64
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let mut metrics = SimulationMetrics::new();

        metrics.record_resolved(false, Duration::from_micros(100));
        metrics.record_resolved(true, Duration::from_micros(200));
        metrics.record_resolved(true, Duration::from_micros(150));
        metrics.record_unresolved(Duration::from_micros(50));
        metrics.record_expectation(true);
        metrics.record_expectation(false);

        assert_eq!(metrics.total_queries, 4);
        assert_eq!(metrics.resolved_queries, 3);
        assert_eq!(metrics.inferred_queries, 2);
        assert_eq!(metrics.unresolved_queries, 1);
        assert_eq!(metrics.average_latency_us(), 125);
        assert_eq!(metrics.p99_latency_us(), 200);
        assert_eq!(metrics.hit_rate(), 0.75);
        assert_eq!(metrics.expectations_failed, 1);
    }
}
