//! Health Monitor: a running aggregate over task outcomes.
//!
//! Purely observational — it has no control authority over the pool. Owned
//! directly by the pool coordinator thread, so none of its mutating methods
//! need internal synchronisation (see `core::worker_pool::coordinator`).

use std::collections::VecDeque;
use std::time::Duration;

use tracing::info;

/// Capacity of the rolling window of recent successful task durations.
const DURATION_RING_CAPACITY: usize = 100;

/// Three-valued health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verdict {
    /// Nothing in the metrics crosses a threshold.
    Healthy,
    /// At least one metric crosses its single threshold.
    Degraded,
    /// At least one metric crosses its double threshold.
    Unhealthy,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Thresholds the monitor derives a verdict against. Sourced from `PoolConfig`.
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    /// Worker-count floor below which the pool is at least degraded.
    pub min_workers: usize,
    /// Queue-depth threshold; `> cap` is degraded, `> 2*cap` is unhealthy.
    pub queue_cap: usize,
    /// Error-rate threshold (0.0–1.0); `> cap` is degraded, `> 2*cap` is unhealthy.
    pub err_cap: f64,
}

/// A snapshot of derived health metrics.
#[derive(Debug, Clone, Copy)]
pub struct HealthMetrics {
    /// The derived verdict.
    pub verdict: Verdict,
    /// Successes / (successes + errors), 0 when both are 0.
    pub error_rate: f64,
    /// Mean of the duration ring, in milliseconds; `None` if no successes recorded yet.
    pub avg_duration_ms: Option<f64>,
}

/// Running aggregate of task outcomes.
pub struct HealthMonitor {
    durations: VecDeque<Duration>,
    success_count: u64,
    error_count: u64,
    last_verdict: Option<Verdict>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    /// Construct a fresh monitor with empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            durations: VecDeque::with_capacity(DURATION_RING_CAPACITY),
            success_count: 0,
            error_count: 0,
            last_verdict: None,
        }
    }

    /// Record a successful task, appending its duration to the bounded ring.
    pub fn record_success(&mut self, duration: Duration) {
        if self.durations.len() == DURATION_RING_CAPACITY {
            self.durations.pop_front();
        }
        self.durations.push_back(duration);
        self.success_count += 1;
    }

    /// Record a failed task.
    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    /// Reset all counters and the duration ring.
    pub fn reset(&mut self) {
        self.durations.clear();
        self.success_count = 0;
        self.error_count = 0;
        self.last_verdict = None;
    }

    fn error_rate(&self) -> f64 {
        let total = self.success_count + self.error_count;
        if total == 0 {
            0.0
        } else {
            self.error_count as f64 / total as f64
        }
    }

    fn avg_duration_ms(&self) -> Option<f64> {
        if self.durations.is_empty() {
            return None;
        }
        let total_ms: f64 = self.durations.iter().map(Duration::as_secs_f64).sum::<f64>() * 1000.0;
        Some(total_ms / self.durations.len() as f64)
    }

    /// Derive the current health metrics from live pool state, logging a
    /// `tracing` event exactly when the verdict changes (not on every call).
    pub fn compute(&mut self, total_workers: usize, queue_depth: usize, thresholds: HealthThresholds) -> HealthMetrics {
        let mut verdict = Verdict::Healthy;

        if total_workers < thresholds.min_workers {
            verdict = verdict.max(Verdict::Degraded);
        }

        if queue_depth > 2 * thresholds.queue_cap {
            verdict = verdict.max(Verdict::Unhealthy);
        } else if queue_depth > thresholds.queue_cap {
            verdict = verdict.max(Verdict::Degraded);
        }

        let error_rate = self.error_rate();
        if error_rate > 2.0 * thresholds.err_cap {
            verdict = verdict.max(Verdict::Unhealthy);
        } else if error_rate > thresholds.err_cap {
            verdict = verdict.max(Verdict::Degraded);
        }

        if self.last_verdict != Some(verdict) {
            info!(from = ?self.last_verdict, to = %verdict, "health verdict changed");
            self.last_verdict = Some(verdict);
        }

        HealthMetrics {
            verdict,
            error_rate,
            avg_duration_ms: self.avg_duration_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> HealthThresholds {
        HealthThresholds { min_workers: 1, queue_cap: 10, err_cap: 0.1 }
    }

    #[test]
    fn healthy_when_nothing_crosses_a_threshold() {
        let mut m = HealthMonitor::new();
        m.record_success(Duration::from_millis(5));
        let metrics = m.compute(2, 0, thresholds());
        assert_eq!(metrics.verdict, Verdict::Healthy);
    }

    #[test]
    fn degraded_below_min_workers() {
        let mut m = HealthMonitor::new();
        let metrics = m.compute(0, 0, thresholds());
        assert_eq!(metrics.verdict, Verdict::Degraded);
    }

    #[test]
    fn unhealthy_when_queue_depth_exceeds_double_cap() {
        let mut m = HealthMonitor::new();
        let metrics = m.compute(2, 21, thresholds());
        assert_eq!(metrics.verdict, Verdict::Unhealthy);
    }

    #[test]
    fn degraded_when_queue_depth_exceeds_single_cap() {
        let mut m = HealthMonitor::new();
        let metrics = m.compute(2, 11, thresholds());
        assert_eq!(metrics.verdict, Verdict::Degraded);
    }

    #[test]
    fn error_rate_drives_unhealthy() {
        let mut m = HealthMonitor::new();
        for _ in 0..10 {
            m.record_error();
        }
        let metrics = m.compute(2, 0, thresholds());
        assert_eq!(metrics.verdict, Verdict::Unhealthy);
        assert!((metrics.error_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn worst_verdict_across_conditions_wins() {
        let mut m = HealthMonitor::new();
        m.record_error();
        // 0 workers (degraded) and 1 error out of 1 (unhealthy) -> unhealthy wins.
        let metrics = m.compute(0, 0, thresholds());
        assert_eq!(metrics.verdict, Verdict::Unhealthy);
    }

    #[test]
    fn reset_clears_counters_and_ring() {
        let mut m = HealthMonitor::new();
        m.record_success(Duration::from_millis(1));
        m.record_error();
        m.reset();
        let metrics = m.compute(5, 0, thresholds());
        assert_eq!(metrics.verdict, Verdict::Healthy);
        assert!(metrics.avg_duration_ms.is_none());
    }
}
