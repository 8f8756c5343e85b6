use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide engine counters, shared across concurrent runs.
#[derive(Debug, Default)]
pub struct Metrics {
    runs_started: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    runs_aborted: AtomicU64,
    step_attempts: AtomicU64,
    step_failures: AtomicU64,
    recoveries_requested: AtomicU64,
    oracle_failures: AtomicU64,
    pattern_hits: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_runs_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_runs_succeeded(&self) {
        self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_runs_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_runs_aborted(&self) {
        self.runs_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_step_attempts(&self) {
        self.step_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_step_failures(&self) {
        self.step_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_recoveries_requested(&self) {
        self.recoveries_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_oracle_failures(&self) {
        self.oracle_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pattern_hits(&self) {
        self.pattern_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_aborted: self.runs_aborted.load(Ordering::Relaxed),
            step_attempts: self.step_attempts.load(Ordering::Relaxed),
            step_failures: self.step_failures.load(Ordering::Relaxed),
            recoveries_requested: self.recoveries_requested.load(Ordering::Relaxed),
            oracle_failures: self.oracle_failures.load(Ordering::Relaxed),
            pattern_hits: self.pattern_hits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub runs_started: u64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub runs_aborted: u64,
    pub step_attempts: u64,
    pub step_failures: u64,
    pub recoveries_requested: u64,
    pub oracle_failures: u64,
    pub pattern_hits: u64,
}

impl MetricsSnapshot {
    pub fn run_success_rate(&self) -> f64 {
        let finished = self.runs_succeeded + self.runs_failed + self.runs_aborted;
        if finished == 0 {
            return 1.0;
        }
        self.runs_succeeded as f64 / finished as f64
    }

    pub fn step_success_rate(&self) -> f64 {
        if self.step_attempts == 0 {
            return 1.0;
        }
        1.0 - (self.step_failures as f64 / self.step_attempts as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().run_success_rate(), 1.0);

        metrics.inc_runs_started();
        metrics.inc_runs_started();
        metrics.inc_runs_succeeded();
        metrics.inc_runs_failed();
        for _ in 0..4 {
            metrics.inc_step_attempts();
        }
        metrics.inc_step_failures();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs_started, 2);
        assert_eq!(snapshot.run_success_rate(), 0.5);
        assert_eq!(snapshot.step_success_rate(), 0.75);
    }
}
