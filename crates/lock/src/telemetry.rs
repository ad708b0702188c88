use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use vaultlock_core::LockBackendKind;

/// Why an acquire attempt failed, for the `acquire_failure{reason}` counter
/// (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    Timeout,
    Error,
    Interrupted,
}

impl FailureReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Error => "error",
            Self::Interrupted => "interrupted",
        }
    }
}

#[derive(Default)]
struct BackendCounters {
    acquire_attempts: AtomicU64,
    acquire_success: AtomicU64,
    acquire_failure_timeout: AtomicU64,
    acquire_failure_error: AtomicU64,
    acquire_failure_interrupted: AtomicU64,
    release_attempts: AtomicU64,
    release_success: AtomicU64,
    release_failure: AtomicU64,
    cumulative_acquired: AtomicU64,
    active_locks: AtomicI64,
    acquire_latency_micros_total: AtomicU64,
    acquire_latency_samples: AtomicU64,
    hold_duration_micros_total: AtomicU64,
    hold_duration_samples: AtomicU64,
}

/// A point-in-time read of a backend's counters/timers/gauges, plus the
/// derived `contention_ratio` (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySnapshot {
    pub acquire_attempts: u64,
    pub acquire_success: u64,
    pub acquire_failure_timeout: u64,
    pub acquire_failure_error: u64,
    pub acquire_failure_interrupted: u64,
    pub release_attempts: u64,
    pub release_success: u64,
    pub release_failure: u64,
    pub active_locks: i64,
    pub cumulative_acquired: u64,
    pub avg_acquire_latency: Duration,
    pub avg_hold_duration: Duration,
    pub contention_ratio: f64,
}

/// Composite efficiency grade (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EfficiencyGrade {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl EfficiencyGrade {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 95.0 {
            Self::Excellent
        } else if score >= 85.0 {
            Self::Good
        } else if score >= 70.0 {
            Self::Fair
        } else if score >= 50.0 {
            Self::Poor
        } else {
            Self::Critical
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "EXCELLENT",
            Self::Good => "GOOD",
            Self::Fair => "FAIR",
            Self::Poor => "POOR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Counters/timers/gauges tagged by backend identity and operation kind
/// (spec §4.7), plus the process-wide transaction outcome tally used to
/// compute the composite `efficiency` score.
pub struct LockTelemetry {
    by_backend: DashMap<LockBackendKind, BackendCounters>,
    transactions_completed: AtomicU64,
    transactions_failed: AtomicU64,
    started_at: Instant,
}

impl Default for LockTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTelemetry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_backend: DashMap::new(),
            transactions_completed: AtomicU64::new(0),
            transactions_failed: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    fn entry(&self, backend: LockBackendKind) -> dashmap::mapref::one::Ref<'_, LockBackendKind, BackendCounters> {
        self.by_backend.entry(backend).or_default();
        self.by_backend.get(&backend).expect("entry just inserted")
    }

    pub fn record_acquire_attempt(&self, backend: LockBackendKind) {
        self.entry(backend).acquire_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acquire_success(&self, backend: LockBackendKind, latency: Duration) {
        let counters = self.entry(backend);
        counters.acquire_success.fetch_add(1, Ordering::Relaxed);
        counters.cumulative_acquired.fetch_add(1, Ordering::Relaxed);
        counters.active_locks.fetch_add(1, Ordering::Relaxed);
        counters
            .acquire_latency_micros_total
            .fetch_add(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX), Ordering::Relaxed);
        counters.acquire_latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acquire_failure(&self, backend: LockBackendKind, reason: FailureReason) {
        let counters = self.entry(backend);
        match reason {
            FailureReason::Timeout => counters.acquire_failure_timeout.fetch_add(1, Ordering::Relaxed),
            FailureReason::Error => counters.acquire_failure_error.fetch_add(1, Ordering::Relaxed),
            FailureReason::Interrupted => counters.acquire_failure_interrupted.fetch_add(1, Ordering::Relaxed),
        };
        let _ = reason.as_str();
    }

    pub fn record_release_attempt(&self, backend: LockBackendKind) {
        self.entry(backend).release_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful release, decrementing the active-lock gauge and
    /// recording the held duration for the `hold_duration` timer.
    pub fn record_release_success(&self, backend: LockBackendKind, held_for: Duration) {
        let counters = self.entry(backend);
        counters.release_success.fetch_add(1, Ordering::Relaxed);
        counters.active_locks.fetch_sub(1, Ordering::Relaxed);
        counters
            .hold_duration_micros_total
            .fetch_add(u64::try_from(held_for.as_micros()).unwrap_or(u64::MAX), Ordering::Relaxed);
        counters.hold_duration_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_release_failure(&self, backend: LockBackendKind) {
        self.entry(backend).release_failure.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a business operation (transfer/withdraw),
    /// feeding the `transaction_success_rate` term of `efficiency`.
    pub fn record_transaction_outcome(&self, success: bool) {
        if success {
            self.transactions_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.transactions_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn snapshot(&self, backend: LockBackendKind) -> TelemetrySnapshot {
        let counters = self.entry(backend);
        let acquire_attempts = counters.acquire_attempts.load(Ordering::Relaxed);
        let acquire_success = counters.acquire_success.load(Ordering::Relaxed);
        let cumulative_acquired = counters.cumulative_acquired.load(Ordering::Relaxed);
        let active_locks = counters.active_locks.load(Ordering::Relaxed);

        let latency_samples = counters.acquire_latency_samples.load(Ordering::Relaxed);
        let avg_acquire_latency = if latency_samples == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(counters.acquire_latency_micros_total.load(Ordering::Relaxed) / latency_samples)
        };

        let hold_samples = counters.hold_duration_samples.load(Ordering::Relaxed);
        let avg_hold_duration = if hold_samples == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(counters.hold_duration_micros_total.load(Ordering::Relaxed) / hold_samples)
        };

        let contention_ratio = if cumulative_acquired == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                active_locks as f64 / cumulative_acquired as f64
            }
        };

        TelemetrySnapshot {
            acquire_attempts,
            acquire_success,
            acquire_failure_timeout: counters.acquire_failure_timeout.load(Ordering::Relaxed),
            acquire_failure_error: counters.acquire_failure_error.load(Ordering::Relaxed),
            acquire_failure_interrupted: counters.acquire_failure_interrupted.load(Ordering::Relaxed),
            release_attempts: counters.release_attempts.load(Ordering::Relaxed),
            release_success: counters.release_success.load(Ordering::Relaxed),
            release_failure: counters.release_failure.load(Ordering::Relaxed),
            active_locks,
            cumulative_acquired,
            avg_acquire_latency,
            avg_hold_duration,
            contention_ratio,
        }
    }

    /// `completed_ops / uptime`, in operations per second (spec §4.7).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn throughput(&self) -> f64 {
        let completed = self.transactions_completed.load(Ordering::Relaxed) as f64;
        let uptime = self.started_at.elapsed().as_secs_f64().max(1.0);
        completed / uptime
    }

    /// `0.4 * acquire_success_rate + 0.6 * transaction_success_rate`,
    /// aggregated across every backend that has recorded attempts
    /// (spec §4.7).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn efficiency(&self) -> f64 {
        let (mut attempts, mut successes) = (0u64, 0u64);
        for entry in &self.by_backend {
            attempts += entry.acquire_attempts.load(Ordering::Relaxed);
            successes += entry.acquire_success.load(Ordering::Relaxed);
        }
        let acquire_success_rate = if attempts == 0 { 100.0 } else { successes as f64 / attempts as f64 * 100.0 };

        let completed = self.transactions_completed.load(Ordering::Relaxed);
        let failed = self.transactions_failed.load(Ordering::Relaxed);
        let total_tx = completed + failed;
        let transaction_success_rate = if total_tx == 0 { 100.0 } else { completed as f64 / total_tx as f64 * 100.0 };

        0.4 * acquire_success_rate + 0.6 * transaction_success_rate
    }

    #[must_use]
    pub fn efficiency_grade(&self) -> EfficiencyGrade {
        EfficiencyGrade::from_score(self.efficiency())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_starts_at_zero() {
        let telemetry = LockTelemetry::new();
        let snap = telemetry.snapshot(LockBackendKind::Redis);
        assert_eq!(snap.acquire_attempts, 0);
        assert_eq!(snap.active_locks, 0);
        assert_eq!(snap.contention_ratio, 0.0);
    }

    #[test]
    fn active_locks_tracks_acquire_and_release() {
        let telemetry = LockTelemetry::new();
        telemetry.record_acquire_attempt(LockBackendKind::Redis);
        telemetry.record_acquire_success(LockBackendKind::Redis, Duration::from_millis(5));
        assert_eq!(telemetry.snapshot(LockBackendKind::Redis).active_locks, 1);

        telemetry.record_release_attempt(LockBackendKind::Redis);
        telemetry.record_release_success(LockBackendKind::Redis, Duration::from_millis(50));
        assert_eq!(telemetry.snapshot(LockBackendKind::Redis).active_locks, 0);
    }

    #[test]
    fn contention_ratio_is_active_over_cumulative() {
        let telemetry = LockTelemetry::new();
        for _ in 0..4 {
            telemetry.record_acquire_success(LockBackendKind::Redis, Duration::from_millis(1));
        }
        telemetry.record_release_success(LockBackendKind::Redis, Duration::from_millis(1));
        let snap = telemetry.snapshot(LockBackendKind::Redis);
        assert_eq!(snap.cumulative_acquired, 4);
        assert_eq!(snap.active_locks, 3);
        assert!((snap.contention_ratio - 0.75).abs() < 1e-9);
    }

    #[test]
    fn efficiency_grade_bands() {
        assert_eq!(EfficiencyGrade::from_score(100.0), EfficiencyGrade::Excellent);
        assert_eq!(EfficiencyGrade::from_score(90.0), EfficiencyGrade::Good);
        assert_eq!(EfficiencyGrade::from_score(75.0), EfficiencyGrade::Fair);
        assert_eq!(EfficiencyGrade::from_score(60.0), EfficiencyGrade::Poor);
        assert_eq!(EfficiencyGrade::from_score(10.0), EfficiencyGrade::Critical);
    }

    #[test]
    fn efficiency_blends_acquire_and_transaction_rates() {
        let telemetry = LockTelemetry::new();
        telemetry.record_acquire_attempt(LockBackendKind::Redis);
        telemetry.record_acquire_success(LockBackendKind::Redis, Duration::from_millis(1));
        telemetry.record_transaction_outcome(true);
        assert!((telemetry.efficiency() - 100.0).abs() < 1e-9);

        telemetry.record_transaction_outcome(false);
        // 1 success / 2 total tx = 50% at weight 0.6, acquire rate 100% at weight 0.4.
        assert!((telemetry.efficiency() - 70.0).abs() < 1e-9);
    }
}
