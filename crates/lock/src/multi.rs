use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use vaultlock_core::{LockBackendKind, LockKey, VaultError};

use crate::backend::{AcquireOutcome, LockBackend, LockHandle, ReleaseOutcome};
use crate::telemetry::{FailureReason, LockTelemetry};

/// A set of locks held in deterministic acquisition order (C5, spec §4.5).
///
/// Released in reverse acquisition order on [`release_all`](Self::release_all),
/// which also feeds the `release_*` and `hold_duration` telemetry (spec
/// §4.7) for every key. Dropping a guard without releasing it leaks the
/// handles to the backend's own lease/session expiry; callers should always
/// call `release_all`.
pub struct MultiLockGuard<'a> {
    held: Vec<(Box<dyn LockHandle>, Instant)>,
    backend_kind: LockBackendKind,
    telemetry: &'a LockTelemetry,
}

impl<'a> MultiLockGuard<'a> {
    /// The keys currently held, in acquisition (ascending) order.
    #[must_use]
    pub fn keys(&self) -> Vec<&LockKey> {
        self.held.iter().map(|(h, _)| h.key()).collect()
    }

    /// Release every held lock in reverse acquisition order. Individual
    /// release errors are logged but never propagated -- per spec §4.5,
    /// "release errors on individual keys are logged but do not mask the
    /// critical-section outcome."
    pub async fn release_all(self) {
        for (handle, acquired_at) in self.held.into_iter().rev() {
            let key = handle.key().clone();
            self.telemetry.record_release_attempt(self.backend_kind);
            match handle.release().await {
                Ok(ReleaseOutcome::Released) => {
                    self.telemetry.record_release_success(self.backend_kind, acquired_at.elapsed());
                }
                Ok(outcome) => {
                    self.telemetry.record_release_failure(self.backend_kind);
                    warn!(%key, ?outcome, "release during multi-lock unwind was not clean");
                }
                Err(err) => {
                    self.telemetry.record_release_failure(self.backend_kind);
                    warn!(%key, error = %err, "failed to release lock during multi-lock unwind");
                }
            }
        }
    }
}

/// Acquire `keys` in deterministic byte-lexicographic order (spec §4.5
/// step 1), discharging the circular-wait condition that would otherwise
/// let a concurrent reverse-direction operation deadlock against this one.
///
/// On any failure (`WAIT_TIMEOUT`, `INTERRUPTED`, or backend error), already
/// acquired locks are released in reverse order before returning `Err`.
pub async fn acquire_ordered<'a>(
    backend: &dyn LockBackend,
    keys: &[LockKey],
    wait: Duration,
    lease: Duration,
    telemetry: &'a LockTelemetry,
) -> Result<MultiLockGuard<'a>, VaultError> {
    let ordered = vaultlock_core::lock_key::total_order(keys.to_vec());
    let backend_kind = backend.backend_kind();
    let mut held: Vec<(Box<dyn LockHandle>, Instant)> = Vec::with_capacity(ordered.len());

    for key in &ordered {
        telemetry.record_acquire_attempt(backend_kind);
        let started = Instant::now();

        let outcome = backend.try_acquire(key, wait, lease).await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                telemetry.record_acquire_failure(backend_kind, FailureReason::Error);
                warn!(%key, error = %err, "multi-lock acquire aborted on backend error, rolling back");
                rollback(held, backend_kind, telemetry).await;
                return Err(err);
            }
        };

        match outcome {
            AcquireOutcome::Acquired(handle) => {
                telemetry.record_acquire_success(backend_kind, started.elapsed());
                held.push((handle, Instant::now()));
            }
            AcquireOutcome::WaitTimeout => {
                telemetry.record_acquire_failure(backend_kind, FailureReason::Timeout);
                info!(%key, "multi-lock acquire timed out, rolling back");
                rollback(held, backend_kind, telemetry).await;
                return Err(VaultError::LockWaitTimeout);
            }
            AcquireOutcome::Interrupted => {
                telemetry.record_acquire_failure(backend_kind, FailureReason::Interrupted);
                info!(%key, "multi-lock acquire interrupted, rolling back");
                rollback(held, backend_kind, telemetry).await;
                return Err(VaultError::Interrupted);
            }
        }
    }

    Ok(MultiLockGuard { held, backend_kind, telemetry })
}

async fn rollback(held: Vec<(Box<dyn LockHandle>, Instant)>, backend_kind: LockBackendKind, telemetry: &LockTelemetry) {
    for (handle, acquired_at) in held.into_iter().rev() {
        let key = handle.key().clone();
        telemetry.record_release_attempt(backend_kind);
        match handle.release().await {
            Ok(ReleaseOutcome::Released) => {
                telemetry.record_release_success(backend_kind, acquired_at.elapsed());
            }
            Ok(outcome) => {
                telemetry.record_release_failure(backend_kind);
                warn!(%key, ?outcome, "release during rollback was not clean");
            }
            Err(err) => {
                telemetry.record_release_failure(backend_kind);
                warn!(%key, error = %err, "failed to release lock during rollback");
            }
        }
    }
}

/// Acquire `keys` in order, run `critical_section`, then release in reverse
/// order regardless of whether the critical section succeeded (spec §4.5
/// steps 3-4).
pub async fn with_ordered_locks<F, Fut, T>(
    backend: &dyn LockBackend,
    keys: &[LockKey],
    wait: Duration,
    lease: Duration,
    telemetry: &LockTelemetry,
    critical_section: F,
) -> Result<T, VaultError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, VaultError>>,
{
    let guard = acquire_ordered(backend, keys, wait, lease, telemetry).await?;
    let result = critical_section().await;
    guard.release_all().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    /// An in-memory test double backend that records acquisition order and
    /// can be made to fail on a specific key to exercise rollback.
    struct FakeBackend {
        fail_on: Option<LockKey>,
        order: Arc<std::sync::Mutex<Vec<String>>>,
        release_count: Arc<AtomicU32>,
    }

    struct FakeHandle {
        key: LockKey,
        order: Arc<std::sync::Mutex<Vec<String>>>,
        release_count: Arc<AtomicU32>,
    }

    #[async_trait]
    impl LockHandle for FakeHandle {
        fn key(&self) -> &LockKey {
            &self.key
        }

        async fn release(self: Box<Self>) -> Result<ReleaseOutcome, VaultError> {
            self.order.lock().unwrap().push(format!("release:{}", self.key));
            self.release_count.fetch_add(1, Ordering::SeqCst);
            Ok(ReleaseOutcome::Released)
        }

        async fn is_held_by_caller(&self) -> Result<bool, VaultError> {
            Ok(true)
        }
    }

    #[async_trait]
    impl LockBackend for FakeBackend {
        async fn try_acquire(
            &self,
            key: &LockKey,
            _wait: Duration,
            _lease: Duration,
        ) -> Result<AcquireOutcome, VaultError> {
            if self.fail_on.as_ref() == Some(key) {
                return Ok(AcquireOutcome::WaitTimeout);
            }
            self.order.lock().unwrap().push(format!("acquire:{key}"));
            Ok(AcquireOutcome::Acquired(Box::new(FakeHandle {
                key: key.clone(),
                order: Arc::clone(&self.order),
                release_count: Arc::clone(&self.release_count),
            })))
        }

        async fn is_held_anywhere(&self, _key: &LockKey) -> Result<bool, VaultError> {
            Ok(false)
        }

        fn backend_kind(&self) -> LockBackendKind {
            LockBackendKind::Redis
        }

        async fn drain_local_handles(&self) -> crate::backend::DrainReport {
            crate::backend::DrainReport::default()
        }
    }

    #[tokio::test]
    async fn acquires_in_byte_lexicographic_order_regardless_of_input_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let backend = FakeBackend {
            fail_on: None,
            order: Arc::clone(&order),
            release_count: Arc::new(AtomicU32::new(0)),
        };
        let telemetry = LockTelemetry::new();

        let keys = vec![LockKey::new("account_lock:b"), LockKey::new("account_lock:a")];
        let guard = acquire_ordered(&backend, &keys, Duration::from_secs(1), Duration::from_secs(5), &telemetry)
            .await
            .unwrap();

        assert_eq!(guard.keys(), vec![&LockKey::new("account_lock:a"), &LockKey::new("account_lock:b")]);
        assert_eq!(
            *order.lock().unwrap(),
            vec!["acquire:account_lock:a".to_string(), "acquire:account_lock:b".to_string()]
        );
        guard.release_all().await;
    }

    #[tokio::test]
    async fn releases_in_reverse_order_on_success() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let backend = FakeBackend {
            fail_on: None,
            order: Arc::clone(&order),
            release_count: Arc::new(AtomicU32::new(0)),
        };
        let telemetry = LockTelemetry::new();
        let keys = vec![LockKey::new("a"), LockKey::new("b"), LockKey::new("c")];

        let guard = acquire_ordered(&backend, &keys, Duration::from_secs(1), Duration::from_secs(5), &telemetry)
            .await
            .unwrap();
        guard.release_all().await;

        let seq = order.lock().unwrap().clone();
        assert_eq!(
            seq,
            vec![
                "acquire:a".to_string(),
                "acquire:b".to_string(),
                "acquire:c".to_string(),
                "release:c".to_string(),
                "release:b".to_string(),
                "release:a".to_string(),
            ]
        );
        assert_eq!(telemetry.snapshot(LockBackendKind::Redis).release_success, 3);
    }

    #[tokio::test]
    async fn partial_failure_rolls_back_already_acquired_locks() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let release_count = Arc::new(AtomicU32::new(0));
        let backend = FakeBackend {
            fail_on: Some(LockKey::new("b")),
            order: Arc::clone(&order),
            release_count: Arc::clone(&release_count),
        };
        let telemetry = LockTelemetry::new();
        let keys = vec![LockKey::new("a"), LockKey::new("b")];

        let result = acquire_ordered(&backend, &keys, Duration::from_secs(1), Duration::from_secs(5), &telemetry).await;

        assert!(matches!(result, Err(VaultError::LockWaitTimeout)));
        assert_eq!(release_count.load(Ordering::SeqCst), 1, "the one acquired lock (a) must be rolled back");
    }

    #[tokio::test]
    async fn with_ordered_locks_releases_even_on_critical_section_error() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let release_count = Arc::new(AtomicU32::new(0));
        let backend = FakeBackend {
            fail_on: None,
            order: Arc::clone(&order),
            release_count: Arc::clone(&release_count),
        };
        let telemetry = LockTelemetry::new();
        let keys = vec![LockKey::new("a"), LockKey::new("b")];

        let result: Result<(), VaultError> = with_ordered_locks(
            &backend,
            &keys,
            Duration::from_secs(1),
            Duration::from_secs(5),
            &telemetry,
            || async { Err(VaultError::Internal("boom".into())) },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(release_count.load(Ordering::SeqCst), 2);
    }
}
