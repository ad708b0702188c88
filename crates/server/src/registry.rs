use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tracing::error;

use vaultlock_core::{LockBackendKind, LockKey, VaultError};
use vaultlock_lock::backend::{AcquireOutcome, DrainReport, LockBackend};

/// Result of a successful `/lock-management/switch` call (spec §4.4, §6).
#[derive(Debug, Clone, Copy)]
pub struct SwitchOutcome {
    pub previous: LockBackendKind,
    pub current: LockBackendKind,
}

/// C4: holds every backend the process was started with and the one
/// currently serving requests, and performs the drain-then-swap sequence a
/// `/lock-management/switch` call triggers (spec §4.4).
///
/// Implements [`LockBackend`] itself by forwarding to whichever backend is
/// currently installed, so `BankOrchestrator` can hold an
/// `Arc<dyn LockBackend>` that transparently survives a switch underneath
/// it.
pub struct LockRegistry {
    current: ArcSwap<dyn LockBackend>,
    backends: HashMap<LockBackendKind, Arc<dyn LockBackend>>,
}

impl LockRegistry {
    /// `backends` must contain the entry named by `active`; callers build
    /// the full set from `backend.*` configuration before constructing this.
    pub fn new(backends: HashMap<LockBackendKind, Arc<dyn LockBackend>>, active: LockBackendKind) -> Result<Self, VaultError> {
        let initial = backends.get(&active).cloned().ok_or(VaultError::BackendUnavailable(active))?;
        Ok(Self { current: ArcSwap::from(initial), backends })
    }

    /// The backend currently serving requests.
    #[must_use]
    pub fn current_backend(&self) -> Arc<dyn LockBackend> {
        self.current.load_full()
    }

    #[must_use]
    pub fn current(&self) -> LockBackendKind {
        self.current.load().backend_kind()
    }

    /// Every backend kind this process was configured with, regardless of
    /// which one is active.
    pub fn configured(&self) -> impl Iterator<Item = LockBackendKind> + '_ {
        self.backends.keys().copied()
    }

    #[must_use]
    pub fn available(&self, kind: LockBackendKind) -> bool {
        self.backends.contains_key(&kind)
    }

    /// Drain the currently active backend's in-process handles and install
    /// `target` in its place (spec §4.4). A partially failed drain leaves
    /// the previous backend installed and reports `SwitchIncomplete` rather
    /// than risking two backends believing they hold the same lock.
    pub async fn switch_to(&self, target: LockBackendKind) -> Result<SwitchOutcome, VaultError> {
        let replacement = self.backends.get(&target).cloned().ok_or(VaultError::BackendUnavailable(target))?;
        let outgoing = self.current.load_full();
        let previous = outgoing.backend_kind();

        if previous == target {
            return Ok(SwitchOutcome { previous, current: target });
        }

        let report = outgoing.drain_local_handles().await;
        if !report.is_complete() {
            error!(
                from = %previous,
                to = %target,
                released = report.released,
                failed = report.failed,
                "backend switch aborted: outgoing backend failed to drain all held locks"
            );
            return Err(VaultError::SwitchIncomplete);
        }

        self.current.store(replacement);
        Ok(SwitchOutcome { previous, current: target })
    }
}

#[async_trait]
impl LockBackend for LockRegistry {
    async fn try_acquire(&self, key: &LockKey, wait: Duration, lease: Duration) -> Result<AcquireOutcome, VaultError> {
        self.current_backend().try_acquire(key, wait, lease).await
    }

    async fn is_held_anywhere(&self, key: &LockKey) -> Result<bool, VaultError> {
        self.current_backend().is_held_anywhere(key).await
    }

    fn backend_kind(&self) -> LockBackendKind {
        self.current()
    }

    async fn drain_local_handles(&self) -> DrainReport {
        self.current_backend().drain_local_handles().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use vaultlock_lock::backend::{LockHandle, ReleaseOutcome};

    struct StubBackend {
        kind: LockBackendKind,
        drain_failures: usize,
    }

    struct StubHandle {
        key: LockKey,
    }

    #[async_trait]
    impl LockHandle for StubHandle {
        fn key(&self) -> &LockKey {
            &self.key
        }
        async fn release(self: Box<Self>) -> Result<ReleaseOutcome, VaultError> {
            Ok(ReleaseOutcome::Released)
        }
        async fn is_held_by_caller(&self) -> Result<bool, VaultError> {
            Ok(true)
        }
    }

    #[async_trait]
    impl LockBackend for StubBackend {
        async fn try_acquire(&self, key: &LockKey, _wait: Duration, _lease: Duration) -> Result<AcquireOutcome, VaultError> {
            Ok(AcquireOutcome::Acquired(Box::new(StubHandle { key: key.clone() })))
        }
        async fn is_held_anywhere(&self, _key: &LockKey) -> Result<bool, VaultError> {
            Ok(false)
        }
        fn backend_kind(&self) -> LockBackendKind {
            self.kind
        }
        async fn drain_local_handles(&self) -> DrainReport {
            if self.drain_failures > 0 {
                DrainReport { released: 0, failed: self.drain_failures }
            } else {
                DrainReport { released: 1, failed: 0 }
            }
        }
    }

    fn backends(redis_failures: usize) -> HashMap<LockBackendKind, Arc<dyn LockBackend>> {
        let mut map: HashMap<LockBackendKind, Arc<dyn LockBackend>> = HashMap::new();
        map.insert(LockBackendKind::Redis, Arc::new(StubBackend { kind: LockBackendKind::Redis, drain_failures: redis_failures }));
        map.insert(LockBackendKind::ZooKeeper, Arc::new(StubBackend { kind: LockBackendKind::ZooKeeper, drain_failures: 0 }));
        map
    }

    #[tokio::test]
    async fn switch_succeeds_and_updates_current() {
        let registry = LockRegistry::new(backends(0), LockBackendKind::Redis).unwrap();
        assert_eq!(registry.current(), LockBackendKind::Redis);

        let outcome = registry.switch_to(LockBackendKind::ZooKeeper).await.unwrap();
        assert_eq!(outcome.previous, LockBackendKind::Redis);
        assert_eq!(outcome.current, LockBackendKind::ZooKeeper);
        assert_eq!(registry.current(), LockBackendKind::ZooKeeper);
    }

    #[tokio::test]
    async fn switch_to_same_backend_is_a_no_op() {
        let registry = LockRegistry::new(backends(0), LockBackendKind::Redis).unwrap();
        let outcome = registry.switch_to(LockBackendKind::Redis).await.unwrap();
        assert_eq!(outcome.previous, LockBackendKind::Redis);
        assert_eq!(outcome.current, LockBackendKind::Redis);
    }

    #[tokio::test]
    async fn failed_drain_leaves_previous_backend_installed() {
        let registry = LockRegistry::new(backends(2), LockBackendKind::Redis).unwrap();
        let err = registry.switch_to(LockBackendKind::ZooKeeper).await.unwrap_err();
        assert!(matches!(err, VaultError::SwitchIncomplete));
        assert_eq!(registry.current(), LockBackendKind::Redis);
    }

    #[tokio::test]
    async fn switch_to_unconfigured_backend_fails() {
        let mut only_redis: HashMap<LockBackendKind, Arc<dyn LockBackend>> = HashMap::new();
        only_redis.insert(LockBackendKind::Redis, Arc::new(StubBackend { kind: LockBackendKind::Redis, drain_failures: 0 }));
        let registry = LockRegistry::new(only_redis, LockBackendKind::Redis).unwrap();
        let err = registry.switch_to(LockBackendKind::ZooKeeper).await.unwrap_err();
        assert!(matches!(err, VaultError::BackendUnavailable(LockBackendKind::ZooKeeper)));
    }
}
