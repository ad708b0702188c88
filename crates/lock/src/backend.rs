use std::time::Duration;

use async_trait::async_trait;

use vaultlock_core::{LockBackendKind, LockKey, VaultError};

/// Result of an acquire attempt (spec §4.1). Backend errors are not a
/// variant here; they propagate as `Err(VaultError::LockBackendError)`,
/// matching the teacher's `Result<_, StateError>` convention rather than
/// encoding every outcome as enum data.
#[derive(Debug)]
pub enum AcquireOutcome {
    Acquired(Box<dyn LockHandle>),
    WaitTimeout,
    Interrupted,
}

impl AcquireOutcome {
    #[must_use]
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }
}

/// Result of a release attempt (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    NotHeldByCaller,
}

/// Summary of a [`LockBackend::drain_local_handles`] call, made during a
/// backend switch (C4, spec §4.4: "drains in-process lock handles held by
/// the outgoing backend"). A non-zero `failed` causes the switch to report
/// `SWITCH_INCOMPLETE` while the new backend is still installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub released: usize,
    pub failed: usize,
}

impl DrainReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// A capability contract over a lock backend (spec §4.1, §9: "capability
/// set rather than a class hierarchy"). Both the Redis lease backend and
/// the ZooKeeper sequential backend implement this despite differing
/// leasing models.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Block up to `wait` attempting to acquire `key`. On success the lock
    /// is held until released or until `lease` elapses without renewal
    /// (backend permitting -- ZooKeeper ignores `lease`, see its module docs).
    async fn try_acquire(
        &self,
        key: &LockKey,
        wait: Duration,
        lease: Duration,
    ) -> Result<AcquireOutcome, VaultError>;

    /// Best-effort global check; may race with a concurrent release
    /// (spec §4.1).
    async fn is_held_anywhere(&self, key: &LockKey) -> Result<bool, VaultError>;

    /// Which backend variant this is, for telemetry tagging and the
    /// transaction row's `backend_tag`.
    fn backend_kind(&self) -> LockBackendKind;

    /// Release every lock this backend instance currently holds in-process,
    /// called by the registry immediately before installing a replacement
    /// backend (spec §4.4). Best-effort: a lock this process can no longer
    /// reach (e.g. a connection already gone) counts against `failed`
    /// rather than panicking the switch.
    async fn drain_local_handles(&self) -> DrainReport;
}

/// In-process bookkeeping for a currently held lock (the Lock Handle, LH,
/// of spec §3). Exclusively owned by the process/context that acquired it.
#[async_trait]
pub trait LockHandle: Send + Sync {
    fn key(&self) -> &LockKey;

    /// Release the lock. Idempotent from the caller's standpoint only when
    /// called by the owner (I2); non-owner calls return `NotHeldByCaller`
    /// and never mutate backend state (spec P5).
    async fn release(self: Box<Self>) -> Result<ReleaseOutcome, VaultError>;

    /// Authoritative for the calling context (spec §4.1).
    async fn is_held_by_caller(&self) -> Result<bool, VaultError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Object-safety check, same pattern as the teacher's lock.rs tests.
    fn _assert_dyn_lock_backend(_: &dyn LockBackend) {}
    fn _assert_dyn_lock_handle(_: &dyn LockHandle) {}
}
