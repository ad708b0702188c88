use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;
use zookeeper_client as zk;

use vaultlock_core::{LockBackendKind, LockKey, VaultError};
use vaultlock_lock::backend::{AcquireOutcome, DrainReport, LockBackend, LockHandle, ReleaseOutcome};
use vaultlock_lock::{current_caller, current_cancellation};

use crate::config::ZookeeperConfig;

const CHILD_PREFIX: &str = "lock-";

struct HoldState {
    caller: Uuid,
    node_path: String,
    depth: u32,
    lost: Arc<AtomicBool>,
}

struct Inner {
    client: zk::Client,
    config: ZookeeperConfig,
    holds: DashMap<LockKey, HoldState>,
}

/// ZooKeeper-backed lock (C3, spec §3) using ephemeral sequential children
/// under a persistent per-key parent znode, the standard ZooKeeper
/// recipe: lowest sequence number owns the lock, everyone else watches
/// their immediate predecessor (spec §4.3).
pub struct ZookeeperDistributedLock {
    inner: Arc<Inner>,
}

impl ZookeeperDistributedLock {
    pub async fn connect(config: ZookeeperConfig) -> Result<Self, VaultError> {
        let client = Self::connect_with_retry(&config).await?;
        let inner = Arc::new(Inner { client, config, holds: DashMap::new() });
        spawn_session_watcher(Arc::downgrade(&inner));
        Ok(Self { inner })
    }

    /// Connect to the ensemble, retrying on failure per `config.retry`
    /// (spec §6: `backend.zookeeper.retry.*`) with exponential backoff
    /// capped at `max_sleep`.
    async fn connect_with_retry(config: &ZookeeperConfig) -> Result<zk::Client, VaultError> {
        let mut attempt = 0u32;
        loop {
            let connect = zk::Client::builder().with_session_timeout(config.session_timeout).connect(&config.connect_string);
            let result = timeout(config.connect_timeout, connect).await;
            match result {
                Ok(Ok(client)) => return Ok(client),
                Ok(Err(err)) if attempt >= config.retry.max_retries => {
                    return Err(VaultError::LockBackendError { backend: LockBackendKind::ZooKeeper, cause: err.to_string() });
                }
                Err(_) if attempt >= config.retry.max_retries => {
                    return Err(VaultError::LockBackendError {
                        backend: LockBackendKind::ZooKeeper,
                        cause: "connect timed out".to_string(),
                    });
                }
                Ok(Err(err)) => {
                    warn!(attempt, error = %err, "zookeeper connect attempt failed, retrying");
                }
                Err(_) => {
                    warn!(attempt, "zookeeper connect attempt timed out, retrying");
                }
            }

            let backoff = config.retry.base_sleep.saturating_mul(1u32 << attempt.min(16)).min(config.retry.max_sleep);
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    async fn ensure_parent(&self, path: &str) -> Result<(), VaultError> {
        let options = zk::CreateOptions::new(zk::CreateMode::Persistent, zk::Acls::anyone_all());
        match self.inner.client.create(path, b"", &options).await {
            Ok(_) | Err(zk::Error::NodeExists) => Ok(()),
            Err(err) => Err(VaultError::LockBackendError { backend: LockBackendKind::ZooKeeper, cause: err.to_string() }),
        }
    }
}

#[async_trait]
impl LockBackend for ZookeeperDistributedLock {
    async fn try_acquire(&self, key: &LockKey, wait: Duration, _lease: Duration) -> Result<AcquireOutcome, VaultError> {
        let caller = current_caller();

        if let Some(mut state) = self.inner.holds.get_mut(key) {
            if state.caller == caller && !state.lost.load(Ordering::SeqCst) {
                state.depth += 1;
                debug!(%key, depth = state.depth, "reentrant acquire satisfied locally");
                return Ok(AcquireOutcome::Acquired(Box::new(ZookeeperLockHandle {
                    key: key.clone(),
                    inner: Arc::clone(&self.inner),
                })));
            }
        }

        let parent = self.inner.config.parent_path(key.as_str());
        self.ensure_parent(&parent).await?;

        let child_path = format!("{parent}/{CHILD_PREFIX}");
        let options = zk::CreateOptions::new(zk::CreateMode::EphemeralSequential, zk::Acls::anyone_all());
        let (_, node_path) = self
            .inner
            .client
            .create(&child_path, caller.as_bytes(), &options)
            .await
            .map_err(|err| VaultError::LockBackendError { backend: LockBackendKind::ZooKeeper, cause: err.to_string() })?;

        let deadline = Instant::now() + wait;
        let cancellation = current_cancellation();

        loop {
            let children = self
                .inner
                .client
                .list_children(&parent)
                .await
                .map_err(|err| VaultError::LockBackendError { backend: LockBackendKind::ZooKeeper, cause: err.to_string() })?;

            let mut ordered = children
                .into_iter()
                .filter_map(|name| sequence_number(&name).map(|seq| (seq, name)))
                .collect::<Vec<_>>();
            ordered.sort_by_key(|(seq, _)| *seq);

            let own_name = node_name(&node_path);
            let own_index = ordered.iter().position(|(_, name)| name == own_name);

            let Some(own_index) = own_index else {
                return Err(VaultError::LockBackendError {
                    backend: LockBackendKind::ZooKeeper,
                    cause: "own sequential node vanished before acquisition".to_string(),
                });
            };

            if own_index == 0 {
                let lost = Arc::new(AtomicBool::new(false));
                self.inner.holds.insert(key.clone(), HoldState { caller, node_path, depth: 1, lost });
                return Ok(AcquireOutcome::Acquired(Box::new(ZookeeperLockHandle {
                    key: key.clone(),
                    inner: Arc::clone(&self.inner),
                })));
            }

            let (_, predecessor_name) = &ordered[own_index - 1];
            let predecessor_path = format!("{parent}/{predecessor_name}");

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.cleanup_orphan(&node_path).await;
                return Ok(AcquireOutcome::WaitTimeout);
            }

            let (stat, watcher) = match self.inner.client.check_and_watch_stat(&predecessor_path).await {
                Ok(result) => result,
                Err(err) => {
                    self.cleanup_orphan(&node_path).await;
                    return Err(VaultError::LockBackendError {
                        backend: LockBackendKind::ZooKeeper,
                        cause: err.to_string(),
                    });
                }
            };

            if stat.is_none() {
                // Predecessor already gone; re-list immediately.
                continue;
            }

            tokio::select! {
                _ = watcher.changed() => {}
                () = tokio::time::sleep(remaining) => {
                    self.cleanup_orphan(&node_path).await;
                    return Ok(AcquireOutcome::WaitTimeout);
                }
                () = cancellation.cancelled() => {
                    self.cleanup_orphan(&node_path).await;
                    return Ok(AcquireOutcome::Interrupted);
                }
            }
        }
    }

    async fn is_held_anywhere(&self, key: &LockKey) -> Result<bool, VaultError> {
        let parent = self.inner.config.parent_path(key.as_str());
        match self.inner.client.list_children(&parent).await {
            Ok(children) => Ok(!children.is_empty()),
            Err(zk::Error::NoNode) => Ok(false),
            Err(err) => Err(VaultError::LockBackendError { backend: LockBackendKind::ZooKeeper, cause: err.to_string() }),
        }
    }

    fn backend_kind(&self) -> LockBackendKind {
        LockBackendKind::ZooKeeper
    }

    /// Release every sequential node this process currently owns (spec
    /// §4.4). A node already gone (`NoNode`) counts as released, matching
    /// `ZookeeperLockHandle::release`'s own handling of that case.
    async fn drain_local_handles(&self) -> DrainReport {
        let keys: Vec<LockKey> = self.inner.holds.iter().map(|entry| entry.key().clone()).collect();
        let mut report = DrainReport::default();

        for key in keys {
            let Some((_, state)) = self.inner.holds.remove(&key) else { continue };
            match self.inner.client.delete(&state.node_path, None).await {
                Ok(()) | Err(zk::Error::NoNode) => report.released += 1,
                Err(err) => {
                    warn!(%key, error = %err, "drain failed to release held lock");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

impl ZookeeperDistributedLock {
    /// Best-effort delete of a sequential node we created but never came to
    /// own, so a timed-out or cancelled acquire never leaves an orphaned
    /// child behind to permanently block whoever is now at the head of the
    /// queue (spec §5, "Cancellation").
    async fn cleanup_orphan(&self, node_path: &str) {
        if let Err(err) = self.inner.client.delete(node_path, None).await {
            warn!(node_path, error = %err, "failed to clean up orphaned sequential node");
        }
    }
}

fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn sequence_number(name: &str) -> Option<i64> {
    if !name.starts_with(CHILD_PREFIX) {
        return None;
    }
    name[CHILD_PREFIX.len()..].parse::<i64>().ok()
}

/// Watches the client's session-state stream; on `Expired` every local hold
/// is marked lost, since the ephemeral nodes behind them are already gone
/// and a new session would not own them (I5). Holds a `Weak` reference so
/// it exits once the backend itself is dropped rather than keeping it
/// alive forever.
fn spawn_session_watcher(weak: Weak<Inner>) {
    tokio::spawn(async move {
        loop {
            let Some(inner) = weak.upgrade() else { return };
            let mut watcher = inner.client.state_watcher();
            drop(inner);

            let state = watcher.changed().await;
            let Some(inner) = weak.upgrade() else { return };
            if state == zk::SessionState::Expired {
                warn!("zookeeper session expired, marking all local holds lost");
                for mut entry in inner.holds.iter_mut() {
                    entry.lost.store(true, Ordering::SeqCst);
                }
            }
        }
    });
}

struct ZookeeperLockHandle {
    key: LockKey,
    inner: Arc<Inner>,
}

#[async_trait]
impl LockHandle for ZookeeperLockHandle {
    fn key(&self) -> &LockKey {
        &self.key
    }

    async fn release(self: Box<Self>) -> Result<ReleaseOutcome, VaultError> {
        let caller = current_caller();

        let should_release_backend = {
            let Some(mut state) = self.inner.holds.get_mut(&self.key) else {
                return Ok(ReleaseOutcome::NotHeldByCaller);
            };
            if state.caller != caller {
                return Ok(ReleaseOutcome::NotHeldByCaller);
            }
            if state.lost.load(Ordering::SeqCst) {
                drop(state);
                self.inner.holds.remove(&self.key);
                return Ok(ReleaseOutcome::NotHeldByCaller);
            }
            state.depth = state.depth.saturating_sub(1);
            state.depth == 0
        };

        if !should_release_backend {
            return Ok(ReleaseOutcome::Released);
        }

        let Some((_, state)) = self.inner.holds.remove(&self.key) else {
            return Ok(ReleaseOutcome::NotHeldByCaller);
        };

        match self.inner.client.delete(&state.node_path, None).await {
            Ok(()) | Err(zk::Error::NoNode) => Ok(ReleaseOutcome::Released),
            Err(err) => Err(VaultError::LockBackendError { backend: LockBackendKind::ZooKeeper, cause: err.to_string() }),
        }
    }

    async fn is_held_by_caller(&self) -> Result<bool, VaultError> {
        let caller = current_caller();
        Ok(self
            .inner
            .holds
            .get(&self.key)
            .map(|state| state.caller == caller && !state.lost.load(Ordering::SeqCst))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_number_parses_prefixed_digits() {
        assert_eq!(sequence_number("lock-0000000007"), Some(7));
        assert_eq!(sequence_number("other-0000000007"), None);
        assert_eq!(sequence_number("lock-notanumber"), None);
    }

    #[test]
    fn node_name_strips_parent_path() {
        assert_eq!(node_name("/vaultlock/locks/account_lock:a/lock-0000000003"), "lock-0000000003");
        assert_eq!(node_name("lock-0000000003"), "lock-0000000003");
    }
}
