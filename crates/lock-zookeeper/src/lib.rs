//! ZooKeeper ephemeral-sequential-node lock backend (C3, spec §3, §4.3).
//!
//! There is no ZooKeeper client in the teacher's dependency tree; this
//! backend is built directly on the `zookeeper-client` crate rather than
//! generalized from existing teacher code, following the pack's other
//! sequential-node/cluster-membership lock implementations.
//!
//! Unlike the Redis backend, a ZooKeeper session carries the lock's
//! liveness implicitly: the ephemeral child node disappears the instant
//! the session expires, so there is no separate lease to renew. What this
//! backend renews instead is its *belief* about ownership -- a background
//! task watches the client's session-state stream and marks every local
//! hold lost the moment the session is reported `Expired` (I5), since a
//! new session would create a fresh, unrelated ephemeral node.

pub mod config;
pub mod lock;

pub use config::ZookeeperConfig;
pub use lock::ZookeeperDistributedLock;
