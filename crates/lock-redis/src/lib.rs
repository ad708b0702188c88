//! Redis-backed implementation of C2 (spec §4.2): a lease lock built on
//! `SET NX PX`-style Lua scripts over `deadpool-redis`, with watchdog-based
//! lease renewal and pub/sub release wake-up.
//!
//! # Guarantees
//!
//! Full mutual exclusion on a single Redis instance, for a lease longer
//! than the critical section. Redis Cluster/Sentinel failover can violate
//! mutual exclusion (asynchronous replication); this implementation does
//! not attempt the Redlock algorithm. For strict guarantees, use the
//! ZooKeeper backend instead.

pub mod config;
mod scripts;

pub mod lock;

pub use config::RedisConfig;
pub use lock::RedisDistributedLock;
