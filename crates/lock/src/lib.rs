//! Backend-agnostic distributed lock abstraction (C1), the ordered
//! multi-key acquisition coordinator (C5), and lock telemetry (C7).
//!
//! Concrete backends (Redis in `vaultlock-lock-redis`, ZooKeeper in
//! `vaultlock-lock-zookeeper`) implement [`LockBackend`]/[`LockHandle`]
//! from this crate; everything above the backend boundary -- the
//! multi-lock coordinator, the bank orchestrator, the HTTP surface -- is
//! written against the trait, never a concrete backend type.

pub mod backend;
pub mod caller;
pub mod cancellation;
pub mod multi;
pub mod telemetry;

pub use backend::{AcquireOutcome, DrainReport, LockBackend, LockHandle, ReleaseOutcome};
pub use caller::{current_caller, with_caller_scope};
pub use cancellation::{current_cancellation, with_cancellation};
pub use multi::{acquire_ordered, with_ordered_locks, MultiLockGuard};
pub use telemetry::{EfficiencyGrade, FailureReason, LockTelemetry, TelemetrySnapshot};
