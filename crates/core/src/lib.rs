//! Shared domain types for the vaultlock distributed lock service.
//!
//! This crate has no async runtime dependency and no backend-specific code;
//! it exists so the lock layer, the bank layer, and the server layer agree
//! on the same account/transaction/lock-key vocabulary.

pub mod account;
pub mod backend;
pub mod error;
pub mod lock_key;
pub mod transaction;

pub use account::{Account, AccountId, AccountStatus};
pub use backend::LockBackendKind;
pub use error::VaultError;
pub use lock_key::LockKey;
pub use transaction::{TransactionKind, TransactionRecord, TransactionState};
