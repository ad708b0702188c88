use rust_decimal::Decimal;
use thiserror::Error;

use crate::backend::LockBackendKind;

/// The error taxonomy produced by the lock core and the bank orchestrator
/// (spec §7). Each variant maps to exactly one surface behavior at the HTTP
/// boundary (see `vaultlock-server::api::error_response`); no variant here
/// leaks which concrete backend or storage engine produced it verbatim to
/// clients.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("validation failed for '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("account not found: {id}")]
    AccountNotFound { id: String },

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    #[error("account '{id}' is not ACTIVE (status: {status})")]
    AccountState { id: String, status: String },

    #[error("lock wait timed out")]
    LockWaitTimeout,

    #[error("lock operation was interrupted")]
    Interrupted,

    #[error("lock backend error ({backend}): {cause}")]
    LockBackendError {
        backend: LockBackendKind,
        cause: String,
    },

    #[error("lock lost for key '{key}': {cause}")]
    LockLost { key: String, cause: String },

    #[error("storage version conflict on '{key}': expected {expected}, found {found}")]
    StorageConflict {
        key: String,
        expected: u64,
        found: u64,
    },

    #[error("unsupported lock backend: {0}")]
    UnsupportedBackend(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(LockBackendKind),

    #[error("backend switch did not fully drain the outgoing backend")]
    SwitchIncomplete,

    #[error("internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Backend-agnostic message suitable for clients (spec §7:
    /// "No error is allowed to leak the source-language identity of the
    /// backend to clients; messages refer to \"the lock system\"").
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::LockWaitTimeout => "system busy, retry".to_string(),
            Self::Interrupted => "operation was interrupted, retry".to_string(),
            Self::LockBackendError { .. } | Self::LockLost { .. } => {
                "the lock system is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_hides_backend_identity() {
        let err = VaultError::LockBackendError {
            backend: LockBackendKind::ZooKeeper,
            cause: "session expired on ensemble node 3".into(),
        };
        let msg = err.client_message();
        assert!(!msg.contains("zookeeper"));
        assert!(!msg.contains("ensemble"));
    }

    #[test]
    fn timeout_message_is_backend_agnostic() {
        assert_eq!(VaultError::LockWaitTimeout.client_message(), "system busy, retry");
    }
}
