use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AccountId;
use crate::backend::LockBackendKind;

/// The kind of business operation a transaction row records (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum TransactionKind {
    Transfer,
    Withdrawal,
    Deposit,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Transfer => "TRANSFER",
            Self::Withdrawal => "WITHDRAWAL",
            Self::Deposit => "DEPOSIT",
        };
        f.write_str(s)
    }
}

/// Transaction state machine (spec §3):
/// `PENDING -> {PROCESSING, CANCELLED, FAILED}`, `PROCESSING -> {COMPLETED, FAILED}`.
/// `COMPLETED`, `FAILED`, and `CANCELLED` are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum TransactionState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionState {
    /// Whether `next` is a legal transition from `self`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use TransactionState::{Cancelled, Completed, Failed, Pending, Processing};
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Cancelled) | (Pending, Failed)
                | (Processing, Completed) | (Processing, Failed)
        )
    }

    /// Terminal states are sinks: no further transition is legal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled
        )
    }
}

/// A transaction row (spec §3, §6). `backend_tag` records which lock
/// backend was active when the orchestrator ran this operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TransactionRecord {
    pub id: Uuid,
    pub from: Option<AccountId>,
    pub to: Option<AccountId>,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub state: TransactionState,
    pub backend_tag: LockBackendKind,
    pub created_at: DateTime<Utc>,
    pub description: String,
}

impl TransactionRecord {
    #[must_use]
    pub fn new_pending(
        kind: TransactionKind,
        from: Option<AccountId>,
        to: Option<AccountId>,
        amount: Decimal,
        backend_tag: LockBackendKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            to,
            amount,
            kind,
            state: TransactionState::Pending,
            backend_tag,
            created_at: Utc::now(),
            description: String::new(),
        }
    }

    /// Attempt a state transition, failing if it is not legal per the
    /// state machine in spec §3.
    pub fn transition(&mut self, next: TransactionState, description: impl Into<String>) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            self.description = description.into();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use TransactionState::{Cancelled, Completed, Failed, Pending, Processing};
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
    }

    #[test]
    fn illegal_transitions() {
        use TransactionState::{Cancelled, Completed, Failed, Pending, Processing};
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Cancelled.can_transition_to(Processing));
    }

    #[test]
    fn terminal_states_are_sinks() {
        assert!(TransactionState::Completed.is_terminal());
        assert!(TransactionState::Failed.is_terminal());
        assert!(TransactionState::Cancelled.is_terminal());
        assert!(!TransactionState::Pending.is_terminal());
        assert!(!TransactionState::Processing.is_terminal());
    }

    #[test]
    fn transition_updates_description_only_if_legal() {
        let mut tx = TransactionRecord::new_pending(
            TransactionKind::Withdrawal,
            Some(AccountId::parse("a").unwrap()),
            None,
            Decimal::ONE,
            LockBackendKind::Redis,
        );
        assert!(tx.transition(TransactionState::Processing, "guarded"));
        assert_eq!(tx.description, "guarded");
        assert!(!tx.transition(TransactionState::Pending, "illegal"));
        assert_eq!(tx.state, TransactionState::Processing);
    }
}
