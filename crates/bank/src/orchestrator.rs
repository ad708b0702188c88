use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{info, warn};

use vaultlock_core::{Account, AccountId, TransactionKind, TransactionRecord, TransactionState, VaultError};
use vaultlock_lock::{with_ordered_locks, LockBackend, LockTelemetry};

use crate::store::AccountStore;
use crate::transactions::TransactionStore;

/// Bounds on the wait/lease budgets C6 hands to C5 for a single operation
/// (spec §6: `lock.defaultWaitBudget`/`lock.defaultLeaseBudget`).
#[derive(Debug, Clone, Copy)]
pub struct LockBudgets {
    pub wait: Duration,
    pub lease: Duration,
}

impl Default for LockBudgets {
    fn default() -> Self {
        Self { wait: Duration::from_secs(5), lease: Duration::from_secs(10) }
    }
}

/// Largest amount a single transfer/withdrawal may move (spec §6).
const MAX_AMOUNT: &str = "1000000";

/// Validate a money amount: positive, at most two fractional digits, and
/// not exceeding the configured ceiling (spec §6).
fn validate_amount(amount: Decimal) -> Result<(), VaultError> {
    if amount <= Decimal::ZERO {
        return Err(VaultError::Validation { field: "amount".into(), reason: "must be greater than zero".into() });
    }
    if amount.scale() > 2 {
        return Err(VaultError::Validation { field: "amount".into(), reason: "must have at most 2 fractional digits".into() });
    }
    let max: Decimal = MAX_AMOUNT.parse().expect("constant parses");
    if amount > max {
        return Err(VaultError::Validation { field: "amount".into(), reason: format!("must not exceed {max}") });
    }
    Ok(())
}

/// Orchestrates the transfer/withdraw business operations (C6, spec §4.6):
/// validate, pre-check, persist a PENDING transaction row, enter the C5
/// multi-lock coordinator, mutate account rows under a storage transaction,
/// and transition the transaction row to its terminal state.
pub struct BankOrchestrator {
    accounts: Arc<dyn AccountStore>,
    transactions: Arc<dyn TransactionStore>,
    locks: Arc<dyn LockBackend>,
    telemetry: Arc<LockTelemetry>,
    budgets: LockBudgets,
}

impl BankOrchestrator {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        transactions: Arc<dyn TransactionStore>,
        locks: Arc<dyn LockBackend>,
        telemetry: Arc<LockTelemetry>,
        budgets: LockBudgets,
    ) -> Self {
        Self { accounts, transactions, locks, telemetry, budgets }
    }

    /// Move `amount` from `from` to `to` (spec §4.6).
    pub async fn transfer(&self, from: AccountId, to: AccountId, amount: Decimal) -> Result<TransactionRecord, VaultError> {
        if from == to {
            return Err(VaultError::Validation { field: "to".into(), reason: "must differ from 'from'".into() });
        }
        validate_amount(amount)?;

        let from_account = self.accounts.get_account(&from).await?;
        let to_account = self.accounts.get_account(&to).await?;
        require_preflight(&from_account, &to_account, amount)?;

        let mut record = TransactionRecord::new_pending(TransactionKind::Transfer, Some(from.clone()), Some(to.clone()), amount, self.locks.backend_kind());
        self.transactions.insert(&record).await?;
        self.transactions.transition(record.id, TransactionState::Processing, "entering multi-lock coordinator").await?;
        record.transition(TransactionState::Processing, "entering multi-lock coordinator");

        let keys = [from.lock_key(), to.lock_key()];
        let accounts = Arc::clone(&self.accounts);
        let from_for_section = from.clone();
        let to_for_section = to.clone();

        let outcome = with_ordered_locks(self.locks.as_ref(), &keys, self.budgets.wait, self.budgets.lease, &self.telemetry, || async move {
            accounts.apply_transfer(&from_for_section, &to_for_section, amount).await
        })
        .await;

        self.finish(record, outcome.map(|_| ())).await
    }

    /// Debit `account` by `amount` (spec §4.6).
    pub async fn withdraw(&self, account: AccountId, amount: Decimal) -> Result<TransactionRecord, VaultError> {
        validate_amount(amount)?;

        let current = self.accounts.get_account(&account).await?;
        require_active_and_sufficient(&current, amount)?;

        let mut record = TransactionRecord::new_pending(TransactionKind::Withdrawal, Some(account.clone()), None, amount, self.locks.backend_kind());
        self.transactions.insert(&record).await?;
        self.transactions.transition(record.id, TransactionState::Processing, "entering multi-lock coordinator").await?;
        record.transition(TransactionState::Processing, "entering multi-lock coordinator");

        let keys = [account.lock_key()];
        let accounts = Arc::clone(&self.accounts);
        let account_for_section = account.clone();

        let outcome = with_ordered_locks(self.locks.as_ref(), &keys, self.budgets.wait, self.budgets.lease, &self.telemetry, || async move {
            accounts.apply_withdrawal(&account_for_section, amount).await
        })
        .await;

        self.finish(record, outcome.map(|_| ())).await
    }

    /// Transition `record` to its terminal state based on `outcome`,
    /// recording the transaction-success telemetry that feeds `efficiency`
    /// (spec §4.7), and persist the transition.
    async fn finish(&self, mut record: TransactionRecord, outcome: Result<(), VaultError>) -> Result<TransactionRecord, VaultError> {
        match outcome {
            Ok(()) => {
                self.transactions.transition(record.id, TransactionState::Completed, "ok").await?;
                record.transition(TransactionState::Completed, "ok");
                self.telemetry.record_transaction_outcome(true);
                info!(transaction_id = %record.id, kind = %record.kind, "transaction completed");
                Ok(record)
            }
            Err(err) => {
                let reason = err.to_string();
                if let Err(store_err) = self.transactions.transition(record.id, TransactionState::Failed, &reason).await {
                    warn!(transaction_id = %record.id, error = %store_err, "failed to persist FAILED transition");
                }
                record.transition(TransactionState::Failed, &reason);
                self.telemetry.record_transaction_outcome(false);
                warn!(transaction_id = %record.id, error = %err, "transaction failed");
                Err(err)
            }
        }
    }
}

fn require_preflight(from: &Account, to: &Account, amount: Decimal) -> Result<(), VaultError> {
    if !from.status.is_active() {
        return Err(VaultError::AccountState { id: from.id.as_str().to_string(), status: from.status.to_string() });
    }
    if !to.status.is_active() {
        return Err(VaultError::AccountState { id: to.id.as_str().to_string(), status: to.status.to_string() });
    }
    if from.balance < amount {
        return Err(VaultError::InsufficientFunds { requested: amount, available: from.balance });
    }
    Ok(())
}

fn require_active_and_sufficient(account: &Account, amount: Decimal) -> Result<(), VaultError> {
    if !account.status.is_active() {
        return Err(VaultError::AccountState { id: account.id.as_str().to_string(), status: account.status.to_string() });
    }
    if account.balance < amount {
        return Err(VaultError::InsufficientFunds { requested: amount, available: account.balance });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use vaultlock_core::{AccountStatus, LockBackendKind, LockKey};
    use vaultlock_lock::backend::{AcquireOutcome, LockHandle, ReleaseOutcome};

    use crate::store::InMemoryAccountStore;
    use crate::transactions::InMemoryTransactionStore;

    struct ImmediateBackend;

    struct ImmediateHandle {
        key: LockKey,
    }

    #[async_trait]
    impl LockHandle for ImmediateHandle {
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
    impl LockBackend for ImmediateBackend {
        async fn try_acquire(&self, key: &LockKey, _wait: StdDuration, _lease: StdDuration) -> Result<AcquireOutcome, VaultError> {
            Ok(AcquireOutcome::Acquired(Box::new(ImmediateHandle { key: key.clone() })))
        }
        async fn is_held_anywhere(&self, _key: &LockKey) -> Result<bool, VaultError> {
            Ok(false)
        }
        fn backend_kind(&self) -> LockBackendKind {
            LockBackendKind::Redis
        }

        async fn drain_local_handles(&self) -> vaultlock_lock::DrainReport {
            vaultlock_lock::DrainReport::default()
        }
    }

    fn orchestrator() -> (BankOrchestrator, Arc<InMemoryAccountStore>) {
        let accounts = Arc::new(InMemoryAccountStore::new());
        accounts.seed(Account { id: AccountId::parse("a").unwrap(), balance: "100.00".parse().unwrap(), status: AccountStatus::Active, version: 1 });
        accounts.seed(Account { id: AccountId::parse("b").unwrap(), balance: "10.00".parse().unwrap(), status: AccountStatus::Active, version: 1 });

        let orchestrator = BankOrchestrator::new(
            Arc::clone(&accounts) as Arc<dyn AccountStore>,
            Arc::new(InMemoryTransactionStore::new()),
            Arc::new(ImmediateBackend),
            Arc::new(LockTelemetry::new()),
            LockBudgets::default(),
        );
        (orchestrator, accounts)
    }

    #[tokio::test]
    async fn transfer_completes_and_moves_balance() {
        let (orchestrator, accounts) = orchestrator();
        let record = orchestrator.transfer(AccountId::parse("a").unwrap(), AccountId::parse("b").unwrap(), "30.00".parse().unwrap()).await.unwrap();

        assert_eq!(record.state, TransactionState::Completed);
        assert_eq!(accounts.get_account(&AccountId::parse("a").unwrap()).await.unwrap().balance, "70.00".parse().unwrap());
        assert_eq!(accounts.get_account(&AccountId::parse("b").unwrap()).await.unwrap().balance, "40.00".parse().unwrap());
    }

    #[tokio::test]
    async fn transfer_rejects_same_source_and_destination() {
        let (orchestrator, _accounts) = orchestrator();
        let err = orchestrator.transfer(AccountId::parse("a").unwrap(), AccountId::parse("a").unwrap(), "1.00".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, VaultError::Validation { .. }));
    }

    #[tokio::test]
    async fn transfer_fails_closed_on_insufficient_funds_and_marks_transaction_failed() {
        let (orchestrator, accounts) = orchestrator();
        let err = orchestrator.transfer(AccountId::parse("a").unwrap(), AccountId::parse("b").unwrap(), "999.00".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, VaultError::InsufficientFunds { .. }));
        // Balances must be untouched.
        assert_eq!(accounts.get_account(&AccountId::parse("a").unwrap()).await.unwrap().balance, "100.00".parse().unwrap());
    }

    #[tokio::test]
    async fn withdraw_debits_single_account() {
        let (orchestrator, accounts) = orchestrator();
        let record = orchestrator.withdraw(AccountId::parse("a").unwrap(), "15.00".parse().unwrap()).await.unwrap();
        assert_eq!(record.state, TransactionState::Completed);
        assert_eq!(accounts.get_account(&AccountId::parse("a").unwrap()).await.unwrap().balance, "85.00".parse().unwrap());
    }

    #[tokio::test]
    async fn amount_validation_rejects_zero_negative_and_oversized() {
        let (orchestrator, _accounts) = orchestrator();
        assert!(matches!(
            orchestrator.withdraw(AccountId::parse("a").unwrap(), Decimal::ZERO).await.unwrap_err(),
            VaultError::Validation { .. }
        ));
        assert!(matches!(
            orchestrator.withdraw(AccountId::parse("a").unwrap(), "-5.00".parse().unwrap()).await.unwrap_err(),
            VaultError::Validation { .. }
        ));
        assert!(matches!(
            orchestrator.withdraw(AccountId::parse("a").unwrap(), "1000001".parse().unwrap()).await.unwrap_err(),
            VaultError::Validation { .. }
        ));
    }
}
