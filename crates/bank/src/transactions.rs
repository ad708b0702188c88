use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use vaultlock_core::{LockBackendKind, TransactionRecord, TransactionState, VaultError};

use crate::config::PostgresConfig;

/// Persists transaction rows through their `PENDING -> ... -> {COMPLETED,
/// FAILED, CANCELLED}` lifecycle (spec §4.6, §6).
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, record: &TransactionRecord) -> Result<(), VaultError>;

    /// Move `id` to `next`, recording `description`. The orchestrator is
    /// responsible for only requesting legal transitions; implementations
    /// may assume `next` is reachable from the row's current state.
    async fn transition(&self, id: Uuid, next: TransactionState, description: &str) -> Result<(), VaultError>;
}

/// An in-memory [`TransactionStore`], used for tests and for running
/// without a `PostgreSQL` instance configured.
#[derive(Default)]
pub struct InMemoryTransactionStore {
    records: Mutex<HashMap<Uuid, TransactionRecord>>,
}

impl InMemoryTransactionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<TransactionRecord> {
        self.records.lock().get(&id).cloned()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, record: &TransactionRecord) -> Result<(), VaultError> {
        self.records.lock().insert(record.id, record.clone());
        Ok(())
    }

    async fn transition(&self, id: Uuid, next: TransactionState, description: &str) -> Result<(), VaultError> {
        let mut records = self.records.lock();
        let record = records.get_mut(&id).ok_or_else(|| VaultError::Internal(format!("unknown transaction {id}")))?;
        if !record.transition(next, description) {
            return Err(VaultError::Internal(format!("illegal transition for transaction {id}: {:?} -> {next:?}", record.state)));
        }
        Ok(())
    }
}

/// `PostgreSQL`-backed [`TransactionStore`].
pub struct PostgresTransactionStore {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresTransactionStore {
    #[must_use]
    pub fn new(pool: PgPool, config: PostgresConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn insert(&self, record: &TransactionRecord) -> Result<(), VaultError> {
        let table = self.config.transactions_table();
        let query = format!(
            "INSERT INTO {table} (id, from_account, to_account, amount, kind, state, backend_tag, created_at, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        );

        sqlx::query(&query)
            .bind(record.id)
            .bind(record.from.as_ref().map(|a| a.as_str().to_string()))
            .bind(record.to.as_ref().map(|a| a.as_str().to_string()))
            .bind(record.amount)
            .bind(record.kind.to_string())
            .bind(record.state.to_string())
            .bind(record.backend_tag.as_str())
            .bind(record.created_at)
            .bind(&record.description)
            .execute(&self.pool)
            .await
            .map_err(|e| VaultError::Internal(format!("transaction insert failed: {e}")))?;

        Ok(())
    }

    async fn transition(&self, id: Uuid, next: TransactionState, description: &str) -> Result<(), VaultError> {
        let table = self.config.transactions_table();

        let current_row = sqlx::query(&format!("SELECT state FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VaultError::Internal(e.to_string()))?
            .ok_or_else(|| VaultError::Internal(format!("unknown transaction {id}")))?;

        let current_state = parse_state(current_row.get::<String, _>("state").as_str())?;
        if !current_state.can_transition_to(next) {
            return Err(VaultError::Internal(format!("illegal transition for transaction {id}: {current_state:?} -> {next:?}")));
        }

        let update = format!("UPDATE {table} SET state = $1, description = $2 WHERE id = $3");
        sqlx::query(&update)
            .bind(next.to_string())
            .bind(description)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| VaultError::Internal(format!("transaction update failed: {e}")))?;

        Ok(())
    }
}

fn parse_state(raw: &str) -> Result<TransactionState, VaultError> {
    match raw {
        "PENDING" => Ok(TransactionState::Pending),
        "PROCESSING" => Ok(TransactionState::Processing),
        "COMPLETED" => Ok(TransactionState::Completed),
        "FAILED" => Ok(TransactionState::Failed),
        "CANCELLED" => Ok(TransactionState::Cancelled),
        other => Err(VaultError::Internal(format!("unknown transaction state in storage: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use vaultlock_core::{AccountId, TransactionKind};

    #[tokio::test]
    async fn transition_updates_state_and_description() {
        let store = InMemoryTransactionStore::new();
        let record = TransactionRecord::new_pending(
            TransactionKind::Withdrawal,
            Some(AccountId::parse("a").unwrap()),
            None,
            Decimal::ONE,
            LockBackendKind::Redis,
        );
        let id = record.id;
        store.insert(&record).await.unwrap();

        store.transition(id, TransactionState::Processing, "guarded").await.unwrap();
        let updated = store.get(id).unwrap();
        assert_eq!(updated.state, TransactionState::Processing);
        assert_eq!(updated.description, "guarded");
    }

    #[tokio::test]
    async fn transition_rejects_illegal_jump() {
        let store = InMemoryTransactionStore::new();
        let record = TransactionRecord::new_pending(
            TransactionKind::Withdrawal,
            Some(AccountId::parse("a").unwrap()),
            None,
            Decimal::ONE,
            LockBackendKind::Redis,
        );
        let id = record.id;
        store.insert(&record).await.unwrap();

        let err = store.transition(id, TransactionState::Completed, "skip").await.unwrap_err();
        assert!(matches!(err, VaultError::Internal(_)));
    }
}
