use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use vaultlock_core::{Account, AccountId, AccountStatus, VaultError};

use crate::config::PostgresConfig;
use crate::migrations;

/// Re-reads and mutates account rows inside a single storage transaction
/// (spec §4.6: "re-read authoritative account rows under the storage
/// transaction, recompute balances, assert non-negative result, write both
/// updated rows"). Implementations are called from inside the C5-guarded
/// section, so the account-key locks are already held by the caller; the
/// version column here is strictly a second line of defense (I1/I4).
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, id: &AccountId) -> Result<Account, VaultError>;

    /// Debit `from` and credit `to` by `amount`, failing the whole
    /// operation (no partial write) if either account is missing,
    /// inactive, or would go negative.
    async fn apply_transfer(&self, from: &AccountId, to: &AccountId, amount: Decimal) -> Result<(Account, Account), VaultError>;

    /// Debit `id` by `amount`.
    async fn apply_withdrawal(&self, id: &AccountId, amount: Decimal) -> Result<Account, VaultError>;
}

fn require_active(account: &Account) -> Result<(), VaultError> {
    if account.status.is_active() {
        Ok(())
    } else {
        Err(VaultError::AccountState { id: account.id.as_str().to_string(), status: account.status.to_string() })
    }
}

fn debit(account: &Account, amount: Decimal) -> Result<Decimal, VaultError> {
    let new_balance = account.balance - amount;
    if new_balance < Decimal::ZERO {
        return Err(VaultError::InsufficientFunds { requested: amount, available: account.balance });
    }
    Ok(new_balance)
}

/// An in-memory [`AccountStore`], used for tests and for running without a
/// `PostgreSQL` instance configured.
pub struct InMemoryAccountStore {
    accounts: Mutex<HashMap<AccountId, Account>>,
}

impl InMemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self { accounts: Mutex::new(HashMap::new()) }
    }

    /// Seed an account, overwriting any existing row with the same id.
    pub fn seed(&self, account: Account) {
        self.accounts.lock().insert(account.id.clone(), account);
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get_account(&self, id: &AccountId) -> Result<Account, VaultError> {
        self.accounts
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::AccountNotFound { id: id.as_str().to_string() })
    }

    async fn apply_transfer(&self, from: &AccountId, to: &AccountId, amount: Decimal) -> Result<(Account, Account), VaultError> {
        let mut accounts = self.accounts.lock();

        let from_account = accounts.get(from).cloned().ok_or_else(|| VaultError::AccountNotFound { id: from.as_str().to_string() })?;
        let to_account = accounts.get(to).cloned().ok_or_else(|| VaultError::AccountNotFound { id: to.as_str().to_string() })?;
        require_active(&from_account)?;
        require_active(&to_account)?;

        let new_from_balance = debit(&from_account, amount)?;
        let new_to_balance = to_account.balance + amount;

        let updated_from = Account { balance: new_from_balance, version: from_account.version + 1, ..from_account };
        let updated_to = Account { balance: new_to_balance, version: to_account.version + 1, ..to_account };

        accounts.insert(from.clone(), updated_from.clone());
        accounts.insert(to.clone(), updated_to.clone());

        Ok((updated_from, updated_to))
    }

    async fn apply_withdrawal(&self, id: &AccountId, amount: Decimal) -> Result<Account, VaultError> {
        let mut accounts = self.accounts.lock();
        let account = accounts.get(id).cloned().ok_or_else(|| VaultError::AccountNotFound { id: id.as_str().to_string() })?;
        require_active(&account)?;

        let new_balance = debit(&account, amount)?;
        let updated = Account { balance: new_balance, version: account.version + 1, ..account };
        accounts.insert(id.clone(), updated.clone());

        Ok(updated)
    }
}

/// Build `PgConnectOptions` from a [`PostgresConfig`], applying SSL settings
/// when configured.
pub(crate) fn build_connect_options(config: &PostgresConfig) -> Result<sqlx::postgres::PgConnectOptions, VaultError> {
    let mut options: sqlx::postgres::PgConnectOptions =
        config.url.parse().map_err(|e: sqlx::Error| VaultError::Internal(format!("invalid postgres url: {e}")))?;

    if let Some(ref mode) = config.ssl_mode {
        let ssl_mode = match mode.as_str() {
            "disable" => sqlx::postgres::PgSslMode::Disable,
            "prefer" => sqlx::postgres::PgSslMode::Prefer,
            "require" => sqlx::postgres::PgSslMode::Require,
            "verify-ca" => sqlx::postgres::PgSslMode::VerifyCa,
            "verify-full" => sqlx::postgres::PgSslMode::VerifyFull,
            other => return Err(VaultError::Internal(format!("unknown ssl_mode: {other}"))),
        };
        options = options.ssl_mode(ssl_mode);
    }

    if let Some(ref path) = config.ssl_root_cert {
        options = options.ssl_root_cert(path);
    }
    if let Some(ref path) = config.ssl_cert {
        options = options.ssl_client_cert(path);
    }
    if let Some(ref path) = config.ssl_key {
        options = options.ssl_client_key(path);
    }

    Ok(options)
}

fn parse_status(raw: &str) -> Result<AccountStatus, VaultError> {
    match raw {
        "ACTIVE" => Ok(AccountStatus::Active),
        "INACTIVE" => Ok(AccountStatus::Inactive),
        "FROZEN" => Ok(AccountStatus::Frozen),
        "CLOSED" => Ok(AccountStatus::Closed),
        other => Err(VaultError::Internal(format!("unknown account status in storage: {other}"))),
    }
}

fn row_to_account(id: AccountId, balance: Decimal, status: &str, version: i64) -> Result<Account, VaultError> {
    Ok(Account { id, balance, status: parse_status(status)?, version: u64::try_from(version).unwrap_or(0) })
}

/// `PostgreSQL`-backed [`AccountStore`], grounded on the teacher's
/// `PostgresStateStore` connection/migration bootstrapping shape.
pub struct PostgresAccountStore {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresAccountStore {
    /// Connect, build the pool, and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Internal`] if pool creation or migration fails.
    pub async fn new(config: PostgresConfig) -> Result<Self, VaultError> {
        let connect_options = build_connect_options(&config)?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect_with(connect_options)
            .await
            .map_err(|e| VaultError::Internal(format!("postgres connect failed: {e}")))?;

        migrations::run_migrations(&pool, &config).await.map_err(|e| VaultError::Internal(format!("migration failed: {e}")))?;

        Ok(Self { pool, config })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool, config: PostgresConfig) -> Self {
        Self { pool, config }
    }

    fn accounts_table(&self) -> String {
        self.config.accounts_table()
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn get_account(&self, id: &AccountId) -> Result<Account, VaultError> {
        let table = self.accounts_table();
        let query = format!("SELECT id, balance, status, version FROM {table} WHERE id = $1");

        let row = sqlx::query(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VaultError::Internal(format!("account lookup failed: {e}")))?
            .ok_or_else(|| VaultError::AccountNotFound { id: id.as_str().to_string() })?;

        row_to_account(id.clone(), row.get("balance"), row.get("status"), row.get("version"))
    }

    async fn apply_transfer(&self, from: &AccountId, to: &AccountId, amount: Decimal) -> Result<(Account, Account), VaultError> {
        let table = self.accounts_table();
        let mut tx = self.pool.begin().await.map_err(|e| VaultError::Internal(format!("begin tx failed: {e}")))?;

        let select = format!("SELECT id, balance, status, version FROM {table} WHERE id = $1 FOR UPDATE");

        let from_row = sqlx::query(&select)
            .bind(from.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| VaultError::Internal(e.to_string()))?
            .ok_or_else(|| VaultError::AccountNotFound { id: from.as_str().to_string() })?;
        let to_row = sqlx::query(&select)
            .bind(to.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| VaultError::Internal(e.to_string()))?
            .ok_or_else(|| VaultError::AccountNotFound { id: to.as_str().to_string() })?;

        let from_account = row_to_account(from.clone(), from_row.get("balance"), from_row.get("status"), from_row.get("version"))?;
        let to_account = row_to_account(to.clone(), to_row.get("balance"), to_row.get("status"), to_row.get("version"))?;
        require_active(&from_account)?;
        require_active(&to_account)?;

        let new_from_balance = debit(&from_account, amount)?;
        let new_to_balance = to_account.balance + amount;

        let update = format!("UPDATE {table} SET balance = $1, version = version + 1 WHERE id = $2 AND version = $3");

        let from_result = sqlx::query(&update)
            .bind(new_from_balance)
            .bind(from.as_str())
            .bind(i64::try_from(from_account.version).unwrap_or(i64::MAX))
            .execute(&mut *tx)
            .await
            .map_err(|e| VaultError::Internal(e.to_string()))?;
        if from_result.rows_affected() == 0 {
            return Err(VaultError::StorageConflict {
                key: from.as_str().to_string(),
                expected: from_account.version,
                found: from_account.version + 1,
            });
        }

        let to_result = sqlx::query(&update)
            .bind(new_to_balance)
            .bind(to.as_str())
            .bind(i64::try_from(to_account.version).unwrap_or(i64::MAX))
            .execute(&mut *tx)
            .await
            .map_err(|e| VaultError::Internal(e.to_string()))?;
        if to_result.rows_affected() == 0 {
            return Err(VaultError::StorageConflict { key: to.as_str().to_string(), expected: to_account.version, found: to_account.version + 1 });
        }

        tx.commit().await.map_err(|e| VaultError::Internal(format!("commit failed: {e}")))?;

        Ok((
            Account { balance: new_from_balance, version: from_account.version + 1, ..from_account },
            Account { balance: new_to_balance, version: to_account.version + 1, ..to_account },
        ))
    }

    async fn apply_withdrawal(&self, id: &AccountId, amount: Decimal) -> Result<Account, VaultError> {
        let table = self.accounts_table();
        let mut tx = self.pool.begin().await.map_err(|e| VaultError::Internal(format!("begin tx failed: {e}")))?;

        let select = format!("SELECT id, balance, status, version FROM {table} WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&select)
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| VaultError::Internal(e.to_string()))?
            .ok_or_else(|| VaultError::AccountNotFound { id: id.as_str().to_string() })?;

        let account = row_to_account(id.clone(), row.get("balance"), row.get("status"), row.get("version"))?;
        require_active(&account)?;
        let new_balance = debit(&account, amount)?;

        let update = format!("UPDATE {table} SET balance = $1, version = version + 1 WHERE id = $2 AND version = $3");
        let result = sqlx::query(&update)
            .bind(new_balance)
            .bind(id.as_str())
            .bind(i64::try_from(account.version).unwrap_or(i64::MAX))
            .execute(&mut *tx)
            .await
            .map_err(|e| VaultError::Internal(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(VaultError::StorageConflict { key: id.as_str().to_string(), expected: account.version, found: account.version + 1 });
        }

        tx.commit().await.map_err(|e| VaultError::Internal(format!("commit failed: {e}")))?;

        Ok(Account { balance: new_balance, version: account.version + 1, ..account })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_account(id: &str, balance: &str) -> Account {
        Account {
            id: AccountId::parse(id).unwrap(),
            balance: balance.parse().unwrap(),
            status: AccountStatus::Active,
            version: 1,
        }
    }

    #[tokio::test]
    async fn transfer_moves_balance_and_bumps_versions() {
        let store = InMemoryAccountStore::new();
        store.seed(active_account("a", "100.00"));
        store.seed(active_account("b", "10.00"));

        let (from, to) = store
            .apply_transfer(&AccountId::parse("a").unwrap(), &AccountId::parse("b").unwrap(), "30.00".parse().unwrap())
            .await
            .unwrap();

        assert_eq!(from.balance, "70.00".parse().unwrap());
        assert_eq!(to.balance, "40.00".parse().unwrap());
        assert_eq!(from.version, 2);
        assert_eq!(to.version, 2);
    }

    #[tokio::test]
    async fn transfer_rejects_insufficient_funds_without_mutating() {
        let store = InMemoryAccountStore::new();
        store.seed(active_account("a", "5.00"));
        store.seed(active_account("b", "0.00"));

        let err = store
            .apply_transfer(&AccountId::parse("a").unwrap(), &AccountId::parse("b").unwrap(), "30.00".parse().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, VaultError::InsufficientFunds { .. }));
        assert_eq!(store.get_account(&AccountId::parse("a").unwrap()).await.unwrap().balance, "5.00".parse().unwrap());
    }

    #[tokio::test]
    async fn transfer_rejects_inactive_destination() {
        let store = InMemoryAccountStore::new();
        store.seed(active_account("a", "100.00"));
        store.seed(Account { status: AccountStatus::Frozen, ..active_account("b", "0.00") });

        let err = store
            .apply_transfer(&AccountId::parse("a").unwrap(), &AccountId::parse("b").unwrap(), "10.00".parse().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, VaultError::AccountState { .. }));
    }

    #[tokio::test]
    async fn withdrawal_debits_and_bumps_version() {
        let store = InMemoryAccountStore::new();
        store.seed(active_account("a", "50.00"));

        let account = store.apply_withdrawal(&AccountId::parse("a").unwrap(), "20.00".parse().unwrap()).await.unwrap();
        assert_eq!(account.balance, "30.00".parse().unwrap());
        assert_eq!(account.version, 2);
    }
}
