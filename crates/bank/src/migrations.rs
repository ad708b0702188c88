use sqlx::PgPool;

use crate::config::PostgresConfig;

/// Run database migrations, creating the accounts and transactions tables
/// if they do not exist (spec §6: "Persistent state").
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresConfig) -> Result<(), sqlx::Error> {
    let accounts_table = config.accounts_table();
    let transactions_table = config.transactions_table();

    let create_accounts = format!(
        "CREATE TABLE IF NOT EXISTS {accounts_table} (
            id TEXT PRIMARY KEY,
            balance NUMERIC(18, 2) NOT NULL,
            status TEXT NOT NULL,
            version BIGINT NOT NULL DEFAULT 1
        )"
    );

    let create_transactions = format!(
        "CREATE TABLE IF NOT EXISTS {transactions_table} (
            id UUID PRIMARY KEY,
            from_account TEXT,
            to_account TEXT,
            amount NUMERIC(18, 2) NOT NULL,
            kind TEXT NOT NULL,
            state TEXT NOT NULL,
            backend_tag TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            description TEXT NOT NULL DEFAULT ''
        )"
    );

    sqlx::query(&create_accounts).execute(pool).await?;
    sqlx::query(&create_transactions).execute(pool).await?;

    Ok(())
}
