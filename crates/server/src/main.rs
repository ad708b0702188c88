use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use vaultlock_bank::{BankOrchestrator, InMemoryAccountStore, InMemoryTransactionStore};
use vaultlock_core::LockBackendKind;
use vaultlock_lock::backend::LockBackend;
use vaultlock_lock::LockTelemetry;
use vaultlock_server::api::AppState;
use vaultlock_server::config::VaultlockConfig;
use vaultlock_server::registry::LockRegistry;

/// vaultlock lock-coordinated bank-account server.
#[derive(Parser, Debug)]
#[command(name = "vaultlock-server", about = "Standalone HTTP server for vaultlock")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "vaultlock.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config: VaultlockConfig = if Path::new(&cli.config).exists() {
        let contents = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&contents)?
    } else {
        info!(path = %cli.config, "config file not found, using defaults");
        toml::from_str("")?
    };

    config.lock.validate()?;
    let active_backend = config.backend.active_backend()?;
    let mut backends: HashMap<LockBackendKind, Arc<dyn LockBackend>> = HashMap::new();

    #[cfg(feature = "redis")]
    {
        let redis_config: vaultlock_lock_redis::RedisConfig = (&config.backend.redis).into();
        let redis = vaultlock_lock_redis::RedisDistributedLock::new(redis_config)?;
        backends.insert(LockBackendKind::Redis, Arc::new(redis));
        info!("redis lock backend configured");
    }

    #[cfg(feature = "zookeeper")]
    {
        let zk_config: vaultlock_lock_zookeeper::ZookeeperConfig = (&config.backend.zookeeper).into();
        let zookeeper = vaultlock_lock_zookeeper::ZookeeperDistributedLock::connect(zk_config).await?;
        backends.insert(LockBackendKind::ZooKeeper, Arc::new(zookeeper));
        info!("zookeeper lock backend configured");
    }

    if backends.is_empty() {
        return Err("no lock backend compiled in; build with the \"redis\" or \"zookeeper\" feature".into());
    }
    if !backends.contains_key(&active_backend) {
        return Err(format!("backend.active = \"{active_backend}\" is not compiled in").into());
    }

    let registry = Arc::new(LockRegistry::new(backends, active_backend)?);
    let lock_backend: Arc<dyn LockBackend> = Arc::clone(&registry) as Arc<dyn LockBackend>;

    let postgres_config = config.postgres.to_postgres_config();
    let (accounts, transactions): (Arc<dyn vaultlock_bank::AccountStore>, Arc<dyn vaultlock_bank::TransactionStore>) =
        match postgres_config {
            #[cfg(feature = "postgres")]
            Some(pg_config) => {
                let account_store = vaultlock_bank::PostgresAccountStore::new(pg_config.clone()).await?;
                let pool = sqlx::postgres::PgPoolOptions::new().max_connections(pg_config.pool_size).connect(&pg_config.url).await?;
                let transaction_store = vaultlock_bank::PostgresTransactionStore::new(pool, pg_config);
                info!("postgres account/transaction stores configured");
                (Arc::new(account_store), Arc::new(transaction_store))
            }
            #[cfg(not(feature = "postgres"))]
            Some(_) => {
                return Err("postgres.url is set but the server was built without the \"postgres\" feature".into());
            }
            None => {
                info!("no postgres.url configured, using in-memory account/transaction stores");
                (Arc::new(InMemoryAccountStore::new()), Arc::new(InMemoryTransactionStore::new()))
            }
        };

    let telemetry = Arc::new(LockTelemetry::new());
    let budgets = config.lock.default_budgets();
    let orchestrator = Arc::new(BankOrchestrator::new(Arc::clone(&accounts), transactions, lock_backend, Arc::clone(&telemetry), budgets));

    let state = AppState { orchestrator, accounts, registry, telemetry };
    let app = vaultlock_server::api::router(state);

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, backend = %active_backend, "vaultlock-server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(Duration::from_secs(config.server.shutdown_timeout_seconds))).await?;

    info!("vaultlock-server shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
/// `shutdown_timeout` is logged here since the actual drain work happens inside
/// axum's graceful-shutdown future rather than as a separate post-serve step.
async fn shutdown_signal(shutdown_timeout: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
    info!(timeout_secs = shutdown_timeout.as_secs(), "shutting down gracefully");
}
