use std::time::Duration;

use serde::Deserialize;

use vaultlock_bank::LockBudgets;
use vaultlock_core::LockBackendKind;
use vaultlock_lock_redis::config::{ClusterConfig, ReadMode};
use vaultlock_lock_redis::RedisConfig;
use vaultlock_lock_zookeeper::config::RetryConfig;
use vaultlock_lock_zookeeper::ZookeeperConfig;

/// HTTP server bind configuration (spec §6).
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), shutdown_timeout_seconds: default_shutdown_timeout() }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// `lock.*` bounds on acquire arguments (spec §6: lease must exceed wait;
/// the max fields must dominate the defaults).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockConfig {
    #[serde(default = "default_wait_budget_ms")]
    pub default_wait_budget_ms: u64,
    #[serde(default = "default_lease_budget_ms")]
    pub default_lease_budget_ms: u64,
    #[serde(default = "default_max_wait_budget_ms")]
    pub max_wait_budget_ms: u64,
    #[serde(default = "default_max_lease_budget_ms")]
    pub max_lease_budget_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_wait_budget_ms: default_wait_budget_ms(),
            default_lease_budget_ms: default_lease_budget_ms(),
            max_wait_budget_ms: default_max_wait_budget_ms(),
            max_lease_budget_ms: default_max_lease_budget_ms(),
        }
    }
}

fn default_wait_budget_ms() -> u64 {
    5_000
}

fn default_lease_budget_ms() -> u64 {
    10_000
}

fn default_max_wait_budget_ms() -> u64 {
    30_000
}

fn default_max_lease_budget_ms() -> u64 {
    60_000
}

impl LockConfig {
    #[must_use]
    pub fn default_budgets(&self) -> LockBudgets {
        LockBudgets {
            wait: Duration::from_millis(self.default_wait_budget_ms),
            lease: Duration::from_millis(self.default_lease_budget_ms),
        }
    }

    /// Enforce spec §6's ordering on `lock.*`: lease must exceed wait, and
    /// the max fields must dominate the defaults. Called once at startup
    /// so a misconfigured budget table fails fast rather than silently
    /// having no effect.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_lease_budget_ms <= self.default_wait_budget_ms {
            return Err(format!(
                "lock.defaultLeaseBudgetMs ({}) must exceed lock.defaultWaitBudgetMs ({})",
                self.default_lease_budget_ms, self.default_wait_budget_ms
            ));
        }
        if self.max_wait_budget_ms < self.default_wait_budget_ms {
            return Err(format!(
                "lock.maxWaitBudgetMs ({}) must be at least lock.defaultWaitBudgetMs ({})",
                self.max_wait_budget_ms, self.default_wait_budget_ms
            ));
        }
        if self.max_lease_budget_ms < self.default_lease_budget_ms {
            return Err(format!(
                "lock.maxLeaseBudgetMs ({}) must be at least lock.defaultLeaseBudgetMs ({})",
                self.max_lease_budget_ms, self.default_lease_budget_ms
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod lock_config_tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(LockConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_lease_not_exceeding_wait() {
        let config = LockConfig { default_lease_budget_ms: 1_000, default_wait_budget_ms: 1_000, ..LockConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_max_below_default() {
        let config = LockConfig { max_wait_budget_ms: 1_000, default_wait_budget_ms: 5_000, ..LockConfig::default() };
        assert!(config.validate().is_err());
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterFileConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub read_mode: String,
}

/// `backend.redis.*` (spec §6).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisFileConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    pub password: Option<String>,
    #[serde(default)]
    pub database: i64,
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default)]
    pub cluster: RedisClusterFileConfig,
}

impl Default for RedisFileConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            database: 0,
            timeout_ms: default_redis_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            pool_size: default_pool_size(),
            cluster: RedisClusterFileConfig::default(),
        }
    }
}

fn default_redis_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_redis_timeout_ms() -> u64 {
    5_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_pool_size() -> usize {
    10
}

impl From<&RedisFileConfig> for RedisConfig {
    fn from(file: &RedisFileConfig) -> Self {
        let read_mode = if file.cluster.read_mode.eq_ignore_ascii_case("preferreplica") {
            ReadMode::PreferReplica
        } else {
            ReadMode::Primary
        };
        Self {
            host: file.host.clone(),
            port: file.port,
            password: file.password.clone(),
            database: file.database,
            timeout: Duration::from_millis(file.timeout_ms),
            retry_attempts: file.retry_attempts,
            cluster: ClusterConfig { enabled: file.cluster.enabled, nodes: file.cluster.nodes.clone(), read_mode },
            ..RedisConfig::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperRetryFileConfig {
    #[serde(default = "default_retry_base_sleep_ms")]
    pub base_sleep_ms: u64,
    #[serde(default = "default_retry_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_max_sleep_ms")]
    pub max_sleep_ms: u64,
}

impl Default for ZookeeperRetryFileConfig {
    fn default() -> Self {
        Self {
            base_sleep_ms: default_retry_base_sleep_ms(),
            max_retries: default_retry_max_retries(),
            max_sleep_ms: default_retry_max_sleep_ms(),
        }
    }
}

fn default_retry_base_sleep_ms() -> u64 {
    100
}

fn default_retry_max_retries() -> u32 {
    5
}

fn default_retry_max_sleep_ms() -> u64 {
    10_000
}

/// `backend.zookeeper.*` (spec §6).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperFileConfig {
    #[serde(default = "default_zk_connect_string")]
    pub connect_string: String,
    #[serde(default = "default_zk_namespace")]
    pub namespace: String,
    #[serde(default = "default_zk_session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(default = "default_zk_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    #[serde(default)]
    pub retry: ZookeeperRetryFileConfig,
}

impl Default for ZookeeperFileConfig {
    fn default() -> Self {
        Self {
            connect_string: default_zk_connect_string(),
            namespace: default_zk_namespace(),
            session_timeout_ms: default_zk_session_timeout_ms(),
            connection_timeout_ms: default_zk_connection_timeout_ms(),
            retry: ZookeeperRetryFileConfig::default(),
        }
    }
}

fn default_zk_connect_string() -> String {
    "127.0.0.1:2181".to_owned()
}

fn default_zk_namespace() -> String {
    "/vaultlock/locks".to_owned()
}

fn default_zk_session_timeout_ms() -> u64 {
    10_000
}

fn default_zk_connection_timeout_ms() -> u64 {
    5_000
}

impl From<&ZookeeperFileConfig> for ZookeeperConfig {
    fn from(file: &ZookeeperFileConfig) -> Self {
        Self {
            connect_string: file.connect_string.clone(),
            namespace: file.namespace.clone(),
            session_timeout: Duration::from_millis(file.session_timeout_ms),
            connect_timeout: Duration::from_millis(file.connection_timeout_ms),
            retry: RetryConfig {
                base_sleep: Duration::from_millis(file.retry.base_sleep_ms),
                max_retries: file.retry.max_retries,
                max_sleep: Duration::from_millis(file.retry.max_sleep_ms),
            },
        }
    }
}

/// `backend.*` (spec §6: `backend.active` selects the initial [`LockBackendKind`]).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    #[serde(default = "default_active_backend")]
    pub active: String,
    #[serde(default)]
    pub redis: RedisFileConfig,
    #[serde(default)]
    pub zookeeper: ZookeeperFileConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self { active: default_active_backend(), redis: RedisFileConfig::default(), zookeeper: ZookeeperFileConfig::default() }
    }
}

fn default_active_backend() -> String {
    "redis".to_owned()
}

impl BackendConfig {
    /// Parse `active` into a [`LockBackendKind`]; an unrecognized value is
    /// surfaced by the caller at startup rather than at first request.
    pub fn active_backend(&self) -> Result<LockBackendKind, String> {
        LockBackendKind::parse(&self.active).ok_or_else(|| format!("unknown backend.active value: {}", self.active))
    }
}

/// `vaultlock.postgres.*`: optional persistent storage. When `url` is
/// absent, the server runs against the in-memory account/transaction
/// stores instead.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PostgresFileConfig {
    pub url: Option<String>,
    #[serde(default = "default_pool_size_u32")]
    pub pool_size: u32,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
}

fn default_pool_size_u32() -> u32 {
    10
}

fn default_schema() -> String {
    "public".to_owned()
}

fn default_table_prefix() -> String {
    "vaultlock_".to_owned()
}

impl PostgresFileConfig {
    #[must_use]
    pub fn to_postgres_config(&self) -> Option<vaultlock_bank::PostgresConfig> {
        self.url.as_ref().map(|url| vaultlock_bank::PostgresConfig {
            url: url.clone(),
            pool_size: self.pool_size,
            schema: self.schema.clone(),
            table_prefix: self.table_prefix.clone(),
            ssl_mode: None,
            ssl_root_cert: None,
            ssl_cert: None,
            ssl_key: None,
        })
    }
}

/// Top-level TOML configuration document (spec §6).
#[derive(Debug, Deserialize, Default)]
pub struct VaultlockConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub postgres: PostgresFileConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_all_defaults() {
        let config: VaultlockConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.backend.active, "redis");
        assert_eq!(config.lock.default_wait_budget_ms, 5_000);
    }

    #[test]
    fn parses_nested_backend_tables() {
        let raw = r#"
            [backend]
            active = "zookeeper"

            [backend.redis]
            host = "redis.internal"
            port = 6380

            [backend.zookeeper]
            connectString = "zk1:2181,zk2:2181"

            [backend.zookeeper.retry]
            maxRetries = 10
        "#;
        let config: VaultlockConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.backend.active, "zookeeper");
        assert_eq!(config.backend.redis.host, "redis.internal");
        assert_eq!(config.backend.redis.port, 6380);
        assert_eq!(config.backend.zookeeper.connect_string, "zk1:2181,zk2:2181");
        assert_eq!(config.backend.zookeeper.retry.max_retries, 10);
    }

    #[test]
    fn active_backend_rejects_unknown_values() {
        let config = BackendConfig { active: "etcd".into(), ..BackendConfig::default() };
        assert!(config.active_backend().is_err());
    }
}
