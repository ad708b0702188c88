use std::time::Duration;

/// Configuration for the Redis lease lock backend (spec §6:
/// `backend.redis.*`).
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g. `redis://127.0.0.1:6379`).
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: i64,

    /// Key prefix applied to every lock key to avoid collisions.
    pub prefix: String,

    /// Number of connections in the `deadpool-redis` pool.
    pub pool_size: usize,

    /// Timeout for acquiring a pooled connection / running a command.
    pub timeout: Duration,

    /// Number of retries on a transient connection error.
    pub retry_attempts: u32,

    /// Redis Cluster configuration (spec §6: `backend.redis.cluster.*`).
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    pub enabled: bool,
    pub nodes: Vec<String>,
    pub read_mode: ReadMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadMode {
    #[default]
    Primary,
    PreferReplica,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 6379,
            password: None,
            database: 0,
            prefix: String::from("vaultlock"),
            pool_size: 10,
            timeout: Duration::from_secs(5),
            retry_attempts: 3,
            cluster: ClusterConfig::default(),
        }
    }
}

impl RedisConfig {
    /// Build the connection URL from the discrete host/port/password/database
    /// fields (spec §6 recognizes these as separate config keys rather than
    /// a single URL).
    #[must_use]
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(pw) => format!("redis://:{pw}@{}:{}/{}", self.host, self.port, self.database),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }

    /// Build the full Redis key for a lock.
    #[must_use]
    pub fn lock_key(&self, name: &str) -> String {
        format!("{}:lock:{name}", self.prefix)
    }

    /// Build the pub/sub channel name used for release wake-up.
    #[must_use]
    pub fn release_channel(&self, name: &str) -> String {
        format!("{}:lock-release:{name}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = RedisConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 6379);
        assert_eq!(cfg.pool_size, 10);
    }

    #[test]
    fn connection_url_includes_password_only_when_set() {
        let mut cfg = RedisConfig::default();
        assert_eq!(cfg.connection_url(), "redis://127.0.0.1:6379/0");
        cfg.password = Some("s3cret".into());
        assert_eq!(cfg.connection_url(), "redis://:s3cret@127.0.0.1:6379/0");
    }

    #[test]
    fn key_and_channel_are_namespaced() {
        let cfg = RedisConfig::default();
        assert_eq!(cfg.lock_key("account_lock:a"), "vaultlock:lock:account_lock:a");
        assert_eq!(
            cfg.release_channel("account_lock:a"),
            "vaultlock:lock-release:account_lock:a"
        );
    }
}
