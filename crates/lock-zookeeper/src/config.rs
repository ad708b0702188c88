use std::time::Duration;

/// Configuration for the ZooKeeper sequential-node lock backend (spec §6:
/// `backend.zookeeper.*`).
#[derive(Debug, Clone)]
pub struct ZookeeperConfig {
    /// Comma-separated `host:port` ensemble connect string.
    pub connect_string: String,

    /// Root znode all lock nodes are created under, e.g. `/vaultlock`.
    pub namespace: String,

    pub session_timeout: Duration,
    pub connect_timeout: Duration,

    /// Connect-retry policy (spec §6: `backend.zookeeper.retry.*`).
    pub retry: RetryConfig,
}

/// Backoff policy for the initial ensemble connect (spec §6:
/// `backend.zookeeper.retry.*`).
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub base_sleep: Duration,
    pub max_retries: u32,
    pub max_sleep: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { base_sleep: Duration::from_millis(100), max_retries: 5, max_sleep: Duration::from_secs(10) }
    }
}

impl Default for ZookeeperConfig {
    fn default() -> Self {
        Self {
            connect_string: String::from("127.0.0.1:2181"),
            namespace: String::from("/vaultlock/locks"),
            session_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

impl ZookeeperConfig {
    /// The persistent parent znode a given lock key's sequential children
    /// are created under.
    #[must_use]
    pub fn parent_path(&self, key_name: &str) -> String {
        format!("{}/{key_name}", self.namespace.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_path_is_namespaced() {
        let cfg = ZookeeperConfig::default();
        assert_eq!(cfg.parent_path("account_lock:a"), "/vaultlock/locks/account_lock:a");
    }

    #[test]
    fn default_values() {
        let cfg = ZookeeperConfig::default();
        assert_eq!(cfg.connect_string, "127.0.0.1:2181");
        assert_eq!(cfg.session_timeout, Duration::from_secs(10));
    }
}
