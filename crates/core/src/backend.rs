use serde::{Deserialize, Serialize};

/// The active lock backend, selected by C4 (spec §3: "Backend State").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum LockBackendKind {
    Redis,
    #[serde(rename = "zookeeper")]
    ZooKeeper,
}

impl LockBackendKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::ZooKeeper => "zookeeper",
        }
    }

    /// Parse a backend name from configuration or the `/lock-management/switch`
    /// request body. Unknown values are the caller's responsibility to map to
    /// `VaultError::UnsupportedBackend`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "redis" => Some(Self::Redis),
            "zookeeper" => Some(Self::ZooKeeper),
            _ => None,
        }
    }

    #[must_use]
    pub fn all() -> &'static [Self] {
        &[Self::Redis, Self::ZooKeeper]
    }
}

impl std::fmt::Display for LockBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(LockBackendKind::parse("Redis"), Some(LockBackendKind::Redis));
        assert_eq!(
            LockBackendKind::parse("ZOOKEEPER"),
            Some(LockBackendKind::ZooKeeper)
        );
        assert_eq!(LockBackendKind::parse("etcd"), None);
    }

    #[test]
    fn round_trips_through_as_str() {
        for kind in LockBackendKind::all() {
            assert_eq!(LockBackendKind::parse(kind.as_str()), Some(*kind));
        }
    }
}
