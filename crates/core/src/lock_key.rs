use serde::{Deserialize, Serialize};

/// A printable string uniquely identifying a contended resource (spec §3).
///
/// Equality and ordering are byte-equality / byte-lexicographic, which C5
/// relies on for its deterministic total-order acquisition protocol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockKey(String);

impl LockKey {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LockKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for LockKey {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

/// Sort a set of keys into the deterministic byte-lexicographic order that
/// C5 acquires in, discharging the circular-wait Coffman condition (spec §4.5).
#[must_use]
pub fn total_order(mut keys: Vec<LockKey>) -> Vec<LockKey> {
    keys.sort();
    keys.dedup();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_order_sorts_and_dedups() {
        let keys = vec![
            LockKey::new("account_lock:b"),
            LockKey::new("account_lock:a"),
            LockKey::new("account_lock:a"),
        ];
        let ordered = total_order(keys);
        assert_eq!(
            ordered,
            vec![LockKey::new("account_lock:a"), LockKey::new("account_lock:b")]
        );
    }

    #[test]
    fn ordering_is_consistent_regardless_of_argument_order() {
        let forward = total_order(vec![LockKey::new("x"), LockKey::new("y")]);
        let backward = total_order(vec![LockKey::new("y"), LockKey::new("x")]);
        assert_eq!(forward, backward);
    }
}
