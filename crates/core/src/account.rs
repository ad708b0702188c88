use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// Identifier of a bank account.
///
/// Must match `[A-Za-z0-9-]{1,50}` (spec §6). The newtype keeps that
/// constraint enforced at construction rather than re-checked everywhere
/// the id is used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Parse an account id, validating the `[A-Za-z0-9-]{1,50}` shape.
    pub fn parse(raw: impl Into<String>) -> Result<Self, VaultError> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= 50
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if valid {
            Ok(Self(raw))
        } else {
            Err(VaultError::Validation {
                field: "accountNumber".into(),
                reason: format!("'{raw}' must match [A-Za-z0-9-]{{1,50}}"),
            })
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespaced lock key for this account (`account_lock:<id>`).
    #[must_use]
    pub fn lock_key(&self) -> crate::lock_key::LockKey {
        crate::lock_key::LockKey::new(format!("account_lock:{}", self.0))
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of an account (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum AccountStatus {
    Active,
    Inactive,
    Frozen,
    Closed,
}

impl AccountStatus {
    /// Only `ACTIVE` accounts may participate in debits/credits (spec §3).
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Frozen => "FROZEN",
            Self::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

/// A bank account row, with the optimistic-concurrency `version` column
/// (spec §3, §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Account {
    pub id: AccountId,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub balance: Decimal,
    pub status: AccountStatus,
    /// Monotonically incrementing row version, used for optimistic
    /// concurrency (I1/I4 second line of defense).
    pub version: u64,
}

impl Account {
    /// Validate the no-negative-balance invariant (I4).
    #[must_use]
    pub fn has_non_negative_balance(&self) -> bool {
        self.balance >= Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_ids() {
        assert!(AccountId::parse("acct-001").is_ok());
        assert!(AccountId::parse("A").is_ok());
        assert!(AccountId::parse("a".repeat(50)).is_ok());
    }

    #[test]
    fn rejects_invalid_ids() {
        assert!(AccountId::parse("").is_err());
        assert!(AccountId::parse("a".repeat(51)).is_err());
        assert!(AccountId::parse("has space").is_err());
        assert!(AccountId::parse("has/slash").is_err());
    }

    #[test]
    fn lock_key_is_namespaced() {
        let id = AccountId::parse("acct-1").unwrap();
        assert_eq!(id.lock_key().as_str(), "account_lock:acct-1");
    }

    #[test]
    fn status_is_active_only_for_active() {
        assert!(AccountStatus::Active.is_active());
        assert!(!AccountStatus::Frozen.is_active());
        assert!(!AccountStatus::Closed.is_active());
        assert!(!AccountStatus::Inactive.is_active());
    }
}
