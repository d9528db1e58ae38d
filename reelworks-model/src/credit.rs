//! Credit accounting types.
//!
//! Every change to an account's balance or reservation creates a
//! [`CreditTransaction`] record; the transaction history is the audit
//! source of truth and must be sufficient to reconstruct the balance by
//! replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ActorId, TenantId, TransactionId};

/// Per-tenant credit account.
///
/// Created lazily (zeroed) on first access, never deleted. `reserved`
/// is a soft hold: it reduces `available` without reducing `balance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAccount {
    pub tenant_id: TenantId,

    /// Spendable credits. Never negative.
    pub balance: i64,

    /// Soft-held credits. `0 <= reserved <= balance`.
    pub reserved: i64,

    /// Credits granted each billing month.
    pub monthly_allotment: i64,

    /// Whether unspent credits carry over into the next month.
    pub rollover_enabled: bool,

    /// Optimistic-concurrency version, bumped on every mutation.
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreditAccount {
    /// A fresh zeroed account, as materialised on first access.
    pub fn new(tenant_id: TenantId) -> Self {
        let now = Utc::now();
        Self {
            tenant_id,
            balance: 0,
            reserved: 0,
            monthly_allotment: 0,
            rollover_enabled: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Credits spendable right now.
    pub fn available(&self) -> i64 {
        self.balance - self.reserved
    }

    pub fn summary(&self) -> BalanceSummary {
        BalanceSummary {
            balance: self.balance,
            reserved: self.reserved,
            available: self.available(),
            monthly_allotment: self.monthly_allotment,
            rollover_enabled: self.rollover_enabled,
        }
    }
}

/// Read-only balance view returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub balance: i64,
    pub reserved: i64,
    pub available: i64,
    pub monthly_allotment: i64,
    pub rollover_enabled: bool,
}

/// Result of a read-only sufficiency probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SufficiencyCheck {
    pub required: i64,
    pub available: i64,
    pub sufficient: bool,
}

/// Type of ledger mutation a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Soft hold placed against the balance.
    Reserve,

    /// Reserved credits actually spent; balance and reservation drop.
    Consume,

    /// Previously spent or held credits returned to the balance.
    Refund,

    /// Unused reservation returned; balance untouched.
    Release,

    /// Direct balance top-up (admin grant or purchase).
    Purchase,

    /// Monthly allotment or other administrative correction.
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserve => "reserve",
            Self::Consume => "consume",
            Self::Refund => "refund",
            Self::Release => "release",
            Self::Purchase => "purchase",
            Self::Adjustment => "adjustment",
        }
    }

    /// Whether this kind moves `balance` (as opposed to only the
    /// reservation).
    pub fn touches_balance(&self) -> bool {
        !matches!(self, Self::Reserve | Self::Release)
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserve" => Ok(Self::Reserve),
            "consume" => Ok(Self::Consume),
            "refund" => Ok(Self::Refund),
            "release" => Ok(Self::Release),
            "purchase" => Ok(Self::Purchase),
            "adjustment" => Ok(Self::Adjustment),
            other => Err(format!("unknown transaction kind `{other}`")),
        }
    }
}

/// Append-only record of one ledger mutation. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: TransactionId,
    pub tenant_id: TenantId,
    pub kind: TransactionKind,

    /// Signed amount: positive for credits entering the balance or a
    /// reservation being placed, negative for spends.
    pub amount: i64,

    pub balance_before: i64,
    pub balance_after: i64,

    pub actor_id: ActorId,

    /// Free-form context: job id, video id, reason.
    pub metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    pub fn new(
        tenant_id: TenantId,
        kind: TransactionKind,
        amount: i64,
        balance_before: i64,
        balance_after: i64,
        actor_id: ActorId,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            tenant_id,
            kind,
            amount,
            balance_before,
            balance_after,
            actor_id,
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_account_is_zeroed() {
        let account = CreditAccount::new(TenantId::new());
        assert_eq!(account.balance, 0);
        assert_eq!(account.reserved, 0);
        assert_eq!(account.available(), 0);
        assert_eq!(account.version, 0);
    }

    #[test]
    fn available_subtracts_reservation() {
        let mut account = CreditAccount::new(TenantId::new());
        account.balance = 100;
        account.reserved = 30;
        assert_eq!(account.available(), 70);
        assert_eq!(account.summary().available, 70);
    }

    #[test]
    fn transaction_kind_round_trips_as_str() {
        for kind in [
            TransactionKind::Reserve,
            TransactionKind::Consume,
            TransactionKind::Refund,
            TransactionKind::Release,
            TransactionKind::Purchase,
            TransactionKind::Adjustment,
        ] {
            assert_eq!(kind.as_str().parse::<TransactionKind>(), Ok(kind));
        }
    }

    #[test]
    fn reserve_and_release_leave_balance_alone() {
        assert!(!TransactionKind::Reserve.touches_balance());
        assert!(!TransactionKind::Release.touches_balance());
        assert!(TransactionKind::Consume.touches_balance());
    }
}
