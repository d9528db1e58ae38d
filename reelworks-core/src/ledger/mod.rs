//! Transactional credit ledger.
//!
//! Tracks a spendable balance and a soft reservation per tenant. Every
//! mutation executes as one atomic read-modify-write against the
//! account record: load, apply a pure transition, then a version-checked
//! compare-and-update, retrying on conflict. Concurrent reserves and
//! consumes for one tenant are expected; a naive read-then-write would
//! lose updates.
//!
//! Each successful mutation appends one [`CreditTransaction`]; replaying
//! the transaction history reconstructs the balance.

mod transition;

use std::sync::Arc;

use tracing::{debug, info};

use reelworks_model::{
    ActorId, BalanceSummary, CreditAccount, CreditTransaction,
    SufficiencyCheck, TenantId, TransactionKind,
};

use crate::error::CoreError;
use crate::store::AccountStore;
use crate::Result;

/// Attempts before a hot account is reported as conflicted.
const MAX_CAS_RETRIES: usize = 16;

/// Per-tenant credit accounting service.
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn AccountStore>,
}

impl std::fmt::Debug for CreditLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditLedger").finish_non_exhaustive()
    }
}

impl CreditLedger {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Current balance view, materialising a zeroed account on first
    /// access.
    pub async fn balance_of(&self, tenant: TenantId) -> Result<BalanceSummary> {
        let account = self.store.get_or_create(tenant).await?;
        Ok(account.summary())
    }

    /// Read-only probe; never mutates.
    pub async fn check_sufficient(
        &self,
        tenant: TenantId,
        required: i64,
    ) -> Result<SufficiencyCheck> {
        let available = match self.store.get(tenant).await? {
            Some(account) => account.available(),
            None => 0,
        };
        Ok(SufficiencyCheck {
            required,
            available,
            sufficient: available >= required,
        })
    }

    /// Soft-holds `amount` against the available balance.
    pub async fn reserve(
        &self,
        tenant: TenantId,
        amount: i64,
        actor: &ActorId,
        metadata: serde_json::Value,
    ) -> Result<BalanceSummary> {
        self.mutate(tenant, TransactionKind::Reserve, actor, metadata, |a| {
            transition::reserve(a, amount)
        })
        .await
    }

    /// Spends `amount` of previously reserved credits.
    pub async fn consume(
        &self,
        tenant: TenantId,
        amount: i64,
        actor: &ActorId,
        metadata: serde_json::Value,
    ) -> Result<BalanceSummary> {
        self.mutate(tenant, TransactionKind::Consume, actor, metadata, |a| {
            transition::consume(a, amount)
        })
        .await
    }

    /// Returns previously spent or held credits to the balance.
    pub async fn refund(
        &self,
        tenant: TenantId,
        amount: i64,
        actor: &ActorId,
        metadata: serde_json::Value,
    ) -> Result<BalanceSummary> {
        self.mutate(tenant, TransactionKind::Refund, actor, metadata, |a| {
            transition::refund(a, amount)
        })
        .await
    }

    /// Undoes a consume whose follow-up write failed: the amount goes
    /// back to the balance with its hold restored, so the caller can
    /// retry from the pre-consume state. Recorded as a refund.
    pub async fn reinstate(
        &self,
        tenant: TenantId,
        amount: i64,
        actor: &ActorId,
        metadata: serde_json::Value,
    ) -> Result<BalanceSummary> {
        self.mutate(tenant, TransactionKind::Refund, actor, metadata, |a| {
            transition::reinstate(a, amount)
        })
        .await
    }

    /// Drops an unused reservation; the balance never moves.
    pub async fn release(
        &self,
        tenant: TenantId,
        amount: i64,
        actor: &ActorId,
        metadata: serde_json::Value,
    ) -> Result<BalanceSummary> {
        self.mutate(tenant, TransactionKind::Release, actor, metadata, |a| {
            transition::release(a, amount)
        })
        .await
    }

    /// Admin-only direct balance grant.
    pub async fn add_credits(
        &self,
        tenant: TenantId,
        amount: i64,
        actor: &ActorId,
        reason: &str,
    ) -> Result<BalanceSummary> {
        let metadata = serde_json::json!({ "reason": reason });
        let summary = self
            .mutate(tenant, TransactionKind::Purchase, actor, metadata, |a| {
                transition::add(a, amount)
            })
            .await?;
        info!(%tenant, amount, %actor, "credits added");
        Ok(summary)
    }

    /// Applies the tenant's monthly allotment according to its rollover
    /// setting. Recorded as an `adjustment` transaction.
    pub async fn apply_monthly_grant(
        &self,
        tenant: TenantId,
        actor: &ActorId,
    ) -> Result<BalanceSummary> {
        let metadata = serde_json::json!({ "reason": "monthly allotment" });
        self.mutate(
            tenant,
            TransactionKind::Adjustment,
            actor,
            metadata,
            transition::monthly_grant,
        )
        .await
    }

    /// Newest-first transaction history.
    pub async fn transactions(
        &self,
        tenant: TenantId,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>> {
        self.store.transactions(tenant, limit).await
    }

    /// One atomic read-modify-write: load, transition, version-checked
    /// store, retry on conflict. Appends the transaction record after
    /// the account write lands.
    async fn mutate<F>(
        &self,
        tenant: TenantId,
        kind: TransactionKind,
        actor: &ActorId,
        metadata: serde_json::Value,
        transition: F,
    ) -> Result<BalanceSummary>
    where
        F: Fn(&CreditAccount) -> Result<(CreditAccount, i64)>,
    {
        for attempt in 0..MAX_CAS_RETRIES {
            let current = self.store.get_or_create(tenant).await?;
            let (mut next, amount) = transition(&current)?;

            debug_assert!(next.balance >= 0);
            debug_assert!(next.reserved >= 0);
            debug_assert!(next.reserved <= next.balance);

            next.version = current.version + 1;
            next.updated_at = chrono::Utc::now();

            if self.store.try_update(&next).await? {
                let tx = CreditTransaction::new(
                    tenant,
                    kind,
                    amount,
                    current.balance,
                    next.balance,
                    actor.clone(),
                    metadata,
                );
                self.store.append_transaction(tx).await?;
                debug!(
                    %tenant,
                    kind = kind.as_str(),
                    amount,
                    balance = next.balance,
                    reserved = next.reserved,
                    "ledger mutation applied"
                );
                return Ok(next.summary());
            }

            debug!(%tenant, attempt, "account version conflict, retrying");
        }

        Err(CoreError::Conflict(format!(
            "account {tenant} kept changing under {} after {MAX_CAS_RETRIES} attempts",
            kind.as_str()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ledger() -> (CreditLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CreditLedger::new(store.clone()), store)
    }

    fn actor() -> ActorId {
        ActorId::from("test-actor")
    }

    #[tokio::test]
    async fn balance_of_materialises_zeroed_account() {
        let (ledger, _) = ledger();
        let summary = ledger.balance_of(TenantId::new()).await.unwrap();
        assert_eq!(
            summary,
            BalanceSummary {
                balance: 0,
                reserved: 0,
                available: 0,
                monthly_allotment: 0,
                rollover_enabled: false,
            }
        );
    }

    #[tokio::test]
    async fn check_sufficient_is_read_only() {
        let (ledger, store) = ledger();
        let tenant = TenantId::new();

        let check = ledger.check_sufficient(tenant, 10).await.unwrap();
        assert!(!check.sufficient);
        assert_eq!(check.available, 0);
        // The probe must not have created an account.
        assert!(store.get(tenant).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scenario_a_reserve_consume_refund() {
        let (ledger, _) = ledger();
        let tenant = TenantId::new();
        let actor = actor();

        ledger
            .add_credits(tenant, 100, &actor, "initial grant")
            .await
            .unwrap();

        let after_reserve = ledger
            .reserve(tenant, 30, &actor, serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(after_reserve.available, 70);
        assert_eq!(after_reserve.balance, 100);

        let after_consume = ledger
            .consume(tenant, 20, &actor, serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(after_consume.balance, 80);
        assert_eq!(after_consume.reserved, 10);

        let after_refund = ledger
            .refund(tenant, 10, &actor, serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(after_refund.balance, 90);
        assert_eq!(after_refund.reserved, 0);
    }

    #[tokio::test]
    async fn reinstate_round_trips_a_consume() {
        let (ledger, _) = ledger();
        let tenant = TenantId::new();
        let actor = actor();

        ledger.add_credits(tenant, 100, &actor, "grant").await.unwrap();
        ledger
            .reserve(tenant, 30, &actor, serde_json::Value::Null)
            .await
            .unwrap();
        ledger
            .consume(tenant, 20, &actor, serde_json::Value::Null)
            .await
            .unwrap();

        let after = ledger
            .reinstate(tenant, 20, &actor, serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(after.balance, 100);
        assert_eq!(after.reserved, 30);

        let newest = &ledger.transactions(tenant, 1).await.unwrap()[0];
        assert_eq!(newest.kind, TransactionKind::Refund);
        assert_eq!(newest.amount, 20);
    }

    #[tokio::test]
    async fn reserve_then_release_round_trips_available() {
        let (ledger, _) = ledger();
        let tenant = TenantId::new();
        let actor = actor();

        ledger.add_credits(tenant, 50, &actor, "grant").await.unwrap();
        let before = ledger.balance_of(tenant).await.unwrap();

        ledger
            .reserve(tenant, 25, &actor, serde_json::Value::Null)
            .await
            .unwrap();
        let after = ledger
            .release(tenant, 25, &actor, serde_json::Value::Null)
            .await
            .unwrap();

        assert_eq!(after.available, before.available);
        assert_eq!(after.balance, before.balance);
    }

    #[tokio::test]
    async fn reserve_beyond_available_fails_with_reason() {
        let (ledger, _) = ledger();
        let tenant = TenantId::new();
        let actor = actor();

        ledger.add_credits(tenant, 10, &actor, "grant").await.unwrap();
        let err = ledger
            .reserve(tenant, 50, &actor, serde_json::Value::Null)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::InsufficientCredits { .. }));
        let reason = err.reason();
        assert!(reason.contains("required 50"));
        assert!(reason.contains("available 10"));
    }

    #[tokio::test]
    async fn history_replays_to_current_balance() {
        let (ledger, _) = ledger();
        let tenant = TenantId::new();
        let actor = actor();

        ledger.add_credits(tenant, 100, &actor, "grant").await.unwrap();
        ledger
            .reserve(tenant, 40, &actor, serde_json::Value::Null)
            .await
            .unwrap();
        ledger
            .consume(tenant, 25, &actor, serde_json::Value::Null)
            .await
            .unwrap();
        ledger
            .release(tenant, 15, &actor, serde_json::Value::Null)
            .await
            .unwrap();

        let history = ledger.transactions(tenant, 100).await.unwrap();
        // Replay oldest-first: only balance-touching kinds move it.
        let replayed: i64 = history
            .iter()
            .rev()
            .filter(|tx| tx.kind.touches_balance())
            .map(|tx| tx.amount)
            .sum();

        let summary = ledger.balance_of(tenant).await.unwrap();
        assert_eq!(replayed, summary.balance);
        assert_eq!(summary.balance, 75);
        assert_eq!(summary.reserved, 0);

        // Every record carries a consistent before/after pair.
        for tx in &history {
            if tx.kind.touches_balance() {
                assert_eq!(tx.balance_before + tx.amount, tx.balance_after);
            } else {
                assert_eq!(tx.balance_before, tx.balance_after);
            }
        }
    }

    #[tokio::test]
    async fn concurrent_reserves_do_not_lose_updates() {
        let (ledger, _) = ledger();
        let tenant = TenantId::new();
        let actor = actor();

        ledger.add_credits(tenant, 1000, &actor, "grant").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            let actor = actor.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .reserve(tenant, 10, &actor, serde_json::Value::Null)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let summary = ledger.balance_of(tenant).await.unwrap();
        assert_eq!(summary.reserved, 100);
        assert_eq!(summary.available, 900);
    }
}
