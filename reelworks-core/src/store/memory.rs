//! In-memory store used by tests and single-process deployments.
//!
//! Mutations go through the same version-checked compare-and-update
//! contract as the Postgres backend, so the CAS retry paths in the
//! services are exercised identically against both.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use reelworks_model::{
    AuditEntry, BatchJob, CreditAccount, CreditTransaction, JobId, JobStatus,
    LimitOverride, QueueStats, TenantId, VideoId,
};

use crate::error::CoreError;
use crate::Result;

use super::{
    AccountStore, AuditStore, JobStore, PlanDirectory, VideoCatalog,
};

/// Shared in-memory backend for accounts, jobs, and the audit trail.
#[derive(Clone, Default)]
pub struct MemoryStore {
    accounts: Arc<RwLock<HashMap<TenantId, CreditAccount>>>,
    transactions: Arc<RwLock<Vec<CreditTransaction>>>,
    jobs: Arc<RwLock<HashMap<JobId, BatchJob>>>,
    audit: Arc<RwLock<Vec<AuditEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get(&self, tenant: TenantId) -> Result<Option<CreditAccount>> {
        Ok(self.accounts.read().await.get(&tenant).cloned())
    }

    async fn get_or_create(&self, tenant: TenantId) -> Result<CreditAccount> {
        let mut accounts = self.accounts.write().await;
        Ok(accounts
            .entry(tenant)
            .or_insert_with(|| CreditAccount::new(tenant))
            .clone())
    }

    async fn try_update(&self, account: &CreditAccount) -> Result<bool> {
        let mut accounts = self.accounts.write().await;
        match accounts.get(&account.tenant_id) {
            Some(stored) if stored.version == account.version - 1 => {
                accounts.insert(account.tenant_id, account.clone());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CoreError::AccountNotFound(account.tenant_id)),
        }
    }

    async fn append_transaction(&self, tx: CreditTransaction) -> Result<()> {
        self.transactions.write().await.push(tx);
        Ok(())
    }

    async fn transactions(
        &self,
        tenant: TenantId,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .iter()
            .rev()
            .filter(|tx| tx.tenant_id == tenant)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert(&self, job: BatchJob) -> Result<()> {
        self.jobs.write().await.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, job: JobId) -> Result<Option<BatchJob>> {
        Ok(self.jobs.read().await.get(&job).cloned())
    }

    async fn try_update(&self, job: &BatchJob) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get(&job.id) {
            Some(stored) if stored.version == job.version - 1 => {
                jobs.insert(job.id, job.clone());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CoreError::JobNotFound(job.id)),
        }
    }

    async fn active_job_count(&self, tenant: TenantId) -> Result<usize> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|job| job.tenant_id == tenant && job.status.is_active())
            .count())
    }

    async fn active_job_count_total(&self) -> Result<usize> {
        let jobs = self.jobs.read().await;
        Ok(jobs.values().filter(|job| job.status.is_active()).count())
    }

    async fn running_video_count(&self, tenant: TenantId) -> Result<usize> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|job| job.tenant_id == tenant && job.status.is_active())
            .map(|job| job.progress.running as usize)
            .sum())
    }

    async fn active_jobs_ordered(
        &self,
        tenant: TenantId,
    ) -> Result<Vec<BatchJob>> {
        let jobs = self.jobs.read().await;
        let mut active: Vec<BatchJob> = jobs
            .values()
            .filter(|job| job.tenant_id == tenant && job.status.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(active)
    }

    async fn jobs_for_tenant(&self, tenant: TenantId) -> Result<Vec<BatchJob>> {
        let jobs = self.jobs.read().await;
        let mut all: Vec<BatchJob> = jobs
            .values()
            .filter(|job| job.tenant_id == tenant)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn status_counts(&self) -> Result<QueueStats> {
        let jobs = self.jobs.read().await;
        let mut stats = QueueStats::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats.total = jobs.len();
        Ok(stats)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        self.audit.write().await.push(entry);
        Ok(())
    }

    async fn recent_for_job(
        &self,
        job: JobId,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        let audit = self.audit.read().await;
        Ok(audit
            .iter()
            .rev()
            .filter(|entry| entry.job_id == job)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Catalog backed by a plain map, for tests and fixtures.
#[derive(Clone, Default)]
pub struct MemoryVideoCatalog {
    durations: Arc<RwLock<HashMap<VideoId, u64>>>,
}

impl MemoryVideoCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryVideoCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryVideoCatalog").finish_non_exhaustive()
    }
}

#[async_trait]
impl VideoCatalog for MemoryVideoCatalog {
    async fn duration_secs(&self, video: VideoId) -> Result<u64> {
        self.durations
            .read()
            .await
            .get(&video)
            .copied()
            .ok_or(CoreError::VideoNotFound(video))
    }

    async fn record_duration(
        &self,
        video: VideoId,
        duration_secs: u64,
    ) -> Result<()> {
        self.durations.write().await.insert(video, duration_secs);
        Ok(())
    }
}

/// Plan directory backed by a static map. Tenants without an entry fall
/// through to system defaults.
#[derive(Clone, Default)]
pub struct StaticPlanDirectory {
    overrides: Arc<RwLock<HashMap<TenantId, LimitOverride>>>,
}

impl StaticPlanDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_override(&self, tenant: TenantId, limits: LimitOverride) {
        self.overrides.write().await.insert(tenant, limits);
    }
}

impl std::fmt::Debug for StaticPlanDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticPlanDirectory").finish_non_exhaustive()
    }
}

#[async_trait]
impl PlanDirectory for StaticPlanDirectory {
    async fn concurrency_override(
        &self,
        tenant: TenantId,
    ) -> Result<Option<LimitOverride>> {
        Ok(self.overrides.read().await.get(&tenant).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelworks_model::ActorId;

    #[tokio::test]
    async fn account_cas_rejects_stale_version() {
        let store = MemoryStore::new();
        let tenant = TenantId::new();

        let mut account = store.get_or_create(tenant).await.unwrap();
        account.balance = 100;
        account.version += 1;
        assert!(AccountStore::try_update(&store, &account).await.unwrap());

        // A writer holding the old version loses.
        let mut stale = store.get_or_create(tenant).await.unwrap();
        stale.version = 1; // same version as stored, not bumped
        assert!(!AccountStore::try_update(&store, &stale).await.unwrap());

        stale.version = 2;
        assert!(AccountStore::try_update(&store, &stale).await.unwrap());
    }

    #[tokio::test]
    async fn active_jobs_ordered_by_priority_then_age() {
        let store = MemoryStore::new();
        let tenant = TenantId::new();

        let mut first = BatchJob::new(
            "captions",
            vec![VideoId::new()],
            tenant,
            ActorId::from("coach"),
            serde_json::json!({}),
        );
        first.priority = 0;
        let mut second = first.clone();
        second.id = JobId::new();
        second.priority = 10;
        second.created_at = first.created_at + chrono::Duration::seconds(1);

        store.insert(first.clone()).await.unwrap();
        store.insert(second.clone()).await.unwrap();

        let ordered = store.active_jobs_ordered(tenant).await.unwrap();
        assert_eq!(ordered[0].id, second.id);
        assert_eq!(ordered[1].id, first.id);
    }

    #[tokio::test]
    async fn transactions_come_back_newest_first() {
        let store = MemoryStore::new();
        let tenant = TenantId::new();

        for amount in [1i64, 2, 3] {
            store
                .append_transaction(CreditTransaction::new(
                    tenant,
                    reelworks_model::TransactionKind::Purchase,
                    amount,
                    0,
                    amount,
                    ActorId::from("admin"),
                    serde_json::Value::Null,
                ))
                .await
                .unwrap();
        }

        let history = store.transactions(tenant, 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, 3);
        assert_eq!(history[1].amount, 2);
    }
}
