//! Persistence contracts for the ledger and scheduler.
//!
//! All coordination between concurrent callers happens through these
//! stores: every mutation is a single atomic compare-and-update against
//! one record, keyed on the record's `version`. The core never holds
//! in-memory locks across operations.

use async_trait::async_trait;

use reelworks_model::{
    AuditEntry, BatchJob, CreditAccount, CreditTransaction, JobId,
    LimitOverride, QueueStats, TenantId, VideoId,
};

use crate::Result;

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::PostgresStore;

/// Durable storage for credit accounts and their transaction trail.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, tenant: TenantId) -> Result<Option<CreditAccount>>;

    /// Loads the account, materialising a zeroed one if absent.
    async fn get_or_create(&self, tenant: TenantId) -> Result<CreditAccount>;

    /// Optimistic write: persists `account` only if the stored version
    /// is exactly `account.version - 1`. Returns `false` on conflict so
    /// the caller can re-read and retry.
    async fn try_update(&self, account: &CreditAccount) -> Result<bool>;

    /// Appends one immutable transaction record.
    async fn append_transaction(&self, tx: CreditTransaction) -> Result<()>;

    /// Newest-first transaction history, capped at `limit`.
    async fn transactions(
        &self,
        tenant: TenantId,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>>;
}

/// Durable storage for batch jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: BatchJob) -> Result<()>;

    async fn get(&self, job: JobId) -> Result<Option<BatchJob>>;

    /// Optimistic write with the same version contract as
    /// [`AccountStore::try_update`].
    async fn try_update(&self, job: &BatchJob) -> Result<bool>;

    /// Jobs in `{queued, running}` for one tenant.
    async fn active_job_count(&self, tenant: TenantId) -> Result<usize>;

    /// Jobs in `{queued, running}` across all tenants.
    async fn active_job_count_total(&self) -> Result<usize>;

    /// Videos currently `running` across the tenant's active jobs.
    async fn running_video_count(&self, tenant: TenantId) -> Result<usize>;

    /// Active jobs for the tenant in dequeue scan order: `priority
    /// desc, created_at asc`.
    async fn active_jobs_ordered(&self, tenant: TenantId)
    -> Result<Vec<BatchJob>>;

    /// All jobs for the tenant, newest first.
    async fn jobs_for_tenant(&self, tenant: TenantId) -> Result<Vec<BatchJob>>;

    /// Job counts by status, for operator tooling.
    async fn status_counts(&self) -> Result<QueueStats>;
}

/// Append-only audit trail storage.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<()>;

    /// Newest-first entries for one job, capped at `limit`.
    async fn recent_for_job(
        &self,
        job: JobId,
        limit: usize,
    ) -> Result<Vec<AuditEntry>>;
}

/// Video catalog collaborator. The scheduler only needs durations for
/// credit estimation; entries are mirrored in from the media catalog
/// via [`VideoCatalog::record_duration`].
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    /// Duration of a known video, or [`CoreError::VideoNotFound`].
    ///
    /// [`CoreError::VideoNotFound`]: crate::error::CoreError::VideoNotFound
    async fn duration_secs(&self, video: VideoId) -> Result<u64>;

    /// Upserts a mirrored duration entry.
    async fn record_duration(
        &self,
        video: VideoId,
        duration_secs: u64,
    ) -> Result<()>;
}

/// Subscription plan collaborator: optional concurrency overrides per
/// tenant.
#[async_trait]
pub trait PlanDirectory: Send + Sync {
    async fn concurrency_override(
        &self,
        tenant: TenantId,
    ) -> Result<Option<LimitOverride>>;
}
