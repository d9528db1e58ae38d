//! Postgres-backed store.
//!
//! One row per account and per job; optimistic concurrency via a
//! `version` column checked in the UPDATE's WHERE clause, matching the
//! compare-and-update contract of the port traits. Queries use the
//! runtime API so the crate builds without a live database.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use reelworks_model::{
    ActorId, AuditAction, AuditEntry, BatchJob, CreditAccount,
    CreditTransaction, JobId, JobProgress, JobStatus, LimitOverride,
    QueueStats, TenantId, TransactionId, TransactionKind, VideoId,
    VideoStatus,
};

use crate::error::CoreError;
use crate::Result;

use super::{AccountStore, AuditStore, JobStore, PlanDirectory, VideoCatalog};

/// Shared Postgres backend for accounts, jobs, audit entries, and plan
/// lookups.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore").finish_non_exhaustive()
    }
}

impl PostgresStore {
    /// Wraps an existing pool after a health check.
    pub async fn new(pool: PgPool) -> Result<Self> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| {
                CoreError::Internal(format!(
                    "store failed Postgres health check: {e}"
                ))
            })?;
        info!("store connected to Postgres");
        Ok(Self { pool })
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(format!("migration failed: {e}")))?;
        Ok(())
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn account_from_row(row: &PgRow) -> Result<CreditAccount> {
    Ok(CreditAccount {
        tenant_id: TenantId(row.try_get::<Uuid, _>("tenant_id")?),
        balance: row.try_get("balance")?,
        reserved: row.try_get("reserved")?,
        monthly_allotment: row.try_get("monthly_allotment")?,
        rollover_enabled: row.try_get("rollover_enabled")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<CreditTransaction> {
    let kind: String = row.try_get("kind")?;
    Ok(CreditTransaction {
        id: TransactionId(row.try_get::<Uuid, _>("id")?),
        tenant_id: TenantId(row.try_get::<Uuid, _>("tenant_id")?),
        kind: TransactionKind::from_str(&kind)
            .map_err(CoreError::Internal)?,
        amount: row.try_get("amount")?,
        balance_before: row.try_get("balance_before")?,
        balance_after: row.try_get("balance_after")?,
        actor_id: ActorId(row.try_get("actor_id")?),
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

fn job_from_row(row: &PgRow) -> Result<BatchJob> {
    let status: String = row.try_get("status")?;
    let video_ids: serde_json::Value = row.try_get("video_ids")?;
    let status_by_video: serde_json::Value = row.try_get("status_by_video")?;

    let video_ids: Vec<VideoId> = serde_json::from_value(video_ids)?;
    let status_by_video: HashMap<VideoId, VideoStatus> =
        serde_json::from_value(status_by_video)?;

    Ok(BatchJob {
        id: JobId(row.try_get::<Uuid, _>("id")?),
        kind: row.try_get("kind")?,
        video_ids,
        tenant_id: TenantId(row.try_get::<Uuid, _>("tenant_id")?),
        created_by: ActorId(row.try_get("created_by")?),
        config: row.try_get("config")?,
        status: JobStatus::from_str(&status).map_err(CoreError::Internal)?,
        progress: JobProgress {
            total: row.try_get::<i32, _>("progress_total")? as u32,
            completed: row.try_get::<i32, _>("progress_completed")? as u32,
            failed: row.try_get::<i32, _>("progress_failed")? as u32,
            running: row.try_get::<i32, _>("progress_running")? as u32,
        },
        status_by_video,
        reserved_credits: row.try_get("reserved_credits")?,
        consumed_credits: row.try_get("consumed_credits")?,
        priority: row.try_get("priority")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditEntry> {
    let action: String = row.try_get("action")?;
    Ok(AuditEntry {
        id: row.try_get("id")?,
        job_id: JobId(row.try_get::<Uuid, _>("job_id")?),
        action: AuditAction::from_str(&action).map_err(CoreError::Internal)?,
        actor_id: ActorId(row.try_get("actor_id")?),
        detail: row.try_get("detail")?,
        created_at: row.try_get("created_at")?,
    })
}

const ACCOUNT_COLUMNS: &str = "tenant_id, balance, reserved, \
     monthly_allotment, rollover_enabled, version, created_at, updated_at";

const JOB_COLUMNS: &str = "id, kind, video_ids, tenant_id, created_by, \
     config, status, progress_total, progress_completed, progress_failed, \
     progress_running, status_by_video, reserved_credits, consumed_credits, \
     priority, version, created_at, started_at, completed_at";

#[async_trait]
impl AccountStore for PostgresStore {
    async fn get(&self, tenant: TenantId) -> Result<Option<CreditAccount>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM credit_accounts WHERE tenant_id = $1"
        ))
        .bind(tenant.to_uuid())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn get_or_create(&self, tenant: TenantId) -> Result<CreditAccount> {
        // Insert-if-absent then read back; the conflict arm keeps the
        // existing row untouched.
        let account = CreditAccount::new(tenant);
        sqlx::query(
            "INSERT INTO credit_accounts (tenant_id, balance, reserved, \
             monthly_allotment, rollover_enabled, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (tenant_id) DO NOTHING",
        )
        .bind(tenant.to_uuid())
        .bind(account.balance)
        .bind(account.reserved)
        .bind(account.monthly_allotment)
        .bind(account.rollover_enabled)
        .bind(account.version)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(self.pool())
        .await?;

        AccountStore::get(self, tenant)
            .await?
            .ok_or(CoreError::AccountNotFound(tenant))
    }

    async fn try_update(&self, account: &CreditAccount) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE credit_accounts \
             SET balance = $1, reserved = $2, monthly_allotment = $3, \
                 rollover_enabled = $4, version = $5, updated_at = $6 \
             WHERE tenant_id = $7 AND version = $8",
        )
        .bind(account.balance)
        .bind(account.reserved)
        .bind(account.monthly_allotment)
        .bind(account.rollover_enabled)
        .bind(account.version)
        .bind(account.updated_at)
        .bind(account.tenant_id.to_uuid())
        .bind(account.version - 1)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn append_transaction(&self, tx: CreditTransaction) -> Result<()> {
        sqlx::query(
            "INSERT INTO credit_transactions (id, tenant_id, kind, amount, \
             balance_before, balance_after, actor_id, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(*tx.id.as_uuid())
        .bind(tx.tenant_id.to_uuid())
        .bind(tx.kind.as_str())
        .bind(tx.amount)
        .bind(tx.balance_before)
        .bind(tx.balance_after)
        .bind(tx.actor_id.as_str())
        .bind(tx.metadata)
        .bind(tx.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn transactions(
        &self,
        tenant: TenantId,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, kind, amount, balance_before, \
             balance_after, actor_id, metadata, created_at \
             FROM credit_transactions WHERE tenant_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(tenant.to_uuid())
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(transaction_from_row).collect()
    }
}

#[async_trait]
impl JobStore for PostgresStore {
    async fn insert(&self, job: BatchJob) -> Result<()> {
        sqlx::query(
            "INSERT INTO batch_jobs (id, kind, video_ids, tenant_id, \
             created_by, config, status, progress_total, progress_completed, \
             progress_failed, progress_running, status_by_video, \
             reserved_credits, consumed_credits, priority, version, \
             created_at, started_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
                     $13, $14, $15, $16, $17, $18, $19)",
        )
        .bind(*job.id.as_uuid())
        .bind(&job.kind)
        .bind(serde_json::to_value(&job.video_ids)?)
        .bind(job.tenant_id.to_uuid())
        .bind(job.created_by.as_str())
        .bind(&job.config)
        .bind(job.status.as_str())
        .bind(job.progress.total as i32)
        .bind(job.progress.completed as i32)
        .bind(job.progress.failed as i32)
        .bind(job.progress.running as i32)
        .bind(serde_json::to_value(&job.status_by_video)?)
        .bind(job.reserved_credits)
        .bind(job.consumed_credits)
        .bind(job.priority)
        .bind(job.version)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get(&self, job: JobId) -> Result<Option<BatchJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM batch_jobs WHERE id = $1"
        ))
        .bind(*job.as_uuid())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn try_update(&self, job: &BatchJob) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE batch_jobs \
             SET status = $1, progress_completed = $2, progress_failed = $3, \
                 progress_running = $4, status_by_video = $5, \
                 consumed_credits = $6, priority = $7, version = $8, \
                 started_at = $9, completed_at = $10 \
             WHERE id = $11 AND version = $12",
        )
        .bind(job.status.as_str())
        .bind(job.progress.completed as i32)
        .bind(job.progress.failed as i32)
        .bind(job.progress.running as i32)
        .bind(serde_json::to_value(&job.status_by_video)?)
        .bind(job.consumed_credits)
        .bind(job.priority)
        .bind(job.version)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(*job.id.as_uuid())
        .bind(job.version - 1)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn active_job_count(&self, tenant: TenantId) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM batch_jobs \
             WHERE tenant_id = $1 AND status IN ('queued', 'running')",
        )
        .bind(tenant.to_uuid())
        .fetch_one(self.pool())
        .await?;
        Ok(count as usize)
    }

    async fn active_job_count_total(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM batch_jobs \
             WHERE status IN ('queued', 'running')",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(count as usize)
    }

    async fn running_video_count(&self, tenant: TenantId) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(progress_running), 0) FROM batch_jobs \
             WHERE tenant_id = $1 AND status IN ('queued', 'running')",
        )
        .bind(tenant.to_uuid())
        .fetch_one(self.pool())
        .await?;
        Ok(count.max(0) as usize)
    }

    async fn active_jobs_ordered(
        &self,
        tenant: TenantId,
    ) -> Result<Vec<BatchJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM batch_jobs \
             WHERE tenant_id = $1 AND status IN ('queued', 'running') \
             ORDER BY priority DESC, created_at ASC"
        ))
        .bind(tenant.to_uuid())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn jobs_for_tenant(&self, tenant: TenantId) -> Result<Vec<BatchJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM batch_jobs \
             WHERE tenant_id = $1 ORDER BY created_at DESC"
        ))
        .bind(tenant.to_uuid())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn status_counts(&self) -> Result<QueueStats> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS jobs FROM batch_jobs GROUP BY status",
        )
        .fetch_all(self.pool())
        .await?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let jobs: i64 = row.try_get("jobs")?;
            let jobs = jobs as usize;
            match JobStatus::from_str(&status).map_err(CoreError::Internal)? {
                JobStatus::Queued => stats.queued = jobs,
                JobStatus::Running => stats.running = jobs,
                JobStatus::Completed => stats.completed = jobs,
                JobStatus::Cancelled => stats.cancelled = jobs,
            }
            stats.total += jobs;
        }
        Ok(stats)
    }
}

#[async_trait]
impl AuditStore for PostgresStore {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_audit_log (id, job_id, action, actor_id, \
             detail, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.id)
        .bind(*entry.job_id.as_uuid())
        .bind(entry.action.as_str())
        .bind(entry.actor_id.as_str())
        .bind(entry.detail)
        .bind(entry.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn recent_for_job(
        &self,
        job: JobId,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, job_id, action, actor_id, detail, created_at \
             FROM job_audit_log WHERE job_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(*job.as_uuid())
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(audit_from_row).collect()
    }
}

#[async_trait]
impl PlanDirectory for PostgresStore {
    async fn concurrency_override(
        &self,
        tenant: TenantId,
    ) -> Result<Option<LimitOverride>> {
        let row = sqlx::query(
            "SELECT per_tenant_limit, global_limit FROM tenant_plans \
             WHERE tenant_id = $1",
        )
        .bind(tenant.to_uuid())
        .fetch_optional(self.pool())
        .await?;

        Ok(row
            .map(|row| -> Result<LimitOverride> {
                Ok(LimitOverride {
                    per_tenant: row
                        .try_get::<Option<i32>, _>("per_tenant_limit")?
                        .map(|v| v.max(0) as u32),
                    global: row
                        .try_get::<Option<i32>, _>("global_limit")?
                        .map(|v| v.max(0) as u32),
                })
            })
            .transpose()?)
    }
}

#[async_trait]
impl VideoCatalog for PostgresStore {
    async fn duration_secs(&self, video: VideoId) -> Result<u64> {
        let duration: Option<i64> = sqlx::query_scalar(
            "SELECT duration_secs FROM video_catalog WHERE video_id = $1",
        )
        .bind(video.to_uuid())
        .fetch_optional(self.pool())
        .await?;

        duration
            .map(|d| d.max(0) as u64)
            .ok_or(CoreError::VideoNotFound(video))
    }

    async fn record_duration(
        &self,
        video: VideoId,
        duration_secs: u64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO video_catalog (video_id, duration_secs, updated_at) \
             VALUES ($1, $2, NOW()) \
             ON CONFLICT (video_id) \
             DO UPDATE SET duration_secs = $2, updated_at = NOW()",
        )
        .bind(video.to_uuid())
        .bind(duration_secs as i64)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
