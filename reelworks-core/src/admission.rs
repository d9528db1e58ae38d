//! Creation-time admission control.
//!
//! Counts *jobs* in `{queued, running}`, per tenant and system-wide.
//! This is deliberately distinct from the running-*video* headroom check
//! the scheduler performs at dequeue time; the two checks are never
//! merged.

use std::sync::Arc;

use tracing::debug;

use reelworks_model::{ConcurrencyLimits, TenantId};

use crate::policy::ConcurrencyPolicyResolver;
use crate::store::JobStore;
use crate::Result;

/// Outcome of an admission check. Denials carry a human-readable reason
/// since they surface directly in tenant-facing tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl Admission {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn denied(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

#[derive(Clone)]
pub struct JobAdmissionController {
    jobs: Arc<dyn JobStore>,
    policy: ConcurrencyPolicyResolver,
}

impl std::fmt::Debug for JobAdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobAdmissionController").finish_non_exhaustive()
    }
}

impl JobAdmissionController {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        policy: ConcurrencyPolicyResolver,
    ) -> Self {
        Self { jobs, policy }
    }

    /// Resolved limits for the tenant; also used by the scheduler's
    /// dequeue headroom check.
    pub async fn limits_for(
        &self,
        tenant: TenantId,
    ) -> Result<ConcurrencyLimits> {
        self.policy.limits_for(tenant).await
    }

    pub async fn can_start_job(&self, tenant: TenantId) -> Result<Admission> {
        let limits = self.policy.limits_for(tenant).await?;

        let tenant_active = self.jobs.active_job_count(tenant).await?;
        if tenant_active >= limits.per_tenant as usize {
            debug!(%tenant, tenant_active, limit = limits.per_tenant, "tenant job limit hit");
            return Ok(Admission::denied(format!(
                "tenant already has {tenant_active} active jobs (limit {})",
                limits.per_tenant
            )));
        }

        let global_active = self.jobs.active_job_count_total().await?;
        if global_active >= limits.global as usize {
            debug!(global_active, limit = limits.global, "global job limit hit");
            return Ok(Admission::denied(format!(
                "system is at capacity with {global_active} active jobs (limit {})",
                limits.global
            )));
        }

        Ok(Admission::allowed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, StaticPlanDirectory};
    use reelworks_model::{ActorId, BatchJob, JobStatus, LimitOverride, VideoId};

    fn controller(store: Arc<MemoryStore>) -> JobAdmissionController {
        let policy = ConcurrencyPolicyResolver::new(
            Arc::new(StaticPlanDirectory::new()),
            LimitOverride::default(),
        );
        JobAdmissionController::new(store, policy)
    }

    async fn insert_job(store: &MemoryStore, tenant: TenantId, status: JobStatus) {
        let mut job = BatchJob::new(
            "captions",
            vec![VideoId::new()],
            tenant,
            ActorId::from("coach"),
            serde_json::json!({}),
        );
        job.status = status;
        crate::store::JobStore::insert(store, job).await.unwrap();
    }

    #[tokio::test]
    async fn admits_under_the_limit() {
        let store = Arc::new(MemoryStore::new());
        let tenant = TenantId::new();
        insert_job(&store, tenant, JobStatus::Queued).await;

        let admission =
            controller(store).can_start_job(tenant).await.unwrap();
        assert!(admission.allowed);
        assert!(admission.reason.is_none());
    }

    #[tokio::test]
    async fn denies_at_per_tenant_limit() {
        let store = Arc::new(MemoryStore::new());
        let tenant = TenantId::new();
        // Default per-tenant limit is 2; queued and running both count.
        insert_job(&store, tenant, JobStatus::Queued).await;
        insert_job(&store, tenant, JobStatus::Running).await;

        let admission =
            controller(store).can_start_job(tenant).await.unwrap();
        assert!(!admission.allowed);
        assert!(admission.reason.unwrap().contains("2 active jobs"));
    }

    #[tokio::test]
    async fn terminal_jobs_do_not_count() {
        let store = Arc::new(MemoryStore::new());
        let tenant = TenantId::new();
        insert_job(&store, tenant, JobStatus::Completed).await;
        insert_job(&store, tenant, JobStatus::Cancelled).await;
        insert_job(&store, tenant, JobStatus::Running).await;

        let admission =
            controller(store).can_start_job(tenant).await.unwrap();
        assert!(admission.allowed);
    }

    #[tokio::test]
    async fn denies_at_global_limit_across_tenants() {
        let store = Arc::new(MemoryStore::new());
        // Default global limit is 10; spread across tenants so no
        // single tenant trips its own cap.
        for _ in 0..10 {
            insert_job(&store, TenantId::new(), JobStatus::Running).await;
        }

        let admission = controller(store)
            .can_start_job(TenantId::new())
            .await
            .unwrap();
        assert!(!admission.allowed);
        assert!(admission.reason.unwrap().contains("capacity"));
    }
}
