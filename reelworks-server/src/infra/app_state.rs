use std::{fmt, sync::Arc};

use reelworks_core::store::memory::{
    MemoryStore, MemoryVideoCatalog, StaticPlanDirectory,
};
use reelworks_core::{
    AccountStore, AuditLog, AuditStore, BatchJobScheduler,
    ConcurrencyPolicyResolver, CreditLedger, JobAdmissionController, JobStore,
    PlanDirectory, VideoCatalog,
};

use crate::infra::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: BatchJobScheduler,
    pub ledger: CreditLedger,
    pub catalog: Arc<dyn VideoCatalog>,
    pub config: Arc<Config>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Wires the ledger, admission controller, and scheduler over the
    /// given store ports. The same backend object may serve several
    /// ports (the Postgres store implements all of them).
    pub fn from_ports(
        accounts: Arc<dyn AccountStore>,
        jobs: Arc<dyn JobStore>,
        audit: Arc<dyn AuditStore>,
        plans: Arc<dyn PlanDirectory>,
        catalog: Arc<dyn VideoCatalog>,
        config: Arc<Config>,
    ) -> Self {
        let ledger = CreditLedger::new(accounts);
        let policy =
            ConcurrencyPolicyResolver::new(plans, config.system_limits());
        let admission = JobAdmissionController::new(jobs.clone(), policy);
        let audit_log = AuditLog::new(audit);
        let scheduler = BatchJobScheduler::new(
            jobs,
            ledger.clone(),
            admission,
            audit_log,
            catalog.clone(),
        );

        Self {
            scheduler,
            ledger,
            catalog,
            config,
        }
    }

    /// Single-process state with no external dependencies, used when
    /// `DATABASE_URL` is unset and by the HTTP tests.
    pub fn in_memory(config: Arc<Config>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(MemoryVideoCatalog::new());
        let plans = Arc::new(StaticPlanDirectory::new());
        Self::from_ports(
            store.clone(),
            store.clone(),
            store,
            plans,
            catalog,
            config,
        )
    }
}
