//! Append-only job audit trail.

use std::sync::Arc;

use reelworks_model::{ActorId, AuditAction, AuditEntry, JobId};

use crate::store::AuditStore;
use crate::Result;

/// Entries returned by status queries when no explicit cap is given.
pub const DEFAULT_DISPLAY_CAP: usize = 20;

#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        job: JobId,
        action: AuditAction,
        actor: &ActorId,
        detail: serde_json::Value,
    ) -> Result<()> {
        let entry = AuditEntry::new(job, action, actor.clone(), detail);
        self.store.append(entry).await
    }

    /// Newest-first entries for one job, capped for display.
    pub async fn recent(
        &self,
        job: JobId,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        self.store.recent_for_job(job, limit).await
    }
}
