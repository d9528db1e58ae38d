//! Core data model definitions shared across Reelworks crates.

pub mod api;
pub mod audit;
pub mod credit;
pub mod ids;
pub mod job;
pub mod policy;

// Intentionally curated re-exports for downstream consumers.
pub use api::ApiResponse;
pub use audit::{AuditAction, AuditEntry};
pub use credit::{
    BalanceSummary, CreditAccount, CreditTransaction, SufficiencyCheck,
    TransactionKind,
};
pub use ids::{ActorId, JobId, TenantId, TransactionId, VideoId};
pub use job::{
    BatchJob, DequeuedVideo, JobProgress, JobStatus, QueueStats, VideoStatus,
};
pub use policy::{ConcurrencyLimits, LimitOverride};
