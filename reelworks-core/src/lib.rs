//! # Reelworks Core
//!
//! Credit accounting and batch job scheduling for AI-cost-bearing video
//! work (captions, transcription, quiz generation) shared by many
//! tenants.
//!
//! The two coupled halves:
//!
//! - [`CreditLedger`]: per-tenant balance/reservation accounting with an
//!   append-only, replayable transaction trail.
//! - [`BatchJobScheduler`]: admission-controlled job lifecycle, polled
//!   by external workers via [`BatchJobScheduler::dequeue_next`], with
//!   reserved-vs-consumed credit reconciliation on completion and
//!   cancellation.
//!
//! The core owns no scheduling loop and no in-memory coordination; all
//! concurrency safety comes from version-checked compare-and-update
//! writes against the [`store`] ports.

pub mod admission;
pub mod audit;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod scheduler;
pub mod store;

pub use admission::{Admission, JobAdmissionController};
pub use audit::{AuditLog, DEFAULT_DISPLAY_CAP};
pub use error::{CoreError, Result};
pub use ledger::CreditLedger;
pub use policy::ConcurrencyPolicyResolver;
pub use scheduler::{BatchJobScheduler, CreateJobRequest, JobStatusView};
pub use scheduler::estimate::video_credit_cost;
pub use store::{
    AccountStore, AuditStore, JobStore, MemoryStore, PlanDirectory,
    VideoCatalog,
};
#[cfg(feature = "database")]
pub use store::PostgresStore;
