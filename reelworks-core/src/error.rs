use thiserror::Error;

use reelworks_model::{JobId, TenantId, VideoId};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(
        "insufficient credits for tenant {tenant_id}: required {required}, available {available}"
    )]
    InsufficientCredits {
        tenant_id: TenantId,
        required: i64,
        available: i64,
    },

    #[error("credit account not found: {0}")]
    AccountNotFound(TenantId),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("video not in catalog: {0}")]
    VideoNotFound(VideoId),

    #[error("invalid job state: {0}")]
    InvalidJobState(String),

    #[error("concurrency limit reached: {0}")]
    ConcurrencyLimitReached(String),

    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    /// Optimistic-concurrency retries exhausted on a hot record.
    #[error("conflicting concurrent update: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Human-readable reason string, surfaced directly in operator and
    /// tenant-facing tooling.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
