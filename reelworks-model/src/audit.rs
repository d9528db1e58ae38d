//! Append-only audit trail entries for job lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{ActorId, JobId};

/// Action recorded by an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Dequeued,
    VideoStatusChanged,
    Prioritized,
    Cancelled,
    Completed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Dequeued => "dequeued",
            Self::VideoStatusChanged => "video_status_changed",
            Self::Prioritized => "prioritized",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "dequeued" => Ok(Self::Dequeued),
            "video_status_changed" => Ok(Self::VideoStatusChanged),
            "prioritized" => Ok(Self::Prioritized),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown audit action `{other}`")),
        }
    }
}

/// One immutable event in a job's trail. Retrieval is newest-first and
/// capped for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub job_id: JobId,
    pub action: AuditAction,
    pub actor_id: ActorId,

    /// Free-form event context (video id, priority delta, reason).
    pub detail: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        job_id: JobId,
        action: AuditAction,
        actor_id: ActorId,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_id,
            action,
            actor_id,
            detail,
            created_at: Utc::now(),
        }
    }
}
