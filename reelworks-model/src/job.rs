//! Batch job types.
//!
//! A batch job covers an ordered list of videos processed one unit at a
//! time by an external worker. The job's `kind` is an opaque tag
//! dispatched entirely by that worker; the core never branches on it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ActorId, JobId, TenantId, VideoId};

/// Job lifecycle status. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses counted against concurrency limits.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status `{other}`")),
        }
    }
}

/// Per-video status within a job. `Completed` and `Failed` are terminal
/// for that video, independent of its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl VideoStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for VideoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown video status `{other}`")),
        }
    }
}

/// Aggregate progress counters. Invariant: the per-video status counts
/// always sum to `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub running: u32,
}

impl JobProgress {
    /// Every video has reached a terminal status.
    pub fn is_finished(&self) -> bool {
        self.completed + self.failed >= self.total
    }
}

/// A multi-video background job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: JobId,

    /// Opaque job type tag, dispatched only by the external worker.
    pub kind: String,

    /// Ordered work list; dequeue scans this in array order.
    pub video_ids: Vec<VideoId>,

    pub tenant_id: TenantId,
    pub created_by: ActorId,

    /// Free-form worker configuration, passed through untouched.
    pub config: serde_json::Value,

    pub status: JobStatus,
    pub progress: JobProgress,
    pub status_by_video: HashMap<VideoId, VideoStatus>,

    /// Credits soft-held at creation. Always >= `consumed_credits`.
    pub reserved_credits: i64,

    /// Credits actually spent so far, as reported by the worker.
    pub consumed_credits: i64,

    /// Higher runs sooner. Ties break on `created_at`.
    pub priority: i32,

    /// Optimistic-concurrency version, bumped on every mutation.
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    /// A freshly queued job: every video `Queued`, zeroed progress,
    /// default priority.
    pub fn new(
        kind: impl Into<String>,
        video_ids: Vec<VideoId>,
        tenant_id: TenantId,
        created_by: ActorId,
        config: serde_json::Value,
    ) -> Self {
        let status_by_video = video_ids
            .iter()
            .map(|video| (*video, VideoStatus::Queued))
            .collect();
        let progress = JobProgress {
            total: video_ids.len() as u32,
            ..JobProgress::default()
        };

        Self {
            id: JobId::new(),
            kind: kind.into(),
            video_ids,
            tenant_id,
            created_by,
            config,
            status: JobStatus::Queued,
            progress,
            status_by_video,
            reserved_credits: 0,
            consumed_credits: 0,
            priority: 0,
            version: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn video_status(&self, video: &VideoId) -> Option<VideoStatus> {
        self.status_by_video.get(video).copied()
    }

    /// Reservation not yet covered by reported spend; released when the
    /// job reaches a terminal status.
    pub fn unspent_reservation(&self) -> i64 {
        (self.reserved_credits - self.consumed_credits).max(0)
    }
}

/// One unit of claimed work handed to the external worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DequeuedVideo {
    pub job_id: JobId,
    pub video_id: VideoId,
}

/// Job counts by status, for operator tooling.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub cancelled: usize,
}
