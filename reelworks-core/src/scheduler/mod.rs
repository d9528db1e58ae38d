//! Batch job scheduling.
//!
//! The scheduler is a passive state machine polled by external worker
//! processes: it owns job lifecycle, queueing order, and the
//! reconciliation of reserved-vs-consumed credits, but runs no loop of
//! its own. All cross-caller coordination happens through the store's
//! version-checked compare-and-update, never in-memory locks.
//!
//! Multi-record invariants (job terminalisation plus reservation
//! release) are two sequenced atomic operations; a crash between them
//! leaves the ledger temporarily over-reserved, which is logged and
//! reconciled out of band rather than hidden.

pub mod estimate;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use reelworks_model::{
    ActorId, AuditAction, AuditEntry, BatchJob, DequeuedVideo, JobId,
    JobStatus, QueueStats, TenantId, VideoId, VideoStatus,
};

use crate::admission::JobAdmissionController;
use crate::audit::{AuditLog, DEFAULT_DISPLAY_CAP};
use crate::error::CoreError;
use crate::ledger::CreditLedger;
use crate::store::{JobStore, VideoCatalog};
use crate::Result;

/// Attempts before a contended job record is reported as conflicted.
const MAX_CAS_RETRIES: usize = 16;

/// Request to create a batch job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    /// Opaque job type tag for the external worker.
    pub kind: String,
    pub video_ids: Vec<VideoId>,
    pub tenant_id: TenantId,
    pub created_by: ActorId,
    /// Worker configuration, passed through untouched.
    pub config: serde_json::Value,
    /// Whether this job type consumes credits. Declared by the caller;
    /// the scheduler never branches on `kind`.
    pub billable: bool,
}

/// Snapshot returned by status queries: the job plus its most recent
/// audit entries, newest first.
#[derive(Debug, Clone)]
pub struct JobStatusView {
    pub job: BatchJob,
    pub recent_events: Vec<AuditEntry>,
}

#[derive(Clone)]
pub struct BatchJobScheduler {
    jobs: Arc<dyn JobStore>,
    ledger: CreditLedger,
    admission: JobAdmissionController,
    audit: AuditLog,
    catalog: Arc<dyn VideoCatalog>,
}

impl std::fmt::Debug for BatchJobScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchJobScheduler").finish_non_exhaustive()
    }
}

impl BatchJobScheduler {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        ledger: CreditLedger,
        admission: JobAdmissionController,
        audit: AuditLog,
        catalog: Arc<dyn VideoCatalog>,
    ) -> Self {
        Self {
            jobs,
            ledger,
            admission,
            audit,
            catalog,
        }
    }

    /// Admission check, credit reservation, then persistence. A denial
    /// or estimation failure leaves no job record and no reservation.
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<JobId> {
        if request.video_ids.is_empty() {
            return Err(CoreError::InvalidJobState(
                "cannot create a job with no videos".to_string(),
            ));
        }

        let admission =
            self.admission.can_start_job(request.tenant_id).await?;
        if !admission.allowed {
            return Err(CoreError::ConcurrencyLimitReached(
                admission
                    .reason
                    .unwrap_or_else(|| "concurrency limit reached".to_string()),
            ));
        }

        let mut job = BatchJob::new(
            request.kind,
            request.video_ids,
            request.tenant_id,
            request.created_by.clone(),
            request.config,
        );

        let mut estimated = 0i64;
        if request.billable {
            for video in &job.video_ids {
                let duration = self.catalog.duration_secs(*video).await?;
                estimated += estimate::video_credit_cost(duration);
            }
            self.ledger
                .reserve(
                    request.tenant_id,
                    estimated,
                    &request.created_by,
                    serde_json::json!({ "job_id": job.id }),
                )
                .await?;
            job.reserved_credits = estimated;
        }

        if let Err(err) = self.jobs.insert(job.clone()).await {
            // The reservation was ours; give it back before surfacing
            // the failure.
            if estimated > 0 {
                if let Err(release_err) = self
                    .ledger
                    .release(
                        request.tenant_id,
                        estimated,
                        &request.created_by,
                        serde_json::json!({
                            "job_id": job.id,
                            "reason": "job insert failed",
                        }),
                    )
                    .await
                {
                    warn!(job_id = %job.id, error = %release_err,
                        "failed to release reservation after insert failure");
                }
            }
            return Err(err);
        }

        self.audit
            .record(
                job.id,
                AuditAction::Created,
                &request.created_by,
                serde_json::json!({
                    "videos": job.progress.total,
                    "reserved_credits": estimated,
                }),
            )
            .await?;

        info!(
            job_id = %job.id,
            tenant = %job.tenant_id,
            videos = job.progress.total,
            reserved = estimated,
            "batch job created"
        );
        Ok(job.id)
    }

    /// Job snapshot plus its most recent audit entries, newest first.
    pub async fn get_status(&self, job: JobId) -> Result<JobStatusView> {
        let snapshot = self
            .jobs
            .get(job)
            .await?
            .ok_or(CoreError::JobNotFound(job))?;
        let recent_events =
            self.audit.recent(job, DEFAULT_DISPLAY_CAP).await?;
        Ok(JobStatusView {
            job: snapshot,
            recent_events,
        })
    }

    /// Flips the job to `cancelled` and releases its unspent
    /// reservation. Cancellation is cooperative: an in-flight worker
    /// step is not interrupted, and its later status reports are
    /// rejected with `InvalidJobState`.
    pub async fn cancel(&self, job: JobId, actor: &ActorId) -> Result<BatchJob> {
        let cancelled = self
            .update_job_with(job, |current| {
                if current.status.is_terminal() {
                    return Err(CoreError::InvalidJobState(format!(
                        "job {} is already {}",
                        current.id,
                        current.status.as_str()
                    )));
                }
                let mut next = current.clone();
                next.status = JobStatus::Cancelled;
                next.completed_at = Some(Utc::now());
                Ok(Some(next))
            })
            .await?;

        let unspent = cancelled.unspent_reservation();
        self.release_unspent(&cancelled, "cancelled").await;

        self.audit
            .record(
                job,
                AuditAction::Cancelled,
                actor,
                serde_json::json!({ "released_credits": unspent }),
            )
            .await?;

        info!(job_id = %job, released = unspent, "job cancelled");
        Ok(cancelled)
    }

    /// Adjusts priority by `delta` (may be negative). Only valid while
    /// the job is still queued.
    pub async fn prioritize(
        &self,
        job: JobId,
        delta: i32,
        actor: &ActorId,
    ) -> Result<BatchJob> {
        let updated = self
            .update_job_with(job, |current| {
                if current.status != JobStatus::Queued {
                    return Err(CoreError::InvalidJobState(format!(
                        "job {} is {}, priority can only change while queued",
                        current.id,
                        current.status.as_str()
                    )));
                }
                let mut next = current.clone();
                next.priority += delta;
                Ok(Some(next))
            })
            .await?;

        self.audit
            .record(
                job,
                AuditAction::Prioritized,
                actor,
                serde_json::json!({
                    "delta": delta,
                    "priority": updated.priority,
                }),
            )
            .await?;

        Ok(updated)
    }

    /// Claims the next unit of work for the tenant, or `None` when the
    /// tenant has no queued video or no running-video headroom.
    ///
    /// Scan order: jobs by `priority desc, created_at asc`, then each
    /// job's videos in array order. Claiming marks the video `running`
    /// (so repeated polls do not hand it out twice) and moves a queued
    /// job to `running`.
    pub async fn dequeue_next(
        &self,
        tenant: TenantId,
        worker: &ActorId,
    ) -> Result<Option<DequeuedVideo>> {
        let limits = self.admission.limits_for(tenant).await?;

        for _ in 0..MAX_CAS_RETRIES {
            // Video-count headroom, deliberately distinct from the
            // job-count check done at creation time.
            let running = self.jobs.running_video_count(tenant).await?;
            if running >= limits.per_tenant as usize {
                debug!(%tenant, running, limit = limits.per_tenant,
                    "no video headroom");
                return Ok(None);
            }

            let candidates = self.jobs.active_jobs_ordered(tenant).await?;
            let Some((job, video)) = next_queued_video(&candidates) else {
                return Ok(None);
            };

            let mut next = job.clone();
            next.status_by_video.insert(video, VideoStatus::Running);
            next.progress.running += 1;
            if next.status == JobStatus::Queued {
                next.status = JobStatus::Running;
                next.started_at = Some(Utc::now());
            }
            next.version = job.version + 1;

            if self.jobs.try_update(&next).await? {
                self.audit
                    .record(
                        job.id,
                        AuditAction::Dequeued,
                        worker,
                        serde_json::json!({ "video_id": video }),
                    )
                    .await?;
                debug!(job_id = %job.id, video_id = %video, "video claimed");
                return Ok(Some(DequeuedVideo {
                    job_id: job.id,
                    video_id: video,
                }));
            }
            // Another worker claimed concurrently; rescan.
        }

        Err(CoreError::Conflict(format!(
            "dequeue for tenant {tenant} kept losing claim races"
        )))
    }

    /// Worker-reported outcome for one video. Progress counters are
    /// adjusted by diffing the previous status against the new one, so
    /// repeated identical calls never double-count; a retried report of
    /// an already-settled outcome is a full no-op, including its
    /// `credits_used`. Reported credit spend settles against the ledger
    /// before it accumulates on the job, and is handed back if the job
    /// write then fails. The first worker-driven transition moves a
    /// queued job to `running`; when every video is terminal the job
    /// completes and its unspent reservation is released.
    pub async fn update_video_status(
        &self,
        job: JobId,
        video: VideoId,
        status: VideoStatus,
        credits_used: Option<i64>,
        actor: &ActorId,
    ) -> Result<BatchJob> {
        let current = self
            .jobs
            .get(job)
            .await?
            .ok_or(CoreError::JobNotFound(job))?;

        if current.status.is_terminal() {
            return Err(CoreError::InvalidJobState(format!(
                "job {} is {}, no further video updates accepted",
                job,
                current.status.as_str()
            )));
        }

        let previous = current.video_status(&video).ok_or_else(|| {
            CoreError::InvalidJobState(format!(
                "video {video} is not part of job {job}"
            ))
        })?;

        // Reject impossible transitions before any credits move.
        if previous.is_terminal() && previous != status {
            return Err(CoreError::InvalidJobState(format!(
                "video {video} is already {}",
                previous.as_str()
            )));
        }
        if status == VideoStatus::Queued && previous != VideoStatus::Queued {
            return Err(CoreError::InvalidJobState(format!(
                "video {video} cannot return to queued"
            )));
        }

        if previous == status
            && (previous.is_terminal() || credits_used.is_none())
        {
            // Worker retry of a report that already landed; the spend
            // it carries was already settled the first time.
            return Ok(current);
        }

        // Settle reported spend against the ledger first. The spend is
        // capped at the job's unspent reservation so the job-level
        // `reserved >= consumed` invariant holds even when the worker
        // overruns the estimate.
        let mut spend = credits_used.unwrap_or(0);
        if spend > 0 {
            if current.reserved_credits == 0 {
                warn!(job_id = %job, spend,
                    "credit spend reported for non-billable job, ignoring");
                spend = 0;
            } else {
                let capped = spend.min(current.unspent_reservation());
                if capped < spend {
                    warn!(job_id = %job, reported = spend, applied = capped,
                        "reported spend exceeds remaining reservation");
                }
                spend = capped;
                if spend > 0 {
                    self.ledger
                        .consume(
                            current.tenant_id,
                            spend,
                            actor,
                            serde_json::json!({
                                "job_id": job,
                                "video_id": video,
                            }),
                        )
                        .await?;
                }
            }
        }

        let update = self
            .update_job_with(job, |fresh| {
                if fresh.status.is_terminal() {
                    return Err(CoreError::InvalidJobState(format!(
                        "job {} is {}, no further video updates accepted",
                        fresh.id,
                        fresh.status.as_str()
                    )));
                }
                let old = fresh.video_status(&video).ok_or_else(|| {
                    CoreError::InvalidJobState(format!(
                        "video {video} is not part of job {}",
                        fresh.id
                    ))
                })?;

                if old.is_terminal() {
                    if old == status && spend == 0 {
                        return Ok(None);
                    }
                    // A concurrent report settled this video between
                    // our snapshot and the write.
                    return Err(CoreError::InvalidJobState(format!(
                        "video {video} is already {}",
                        old.as_str()
                    )));
                }
                if status == VideoStatus::Queued && old != VideoStatus::Queued {
                    return Err(CoreError::InvalidJobState(format!(
                        "video {video} cannot return to queued"
                    )));
                }

                if old == status && spend == 0 {
                    return Ok(None);
                }

                let mut next = fresh.clone();
                if old != status {
                    next.status_by_video.insert(video, status);
                    if old == VideoStatus::Running {
                        next.progress.running =
                            next.progress.running.saturating_sub(1);
                    }
                    match status {
                        VideoStatus::Running => next.progress.running += 1,
                        VideoStatus::Completed => next.progress.completed += 1,
                        VideoStatus::Failed => next.progress.failed += 1,
                        VideoStatus::Queued => {}
                    }
                    if next.status == JobStatus::Queued {
                        next.status = JobStatus::Running;
                        next.started_at = Some(Utc::now());
                    }
                }
                next.consumed_credits += spend;

                if next.progress.is_finished() && !next.status.is_terminal() {
                    next.status = JobStatus::Completed;
                    next.completed_at = Some(Utc::now());
                }
                Ok(Some(next))
            })
            .await;

        let updated = match update {
            Ok(updated) => updated,
            Err(err) => {
                // The spend already left the account but never reached
                // the job record; hand it back before surfacing the
                // failure.
                if spend > 0 {
                    if let Err(reinstate_err) = self
                        .ledger
                        .reinstate(
                            current.tenant_id,
                            spend,
                            actor,
                            serde_json::json!({
                                "job_id": job,
                                "video_id": video,
                                "reason": "video status update failed",
                            }),
                        )
                        .await
                    {
                        warn!(
                            job_id = %job,
                            tenant = %current.tenant_id,
                            spend,
                            error = %reinstate_err,
                            "failed to reinstate spend after job update failure"
                        );
                    }
                }
                return Err(err);
            }
        };

        self.audit
            .record(
                job,
                AuditAction::VideoStatusChanged,
                actor,
                serde_json::json!({
                    "video_id": video,
                    "from": previous.as_str(),
                    "to": status.as_str(),
                    "credits_used": spend,
                }),
            )
            .await?;

        if updated.status == JobStatus::Completed {
            let unspent = updated.unspent_reservation();
            self.release_unspent(&updated, "completed").await;
            self.audit
                .record(
                    job,
                    AuditAction::Completed,
                    &ActorId::system(),
                    serde_json::json!({ "released_credits": unspent }),
                )
                .await?;
            info!(
                job_id = %job,
                completed = updated.progress.completed,
                failed = updated.progress.failed,
                released = unspent,
                "job completed"
            );
        }

        Ok(updated)
    }

    /// Job counts by status, for operator tooling.
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.jobs.status_counts().await
    }

    /// All of a tenant's jobs, newest first.
    pub async fn jobs_for_tenant(
        &self,
        tenant: TenantId,
    ) -> Result<Vec<BatchJob>> {
        self.jobs.jobs_for_tenant(tenant).await
    }

    /// Returns the unspent reservation to the tenant once a job reaches
    /// a terminal status. The job write has already landed; a failure
    /// here leaves the ledger temporarily over-reserved, which is
    /// surfaced in the log for out-of-band reconciliation.
    async fn release_unspent(&self, job: &BatchJob, reason: &str) {
        let unspent = job.unspent_reservation();
        if unspent == 0 {
            return;
        }
        if let Err(err) = self
            .ledger
            .release(
                job.tenant_id,
                unspent,
                &ActorId::system(),
                serde_json::json!({ "job_id": job.id, "reason": reason }),
            )
            .await
        {
            warn!(
                job_id = %job.id,
                tenant = %job.tenant_id,
                unspent,
                error = %err,
                "failed to release unspent reservation"
            );
        }
    }

    /// One atomic read-modify-write against the job record: load,
    /// transition, version-checked store, retry on conflict. A `None`
    /// transition result means "already in the desired state" and skips
    /// the write.
    async fn update_job_with<F>(
        &self,
        job: JobId,
        transition: F,
    ) -> Result<BatchJob>
    where
        F: Fn(&BatchJob) -> Result<Option<BatchJob>>,
    {
        for attempt in 0..MAX_CAS_RETRIES {
            let current = self
                .jobs
                .get(job)
                .await?
                .ok_or(CoreError::JobNotFound(job))?;

            let Some(mut next) = transition(&current)? else {
                return Ok(current);
            };

            debug_assert_eq!(
                next.progress.completed
                    + next.progress.failed
                    + next.progress.running
                    + next
                        .status_by_video
                        .values()
                        .filter(|s| **s == VideoStatus::Queued)
                        .count() as u32,
                next.progress.total
            );
            debug_assert!(next.reserved_credits >= next.consumed_credits);

            next.version = current.version + 1;
            if self.jobs.try_update(&next).await? {
                return Ok(next);
            }
            debug!(job_id = %job, attempt, "job version conflict, retrying");
        }

        Err(CoreError::Conflict(format!(
            "job {job} kept changing under concurrent updates"
        )))
    }
}

/// First queued video across the ordered candidate jobs, scanning each
/// job's `video_ids` in array order.
fn next_queued_video(candidates: &[BatchJob]) -> Option<(&BatchJob, VideoId)> {
    for job in candidates {
        for video in &job.video_ids {
            if job.video_status(video) == Some(VideoStatus::Queued) {
                return Some((job, *video));
            }
        }
    }
    None
}
