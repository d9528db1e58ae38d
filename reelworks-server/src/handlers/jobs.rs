use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use reelworks_core::CreateJobRequest;
use reelworks_model::{
    ApiResponse, AuditEntry, BatchJob, JobId, TenantId, VideoId,
};

use crate::AppState;
use crate::errors::AppResult;
use crate::handlers::Actor;

#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    pub kind: String,
    pub video_ids: Vec<VideoId>,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default = "default_billable")]
    pub billable: bool,
}

fn default_billable() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct JobCreated {
    pub job_id: JobId,
}

pub async fn create_job_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<CreateJobBody>,
) -> AppResult<(StatusCode, Json<ApiResponse<JobCreated>>)> {
    let job_id = state
        .scheduler
        .create_job(CreateJobRequest {
            kind: body.kind,
            video_ids: body.video_ids,
            tenant_id: body.tenant_id,
            created_by: actor,
            config: body.config,
            billable: body.billable,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(JobCreated { job_id })),
    ))
}

#[derive(Debug, Serialize)]
pub struct JobStatusBody {
    pub job: BatchJob,
    pub recent_events: Vec<AuditEntry>,
}

pub async fn get_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<Json<ApiResponse<JobStatusBody>>> {
    let view = state.scheduler.get_status(job_id).await?;
    Ok(Json(ApiResponse::success(JobStatusBody {
        job: view.job,
        recent_events: view.recent_events,
    })))
}

pub async fn cancel_job_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(job_id): Path<JobId>,
) -> AppResult<Json<ApiResponse<BatchJob>>> {
    let job = state.scheduler.cancel(job_id, &actor).await?;
    Ok(Json(ApiResponse::success(job)))
}

#[derive(Debug, Deserialize)]
pub struct PrioritizeBody {
    pub delta: i32,
}

pub async fn prioritize_job_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(job_id): Path<JobId>,
    Json(body): Json<PrioritizeBody>,
) -> AppResult<Json<ApiResponse<BatchJob>>> {
    let job = state
        .scheduler
        .prioritize(job_id, body.delta, &actor)
        .await?;
    Ok(Json(ApiResponse::success(job)))
}

pub async fn list_tenant_jobs_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
) -> AppResult<Json<ApiResponse<Vec<BatchJob>>>> {
    let jobs = state.scheduler.jobs_for_tenant(tenant_id).await?;
    Ok(Json(ApiResponse::success(jobs)))
}
