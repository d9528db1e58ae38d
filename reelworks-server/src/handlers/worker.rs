use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;

use reelworks_model::{
    ApiResponse, BatchJob, DequeuedVideo, JobId, TenantId, VideoId,
    VideoStatus,
};

use crate::AppState;
use crate::errors::AppResult;
use crate::handlers::Actor;

#[derive(Debug, Deserialize)]
pub struct DequeueBody {
    pub tenant_id: TenantId,
}

/// Hands the worker the next claimable video for the tenant. `data` is
/// null when the tenant has nothing queued or no running-video
/// headroom; workers back off and poll again.
pub async fn dequeue_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<DequeueBody>,
) -> AppResult<Json<ApiResponse<Option<DequeuedVideo>>>> {
    let claim = state
        .scheduler
        .dequeue_next(body.tenant_id, &actor)
        .await?;
    Ok(Json(ApiResponse::success(claim)))
}

#[derive(Debug, Deserialize)]
pub struct VideoStatusBody {
    pub status: VideoStatus,
    pub credits_used: Option<i64>,
}

pub async fn update_video_status_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path((job_id, video_id)): Path<(JobId, VideoId)>,
    Json(body): Json<VideoStatusBody>,
) -> AppResult<Json<ApiResponse<BatchJob>>> {
    let job = state
        .scheduler
        .update_video_status(
            job_id,
            video_id,
            body.status,
            body.credits_used,
            &actor,
        )
        .await?;
    Ok(Json(ApiResponse::success(job)))
}
