use axum::{
    Json,
    extract::State,
};
use serde::Deserialize;

use reelworks_model::{ApiResponse, QueueStats, VideoId};

use crate::AppState;
use crate::errors::AppResult;

pub async fn queue_stats_handler(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<QueueStats>>> {
    let stats = state.scheduler.queue_stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

#[derive(Debug, Deserialize)]
pub struct CatalogEntryBody {
    pub video_id: VideoId,
    pub duration_secs: u64,
}

/// Mirrors one video duration from the media catalog. Upstream calls
/// this on upload and whenever a duration is re-probed.
pub async fn record_catalog_entry_handler(
    State(state): State<AppState>,
    Json(body): Json<CatalogEntryBody>,
) -> AppResult<Json<ApiResponse<()>>> {
    state
        .catalog
        .record_duration(body.video_id, body.duration_secs)
        .await?;
    Ok(Json(ApiResponse::success(())))
}
