use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use reelworks_model::{
    ApiResponse, BalanceSummary, CreditTransaction, TenantId,
};

use crate::AppState;
use crate::errors::AppResult;
use crate::handlers::Actor;

pub async fn get_balance_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
) -> AppResult<Json<ApiResponse<BalanceSummary>>> {
    let summary = state.ledger.balance_of(tenant_id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

pub async fn list_transactions_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<ApiResponse<Vec<CreditTransaction>>>> {
    let history = state.ledger.transactions(tenant_id, query.limit).await?;
    Ok(Json(ApiResponse::success(history)))
}

#[derive(Debug, Deserialize)]
pub struct AddCreditsBody {
    pub amount: i64,
    pub reason: String,
}

pub async fn add_credits_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(tenant_id): Path<TenantId>,
    Json(body): Json<AddCreditsBody>,
) -> AppResult<Json<ApiResponse<BalanceSummary>>> {
    let summary = state
        .ledger
        .add_credits(tenant_id, body.amount, &actor, &body.reason)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// Applies the tenant's monthly allotment, honoring its rollover
/// setting. Driven by the billing cron.
pub async fn apply_monthly_grant_handler(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(tenant_id): Path<TenantId>,
) -> AppResult<Json<ApiResponse<BalanceSummary>>> {
    let summary = state
        .ledger
        .apply_monthly_grant(tenant_id, &actor)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}
