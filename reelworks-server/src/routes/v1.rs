use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;
use crate::handlers::{admin, credits, jobs, worker};

/// Create all v1 API routes
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        // Job lifecycle
        .route("/jobs", post(jobs::create_job_handler))
        .route("/jobs/{id}", get(jobs::get_job_handler))
        .route("/jobs/{id}/cancel", post(jobs::cancel_job_handler))
        .route("/jobs/{id}/prioritize", post(jobs::prioritize_job_handler))
        .route(
            "/tenants/{tenant_id}/jobs",
            get(jobs::list_tenant_jobs_handler),
        )
        // Worker polling
        .route("/worker/dequeue", post(worker::dequeue_handler))
        .route(
            "/jobs/{id}/videos/{video_id}/status",
            post(worker::update_video_status_handler),
        )
        // Credits
        .route(
            "/tenants/{tenant_id}/credits",
            get(credits::get_balance_handler),
        )
        .route(
            "/tenants/{tenant_id}/credits/transactions",
            get(credits::list_transactions_handler),
        )
        .route(
            "/tenants/{tenant_id}/credits/add",
            post(credits::add_credits_handler),
        )
        .route(
            "/tenants/{tenant_id}/credits/grant",
            post(credits::apply_monthly_grant_handler),
        )
        // Operator endpoints
        .route("/admin/queue/stats", get(admin::queue_stats_handler))
        .route(
            "/admin/catalog/videos",
            post(admin::record_catalog_entry_handler),
        )
}
