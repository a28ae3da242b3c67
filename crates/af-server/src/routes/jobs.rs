//! Live job route handlers.

use axum::extract::State;
use axum::Json;

use af_engine::JobSummary;

use crate::context::AppContext;

/// GET /api/jobs/active
pub async fn active_jobs(State(ctx): State<AppContext>) -> Json<Vec<JobSummary>> {
    Json(ctx.conversions.active_jobs())
}
