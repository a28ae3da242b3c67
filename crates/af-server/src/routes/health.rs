//! Health check route handler.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use af_av::ToolInfo;
use af_engine::ServiceStats;

use crate::context::AppContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub tools: Vec<ToolInfo>,
    pub jobs: ServiceStats,
}

/// GET /api/health
pub async fn health_check(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let tools = ctx.tools.clone();
    // Version probes run the tools; keep them off the async workers.
    let tools = tokio::task::spawn_blocking(move || tools.check_all())
        .await
        .unwrap_or_default();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        tools,
        jobs: ctx.conversions.stats(),
    })
}
