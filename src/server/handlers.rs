// src/server/handlers.rs
// =============================================================================
// Request handlers. Each one is a thin wrapper around CrawlController:
// pull the input out of the request, call the controller, shape the JSON.
// =============================================================================

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use crate::context::AppContext;
use crate::crawl::CrawlJob;

#[derive(Debug, Deserialize)]
pub struct CrawlRequest {
    pub url: String,
    #[serde(default)]
    pub max_depth: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CrawlStarted {
    pub status: &'static str,
    pub message: &'static str,
    pub url: String,
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<String>,
}

// POST /crawl
//
// Returns as soon as the seed is queued. The crawl itself shows up in
// GET /logs as pages are fetched.
pub async fn start_crawl(
    State(ctx): State<AppContext>,
    payload: Result<Json<CrawlRequest>, JsonRejection>,
) -> ApiResult<Json<CrawlStarted>> {
    let Json(request) = payload?;
    let job = ctx.controller.start_crawl(&request.url, request.max_depth)?;

    Ok(Json(CrawlStarted {
        status: "started",
        message: "Crawl started",
        url: request.url,
        job_id: job.id,
    }))
}

// GET /logs
pub async fn logs(State(ctx): State<AppContext>) -> Json<LogsResponse> {
    Json(LogsResponse {
        logs: ctx.controller.log_lines(),
    })
}

// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "active_jobs": ctx.controller.active_jobs(),
        "log_entries": ctx.logs.len(),
        "log_capacity": ctx.logs.capacity(),
    }))
}

// GET /jobs
pub async fn list_jobs(State(ctx): State<AppContext>) -> Json<Vec<CrawlJob>> {
    Json(ctx.controller.jobs())
}

// GET /jobs/:id
pub async fn get_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<CrawlJob>> {
    let id = parse_job_id(&id)?;
    ctx.controller
        .job(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {}", id)))
}

// POST /jobs/:id/cancel
pub async fn cancel_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<CrawlJob>> {
    let id = parse_job_id(&id)?;
    Ok(Json(ctx.controller.cancel(id)?))
}

fn parse_job_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid job id '{}'", raw)))
}
