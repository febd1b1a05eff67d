// src/server/routes.rs
// =============================================================================
// The route table. Every path maps to one handler in handlers.rs; the
// layers (CORS, tracing) are added in server/mod.rs.
//
// Routes:
// - POST /crawl                  start a crawl job
// - GET  /logs                   the activity log, oldest first
// - GET  /health                 liveness + counters
// - GET  /jobs, /jobs/:id        job snapshots
// - POST /jobs/:id/cancel        stop a job
// =============================================================================

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;
use crate::context::AppContext;

pub fn create_routes(ctx: AppContext) -> Router {
    Router::new()
        .route("/crawl", post(handlers::start_crawl))
        .route("/logs", get(handlers::logs))
        .route("/health", get(handlers::health))
        // Job inspection and control
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/:id", get(handlers::get_job))
        .route("/jobs/:id/cancel", post(handlers::cancel_job))
        .with_state(ctx)
}
