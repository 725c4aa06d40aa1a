//! API routes.

pub mod ccache;
pub mod jobs;
pub mod ping;

use axum::routing::{get, post, put};
use axum::Router;

use crate::AppState;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", post(ping::ping))
        .route("/job", put(jobs::add_job))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/old", get(jobs::old_jobs))
        .route("/job/{id}", get(jobs::job_info))
        .route("/job/{id}/cancel", post(jobs::cancel_job))
        .route("/job/{id}/logs", get(jobs::get_logs))
        .route("/job/{id}/state/{new_state}", put(jobs::set_state))
        .route("/ccache/clear", post(ccache::clear))
        .route("/ccache/stats", get(ccache::stats))
        .with_state(state)
}
