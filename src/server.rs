//! Health endpoints for deployment probes.
//!
//! The hosting platform assigns a port and expects something listening on
//! it; these two routes are all the HTTP surface this service has.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::scheduler::SchedulerHandle;

/// Shared state for the health handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: SchedulerHandle,
}

/// Build the health router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .with_state(state)
}

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

#[derive(Serialize)]
pub struct ReadyzResponse {
    pub status: String,
    pub pending_triggers: usize,
}

pub async fn readyz(State(state): State<AppState>) -> Json<ReadyzResponse> {
    Json(ReadyzResponse {
        status: "ok".to_string(),
        pending_triggers: state.scheduler.pending_count().await,
    })
}
