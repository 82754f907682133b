use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::server::AppState;

/// Liveness plus a snapshot of the delivery queue
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub queue: String,
    pub pending_jobs: usize,
    pub dead_letters: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        queue: state.queue.name().to_string(),
        pending_jobs: state.queue.len().await,
        dead_letters: state.queue.dead_letters().await.len(),
    })
}
