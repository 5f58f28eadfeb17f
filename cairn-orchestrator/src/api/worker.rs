//! Worker API Handlers
//!
//! Fleet registration and status. Registration is how the provisioning path
//! tells the collectors where each worker's resource API lives.

use axum::{Json, extract::State};
use cairn_core::domain::worker::Worker;
use cairn_core::dto::worker::{RegisterWorker, WorkerSummary};

use super::AppState;
use crate::api::error::{ApiError, ApiResult};

// =============================================================================
// Worker Registration
// =============================================================================

/// POST /api/workers
/// Register a worker or update its address and state
pub async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<RegisterWorker>,
) -> ApiResult<Json<Worker>> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("worker name cannot be empty".to_string()));
    }
    if req.address.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "worker address cannot be empty".to_string(),
        ));
    }

    tracing::info!("Registering worker {} ({})", req.name, req.state);

    let worker = Worker::from(req);
    state.tracker.upsert_worker(worker.clone()).await?;

    Ok(Json(worker))
}

// =============================================================================
// Fleet Status
// =============================================================================

/// GET /api/workers
/// List workers with their live container and volume counts
pub async fn list_workers(State(state): State<AppState>) -> ApiResult<Json<Vec<WorkerSummary>>> {
    let workers = state.tracker.list_workers().await?;

    let mut summaries = Vec::with_capacity(workers.len());
    for worker in workers {
        let counts = state.tracker.count_live(&worker.name).await?;
        summaries.push(WorkerSummary::new(worker, counts.containers, counts.volumes));
    }

    Ok(Json(summaries))
}
