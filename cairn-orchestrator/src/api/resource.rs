//! Resource API Handlers
//!
//! The provisioning path registers every container and volume before asking
//! a worker to create it, then confirms it once the worker has. Only
//! confirmed resources are candidates for collection while their owner runs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use cairn_core::domain::resource::{Container, ResourceKind, ResourceState, Volume};
use cairn_core::dto::resource::{RegisterContainer, RegisterVolume};

use super::AppState;
use crate::api::error::{ApiError, ApiResult};

fn require(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// POST /api/containers
pub async fn register_container(
    State(state): State<AppState>,
    Json(req): Json<RegisterContainer>,
) -> ApiResult<(StatusCode, Json<Container>)> {
    require("handle", &req.handle)?;
    require("worker_name", &req.worker_name)?;

    let container = Container::from(req);
    state.tracker.insert_container(container.clone()).await?;

    tracing::debug!(
        "Tracking container {} on {}",
        container.handle,
        container.worker_name
    );
    Ok((StatusCode::CREATED, Json(container)))
}

/// POST /api/volumes
pub async fn register_volume(
    State(state): State<AppState>,
    Json(req): Json<RegisterVolume>,
) -> ApiResult<(StatusCode, Json<Volume>)> {
    require("handle", &req.handle)?;
    require("worker_name", &req.worker_name)?;

    let volume = Volume::from(req);
    state.tracker.insert_volume(volume.clone()).await?;

    tracing::debug!("Tracking volume {} on {}", volume.handle, volume.worker_name);
    Ok((StatusCode::CREATED, Json(volume)))
}

/// POST /api/containers/{handle}/created
pub async fn confirm_container(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> ApiResult<StatusCode> {
    confirm(&state, ResourceKind::Container, &handle).await
}

/// POST /api/volumes/{handle}/created
pub async fn confirm_volume(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> ApiResult<StatusCode> {
    confirm(&state, ResourceKind::Volume, &handle).await
}

async fn confirm(state: &AppState, kind: ResourceKind, handle: &str) -> ApiResult<StatusCode> {
    let moved = state
        .tracker
        .transition(kind, handle, ResourceState::Creating, ResourceState::Created)
        .await?;

    if !moved {
        return Err(ApiError::Conflict(format!(
            "{} {} is not being created",
            kind, handle
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}
