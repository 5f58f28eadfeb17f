//! Telemetry ingest
//!
//! The scheduler and build tracker push samples here; each becomes one
//! metric event. Build notifications also flip the liveness of the build as
//! a resource owner, which is what makes its containers and volumes
//! collectable once it finishes.

use axum::{Json, extract::State, http::StatusCode};
use cairn_core::domain::resource::{Attribution, OwnerKind};
use cairn_core::dto::telemetry::{BuildNotification, SchedulingSample};
use std::time::Duration;

use super::AppState;
use crate::api::error::ApiResult;
use crate::metric::Event;

fn scheduling_event(sample: SchedulingSample) -> Event {
    match sample {
        SchedulingSample::Full {
            pipeline,
            duration_ms,
        } => Event::SchedulingFullDuration {
            pipeline,
            duration: Duration::from_millis(duration_ms),
        },
        SchedulingSample::LoadVersions {
            pipeline,
            duration_ms,
        } => Event::SchedulingLoadVersionsDuration {
            pipeline,
            duration: Duration::from_millis(duration_ms),
        },
        SchedulingSample::Job {
            pipeline,
            job,
            duration_ms,
        } => Event::SchedulingJobDuration {
            pipeline,
            job,
            duration: Duration::from_millis(duration_ms),
        },
    }
}

fn build_event(notification: BuildNotification) -> Event {
    match notification {
        BuildNotification::Started {
            pipeline,
            job,
            build_name,
            build_id,
            team_name,
        } => Event::BuildStarted {
            pipeline,
            job,
            build_name,
            build_id,
            team_name,
        },
        BuildNotification::Finished {
            pipeline,
            job,
            build_name,
            build_id,
            build_status,
            duration_ms,
            team_name,
        } => Event::BuildFinished {
            pipeline,
            job,
            build_name,
            build_id,
            build_status,
            duration: Duration::from_millis(duration_ms),
            team_name,
        },
    }
}

/// POST /api/telemetry/scheduling
pub async fn record_scheduling(
    State(state): State<AppState>,
    Json(sample): Json<SchedulingSample>,
) -> StatusCode {
    state.telemetry.emit(scheduling_event(sample));
    StatusCode::ACCEPTED
}

/// POST /api/telemetry/builds
pub async fn record_build(
    State(state): State<AppState>,
    Json(notification): Json<BuildNotification>,
) -> ApiResult<StatusCode> {
    let (build_id, live) = match &notification {
        BuildNotification::Started { build_id, .. } => (*build_id, true),
        BuildNotification::Finished { build_id, .. } => (*build_id, false),
    };

    let owner = Attribution::new(OwnerKind::Build, build_id.to_string());
    state.tracker.set_owner_live(&owner, live).await?;
    state.telemetry.emit(build_event(notification));

    Ok(StatusCode::ACCEPTED)
}
