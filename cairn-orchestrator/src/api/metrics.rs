//! Recent metric events

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use super::AppState;
use crate::metric::MetricEvent;

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    /// Only events with this exact name
    pub name: Option<String>,
}

/// GET /api/metrics/recent
pub async fn recent_events(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Json<Vec<MetricEvent>> {
    let events = match params.name {
        Some(name) => state.recent.named(&name),
        None => state.recent.events(),
    };

    Json(events)
}
