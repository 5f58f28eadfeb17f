//! Response time middleware

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use super::AppState;
use crate::metric::Event;

/// Emits one `http response time` event per request
pub async fn record_response_time(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let path = request.uri().path().to_string();
    let method = request.method().to_string();

    let started = Instant::now();
    let response = next.run(request).await;

    state.telemetry.emit(Event::HttpResponseTime {
        route,
        path,
        method,
        duration: started.elapsed(),
    });

    response
}
