//! Authentication gate
//!
//! Protected routes pass in development mode or when the request carries
//! credentials the configured method accepts; everything else is sent to
//! the team login page. Basic credentials are compared against the
//! configured pair. OAuth bearer tokens are issued by the provider the
//! `/auth/{provider}` route redirects to.

use axum::{
    extract::{Path, Query, Request, State},
    http::header,
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;
use url::Url;

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::config::AuthMethod;

pub const LOGIN_PATH: &str = "/teams/main/login";

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";

pub async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if accepts(&state.auth, authorization) {
        return next.run(request).await;
    }

    tracing::debug!("Unauthenticated request to {}, redirecting", request.uri().path());
    Redirect::to(LOGIN_PATH).into_response()
}

fn accepts(auth: &AuthMethod, authorization: Option<&str>) -> bool {
    match auth {
        AuthMethod::Development => true,
        AuthMethod::Basic { username, password } => authorization
            .and_then(|value| value.strip_prefix("Basic "))
            .and_then(decode_basic)
            .is_some_and(|(user, pass)| user == *username && pass == *password),
        AuthMethod::GitHub { .. } | AuthMethod::Cf { .. } => authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| !token.trim().is_empty()),
    }
}

/// Splits a base64 `user:password` pair
fn decode_basic(encoded: &str) -> Option<(String, String)> {
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let pair = String::from_utf8(decoded).ok()?;
    let (user, pass) = pair.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    /// Local path to return to after the provider callback
    pub redirect: Option<String>,
}

/// GET /auth/{provider}
pub async fn authorize(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<AuthorizeParams>,
) -> ApiResult<Redirect> {
    let redirect = params
        .redirect
        .filter(|path| path.starts_with('/') && !path.starts_with("//"))
        .unwrap_or_else(|| "/".to_string());

    let url = authorize_url(&state.auth, &provider, &redirect)?;
    Ok(Redirect::temporary(url.as_str()))
}

fn authorize_url(auth: &AuthMethod, provider: &str, redirect: &str) -> ApiResult<Url> {
    let (endpoint, client_id, scope) = match (provider, auth) {
        (
            "github",
            AuthMethod::GitHub {
                client_id,
                endpoints,
                ..
            },
        ) => {
            let endpoint = endpoints
                .as_ref()
                .map_or(GITHUB_AUTHORIZE_URL.to_string(), |e| e.auth_url.clone());
            (endpoint, client_id, "read:org")
        }
        (
            "cf",
            AuthMethod::Cf {
                client_id,
                endpoints,
                ..
            },
        ) => {
            let endpoint = format!("{}/oauth/authorize", endpoints.auth_url.trim_end_matches('/'));
            (endpoint, client_id, "cloud_controller.read")
        }
        _ => {
            return Err(ApiError::NotFound(format!(
                "auth provider {} is not configured",
                provider
            )));
        }
    };

    let mut url = Url::parse(&endpoint).map_err(|e| {
        ApiError::Internal(format!("invalid {} authorize URL {}: {}", provider, endpoint, e))
    })?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("scope", scope)
        .append_pair("state", redirect);

    Ok(url)
}

/// GET /teams/{team}/login
pub async fn login_page(State(state): State<AppState>, Path(team): Path<String>) -> Html<String> {
    let team: String = team
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();

    Html(format!(
        "<html><body><h1>log in to {}</h1><p>authentication: {}</p></body></html>",
        team,
        state.auth.name()
    ))
}
