//! Authentication routes for login, callback, and refresh.

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    response::{IntoResponse, Redirect},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use gatehouse_access::{AccessError, Session};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::Duration as TimeDuration;

use super::AppState;
use crate::error::ApiError;

/// Auth state cookie name (for CSRF protection during the OAuth flow).
pub const AUTH_STATE_COOKIE: &str = "auth_state";

/// Query parameters for the OAuth callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Starts the OAuth login flow.
///
/// Returns the provider URL for the frontend to navigate to and stores the
/// flow's state nonce in a short-lived cookie.
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .federator
        .authorization_url()
        .map_err(|e| ApiError::from(AccessError::from(e.current_context().clone())))?;

    let cookie = Cookie::build((AUTH_STATE_COOKIE, request.state))
        .path("/")
        .http_only(true)
        .secure(state.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(10));

    Ok((jar.add(cookie), Json(LoginResponse { url: request.url })))
}

/// Handles the OAuth callback after the user authenticates with the provider.
///
/// On success the browser is redirected to the frontend with the token pair
/// in the query string.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing authorization code"))?;

    let expected = jar
        .get(AUTH_STATE_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::bad_request("missing auth state"))?;
    if query.state.as_deref() != Some(expected.as_str()) {
        return Err(ApiError::bad_request("auth state mismatch"));
    }

    let session = state.sessions.login(&code).await?;
    let target = frontend_redirect(&state.frontend_url, &session)?;

    let remove_auth_state = Cookie::build((AUTH_STATE_COOKIE, ""))
        .path("/")
        .max_age(TimeDuration::ZERO);

    Ok((jar.add(remove_auth_state), Redirect::temporary(&target)))
}

/// Exchanges a refresh token for a new session.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<Session>, ApiError> {
    let Json(request) = payload?;
    let session = state.sessions.refresh(&request.refresh_token).await?;
    Ok(Json(session))
}

/// Appends the token pair to the frontend URL, keeping any existing query.
fn frontend_redirect(frontend_url: &str, session: &Session) -> Result<String, AccessError> {
    let mut url = reqwest::Url::parse(frontend_url).map_err(|e| AccessError::Internal {
        reason: format!("invalid frontend URL: {e}"),
    })?;
    url.query_pairs_mut()
        .append_pair("access_token", &session.access_token)
        .append_pair("refresh_token", &session.refresh_token);
    Ok(url.into())
}
