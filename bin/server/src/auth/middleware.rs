//! Authentication middleware and extractors for Axum.

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use gatehouse_access::{Gate, Principal};
use std::sync::Arc;

use super::AppState;
use crate::error::ApiError;

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

/// Extractor for requiring an authenticated caller.
///
/// Reuses the principal established by [`require`] when the route is gated,
/// and otherwise validates the bearer token itself.
pub struct Authenticated(pub Principal);

impl<S> FromRequestParts<S> for Authenticated
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(Authenticated(principal.clone()));
        }

        let app_state = Arc::<AppState>::from_ref(state);
        let principal = app_state
            .gate
            .authenticate(authorization(&parts.headers))?;
        Ok(Authenticated(principal))
    }
}

/// Middleware applying a [`Gate`] to every request of a route.
///
/// Use with `axum::middleware::from_fn_with_state((state, gate), require)`.
/// The authorized principal is stored in the request extensions.
pub async fn require(
    State((state, gate)): State<(Arc<AppState>, Gate)>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = state
        .gate
        .authorize(authorization(request.headers()), &gate)
        .inspect_err(|e| tracing::debug!(error = %e, "request rejected by gate"))?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
