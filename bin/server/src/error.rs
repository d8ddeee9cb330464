//! HTTP error responses.
//!
//! Every failure leaves the server as a status code plus a JSON body of the
//! form `{"error": "..."}`. Internal and provider failures are logged in full
//! and answered with a generic message.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gatehouse_access::AccessError;
use rootcause::prelude::Report;
use serde_json::json;

/// An error ready to be sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    fn for_kind(error: &AccessError) -> Self {
        match error {
            AccessError::Validation { .. } => Self::new(StatusCode::BAD_REQUEST, error.to_string()),
            AccessError::Unauthenticated { .. } => {
                Self::new(StatusCode::UNAUTHORIZED, error.to_string())
            }
            AccessError::AccessDenied { .. } => Self::new(StatusCode::FORBIDDEN, error.to_string()),
            AccessError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, error.to_string()),
            AccessError::Federation { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, "identity provider error")
            }
            AccessError::Internal { .. } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}

fn is_server_side(error: &AccessError) -> bool {
    matches!(
        error,
        AccessError::Federation { .. } | AccessError::Internal { .. }
    )
}

impl From<AccessError> for ApiError {
    fn from(error: AccessError) -> Self {
        if is_server_side(&error) {
            tracing::error!(error = %error, "request failed");
        }
        Self::for_kind(&error)
    }
}

impl From<Report<AccessError>> for ApiError {
    fn from(report: Report<AccessError>) -> Self {
        let kind = report.current_context();
        if is_server_side(kind) {
            tracing::error!(error = %report, "request failed");
        }
        Self::for_kind(kind)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_errors_map_to_statuses() {
        let cases = [
            (AccessError::validation("bad"), StatusCode::BAD_REQUEST),
            (AccessError::unauthenticated("no"), StatusCode::UNAUTHORIZED),
            (
                AccessError::AccessDenied {
                    requirement: "role 'admin'".to_string(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                AccessError::NotFound {
                    entity: "user",
                    id: "usr_x".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                AccessError::Federation {
                    reason: "down".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                AccessError::Internal {
                    reason: "db".to_string(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let error = ApiError::from(AccessError::Internal {
            reason: "connection refused to 10.0.0.5".to_string(),
        });
        assert_eq!(error.message(), "internal server error");
    }

    #[test]
    fn report_context_decides_status() {
        let report: Report<AccessError> = AccessError::unauthenticated("expired").into();
        assert_eq!(ApiError::from(report).status(), StatusCode::UNAUTHORIZED);
    }
}
