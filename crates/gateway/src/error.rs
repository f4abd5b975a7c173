//! Error types for the gateway layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use parley_auth::AuthError;
use parley_chats::{ChatError, ErrorKind};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};
use utoipa::ToSchema;

/// Gateway error types
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("missing or invalid bearer token")]
    Unauthenticated,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

/// Body of every failed REST call.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// One of `not_found`, `unauthorized`, `forbidden`, `conflict`,
    /// `invalid_state`, `validation`, `upstream`, `internal`.
    pub error: String,
    pub message: String,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Unauthenticated => ErrorKind::Unauthorized,
            GatewayError::InvalidRequest(_) => ErrorKind::Validation,
            GatewayError::Chat(err) => err.kind(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        status_for(self.kind())
    }

    fn public_message(&self) -> String {
        match self {
            GatewayError::Chat(err) => err.public_message(),
            other => other.to_string(),
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::InvalidState => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        match kind {
            ErrorKind::Internal => error!(error = ?self, "request failed"),
            ErrorKind::Unauthorized | ErrorKind::Forbidden => {
                debug!(error = %self, "request rejected")
            }
            _ => {}
        }

        let body = ErrorResponse {
            error: kind.as_str().to_string(),
            message: self.public_message(),
        };
        (status_for(kind), Json(body)).into_response()
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<AuthError> for GatewayError {
    fn from(error: AuthError) -> Self {
        GatewayError::Chat(ChatError::Auth(error))
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(error: sqlx::Error) -> Self {
        GatewayError::Chat(ChatError::from(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use parley_database::DatabaseError;

    #[test]
    fn every_kind_has_its_status() {
        let cases = [
            (ErrorKind::NotFound, 404),
            (ErrorKind::Unauthorized, 401),
            (ErrorKind::Forbidden, 403),
            (ErrorKind::Conflict, 409),
            (ErrorKind::InvalidState, 422),
            (ErrorKind::Validation, 400),
            (ErrorKind::Upstream, 502),
            (ErrorKind::Internal, 500),
        ];
        for (kind, status) in cases {
            assert_eq!(status_for(kind).as_u16(), status, "{kind:?}");
        }
    }

    #[tokio::test]
    async fn internal_failures_are_flattened() {
        let err = GatewayError::from(ChatError::Database(DatabaseError::corrupt("bad row 3")));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "internal");
        assert_eq!(body["message"], "internal server error");
    }

    #[tokio::test]
    async fn domain_errors_keep_their_message() {
        let response = GatewayError::from(ChatError::AdminCannotLeave).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "invalid_state");
        assert!(body["message"].as_str().unwrap().contains("transfer admin"));
    }
}
