use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use quorum_core::error::CoreError;
use quorum_db::DbError;
use serde_json::json;

/// Errors returned by API handlers, mapped to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // Internal detail goes to the log only; the client gets a fixed body.
        let message = match &self {
            ApiError::Internal(err) => {
                tracing::error!("API internal error: {err:#}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "code": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound => ApiError::NotFound,
            CoreError::BadRequest(msg) => ApiError::BadRequest(msg),
            CoreError::Conflict(msg) => ApiError::Conflict(msg),
            CoreError::Invariant(msg) => ApiError::Internal(anyhow::anyhow!(msg)),
            CoreError::Database(err) => ApiError::Internal(err.into()),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => ApiError::NotFound,
            other => ApiError::Internal(other.into()),
        }
    }
}
