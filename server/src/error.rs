use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use derive_more::derive::Display;
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;
pub type AppJsonResult<T> = AppResult<Json<T>>;

#[derive(Debug, Display)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
    RequestTimeout,
    TooManyRequests,
}

impl std::error::Error for AppError {}

/// Contract violations raised by the categorization pipeline itself.
///
/// Business-level failures (missing titles, API errors) never surface here;
/// they are folded into failed records instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(error)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        tracing::error!("Reqwest error: {:?}", error);
        match error.status() {
            Some(StatusCode::BAD_REQUEST) => AppError::BadRequest(error.to_string()),
            Some(StatusCode::REQUEST_TIMEOUT) => AppError::RequestTimeout,
            Some(StatusCode::TOO_MANY_REQUESTS) => AppError::TooManyRequests,
            _ => AppError::Internal(error.into()),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::InvalidConfig(msg) => AppError::BadRequest(msg),
        }
    }
}

fn error_body(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    (
        status,
        Json(json!({"error": {
            "code": status.as_u16(),
            "message": message.into()
        }})),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = match self {
            AppError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => error_body(StatusCode::NOT_FOUND, msg),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::RequestTimeout => {
                error_body(StatusCode::REQUEST_TIMEOUT, "Request took too long")
            }
            AppError::TooManyRequests => {
                error_body(StatusCode::TOO_MANY_REQUESTS, "Too many requests")
            }
        };
        tracing::error!("Error: {:?}", err.1);

        err.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_maps_to_bad_request() {
        let err: AppError = PipelineError::InvalidConfig("batch size must be > 0".into()).into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_status() {
        let resp = AppError::NotFound("Analysis not found".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
