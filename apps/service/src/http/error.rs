use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no active alert with id {0}")]
    AlertNotFound(Uuid),

    #[error("a sweep is already in progress")]
    SweepInProgress,

    #[error("unknown endpoint '{0}'")]
    UnknownEndpoint(String),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::AlertNotFound(_) => "ALERT_NOT_FOUND",
            ApiError::SweepInProgress => "SWEEP_IN_PROGRESS",
            ApiError::UnknownEndpoint(_) => "UNKNOWN_ENDPOINT",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AlertNotFound(_) | ApiError::UnknownEndpoint(_) => StatusCode::NOT_FOUND,
            ApiError::SweepInProgress => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }))
    }
}
