use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::onboarding::{ChatError, WorkflowError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Workflow(WorkflowError),
    Chat(ChatError),
    Request(serde_json::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Workflow(err) => write!(f, "workflow error: {}", err),
            AppError::Chat(err) => write!(f, "chat error: {}", err),
            AppError::Request(err) => write!(f, "malformed request body: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Workflow(err) => Some(err),
            AppError::Chat(err) => Some(err),
            AppError::Request(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match &self {
            AppError::Workflow(WorkflowError::Validation(errors)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": message, "validation_errors": errors }),
            ),
            AppError::Workflow(WorkflowError::InvalidTransition { stage, .. }) => (
                StatusCode::CONFLICT,
                json!({ "error": message, "stage": stage }),
            ),
            AppError::Chat(_) => (StatusCode::UNPROCESSABLE_ENTITY, json!({ "error": message })),
            AppError::Request(_) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": message }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<WorkflowError> for AppError {
    fn from(value: WorkflowError) -> Self {
        Self::Workflow(value)
    }
}

impl From<ChatError> for AppError {
    fn from(value: ChatError) -> Self {
        Self::Chat(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Request(value)
    }
}
