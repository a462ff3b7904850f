use crate::config::ConfigError;
use crate::ratings::formatter::FormatError;
use crate::ratings::notifier::NotifyError;
use crate::ratings::RatingsError;
use crate::telemetry::TelemetryError;
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
    Ratings(RatingsError),
    Notify(NotifyError),
    Format(FormatError),
    MissingSetting(&'static str),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Ratings(err) => write!(f, "ratings error: {}", err),
            AppError::Notify(err) => write!(f, "notification error: {}", err),
            AppError::Format(err) => write!(f, "format error: {}", err),
            AppError::MissingSetting(name) => {
                write!(f, "{} must be provided via flag or environment", name)
            }
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
            AppError::Ratings(err) => Some(err),
            AppError::Notify(err) => Some(err),
            AppError::Format(err) => Some(err),
            AppError::MissingSetting(_) => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Ratings(RatingsError::NotFound { .. }) => StatusCode::NOT_FOUND,
            AppError::Ratings(RatingsError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::MissingSetting(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Ratings(_)
            | AppError::Notify(_)
            | AppError::Format(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
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

impl From<RatingsError> for AppError {
    fn from(value: RatingsError) -> Self {
        Self::Ratings(value)
    }
}

impl From<NotifyError> for AppError {
    fn from(value: NotifyError) -> Self {
        Self::Notify(value)
    }
}

impl From<FormatError> for AppError {
    fn from(value: FormatError) -> Self {
        Self::Format(value)
    }
}
