//! Error handling for the trainee actions service.
//!
//! Errors carry a stable machine-readable [`ErrorCode`] so API clients can
//! branch on failures without parsing messages, and map onto HTTP statuses
//! via the `IntoResponse` implementation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// A specialized Result type for action service operations.
pub type Result<T> = std::result::Result<T, ActionsError>;

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Store errors
    DatabaseError,
    DatabaseConnectionFailed,
    RecordNotFound,
    DuplicateRecord,

    // Event errors
    InvalidEvent,
    MissingRequiredField,
    QueueError,

    // Broadcast errors
    PublishFailed,

    // Request errors
    InvalidToken,
    ValidationError,

    // Configuration / internal
    ConfigurationError,
    SerializationError,
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::RecordNotFound => StatusCode::NOT_FOUND,
            Self::DuplicateRecord => StatusCode::CONFLICT,
            Self::InvalidEvent | Self::MissingRequiredField | Self::ValidationError => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::InvalidToken => StatusCode::BAD_REQUEST,
            Self::DatabaseConnectionFailed | Self::QueueError => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError
            | Self::PublishFailed
            | Self::ConfigurationError
            | Self::SerializationError
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure is transient and worth redelivering.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError
                | Self::DatabaseConnectionFailed
                | Self::QueueError
                | Self::PublishFailed
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for the actions service.
#[derive(Error, Debug)]
pub enum ActionsError {
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("database connection failed: {0}")]
    DatabaseConnection(#[source] sqlx::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("queue error: {0}")]
    Queue(#[from] redis::RedisError),

    #[error("broadcast publish failed: {0}")]
    Publish(String),

    #[error("invalid authorization token: {0}")]
    InvalidToken(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ActionsError {
    pub fn invalid_event(message: impl Into<String>) -> Self {
        Self::InvalidEvent(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The stable code exposed to API clients.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::DatabaseConnection(_) => ErrorCode::DatabaseConnectionFailed,
            Self::NotFound(_) => ErrorCode::RecordNotFound,
            Self::Duplicate(_) => ErrorCode::DuplicateRecord,
            Self::InvalidEvent(_) => ErrorCode::InvalidEvent,
            Self::Queue(_) => ErrorCode::QueueError,
            Self::Publish(_) => ErrorCode::PublishFailed,
            Self::InvalidToken(_) => ErrorCode::InvalidToken,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::Configuration(_) => ErrorCode::ConfigurationError,
            Self::Serialization(_) => ErrorCode::SerializationError,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Log at a severity appropriate for the error class.
    fn log(&self) {
        let code = self.code();
        if code.http_status().is_server_error() {
            error!(code = %code, error = %self, "request failed");
        } else {
            warn!(code = %code, error = %self, "request rejected");
        }
    }
}

impl From<sqlx::Error> for ActionsError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => Self::NotFound("record not found".into()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    return Self::Duplicate(db_err.to_string());
                }
                Self::Database(error)
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::DatabaseConnection(error)
            }
            _ => Self::Database(error),
        }
    }
}

/// JSON body returned for failed API requests.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: ErrorCode,
}

impl IntoResponse for ActionsError {
    fn into_response(self) -> Response {
        self.log();

        let code = self.code();
        counter!("actions_api_errors_total", "code" => code.to_string()).increment(1);

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: code,
        };
        (code.http_status(), Json(body)).into_response()
    }
}
