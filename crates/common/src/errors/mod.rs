//! Error types for DeepSearch services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    ValidationError,
    InvalidFormat,
    PayloadTooLarge,
    UnsupportedFileType,

    // Authentication errors
    Unauthorized,
    InvalidToken,
    ExpiredToken,
    InvalidCredentials,

    // Authorization errors
    NotDocumentOwner,

    // Resource errors
    DocumentNotFound,

    // Conflict errors
    Conflict,

    // Rate limiting
    RateLimited,

    // Database errors
    DatabaseError,
    ConnectionError,
    PersistenceError,

    // External service errors
    StorageError,

    // Internal errors
    InternalError,
    ConfigurationError,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("File exceeds the maximum upload size of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Unsupported file type: {content_type}")]
    UnsupportedFileType { content_type: String },

    // Authentication errors
    #[error("{message}")]
    Unauthorized { message: String },

    #[error("Token is not valid")]
    InvalidToken,

    #[error("Token expired, please log in again")]
    ExpiredToken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    // Authorization errors
    #[error("Not authorized to access document {id}")]
    NotDocumentOwner { id: String },

    // Resource errors
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    // Conflict errors
    #[error("{message}")]
    Duplicate { message: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Failed to persist document: {message}")]
    Persistence { message: String },

    // External service errors
    #[error("Object storage error: {message}")]
    Storage { message: String },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::UnsupportedFileType { .. } => ErrorCode::UnsupportedFileType,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::InvalidToken => ErrorCode::InvalidToken,
            AppError::ExpiredToken => ErrorCode::ExpiredToken,
            AppError::InvalidCredentials => ErrorCode::InvalidCredentials,
            AppError::NotDocumentOwner { .. } => ErrorCode::NotDocumentOwner,
            AppError::DocumentNotFound { .. } => ErrorCode::DocumentNotFound,
            AppError::Duplicate { .. } => ErrorCode::Conflict,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Persistence { .. } => ErrorCode::PersistenceError,
            AppError::Storage { .. } => ErrorCode::StorageError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::InvalidFormat { .. } |
            AppError::UnsupportedFileType { .. } => StatusCode::BAD_REQUEST,

            // 401 Unauthorized (ownership failures included, clients rely on it)
            AppError::Unauthorized { .. } |
            AppError::InvalidToken |
            AppError::ExpiredToken |
            AppError::InvalidCredentials |
            AppError::NotDocumentOwner { .. } => StatusCode::UNAUTHORIZED,

            // 404 Not Found
            AppError::DocumentNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Duplicate { .. } => StatusCode::CONFLICT,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_) |
            AppError::DatabaseConnection { .. } |
            AppError::Persistence { .. } |
            AppError::Internal { .. } |
            AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Storage { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Message shown to API callers.
    ///
    /// Server-side failures carry internal detail (SQL errors, provider
    /// responses) that stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) |
            AppError::DatabaseConnection { .. } |
            AppError::Persistence { .. } => {
                "An internal error occurred while saving or loading data.".to_string()
            }
            AppError::Storage { .. } => {
                "The document storage service is unavailable.".to_string()
            }
            AppError::Internal { .. } |
            AppError::Configuration { .. } => "An unexpected internal server error occurred.".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let details = match &self {
            AppError::Validation { field: Some(field), .. } => {
                Some(serde_json::json!({ "field": field }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message: self.public_message(),
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}
