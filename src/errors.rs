//! Structured error handling for the HTTP surface
//!
//! Domain errors (`SplitTestError`) are mapped into an `AppError` with a
//! machine-readable code and an HTTP status, serialized as a JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::split_test::SplitTestError;

/// Structured error response for API clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Additional error context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Application error types with proper categorization
#[derive(Debug)]
pub enum AppError {
    // Validation errors (400)
    InvalidInput { field: String, reason: String },
    InvalidWeights(String),

    // Not found (404)
    TestNotFound(String),
    VariantNotFound(String),

    // State conflicts (409)
    TestNotActive(String),
    NoAssignment(String),
    VariantMismatch(String),

    // Internal errors (500)
    StorageError(String),
    Internal(anyhow::Error),
}

impl AppError {
    /// Get error code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InvalidWeights(_) => "INVALID_WEIGHTS",
            Self::TestNotFound(_) => "TEST_NOT_FOUND",
            Self::VariantNotFound(_) => "VARIANT_NOT_FOUND",
            Self::TestNotActive(_) => "TEST_NOT_ACTIVE",
            Self::NoAssignment(_) => "NO_ASSIGNMENT",
            Self::VariantMismatch(_) => "VARIANT_MISMATCH",
            Self::StorageError(_) => "STORAGE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. } | Self::InvalidWeights(_) => StatusCode::BAD_REQUEST,

            Self::TestNotFound(_) | Self::VariantNotFound(_) => StatusCode::NOT_FOUND,

            Self::TestNotActive(_) | Self::NoAssignment(_) | Self::VariantMismatch(_) => {
                StatusCode::CONFLICT
            }

            Self::StorageError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get detailed error message
    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput { field, reason } => {
                format!("Invalid input for field '{field}': {reason}")
            }
            Self::InvalidWeights(msg) => format!("Invalid variant weights: {msg}"),
            Self::TestNotFound(msg) => format!("Test not found: {msg}"),
            Self::VariantNotFound(msg) => format!("Variant not found: {msg}"),
            Self::TestNotActive(msg) => format!("Test not active: {msg}"),
            Self::NoAssignment(msg) => format!("No recorded visit: {msg}"),
            Self::VariantMismatch(msg) => format!("Variant mismatch: {msg}"),
            Self::StorageError(msg) => format!("Storage error: {msg}"),
            Self::Internal(err) => format!("Internal error: {err}"),
        }
    }

    /// Convert to structured error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            message: self.message(),
            details: None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<SplitTestError> for AppError {
    fn from(err: SplitTestError) -> Self {
        match &err {
            SplitTestError::TestNotFound(id) => Self::TestNotFound(id.to_string()),
            SplitTestError::TestNotActive { .. } => Self::TestNotActive(err.to_string()),
            SplitTestError::VariantNotFound { .. } => Self::VariantNotFound(err.to_string()),
            SplitTestError::InvalidWeights(msg) => Self::InvalidWeights(msg.clone()),
            SplitTestError::NoAssignment { .. } => Self::NoAssignment(err.to_string()),
            SplitTestError::VariantMismatch { .. } => Self::VariantMismatch(err.to_string()),
            SplitTestError::Storage(msg) => Self::StorageError(msg.clone()),
        }
    }
}

/// Axum IntoResponse implementation for proper HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[self.code()])
            .inc();

        let status = self.status_code();
        let body = self.to_response();

        (status, Json(body)).into_response()
    }
}

/// Helper trait to convert validation errors
pub trait ValidationErrorExt<T> {
    fn map_validation_err(self, field: &str) -> Result<T>;
}

impl<T> ValidationErrorExt<T> for anyhow::Result<T> {
    fn map_validation_err(self, field: &str) -> Result<T> {
        self.map_err(|e| AppError::InvalidInput {
            field: field.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;
