//! # AppError
//!
//! Centralized error handling for Tripboard.
//! Every failing store operation leaves no partial state behind.

use crate::models::ThreadId;
use thiserror::Error;

/// The primary error type for all tb-core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// A field failed a length or required-field check. Redisplay the form.
    #[error("validation error: {field} {reason}")]
    ValidationError { field: &'static str, reason: String },

    /// The targeted thread does not exist.
    #[error("thread not found with ID {0}")]
    ThreadNotFound(ThreadId),

    /// A write hit a consistency violation and was rolled back. Safe to retry.
    #[error("storage conflict: {0}")]
    StorageConflict(String),

    /// Infrastructure failure (e.g., database file unreadable)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::ValidationError {
            field,
            reason: reason.into(),
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageConflict(_))
    }
}

/// A specialized Result type for Tripboard logic.
pub type Result<T> = std::result::Result<T, AppError>;
