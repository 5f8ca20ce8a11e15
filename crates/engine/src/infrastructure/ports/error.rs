//! Error types for port operations.
//!
//! Each collaborator reports failures in its own terms. Use cases convert
//! them into [`ApplicationError`] with the port error attached as cause.

use charforge_domain::{ApplicationError, ProgressionError};

/// Character store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Entity not found - includes entity type and ID for actionable error messages.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Storage operation failed - includes operation name for tracing.
    #[error("Storage error in {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn storage(operation: &'static str, message: impl ToString) -> Self {
        Self::Storage {
            operation,
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog is not open")]
    NotOpen,

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to load catalog from {path}: {message}")]
    Load { path: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Rule evaluation failed: {0}")]
    Evaluation(String),

    #[error("Rule service unavailable")]
    Unavailable,
}

impl From<StoreError> for ApplicationError {
    fn from(err: StoreError) -> Self {
        ApplicationError::with_cause("Could not save the character", err)
    }
}

impl From<CatalogError> for ApplicationError {
    fn from(err: CatalogError) -> Self {
        ApplicationError::with_cause("Reference data is unavailable", err)
    }
}

impl From<RuleError> for ApplicationError {
    fn from(err: RuleError) -> Self {
        ApplicationError::with_cause("Rule evaluation is unavailable", err)
    }
}

impl From<StoreError> for ProgressionError {
    fn from(err: StoreError) -> Self {
        ProgressionError::Application(err.into())
    }
}

impl From<CatalogError> for ProgressionError {
    fn from(err: CatalogError) -> Self {
        ProgressionError::Application(err.into())
    }
}

impl From<RuleError> for ProgressionError {
    fn from(err: RuleError) -> Self {
        ProgressionError::Application(err.into())
    }
}
