//! Error types for the progression engine.
//!
//! Callers branch on [`ProgressionError`]'s variant: a validation failure is
//! fixed by changing one selection, a conflict by revisiting one of two steps,
//! and an application failure is retryable and carries a correlation id.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{CorrelationId, StepId};
use crate::path::FieldPath;

/// Shared, clonable error cause.
pub type ErrorCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A proposed change is individually illegal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    /// Snapshot field (or selection field) the problem is tied to.
    pub field: String,
    /// Human-readable reason, suitable for an actionable warning.
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// What two merged patches contradicted each other on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum ConflictTarget {
    /// Two patches set the same field (or overlapping fields) to different values.
    Path(FieldPath),
    /// One patch adds an item that another removes, or replaces a collection
    /// another patch edits item-wise.
    Collection(FieldPath),
}

impl fmt::Display for ConflictTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "path '{p}'"),
            Self::Collection(c) => write!(f, "collection '{c}'"),
        }
    }
}

/// Two individually valid patches contradict each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("conflicting changes to {target} from steps '{first_step}' and '{second_step}'")]
pub struct ConflictError {
    pub target: ConflictTarget,
    /// Step that produced the earlier patch in the batch.
    pub first_step: StepId,
    /// Step that produced the later patch in the batch.
    pub second_step: StepId,
}

impl ConflictError {
    pub fn path(&self) -> Option<&FieldPath> {
        match &self.target {
            ConflictTarget::Path(p) => Some(p),
            ConflictTarget::Collection(_) => None,
        }
    }

    pub fn collection(&self) -> Option<&FieldPath> {
        match &self.target {
            ConflictTarget::Collection(c) => Some(c),
            ConflictTarget::Path(_) => None,
        }
    }
}

/// A valid, non-conflicting change could not be durably applied.
#[derive(Debug, Clone, Error)]
#[error("{message} (ref {})", .correlation_id.short())]
pub struct ApplicationError {
    pub message: String,
    /// Reference shown to the user and attached to every log line for this failure.
    pub correlation_id: CorrelationId,
    #[source]
    pub cause: Option<ErrorCause>,
}

impl ApplicationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            correlation_id: CorrelationId::new(),
            cause: None,
        }
    }

    pub fn with_cause<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            correlation_id: CorrelationId::new(),
            cause: Some(Arc::new(cause)),
        }
    }
}

/// Failure applying an operation to a JSON tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("field path is empty")]
    EmptyPath,

    #[error("invalid field path '{0}'")]
    InvalidPath(String),

    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: FieldPath,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{path} is not a collection (found {found})")]
    NotACollection { path: FieldPath, found: &'static str },

    #[error("item added to {path} has no logical key")]
    UnkeyedItem { path: FieldPath },

    #[error("snapshot does not match the character shape: {0}")]
    InvalidSnapshot(String),
}

impl PatchError {
    pub fn type_mismatch(path: FieldPath, expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch {
            path,
            expected,
            found,
        }
    }
}

/// The engine's tagged error union.
#[derive(Debug, Clone, Error)]
pub enum ProgressionError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Conflict(#[from] ConflictError),

    #[error("application failed: {0}")]
    Application(#[from] ApplicationError),
}

impl ProgressionError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(field, reason))
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::Application(ApplicationError::new(message))
    }

    pub fn application_with_cause<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Application(ApplicationError::with_cause(message, cause))
    }

    /// Application failures are the only retryable kind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Application(_))
    }

    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_conflict(&self) -> Option<&ConflictError> {
        match self {
            Self::Conflict(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_application(&self) -> Option<&ApplicationError> {
        match self {
            Self::Application(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PatchError> for ProgressionError {
    fn from(err: PatchError) -> Self {
        Self::application_with_cause("could not apply change to character data", err)
    }
}

pub type ProgressionResult<T> = Result<T, ProgressionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn validation_error_display() {
        let err = ProgressionError::validation("classes", "at least one class is required");
        assert!(matches!(err, ProgressionError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "validation failed: classes: at least one class is required"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn conflict_error_exposes_target() {
        let err = ConflictError {
            target: ConflictTarget::Path(FieldPath::new("hp").key("max")),
            first_step: StepId::from("class"),
            second_step: StepId::from("species"),
        };
        assert_eq!(err.path().map(ToString::to_string).as_deref(), Some("hp.max"));
        assert!(err.collection().is_none());
        assert!(err.to_string().contains("path 'hp.max'"));
        assert!(err.to_string().contains("'class'"));
    }

    #[test]
    fn application_error_keeps_cause_and_reference() {
        let err = ApplicationError::with_cause(
            "store unavailable",
            PatchError::InvalidPath("x..y".into()),
        );
        let short = err.correlation_id.short();
        assert!(err.to_string().contains(&short));
        assert!(err.source().is_some());

        let wrapped: ProgressionError = err.into();
        assert!(wrapped.is_retryable());
        assert!(wrapped.as_application().is_some());
    }

    #[test]
    fn patch_errors_become_application_errors() {
        let err: ProgressionError = PatchError::EmptyPath.into();
        let app = err.as_application().expect("application error");
        assert!(app.cause.is_some());
    }
}
