//! Error types for cvxcanon.

use thiserror::Error;

/// Error type for cvxcanon operations.
#[derive(Debug, Error)]
pub enum CanonError {
    /// A variable with this name is already declared.
    #[error("Duplicate variable name: {0}")]
    DuplicateName(String),

    /// The variable is not declared in the table.
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// No constraint matches the given key or handle.
    #[error("Unknown constraint: {0}")]
    UnknownConstraint(String),

    /// The variable is still referenced by a constraint or the objective.
    #[error("Variable in use: {0}")]
    InUse(String),

    /// A constraint index or (group, item) pair is out of range.
    #[error("Constraint index out of range: {0}")]
    IndexError(String),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeError { expected: String, got: String },

    /// A quadratic form is not a sum of squares in the requested direction.
    #[error("Non-convex quadratic: {0}")]
    NonConvex(String),

    /// The problem does not meet the preconditions of dualization.
    #[error("Cannot dualize: {0}")]
    Dualization(String),

    /// Unknown option key or unparsable option value.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// A consumer cannot express some part of the standard form.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Solver error.
    #[error("Solver error: {0}")]
    Solver(String),

    /// I/O failure while exporting.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),
}

impl CanonError {
    pub(crate) fn shape(expected: impl Into<String>, got: impl Into<String>) -> Self {
        CanonError::ShapeError {
            expected: expected.into(),
            got: got.into(),
        }
    }
}

/// Result type for cvxcanon operations.
pub type Result<T> = std::result::Result<T, CanonError>;
