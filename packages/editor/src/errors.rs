//! Error types for the editor

use thiserror::Error;

/// Recoverable failure of one engine call. Every variant is returned as a
/// value so the caller can read the message and retry with other parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOpShape(String),

    #[error("Unknown operation type: {0}")]
    UnknownOpType(String),

    #[error("No pending change with id {0}")]
    ResolutionNotFound(String),
}

impl EditError {
    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            EditError::EmptyInput(_) => "empty_input",
            EditError::NotFound(_) => "not_found",
            EditError::InvalidOpShape(_) => "invalid_op_shape",
            EditError::UnknownOpType(_) => "unknown_op_type",
            EditError::ResolutionNotFound(_) => "resolution_not_found",
        }
    }
}

/// Failures outside a single edit: loading markup, decoding operation
/// batches, reading files
#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Parse error: {0}")]
    Parse(#[from] revisor_markup::ParseError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Edit(#[from] EditError),
}

pub type EditResult<T> = Result<T, EditError>;
