// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid job status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Unknown job kind: {0}")]
    UnknownKind(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
