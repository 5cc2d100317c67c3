// Content Renderer Port

use crate::domain::ContentRecord;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Render failed: {0}")]
    Failed(String),
}

/// Turns a content record into publishable markup.
///
/// Pure; failures are never retried.
#[cfg_attr(test, mockall::automock)]
pub trait ContentRenderer: Send + Sync {
    fn render(&self, record: &ContentRecord) -> Result<String, RenderError>;
}
