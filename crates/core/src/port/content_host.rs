// Content Host Port - the external publish API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rendered content ready to be pushed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub title: String,
    pub handle: String,
    pub html: String,
    pub metadata: serde_json::Value,
}

/// Host acknowledgement of a publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub external_id: String,
}

/// Errors returned by outbound HTTP collaborators (content host, URL prober)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Remote signalled a request-rate ceiling (HTTP 429); the only retryable case
    #[error("Rate limited by remote host")]
    RateLimited,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl HostError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, HostError::RateLimited)
    }
}

/// External content-hosting API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentHost: Send + Sync {
    /// Publish one page; returns the host-assigned identifier
    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, HostError>;
}
