// URL Prober Port - HTTP probe for scan targets

use crate::port::HostError;
use async_trait::async_trait;

/// Result of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub http_status: u16,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UrlProber: Send + Sync {
    /// Request `url` and report the HTTP status.
    ///
    /// A 429 answer is reported as `HostError::RateLimited`; every other
    /// status is a successful probe.
    async fn probe(&self, url: &str) -> Result<ProbeOutcome, HostError>;
}
