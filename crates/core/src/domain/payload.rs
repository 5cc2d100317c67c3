// Payload records referenced by jobs through `payload_ref`

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Generated content waiting to be pushed to the content host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub title: String,
    pub handle: String,
    pub body: String,
    pub metadata: serde_json::Value,
    /// Identifier assigned by the content host after a successful publish
    pub external_id: Option<String>,
}

/// URL that scan jobs probe over HTTP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTarget {
    pub id: String,
    pub url: String,
    pub last_http_status: Option<u16>,
    pub last_probed_at: Option<i64>,
}

/// Parse an absolute `http`/`https` URL that names a host.
pub fn parse_http_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let url = Url::parse(raw)
        .map_err(|e| DomainError::ValidationError(format!("invalid URL {:?}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DomainError::ValidationError(format!(
            "URL must be http(s): {:?}",
            raw
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(DomainError::ValidationError(format!(
            "URL has no host: {:?}",
            raw
        )));
    }
    Ok(url)
}
