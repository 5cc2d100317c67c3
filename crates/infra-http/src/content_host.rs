// reqwest-backed content host client

use crate::{transport_error, HttpClientConfig};
use async_trait::async_trait;
use herald_core::port::{ContentHost, HostError, PublishReceipt, PublishRequest};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Longest slice of an error body kept in `last_error`
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct PageBody<'a> {
    title: &'a str,
    handle: &'a str,
    body_html: &'a str,
    metadata: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PageCreated {
    id: serde_json::Value,
}

/// Publishes pages with `POST {base_url}/pages` and a bearer token
pub struct HttpContentHost {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl HttpContentHost {
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        config: &HttpClientConfig,
    ) -> Result<Self, HostError> {
        Ok(Self {
            client: config.build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
        })
    }

    fn pages_url(&self) -> String {
        format!("{}/pages", self.base_url)
    }
}

#[async_trait]
impl ContentHost for HttpContentHost {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, HostError> {
        let body = PageBody {
            title: &request.title,
            handle: &request.handle,
            body_html: &request.html,
            metadata: &request.metadata,
        };

        let response = self
            .client
            .post(self.pages_url())
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        debug!(handle = %request.handle, status = status, "Publish response");

        parse_publish_response(status, &text)
    }
}

/// Map a host response to a receipt or a classified error
pub(crate) fn parse_publish_response(status: u16, body: &str) -> Result<PublishReceipt, HostError> {
    match status {
        429 => Err(HostError::RateLimited),
        200..=299 => {
            let created: PageCreated = serde_json::from_str(body)
                .map_err(|e| HostError::InvalidResponse(format!("bad publish body: {}", e)))?;
            let external_id = match created.id {
                serde_json::Value::String(s) if !s.is_empty() => s,
                serde_json::Value::Number(n) => n.to_string(),
                other => {
                    return Err(HostError::InvalidResponse(format!(
                        "unexpected id in publish response: {}",
                        other
                    )))
                }
            };
            Ok(PublishReceipt { external_id })
        }
        _ => Err(HostError::Http {
            status,
            message: truncate(body.trim(), MAX_ERROR_BODY),
        }),
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
