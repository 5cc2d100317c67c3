// reqwest-backed URL prober

use crate::{transport_error, HttpClientConfig};
use async_trait::async_trait;
use herald_core::port::{HostError, ProbeOutcome, UrlProber};

pub struct HttpUrlProber {
    client: reqwest::Client,
}

impl HttpUrlProber {
    pub fn new(config: &HttpClientConfig) -> Result<Self, HostError> {
        Ok(Self {
            client: config.build_client()?,
        })
    }
}

#[async_trait]
impl UrlProber for HttpUrlProber {
    async fn probe(&self, url: &str) -> Result<ProbeOutcome, HostError> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        match response.status().as_u16() {
            429 => Err(HostError::RateLimited),
            http_status => Ok(ProbeOutcome { http_status }),
        }
    }
}
