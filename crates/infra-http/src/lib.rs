// Herald Infrastructure - HTTP Adapters
// Implements: ContentHost, UrlProber, ContentRenderer

mod content_host;
mod renderer;
mod url_prober;

#[cfg(test)]
mod test_server;

#[cfg(test)]
pub(crate) fn direct_config() -> HttpClientConfig {
    HttpClientConfig {
        proxy_from_env: false,
        ..HttpClientConfig::default()
    }
}

pub use content_host::HttpContentHost;
pub use renderer::HtmlRenderer;
pub use url_prober::HttpUrlProber;

use herald_core::port::HostError;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("herald/", env!("CARGO_PKG_VERSION"));

/// Shared reqwest client settings
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// Honor HTTP(S)_PROXY from the environment
    pub proxy_from_env: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy_from_env: true,
        }
    }
}

impl HttpClientConfig {
    pub fn build_client(&self) -> Result<reqwest::Client, HostError> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone());
        if !self.proxy_from_env {
            builder = builder.no_proxy();
        }
        builder
            .build()
            .map_err(|e| HostError::Transport(format!("Failed to create HTTP client: {}", e)))
    }
}

fn transport_error(err: reqwest::Error) -> HostError {
    if err.is_timeout() {
        HostError::Transport(format!("request timed out: {}", err))
    } else {
        HostError::Transport(err.to_string())
    }
}
