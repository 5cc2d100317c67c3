//! Daemon settings
//!
//! Layered: built-in defaults, then an optional TOML file (`HERALD_CONFIG`,
//! default `herald.toml`), then `HERALD__SECTION__KEY` environment variables.
//! `HERALD_LOG_FORMAT` and `HERALD_DATABASE_URL` override the matching keys.
//!
//! ```toml
//! database_url = "~/.herald/herald.db"
//!
//! [host]
//! base_url = "https://shop.example/api"
//! api_token = "..."
//!
//! [scan]
//! concurrency = 4
//! flag_check = "per_item"
//! ```

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use herald_core::application::constants::*;
use herald_core::application::{ExecutorConfig, FlagCheck, RetryPolicy, SchedulerConfig};
use herald_core::domain::parse_http_url;
use herald_infra_http::{HttpClientConfig, DEFAULT_USER_AGENT};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "herald.toml";
const DEFAULT_DB_PATH: &str = "~/.herald/herald.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub log_format: LogFormat,
    pub host: HostSettings,
    pub publish: PipelineSettings,
    pub scan: PipelineSettings,
    pub retry: RetrySettings,
    pub reaper: ReaperSettings,
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostSettings {
    pub base_url: String,
    pub api_token: String,
    pub timeout_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub error_cooldown_ms: u64,
    pub inter_item_delay_ms: u64,
    pub call_timeout_ms: u64,
    pub flag_check: FlagCheck,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReaperSettings {
    pub claim_timeout_ms: u64,
    pub interval_ms: u64,
    pub max_total_attempts: i32,
}

impl Settings {
    /// Load from file + environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("HERALD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let explicit = std::env::var("HERALD_CONFIG").is_ok();

        let builder = defaults()?
            .add_source(File::with_name(&path).required(explicit))
            .add_source(
                Environment::with_prefix("HERALD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("log_format", std::env::var("HERALD_LOG_FORMAT").ok())?
            // Shared with heraldctl
            .set_override_option("database_url", std::env::var("HERALD_DATABASE_URL").ok())?;

        Self::from_builder(builder).with_context(|| format!("Invalid configuration ({})", path))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings.expand_paths())
    }

    fn validate(&self) -> Result<()> {
        if self.host.api_token.trim().is_empty() {
            bail!("host.api_token is required (set HERALD__HOST__API_TOKEN)");
        }
        parse_http_url(&self.host.base_url).context("host.base_url")?;
        for (name, pipeline) in [("publish", &self.publish), ("scan", &self.scan)] {
            if pipeline.batch_size == 0 {
                bail!("{}.batch_size must be at least 1", name);
            }
            if pipeline.concurrency == 0 {
                bail!("{}.concurrency must be at least 1", name);
            }
            if pipeline.call_timeout_ms == 0 {
                bail!("{}.call_timeout_ms must be positive", name);
            }
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.reaper.max_total_attempts <= 0 {
            bail!("reaper.max_total_attempts must be positive");
        }
        // A claim must not expire while its batch can still be running
        for (name, pipeline) in [("publish", &self.publish), ("scan", &self.scan)] {
            let worst_case = pipeline.worst_case_batch_ms();
            if self.reaper.claim_timeout_ms <= worst_case {
                bail!(
                    "reaper.claim_timeout_ms ({}) must exceed the longest {} batch ({}ms = {} waves x (call_timeout_ms + inter_item_delay_ms))",
                    self.reaper.claim_timeout_ms,
                    name,
                    worst_case,
                    pipeline.batch_size.div_ceil(pipeline.concurrency)
                );
            }
        }
        Ok(())
    }

    fn expand_paths(mut self) -> Self {
        self.database_url = shellexpand::tilde(&self.database_url).into_owned();
        self
    }

    pub fn http_client(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_millis(self.host.timeout_ms),
            user_agent: self.host.user_agent.clone(),
            proxy_from_env: true,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
        )
    }

    pub fn claim_timeout(&self) -> Duration {
        Duration::from_millis(self.reaper.claim_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl PipelineSettings {
    /// Upper bound on one batch: `batch_size / concurrency` waves (rounded up),
    /// each item capped by the call timeout plus its trailing delay
    pub fn worst_case_batch_ms(&self) -> u64 {
        let waves = self.batch_size.div_ceil(self.concurrency.max(1)) as u64;
        waves.saturating_mul(self.call_timeout_ms.saturating_add(self.inter_item_delay_ms))
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            concurrency_limit: self.concurrency,
            inter_item_delay: Duration::from_millis(self.inter_item_delay_ms),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            flag_check: self.flag_check,
        }
    }

    pub fn scheduler_config(&self, name: &str, reap_interval: Duration) -> SchedulerConfig {
        SchedulerConfig {
            name: name.to_string(),
            batch_size: self.batch_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            error_cooldown: Duration::from_millis(self.error_cooldown_ms),
            reap_interval,
        }
    }
}

fn millis(d: Duration) -> i64 {
    d.as_millis() as i64
}

/// Built-in defaults. The scan pipeline polls faster and checks the
/// control flag before every item.
fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    let mut builder = Config::builder()
        .set_default("database_url", DEFAULT_DB_PATH)?
        .set_default("log_format", "pretty")?
        .set_default("host.base_url", "http://localhost:8080")?
        .set_default("host.api_token", "")?
        .set_default("host.timeout_ms", millis(DEFAULT_CALL_TIMEOUT))?
        .set_default("host.user_agent", DEFAULT_USER_AGENT)?
        .set_default("retry.max_attempts", i64::from(DEFAULT_RETRY_MAX_ATTEMPTS))?
        .set_default("retry.base_delay_ms", millis(DEFAULT_RETRY_BASE_DELAY))?
        .set_default("reaper.claim_timeout_ms", millis(DEFAULT_CLAIM_TIMEOUT))?
        .set_default("reaper.interval_ms", millis(DEFAULT_REAP_INTERVAL))?
        .set_default("reaper.max_total_attempts", i64::from(DEFAULT_MAX_TOTAL_ATTEMPTS))?
        .set_default("shutdown_grace_ms", 30_000_i64)?;

    for (name, poll_interval, flag_check) in [
        ("publish", DEFAULT_POLL_INTERVAL, "per_batch"),
        ("scan", DEFAULT_SCAN_POLL_INTERVAL, "per_item"),
    ] {
        builder = builder
            .set_default(format!("{}.batch_size", name), DEFAULT_BATCH_SIZE as i64)?
            .set_default(
                format!("{}.concurrency", name),
                DEFAULT_CONCURRENCY_LIMIT as i64,
            )?
            .set_default(format!("{}.poll_interval_ms", name), millis(poll_interval))?
            .set_default(
                format!("{}.error_cooldown_ms", name),
                millis(DEFAULT_ERROR_COOLDOWN),
            )?
            .set_default(
                format!("{}.inter_item_delay_ms", name),
                millis(DEFAULT_INTER_ITEM_DELAY),
            )?
            .set_default(
                format!("{}.call_timeout_ms", name),
                millis(DEFAULT_ITEM_TIMEOUT),
            )?
            .set_default(format!("{}.flag_check", name), flag_check)?;
    }
    Ok(builder)
}
