// Scan processor - probe a target URL and record the HTTP status

use crate::application::backoff::{with_backoff, RetryPolicy};
use crate::application::processor::{ItemProcessor, ProcessError};
use crate::application::publish::classify;
use crate::domain::Job;
use crate::port::{JobRepository, PayloadStore, TimeProvider, UrlProber};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct ScanProcessor {
    payloads: Arc<dyn PayloadStore>,
    prober: Arc<dyn UrlProber>,
    job_repo: Arc<dyn JobRepository>,
    time_provider: Arc<dyn TimeProvider>,
    policy: RetryPolicy,
}

impl ScanProcessor {
    pub fn new(
        payloads: Arc<dyn PayloadStore>,
        prober: Arc<dyn UrlProber>,
        job_repo: Arc<dyn JobRepository>,
        time_provider: Arc<dyn TimeProvider>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            payloads,
            prober,
            job_repo,
            time_provider,
            policy,
        }
    }
}

#[async_trait]
impl ItemProcessor for ScanProcessor {
    async fn process(&self, job: &Job) -> Result<(), ProcessError> {
        let target = self
            .payloads
            .load_scan_target(&job.payload_ref)
            .await
            .map_err(|e| ProcessError::Fatal(format!("failed to load scan target: {}", e)))?
            .ok_or_else(|| {
                ProcessError::Fatal(format!("scan target {} not found", job.payload_ref))
            })?;

        let outcome = with_backoff(&self.policy, self.job_repo.as_ref(), job, |_| {
            let url = target.url.as_str();
            async move { self.prober.probe(url).await.map_err(classify) }
        })
        .await?;

        debug!(job_id = %job.id, url = %target.url, http_status = outcome.http_status, "Probed");

        self.payloads
            .record_probe(&target.id, outcome.http_status, self.time_provider.now_millis())
            .await
            .map_err(|e| ProcessError::Fatal(format!("failed to store probe result: {}", e)))
    }
}
