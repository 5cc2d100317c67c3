// Publish processor - render a content record and push it to the content host

use crate::application::backoff::{with_backoff, RetryPolicy};
use crate::application::processor::{ItemProcessor, ProcessError};
use crate::domain::Job;
use crate::port::{
    ContentHost, ContentRenderer, HostError, JobRepository, PayloadStore, PublishRequest,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub struct PublishProcessor {
    payloads: Arc<dyn PayloadStore>,
    renderer: Arc<dyn ContentRenderer>,
    host: Arc<dyn ContentHost>,
    job_repo: Arc<dyn JobRepository>,
    policy: RetryPolicy,
}

impl PublishProcessor {
    pub fn new(
        payloads: Arc<dyn PayloadStore>,
        renderer: Arc<dyn ContentRenderer>,
        host: Arc<dyn ContentHost>,
        job_repo: Arc<dyn JobRepository>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            payloads,
            renderer,
            host,
            job_repo,
            policy,
        }
    }

    /// Publish the record behind `job.payload_ref`, returning the external id.
    ///
    /// A record that already carries an external id is not pushed again.
    pub async fn publish_with_retry(&self, job: &Job) -> Result<String, ProcessError> {
        let record = self
            .payloads
            .load_content(&job.payload_ref)
            .await
            .map_err(|e| ProcessError::Fatal(format!("failed to load content: {}", e)))?
            .ok_or_else(|| {
                ProcessError::Fatal(format!("content record {} not found", job.payload_ref))
            })?;

        if let Some(external_id) = &record.external_id {
            debug!(job_id = %job.id, external_id = %external_id, "Content already published");
            return Ok(external_id.clone());
        }

        let html = self
            .renderer
            .render(&record)
            .map_err(|e| ProcessError::Fatal(e.to_string()))?;

        let request = PublishRequest {
            title: record.title.clone(),
            handle: record.handle.clone(),
            html,
            metadata: record.metadata.clone(),
        };

        let receipt = with_backoff(&self.policy, self.job_repo.as_ref(), job, |_| {
            let request = &request;
            async move { self.host.publish(request).await.map_err(classify) }
        })
        .await?;

        self.payloads
            .record_published(&record.id, &receipt.external_id)
            .await
            .map_err(|e| {
                ProcessError::Fatal(format!(
                    "published as {} but failed to store external id: {}",
                    receipt.external_id, e
                ))
            })?;

        info!(job_id = %job.id, external_id = %receipt.external_id, "Content published");
        Ok(receipt.external_id)
    }
}

#[async_trait]
impl ItemProcessor for PublishProcessor {
    async fn process(&self, job: &Job) -> Result<(), ProcessError> {
        self.publish_with_retry(job).await.map(|_| ())
    }
}

/// Only a rate limit is worth another attempt
pub(crate) fn classify(error: HostError) -> ProcessError {
    if error.is_rate_limited() {
        ProcessError::Retryable(error.to_string())
    } else {
        ProcessError::Fatal(error.to_string())
    }
}
