// Operator use cases: enqueue work, pause/resume, inspect

use crate::application::reaper::StaleClaimReaper;
use crate::domain::{
    parse_http_url, ContentRecord, Job, JobKind, JobStatus, ScanTarget, StatusCounts,
};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobRepository, PayloadStore, StaleSweep, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// New content record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContent {
    pub title: String,
    pub handle: String,
    pub body: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Pipeline snapshot for `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub enabled: bool,
    /// Last toggle time (epoch ms); `None` when the flag row is missing
    pub flag_updated_at: Option<i64>,
    pub counts: StatusCounts,
}

pub struct AdminService {
    job_repo: Arc<dyn JobRepository>,
    payloads: Arc<dyn PayloadStore>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl AdminService {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        payloads: Arc<dyn PayloadStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            job_repo,
            payloads,
            id_provider,
            time_provider,
        }
    }

    /// Insert a pending job pointing at an existing payload
    pub async fn enqueue(&self, kind: JobKind, payload_ref: &str) -> Result<String> {
        let payload_ref = payload_ref.trim();
        if payload_ref.is_empty() {
            return Err(AppError::Validation("payload_ref cannot be empty".to_string()));
        }

        let exists = match kind {
            JobKind::Publish => self.payloads.load_content(payload_ref).await?.is_some(),
            JobKind::Scan => self.payloads.load_scan_target(payload_ref).await?.is_some(),
        };
        if !exists {
            return Err(AppError::NotFound(format!(
                "{} payload {} not found",
                kind, payload_ref
            )));
        }

        let job = Job::new(
            self.id_provider.generate_id(),
            kind,
            payload_ref,
            self.time_provider.now_millis(),
        );
        self.job_repo.insert(&job).await?;
        info!(job_id = %job.id, kind = %kind, payload_ref = %payload_ref, "Job enqueued");
        Ok(job.id)
    }

    /// Store a content record and enqueue its publish job.
    /// Returns `(content_id, job_id)`.
    pub async fn add_content(&self, content: NewContent) -> Result<(String, String)> {
        if content.title.trim().is_empty() {
            return Err(AppError::Validation("title cannot be empty".to_string()));
        }
        if content.handle.trim().is_empty() {
            return Err(AppError::Validation("handle cannot be empty".to_string()));
        }

        let record = ContentRecord {
            id: self.id_provider.generate_id(),
            title: content.title,
            handle: content.handle,
            body: content.body,
            metadata: content.metadata,
            external_id: None,
        };
        self.payloads.insert_content(&record).await?;
        let job_id = self.enqueue_or_discard(JobKind::Publish, &record.id).await?;
        Ok((record.id, job_id))
    }

    /// Store a scan target and enqueue its scan job.
    /// Returns `(target_id, job_id)`.
    pub async fn add_scan_target(&self, url: &str) -> Result<(String, String)> {
        let url = url.trim();
        parse_http_url(url)?;
        let target = ScanTarget {
            id: self.id_provider.generate_id(),
            url: url.to_string(),
            last_http_status: None,
            last_probed_at: None,
        };
        self.payloads.insert_scan_target(&target).await?;
        let job_id = self.enqueue_or_discard(JobKind::Scan, &target.id).await?;
        Ok((target.id, job_id))
    }

    /// Enqueue the job for a payload stored just before. On failure the
    /// payload is deleted again so no record is left without a job; a crash
    /// between the two writes can still leave one, which `enqueue` repairs.
    async fn enqueue_or_discard(&self, kind: JobKind, payload_ref: &str) -> Result<String> {
        let err = match self.enqueue(kind, payload_ref).await {
            Ok(job_id) => return Ok(job_id),
            Err(e) => e,
        };
        let cleanup = match kind {
            JobKind::Publish => self.payloads.delete_content(payload_ref).await,
            JobKind::Scan => self.payloads.delete_scan_target(payload_ref).await,
        };
        if let Err(cleanup_err) = cleanup {
            warn!(
                payload_ref = %payload_ref,
                error = %cleanup_err,
                "Failed to discard payload after enqueue error"
            );
        }
        Err(err)
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.job_repo.set_control_flag(enabled).await?;
        info!(enabled = enabled, "Control flag updated");
        Ok(())
    }

    pub async fn status(&self) -> Result<StatusReport> {
        let flag = self.job_repo.load_control_flag().await?;
        Ok(StatusReport {
            enabled: flag.is_some_and(|f| f.enabled),
            flag_updated_at: flag.map(|f| f.updated_at),
            counts: self.job_repo.status_counts().await?,
        })
    }

    pub async fn failed_jobs(&self, limit: usize) -> Result<Vec<Job>> {
        self.job_repo.find_by_status(JobStatus::Failed, limit).await
    }

    /// Return failed jobs below the attempt ceiling to pending
    pub async fn resume_failed(&self, max_total_attempts: i32) -> Result<u64> {
        let resumed = self.job_repo.resume_failed(max_total_attempts).await?;
        info!(resumed = resumed, "Failed jobs resumed");
        Ok(resumed)
    }

    /// One-off stale-claim sweep
    pub async fn reap(&self, older_than: Duration, max_total_attempts: i32) -> Result<StaleSweep> {
        StaleClaimReaper::new(
            Arc::clone(&self.job_repo),
            Arc::clone(&self.time_provider),
            older_than,
            max_total_attempts,
        )
        .sweep()
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::job_repository::mocks::InMemoryJobRepository;
    use crate::port::payload_store::mocks::InMemoryPayloadStore;
    use crate::port::time_provider::ManualTimeProvider;

    fn service() -> (AdminService, Arc<InMemoryJobRepository>, Arc<InMemoryPayloadStore>) {
        let clock = Arc::new(ManualTimeProvider::new(5_000));
        let repo = Arc::new(InMemoryJobRepository::with_time_provider(clock.clone()));
        let payloads = Arc::new(InMemoryPayloadStore::new());
        let service = AdminService::new(
            repo.clone(),
            payloads.clone(),
            Arc::new(SequentialIdProvider::new("id")),
            clock,
        );
        (service, repo, payloads)
    }

    #[tokio::test]
    async fn test_add_content_enqueues_publish_job() {
        let (service, repo, payloads) = service();

        let (content_id, job_id) = service
            .add_content(NewContent {
                title: "Lamp".to_string(),
                handle: "lamp".to_string(),
                body: "Warm light".to_string(),
                metadata: serde_json::Value::Null,
            })
            .await
            .unwrap();

        assert_eq!(content_id, "id-1");
        assert!(payloads.content(&content_id).is_some());
        let job = repo.get(&job_id).unwrap();
        assert_eq!(job.kind, JobKind::Publish);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.payload_ref, content_id);
        assert_eq!(job.created_at, 5_000);
    }

    #[tokio::test]
    async fn test_failed_enqueue_discards_new_payload() {
        let (service, repo, payloads) = service();
        // The job id the service will generate next is already taken
        repo.seed([Job::new("id-2", JobKind::Scan, "other", 1)]);

        let result = service.add_scan_target("https://shop.example/a").await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert!(payloads.target("id-1").is_none());
        assert_eq!(repo.all().len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_unknown_payload() {
        let (service, repo, _) = service();

        let err = service.enqueue(JobKind::Scan, "ghost").await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(repo.all().is_empty());
    }

    #[tokio::test]
    async fn test_add_scan_target_validates_url() {
        let (service, repo, payloads) = service();

        assert!(service.add_scan_target("ftp://nope").await.is_err());
        assert!(service.add_scan_target("http://[::1").await.is_err());
        assert!(service.add_scan_target("https://a:b@").await.is_err());
        assert!(repo.all().is_empty());

        let (target_id, _) = service
            .add_scan_target(" https://shop.example/a ")
            .await
            .unwrap();
        assert_eq!(payloads.target(&target_id).unwrap().url, "https://shop.example/a");
    }

    #[tokio::test]
    async fn test_status_and_toggle() {
        let (service, repo, _) = service();
        repo.seed([
            Job::new("a", JobKind::Publish, "c", 1),
            Job::new("b", JobKind::Scan, "t", 2),
        ]);

        service.set_enabled(false).await.unwrap();
        let report = service.status().await.unwrap();

        assert!(!report.enabled);
        assert_eq!(report.flag_updated_at, Some(5_000));
        assert_eq!(report.counts.pending, 2);
        assert_eq!(report.counts.total(), 2);
    }

    #[tokio::test]
    async fn test_resume_failed_jobs() {
        let (service, repo, _) = service();
        repo.seed([Job::new("a", JobKind::Publish, "c", 1)]);
        repo.claim_batch(1, None).await.unwrap();
        repo.mark_failed("a", repo.lease("a"), "HTTP 500: boom")
            .await
            .unwrap();

        assert_eq!(service.failed_jobs(10).await.unwrap().len(), 1);
        assert_eq!(service.resume_failed(25).await.unwrap(), 1);
        assert_eq!(repo.get("a").unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_reap_requeues_orphaned_claims() {
        let clock = Arc::new(ManualTimeProvider::new(5_000));
        let repo = Arc::new(InMemoryJobRepository::with_time_provider(clock.clone()));
        let service = AdminService::new(
            repo.clone(),
            Arc::new(InMemoryPayloadStore::new()),
            Arc::new(SequentialIdProvider::new("id")),
            clock.clone(),
        );
        repo.seed([Job::new("a", JobKind::Scan, "t", 1)]);
        repo.claim_batch(1, None).await.unwrap();
        clock.advance(30_000);

        let sweep = service.reap(Duration::from_secs(60), 25).await.unwrap();
        assert_eq!(sweep, StaleSweep::default());

        let sweep = service.reap(Duration::from_secs(10), 25).await.unwrap();
        assert_eq!(sweep.requeued, 1);
        assert_eq!(repo.get("a").unwrap().status, JobStatus::Pending);
    }
}
