// Claim Manager - turns "enabled and work exists" into an owned batch

use crate::application::events::{EventBus, JobEvent};
use crate::domain::{Job, JobKind};
use crate::error::Result;
use crate::port::JobRepository;
use std::sync::Arc;
use tracing::debug;

pub struct ClaimManager {
    repo: Arc<dyn JobRepository>,
    kind: Option<JobKind>,
    events: EventBus,
}

impl ClaimManager {
    /// `kind = None` claims every job family
    pub fn new(repo: Arc<dyn JobRepository>, kind: Option<JobKind>) -> Self {
        Self {
            repo,
            kind,
            events: EventBus::default(),
        }
    }

    /// Publish a `Claimed` event per job on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Claim up to `batch_size` jobs.
    ///
    /// Returns an empty batch without touching any row when the control flag
    /// is disabled. An empty batch while enabled means the queue is drained.
    /// Store errors propagate.
    pub async fn claim_next(&self, batch_size: usize) -> Result<Vec<Job>> {
        if !self.repo.read_control_flag().await? {
            debug!(kind = ?self.kind, "Pipeline disabled, skipping claim");
            return Ok(Vec::new());
        }

        let jobs = self.repo.claim_batch(batch_size, self.kind).await?;
        if !jobs.is_empty() {
            debug!(kind = ?self.kind, claimed = jobs.len(), "Claimed batch");
        }
        for job in &jobs {
            self.events.publish(JobEvent::Claimed {
                job_id: job.id.clone(),
                kind: job.kind,
            });
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;
    use crate::port::job_repository::mocks::InMemoryJobRepository;

    #[tokio::test]
    async fn test_disabled_flag_claims_nothing() {
        let repo = Arc::new(InMemoryJobRepository::new());
        repo.seed((0..5).map(|i| Job::new(format!("j{}", i), JobKind::Publish, "c", i)));
        repo.set_control_flag(false).await.unwrap();

        let manager = ClaimManager::new(repo.clone(), None);
        let batch = manager.claim_next(10).await.unwrap();

        assert!(batch.is_empty());
        assert_eq!(repo.count_by_status(JobStatus::Pending).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_enabled_claims_bounded_batch() {
        let repo = Arc::new(InMemoryJobRepository::new());
        repo.seed((0..5).map(|i| Job::new(format!("j{}", i), JobKind::Publish, "c", i)));

        let manager = ClaimManager::new(repo.clone(), Some(JobKind::Publish));
        let batch = manager.claim_next(3).await.unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(repo.count_by_status(JobStatus::InProgress).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_claim_publishes_one_event_per_job() {
        let repo = Arc::new(InMemoryJobRepository::new());
        repo.seed((0..3).map(|i| Job::new(format!("j{}", i), JobKind::Scan, "t", i)));
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let manager = ClaimManager::new(repo.clone(), None).with_events(bus);

        repo.set_control_flag(false).await.unwrap();
        manager.claim_next(2).await.unwrap();
        assert!(rx.try_recv().is_err());

        repo.set_control_flag(true).await.unwrap();
        manager.claim_next(2).await.unwrap();
        let claimed: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            claimed,
            vec![
                JobEvent::Claimed {
                    job_id: "j0".to_string(),
                    kind: JobKind::Scan
                },
                JobEvent::Claimed {
                    job_id: "j1".to_string(),
                    kind: JobKind::Scan
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_drained_queue_returns_empty() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let manager = ClaimManager::new(repo, None);
        assert!(manager.claim_next(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flag_read_failure_propagates() {
        let repo = Arc::new(InMemoryJobRepository::new());
        repo.set_fail_flag_reads(true);
        let manager = ClaimManager::new(repo, None);
        assert!(manager.claim_next(3).await.is_err());
    }
}
