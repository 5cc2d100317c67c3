// Scheduler Loop - the long-lived driver of one pipeline
//
// Polling -> claim -> (Draining: run batch, claim again immediately)
//                  -> (Sleeping: queue drained or disabled)
// Iteration errors degrade to slow polling via the error cooldown.

mod shutdown;

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::claim::ClaimManager;
use crate::application::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_ERROR_COOLDOWN, DEFAULT_POLL_INTERVAL,
};
use crate::application::executor::{BatchReport, BoundedExecutor};
use crate::application::processor::ItemProcessor;
use crate::application::reaper::StaleClaimReaper;
use crate::error::Result;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Loop state, observable for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Polling,
    Draining,
    Sleeping,
    Stopped,
}

/// Result of a single iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Nothing claimed: queue drained or pipeline disabled
    Idle,
    /// A batch ran to completion
    Processed(BatchReport),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pipeline name for logs
    pub name: String,
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub error_cooldown: Duration,
    /// How often the stale-claim sweep runs; only used when a reaper is attached
    pub reap_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            error_cooldown: DEFAULT_ERROR_COOLDOWN,
            reap_interval: crate::application::constants::DEFAULT_REAP_INTERVAL,
        }
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    claim: ClaimManager,
    executor: BoundedExecutor,
    processor: Arc<dyn ItemProcessor>,
    reaper: Option<StaleClaimReaper>,
    last_reap: Mutex<Option<Instant>>,
    state: Mutex<LoopState>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        claim: ClaimManager,
        executor: BoundedExecutor,
        processor: Arc<dyn ItemProcessor>,
    ) -> Self {
        Self {
            config,
            claim,
            executor,
            processor,
            reaper: None,
            last_reap: Mutex::new(None),
            state: Mutex::new(LoopState::Idle),
        }
    }

    /// Attach a stale-claim sweep that runs every `reap_interval`
    pub fn with_reaper(mut self, reaper: StaleClaimReaper) -> Self {
        self.reaper = Some(reaper);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> LoopState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: LoopState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Run until `shutdown` fires.
    ///
    /// Shutdown is only observed between iterations and during sleeps, so an
    /// in-flight batch always finishes before the loop exits.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(pipeline = %self.config.name, "Scheduler started");
        loop {
            if shutdown.is_shutdown() {
                info!(pipeline = %self.config.name, "Scheduler shutting down");
                break;
            }

            let pause = match self.run_once().await {
                Ok(IterationOutcome::Processed(report)) => {
                    info!(
                        pipeline = %self.config.name,
                        done = report.done,
                        failed = report.failed,
                        released = report.released,
                        lost = report.lost,
                        "Batch complete"
                    );
                    // Keep draining while work remains; a fully released batch
                    // means the pipeline was paused, so back off like an idle poll.
                    (report.done + report.failed == 0).then_some(self.config.poll_interval)
                }
                Ok(IterationOutcome::Idle) => Some(self.config.poll_interval),
                Err(e) => {
                    error!(pipeline = %self.config.name, error = %e, "Scheduler iteration failed");
                    Some(self.config.error_cooldown)
                }
            };

            if let Some(duration) = pause {
                self.set_state(LoopState::Sleeping);
                tokio::select! {
                    _ = sleep(duration) => {},
                    _ = shutdown.wait() => {
                        info!(pipeline = %self.config.name, "Scheduler interrupted while sleeping");
                        break;
                    }
                }
            }
        }
        self.set_state(LoopState::Stopped);
        info!(pipeline = %self.config.name, "Scheduler stopped");
        Ok(())
    }

    /// One claim-and-execute iteration
    pub async fn run_once(&self) -> Result<IterationOutcome> {
        self.reap_if_due().await?;

        self.set_state(LoopState::Polling);
        let jobs = self.claim.claim_next(self.config.batch_size).await?;
        if jobs.is_empty() {
            debug!(pipeline = %self.config.name, "Nothing to claim");
            return Ok(IterationOutcome::Idle);
        }

        self.set_state(LoopState::Draining);
        let report = self
            .executor
            .run(jobs, Arc::clone(&self.processor))
            .await?;
        Ok(IterationOutcome::Processed(report))
    }

    async fn reap_if_due(&self) -> Result<()> {
        let Some(reaper) = &self.reaper else {
            return Ok(());
        };

        let due = {
            let last = self.last_reap.lock().unwrap_or_else(|e| e.into_inner());
            last.map_or(true, |at| at.elapsed() >= self.config.reap_interval)
        };
        if !due {
            return Ok(());
        }

        reaper.sweep().await?;
        *self.last_reap.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::EventBus;
    use crate::application::executor::{ExecutorConfig, FlagCheck};
    use crate::application::processor::mocks::MockProcessor;
    use crate::domain::{Job, JobKind, JobStatus};
    use crate::port::job_repository::mocks::InMemoryJobRepository;
    use crate::port::time_provider::ManualTimeProvider;
    use crate::port::JobRepository;

    fn scheduler(
        repo: Arc<InMemoryJobRepository>,
        processor: Arc<MockProcessor>,
        batch_size: usize,
    ) -> Scheduler {
        let config = SchedulerConfig {
            name: "test".to_string(),
            batch_size,
            poll_interval: Duration::from_millis(20),
            error_cooldown: Duration::from_millis(20),
            reap_interval: Duration::from_secs(60),
        };
        let executor = BoundedExecutor::new(
            repo.clone(),
            ExecutorConfig {
                concurrency_limit: 2,
                inter_item_delay: Duration::ZERO,
                call_timeout: Duration::from_secs(5),
                flag_check: FlagCheck::PerBatch,
            },
            EventBus::default(),
        );
        Scheduler::new(
            config,
            ClaimManager::new(repo, Some(JobKind::Publish)),
            executor,
            processor,
        )
    }

    #[tokio::test]
    async fn test_run_once_processes_batch() {
        let repo = Arc::new(InMemoryJobRepository::new());
        repo.seed((0..3).map(|i| Job::new(format!("j{}", i), JobKind::Publish, "c", i)));
        let processor = Arc::new(MockProcessor::succeeding());
        let scheduler = scheduler(repo.clone(), processor, 10);

        let outcome = scheduler.run_once().await.unwrap();

        match outcome {
            IterationOutcome::Processed(report) => assert_eq!(report.done, 3),
            IterationOutcome::Idle => panic!("expected a processed batch"),
        }
        assert_eq!(scheduler.run_once().await.unwrap(), IterationOutcome::Idle);
    }

    #[tokio::test]
    async fn test_disabled_flag_leaves_job_pending() {
        let repo = Arc::new(InMemoryJobRepository::new());
        repo.seed([Job::new("only", JobKind::Publish, "c", 1)]);
        repo.set_control_flag(false).await.unwrap();
        let processor = Arc::new(MockProcessor::succeeding());
        let scheduler = Arc::new(scheduler(repo.clone(), processor.clone(), 10));

        let (tx, token) = shutdown_channel();
        let handle = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run(token).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(result.unwrap().unwrap().is_ok());
        assert_eq!(repo.get("only").unwrap().status, JobStatus::Pending);
        assert_eq!(processor.call_count(), 0);
        assert_eq!(scheduler.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_drains_queue_across_batches() {
        let repo = Arc::new(InMemoryJobRepository::new());
        repo.seed((0..7).map(|i| Job::new(format!("j{}", i), JobKind::Publish, "c", i)));
        let processor = Arc::new(MockProcessor::succeeding());
        let scheduler = Arc::new(scheduler(repo.clone(), processor.clone(), 2));

        let (tx, token) = shutdown_channel();
        let handle = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run(token).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(repo.count_by_status(JobStatus::Done).await.unwrap(), 7);
        assert_eq!(processor.call_count(), 7);
    }

    #[tokio::test]
    async fn test_store_outage_does_not_stop_loop() {
        let repo = Arc::new(InMemoryJobRepository::new());
        repo.seed([Job::new("j", JobKind::Publish, "c", 1)]);
        repo.set_fail_flag_reads(true);
        let processor = Arc::new(MockProcessor::succeeding());
        let scheduler = Arc::new(scheduler(repo.clone(), processor, 10));

        assert!(scheduler.run_once().await.is_err());

        let (tx, token) = shutdown_channel();
        let handle = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run(token).await })
        };
        tokio::time::sleep(Duration::from_millis(60)).await;
        repo.set_fail_flag_reads(false);
        tokio::time::sleep(Duration::from_millis(150)).await;
        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(repo.get("j").unwrap().status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_reaper_runs_before_claim() {
        let clock = Arc::new(ManualTimeProvider::new(1_000_000));
        let repo = Arc::new(InMemoryJobRepository::with_time_provider(clock.clone()));
        repo.seed([Job::new("orphan", JobKind::Publish, "c", 1)]);
        repo.claim_batch(1, None).await.unwrap();
        clock.advance(120_000);

        let processor = Arc::new(MockProcessor::succeeding());
        let reaper =
            StaleClaimReaper::new(repo.clone(), clock.clone(), Duration::from_secs(60), 25);
        let scheduler = scheduler(repo.clone(), processor, 10).with_reaper(reaper);

        let outcome = scheduler.run_once().await.unwrap();

        assert!(matches!(outcome, IterationOutcome::Processed(r) if r.done == 1));
        assert_eq!(repo.get("orphan").unwrap().status, JobStatus::Done);
    }
}
