// Shared harness: a migrated file-backed store plus scripted HTTP fakes
#![allow(dead_code)]

use async_trait::async_trait;
use herald_core::application::{
    AdminService, BoundedExecutor, ClaimManager, EventBus, ExecutorConfig, FlagCheck,
    ProcessorRegistry, PublishProcessor, RetryPolicy, ScanProcessor, Scheduler, SchedulerConfig,
};
use herald_core::domain::JobKind;
use herald_core::port::id_provider::UuidProvider;
use herald_core::port::time_provider::SystemTimeProvider;
use herald_core::port::{
    ContentHost, HostError, JobRepository, PayloadStore, ProbeOutcome, PublishReceipt,
    PublishRequest, TimeProvider, UrlProber,
};
use herald_infra_http::HtmlRenderer;
use herald_infra_sqlite::{create_pool, run_migrations, SqliteJobRepository, SqlitePayloadStore};
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub struct Harness {
    // Keeps the database file alive for the test
    _dir: TempDir,
    pub pool: SqlitePool,
    pub time: Arc<dyn TimeProvider>,
    pub repo: Arc<dyn JobRepository>,
    pub payloads: Arc<dyn PayloadStore>,
    pub admin: AdminService,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herald.db");
        let pool = create_pool(path.to_str().unwrap()).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let repo: Arc<dyn JobRepository> =
            Arc::new(SqliteJobRepository::new(pool.clone(), time.clone()));
        let payloads: Arc<dyn PayloadStore> = Arc::new(SqlitePayloadStore::new(pool.clone()));
        let admin = AdminService::new(
            repo.clone(),
            payloads.clone(),
            Arc::new(UuidProvider),
            time.clone(),
        );

        Self {
            _dir: dir,
            pool,
            time,
            repo,
            payloads,
            admin,
        }
    }

    /// Store `n` content records, each with a pending publish job
    pub async fn seed_content(&self, n: usize) -> Vec<(String, String)> {
        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            let content = herald_core::application::NewContent {
                title: format!("Item {}", i),
                handle: format!("item-{}", i),
                body: format!("<p>Body {}</p>", i),
                metadata: serde_json::json!({ "position": i }),
            };
            ids.push(self.admin.add_content(content).await.unwrap());
        }
        ids
    }

    pub fn publish_scheduler(
        &self,
        host: Arc<dyn ContentHost>,
        batch_size: usize,
        policy: RetryPolicy,
    ) -> Scheduler {
        let processor = PublishProcessor::new(
            self.payloads.clone(),
            Arc::new(HtmlRenderer),
            host,
            self.repo.clone(),
            policy,
        );
        let registry = ProcessorRegistry::new().register(JobKind::Publish, Arc::new(processor));
        Scheduler::new(
            fast_scheduler_config("publish", batch_size),
            ClaimManager::new(self.repo.clone(), Some(JobKind::Publish)),
            BoundedExecutor::new(
                self.repo.clone(),
                fast_executor_config(FlagCheck::PerBatch),
                EventBus::default(),
            ),
            Arc::new(registry),
        )
    }

    pub fn scan_scheduler(&self, prober: Arc<dyn UrlProber>, policy: RetryPolicy) -> Scheduler {
        let processor = ScanProcessor::new(
            self.payloads.clone(),
            prober,
            self.repo.clone(),
            self.time.clone(),
            policy,
        );
        Scheduler::new(
            fast_scheduler_config("scan", 10),
            ClaimManager::new(self.repo.clone(), Some(JobKind::Scan)),
            BoundedExecutor::new(
                self.repo.clone(),
                fast_executor_config(FlagCheck::PerItem),
                EventBus::default(),
            ),
            Arc::new(processor),
        )
    }
}

pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(1))
}

pub fn fast_scheduler_config(name: &str, batch_size: usize) -> SchedulerConfig {
    SchedulerConfig {
        name: name.to_string(),
        batch_size,
        poll_interval: Duration::from_millis(10),
        error_cooldown: Duration::from_millis(10),
        ..SchedulerConfig::default()
    }
}

pub fn fast_executor_config(flag_check: FlagCheck) -> ExecutorConfig {
    ExecutorConfig {
        concurrency_limit: 4,
        inter_item_delay: Duration::ZERO,
        call_timeout: Duration::from_secs(5),
        flag_check,
    }
}

/// Content host answering from a script, then succeeding
#[derive(Default)]
pub struct ScriptedHost {
    script: Mutex<VecDeque<HostError>>,
    always_rate_limited: bool,
    delay: Duration,
    calls: AtomicUsize,
    handles: Mutex<Vec<String>>,
}

impl ScriptedHost {
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Fail with each error in order before succeeding
    pub fn failing_first(errors: impl IntoIterator<Item = HostError>) -> Self {
        Self {
            script: Mutex::new(errors.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn always_rate_limited() -> Self {
        Self {
            always_rate_limited: true,
            ..Self::default()
        }
    }

    /// Hold every call for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn published_handles(&self) -> Vec<String> {
        self.handles.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentHost for ScriptedHost {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, HostError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.always_rate_limited {
            return Err(HostError::RateLimited);
        }
        if let Some(error) = self.script.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.handles.lock().unwrap().push(request.handle.clone());
        Ok(PublishReceipt {
            external_id: format!("page-{}", call),
        })
    }
}

/// Prober returning a fixed status for every URL
pub struct FixedProber {
    pub status: u16,
    pub calls: AtomicUsize,
}

impl FixedProber {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl UrlProber for FixedProber {
    async fn probe(&self, _url: &str) -> Result<ProbeOutcome, HostError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProbeOutcome {
            http_status: self.status,
        })
    }
}
