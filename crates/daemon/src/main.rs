//! Herald - Main Entry Point
//! Runs the publish and scan pipelines against the shared SQLite job store.

mod settings;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use settings::{LogFormat, Settings};
use herald_core::application::{
    shutdown_channel, BoundedExecutor, ClaimManager, EventBus, JobEvent, ProcessorRegistry,
    PublishProcessor, ScanProcessor, Scheduler, ShutdownToken, StaleClaimReaper,
};
use herald_core::domain::JobKind;
use herald_core::port::time_provider::SystemTimeProvider;
use herald_core::port::{JobRepository, PayloadStore, TimeProvider};
use herald_infra_http::{HtmlRenderer, HttpContentHost, HttpUrlProber};
use herald_infra_sqlite::{create_pool, run_migrations, SqliteJobRepository, SqlitePayloadStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration (fatal before anything starts)
    let settings = Settings::load()?;

    // 2. Logging
    init_tracing(settings.log_format)?;
    info!("Herald v{} starting...", VERSION);

    // 3. Database
    info!(database_url = %settings.database_url, "Initializing database...");
    let pool = create_pool(&settings.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Dependency wiring
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let job_repo: Arc<dyn JobRepository> = Arc::new(SqliteJobRepository::new(
        pool.clone(),
        time_provider.clone(),
    ));
    let payloads: Arc<dyn PayloadStore> = Arc::new(SqlitePayloadStore::new(pool.clone()));

    let http = settings.http_client();
    let host = HttpContentHost::new(&settings.host.base_url, &settings.host.api_token, &http)
        .context("Failed to build content host client")?;
    let prober = HttpUrlProber::new(&http).context("Failed to build URL prober")?;

    let registry = ProcessorRegistry::new()
        .register(
            JobKind::Publish,
            Arc::new(PublishProcessor::new(
                payloads.clone(),
                Arc::new(HtmlRenderer),
                Arc::new(host),
                job_repo.clone(),
                settings.retry_policy(),
            )),
        )
        .register(
            JobKind::Scan,
            Arc::new(ScanProcessor::new(
                payloads.clone(),
                Arc::new(prober),
                job_repo.clone(),
                time_provider.clone(),
                settings.retry_policy(),
            )),
        );
    info!(kinds = ?registry.kinds(), "Item processors registered");
    let processor = Arc::new(registry);

    let new_reaper = || {
        StaleClaimReaper::new(
            job_repo.clone(),
            time_provider.clone(),
            settings.claim_timeout(),
            settings.reaper.max_total_attempts,
        )
    };

    // 5. Requeue claims orphaned by a previous crash
    info!("Sweeping stale claims...");
    match new_reaper().sweep().await {
        Ok(sweep) => info!(
            requeued = sweep.requeued,
            abandoned = sweep.abandoned,
            "Startup sweep completed"
        ),
        Err(e) => error!(error = %e, "Startup sweep failed"),
    }

    // 6. Event log
    let events = EventBus::default();
    let event_logger = spawn_event_logger(&events);

    // 7. Scheduler loops, one per job family
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let reap_interval = Duration::from_millis(settings.reaper.interval_ms);
    let mut handles = Vec::new();

    for (kind, pipeline) in [
        (JobKind::Publish, &settings.publish),
        (JobKind::Scan, &settings.scan),
    ] {
        let mut scheduler = Scheduler::new(
            pipeline.scheduler_config(kind.as_str(), reap_interval),
            ClaimManager::new(job_repo.clone(), Some(kind)).with_events(events.clone()),
            BoundedExecutor::new(job_repo.clone(), pipeline.executor_config(), events.clone()),
            processor.clone(),
        );
        // The sweep is store-wide; one loop is enough to drive it
        if kind == JobKind::Publish {
            scheduler = scheduler.with_reaper(new_reaper());
        }
        info!(
            pipeline = %kind,
            batch_size = pipeline.batch_size,
            concurrency = pipeline.concurrency,
            flag_check = ?pipeline.flag_check,
            "Starting scheduler"
        );
        handles.push(spawn_scheduler(scheduler, shutdown_rx.clone()));
    }

    info!("System ready. Press Ctrl+C to shutdown");

    // 8. Wait for shutdown signal
    wait_for_signal().await?;
    info!("Shutdown signal received. Draining in-flight batches...");

    // 9. Graceful shutdown: loops finish their current batch
    shutdown_tx.shutdown();
    let grace = settings.shutdown_grace();
    let drained = tokio::time::timeout(grace, async {
        for handle in handles {
            let _ = handle.await;
        }
    })
    .await;
    if drained.is_err() {
        warn!(
            grace_ms = grace.as_millis() as u64,
            "Shutdown grace expired; unfinished claims will be requeued by the next sweep"
        );
    }
    event_logger.abort();
    pool.close().await;

    info!("Shutdown complete.");
    Ok(())
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("herald=info"))
        .context("Failed to create env filter")?;

    match format {
        LogFormat::Json => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
    Ok(())
}

fn spawn_scheduler(scheduler: Scheduler, shutdown: ShutdownToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = scheduler.run(shutdown).await {
            error!(pipeline = %scheduler.name(), error = %e, "Scheduler failed");
        }
    })
}

fn spawn_event_logger(events: &EventBus) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(JobEvent::Failed {
                    job_id,
                    kind,
                    error,
                }) => debug!(job_id = %job_id, kind = %kind, error = %error, "Job failed"),
                Ok(event) => debug!(job_id = %event.job_id(), event = ?event, "Job event"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Event logger lagging")
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
