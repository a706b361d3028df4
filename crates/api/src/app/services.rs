//! Service wiring: stores, pipelines, and background workers.

use std::sync::Arc;

use hubsync_entities::SyncDomain;
use hubsync_jobs::{
    InMemoryJobStore, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobStore,
};
use hubsync_ledger::{InMemorySyncLedger, PostgresSyncLedger, SyncLedger};
use hubsync_pipelines::{CaptureJobHandler, CapturePipeline, IngestJobHandler, IngestPipeline};
use hubsync_registry::EntityRegistry;

use crate::config::SyncConfig;

/// Everything the route handlers and workers share.
#[derive(Clone)]
pub struct AppServices {
    pub config: SyncConfig,
    pub domain: SyncDomain,
    pub registry: EntityRegistry,
    pub ledger: Arc<dyn SyncLedger>,
    pub jobs: Arc<dyn JobStore>,
    pub capture: CapturePipeline,
    pub ingest: IngestPipeline,
}

/// Build the full service graph for one hub process.
///
/// The ledger is Postgres-backed when a database URL is configured
/// (connections open lazily) and in-memory otherwise; domain stores and
/// the job queue are in-process.
pub fn build_services(config: SyncConfig) -> anyhow::Result<AppServices> {
    let domain = SyncDomain::new(config.media_base_url.clone());
    let registry = domain.registry(&config.synchronizable_models)?;

    let ledger: Arc<dyn SyncLedger> = match &config.database_url {
        Some(url) => {
            // One connection per request/task, recycled by age and checked
            // before reuse.
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .max_lifetime(std::time::Duration::from_secs(30 * 60))
                .acquire_timeout(std::time::Duration::from_secs(30))
                .test_before_acquire(true)
                .connect_lazy(url)?;
            Arc::new(PostgresSyncLedger::new(pool))
        }
        None => Arc::new(InMemorySyncLedger::new()),
    };

    let jobs: Arc<dyn JobStore> = InMemoryJobStore::arc();

    let capture = CapturePipeline::new(
        registry.clone(),
        jobs.clone(),
        config.capture_retry.clone(),
    );
    let ingest = IngestPipeline::new(
        registry.clone(),
        ledger.clone(),
        domain.stations.clone(),
        capture.clone(),
    );

    Ok(AppServices {
        config,
        domain,
        registry,
        ledger,
        jobs,
        capture,
        ingest,
    })
}

/// Run the ledger schema bootstrap when a durable backend is configured.
pub async fn migrate_if_durable(services: &AppServices) -> anyhow::Result<()> {
    if services.config.database_url.is_none() {
        return Ok(());
    }
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(services.config.database_url.as_deref().expect("checked"))
        .await?;
    PostgresSyncLedger::new(pool).migrate().await?;
    Ok(())
}

/// Spawn the capture and ingestion workers.
pub fn spawn_workers(services: &AppServices) -> Vec<JobExecutorHandle> {
    let executor_config = JobExecutorConfig {
        soft_time_limit: services.config.soft_time_limit,
        hard_time_limit: services.config.hard_time_limit,
        max_tasks_per_run: services.config.max_tasks_per_child,
        ..Default::default()
    };

    let mut capture_executor = JobExecutor::new(services.jobs.clone());
    capture_executor.register_handler(
        "sync.capture",
        Arc::new(CaptureJobHandler::new(
            services.ledger.clone(),
            services.domain.stations.clone(),
        )),
    );

    let mut ingest_executor = JobExecutor::new(services.jobs.clone());
    ingest_executor.register_handler(
        "sync.ingest",
        Arc::new(IngestJobHandler::new(
            services.ingest.clone(),
            services.registry.clone(),
        )),
    );

    vec![
        capture_executor.spawn(executor_config.clone().with_name("capture-worker")),
        ingest_executor.spawn(executor_config.with_name("ingest-worker")),
    ]
}
