//! Environment-driven configuration.

use std::time::Duration;

use hubsync_jobs::RetryPolicy;

/// Runtime configuration for one hub process.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Listen address for the HTTP server.
    pub bind_addr: String,
    /// Postgres connection string for the durable ledger; in-memory when
    /// absent.
    pub database_url: Option<String>,
    /// Task-queue broker URL (informational; the in-process queue is the
    /// broker in single-binary deployments).
    pub broker_url: String,
    /// Task result backend URL (informational, as above).
    pub result_backend_url: String,
    /// Base URL under which stored media blobs are served.
    pub media_base_url: String,
    /// Bearer token for the operator surface (sync-configs, station list).
    pub operator_token: String,
    /// Entity tags participating in sync.
    pub synchronizable_models: Vec<String>,
    /// Soft task deadline: the attempt is interrupted and retried.
    pub soft_time_limit: Duration,
    /// Hard task deadline backstop.
    pub hard_time_limit: Duration,
    /// Worker loop recycles after this many tasks.
    pub max_tasks_per_child: u32,
    /// Retry policy for capture tasks.
    pub capture_retry: RetryPolicy,
    /// Retry policy for ingestion tasks.
    pub ingest_retry: RetryPolicy,
}

/// The entity tags this build ships stores for.
pub fn default_synchronizable_models() -> Vec<String> {
    [
        "workstations.WorkStation",
        "drivers.Driver",
        "trucks.TruckOwner",
        "trucks.Truck",
        "declarations.Commodity",
        "declarations.PaymentMethod",
        "declarations.Declaration",
        "paths.Path",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            broker_url: "memory://".to_string(),
            result_backend_url: "memory://".to_string(),
            media_base_url: "http://localhost:8080/media".to_string(),
            operator_token: "dev-operator-token".to_string(),
            synchronizable_models: default_synchronizable_models(),
            soft_time_limit: Duration::from_secs(300),
            hard_time_limit: Duration::from_secs(360),
            max_tasks_per_child: 50,
            capture_retry: RetryPolicy::exponential(
                3,
                Duration::from_secs(5),
                Duration::from_secs(60),
            ),
            ingest_retry: RetryPolicy::exponential(
                3,
                Duration::from_secs(10),
                Duration::from_secs(60),
            ),
        }
    }
}

impl SyncConfig {
    /// Read configuration from the environment, falling back to (logged)
    /// development defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .or_else(database_url_from_parts);
        if database_url.is_none() {
            tracing::warn!("DATABASE_URL not set; ledger runs in-memory (non-durable)");
        }

        let operator_token = std::env::var("HUBSYNC_OPERATOR_TOKEN").unwrap_or_else(|_| {
            tracing::warn!("HUBSYNC_OPERATOR_TOKEN not set; using insecure dev default");
            defaults.operator_token.clone()
        });

        let synchronizable_models = std::env::var("SYNCHRONIZABLE_MODELS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|_| defaults.synchronizable_models.clone());

        Self {
            bind_addr: std::env::var("HUBSYNC_BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url,
            broker_url: std::env::var("BROKER_URL").unwrap_or(defaults.broker_url),
            result_backend_url: std::env::var("RESULT_BACKEND_URL")
                .unwrap_or(defaults.result_backend_url),
            media_base_url: std::env::var("HUBSYNC_MEDIA_BASE_URL")
                .unwrap_or(defaults.media_base_url),
            operator_token,
            synchronizable_models,
            soft_time_limit: env_secs("TASK_SOFT_TIME_LIMIT", defaults.soft_time_limit),
            hard_time_limit: env_secs("TASK_TIME_LIMIT", defaults.hard_time_limit),
            max_tasks_per_child: env_u32(
                "WORKER_MAX_TASKS_PER_CHILD",
                defaults.max_tasks_per_child,
            ),
            capture_retry: defaults.capture_retry,
            ingest_retry: defaults.ingest_retry,
        }
    }
}

/// Assemble a connection string from discrete DB_* parts when no single
/// DATABASE_URL is provided.
fn database_url_from_parts() -> Option<String> {
    let host = std::env::var("DB_HOST").ok()?;
    let port = std::env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
    let name = std::env::var("DB_NAME").unwrap_or_else(|_| "hubsync".to_string());
    let user = std::env::var("DB_USER").unwrap_or_else(|_| "hubsync".to_string());
    let password = std::env::var("DB_PASSWORD").unwrap_or_default();
    Some(format!("postgres://{user}:{password}@{host}:{port}/{name}"))
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}
