//! Async job executor with retry and deadline enforcement.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::store::JobStore;
use crate::types::{Job, JobResult, JobStatus};

/// Handler for one job kind.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &Job) -> JobResult;
}

/// Job executor configuration.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How often to poll for new jobs
    pub poll_interval: Duration,
    /// Soft execution deadline: the handler is interrupted and the attempt
    /// counted as failed (retried with backoff)
    pub soft_time_limit: Duration,
    /// Hard execution deadline backstop
    pub hard_time_limit: Duration,
    /// Recycle the worker loop after this many processed jobs
    pub max_tasks_per_run: u32,
    /// Name for logging
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            soft_time_limit: Duration::from_secs(300),
            hard_time_limit: Duration::from_secs(360),
            max_tasks_per_run: 50,
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Handle to control a running executor.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<tokio::task::JoinHandle<()>>,
}

impl JobExecutorHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(()).await;
        if let Some(j) = self.join.take() {
            let _ = j.await;
        }
    }
}

/// Background job executor.
///
/// Polls a job store for pending jobs, executes them with registered
/// handlers, and drives retries and dead-lettering through the job's own
/// retry policy. One job is in flight at a time per executor (prefetch 1);
/// run several executors for parallelism.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a job kind.
    pub fn register_handler(&mut self, kind_name: &'static str, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(kind_name, handler);
    }

    /// Spawn the executor on the current runtime.
    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let name = config.name.clone();

        let join = tokio::spawn(async move {
            info!(worker = %name, "job executor started");
            executor_loop(self, config, shutdown_rx).await;
            info!(worker = %name, "job executor stopped");
        });

        JobExecutorHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }

    /// Execute one claimed job to completion of this attempt (also used
    /// directly by tests to drive the queue synchronously).
    pub async fn execute_one(&self, job: &mut Job, config: &JobExecutorConfig) {
        let Some(handler) = self.handlers.get(job.kind.type_name()) else {
            let reason = format!("no handler for job kind '{}'", job.kind.type_name());
            error!(job_id = %job.id, "{reason}");
            job.mark_failed(reason.clone(), Utc::now());
            self.finish_attempt(job, reason);
            return;
        };

        let started = Utc::now();
        debug!(job_id = %job.id, kind = job.kind.type_name(), attempt = job.attempt, "executing job");

        let outcome = tokio::time::timeout(config.hard_time_limit, async {
            match tokio::time::timeout(config.soft_time_limit, handler.run(job)).await {
                Ok(result) => result,
                Err(_) => JobResult::Failure(format!(
                    "soft time limit ({}s) exceeded",
                    config.soft_time_limit.as_secs()
                )),
            }
        })
        .await
        .unwrap_or_else(|_| {
            JobResult::Failure(format!(
                "hard time limit ({}s) exceeded",
                config.hard_time_limit.as_secs()
            ))
        });

        match outcome {
            JobResult::Success => {
                job.mark_completed(started);
                if let Err(e) = self.store.update(job) {
                    error!(job_id = %job.id, error = %e, "failed to persist completed job");
                }
            }
            JobResult::Failure(reason) => {
                warn!(job_id = %job.id, attempt = job.attempt, error = %reason, "job attempt failed");
                job.mark_failed(reason.clone(), started);
                self.finish_attempt(job, reason);
            }
        }
    }

    fn finish_attempt(&self, job: &mut Job, reason: String) {
        if let Err(e) = self.store.update(job) {
            error!(job_id = %job.id, error = %e, "failed to persist failed job");
            return;
        }
        if matches!(job.status, JobStatus::DeadLettered { .. }) {
            error!(job_id = %job.id, attempts = job.attempt, error = %reason, "job dead-lettered");
            if let Err(e) = self.store.dead_letter(job.clone(), reason) {
                error!(job_id = %job.id, error = %e, "failed to dead-letter job");
            }
        }
    }
}

async fn executor_loop<S: JobStore + 'static>(
    executor: JobExecutor<S>,
    config: JobExecutorConfig,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut processed_this_run: u32 = 0;

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let claimed = match executor.store.claim_next() {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(worker = %config.name, error = %e, "claim failed");
                None
            }
        };

        match claimed {
            Some(mut job) => {
                executor.execute_one(&mut job, &config).await;
                processed_this_run += 1;
                if processed_this_run >= config.max_tasks_per_run {
                    // Recycle the loop state, mirroring worker-process
                    // recycling in multi-process deployments.
                    info!(worker = %config.name, tasks = processed_this_run, "recycling worker loop");
                    processed_this_run = 0;
                }
            }
            None => {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(config.poll_interval) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryJobStore;
    use crate::types::{JobKind, RetryPolicy};

    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        calls: Arc<AtomicU32>,
        fail_first: u32,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn run(&self, _job: &Job) -> JobResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                JobResult::Failure(format!("transient failure {call}"))
            } else {
                JobResult::Success
            }
        }
    }

    fn quick_config() -> JobExecutorConfig {
        JobExecutorConfig {
            poll_interval: Duration::from_millis(5),
            soft_time_limit: Duration::from_millis(200),
            hard_time_limit: Duration::from_millis(400),
            ..Default::default()
        }
    }

    fn immediate_retry_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn successful_job_completes() {
        let store = InMemoryJobStore::arc();
        let calls = Arc::new(AtomicU32::new(0));

        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler(
            "sync.capture",
            Arc::new(CountingHandler {
                calls: calls.clone(),
                fail_first: 0,
            }),
        );

        store
            .enqueue(Job::new(JobKind::Capture, serde_json::json!({})))
            .unwrap();

        let mut job = store.claim_next().unwrap().unwrap();
        executor.execute_one(&mut job, &quick_config()).await;

        assert!(matches!(job.status, JobStatus::Completed));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_retries_then_succeeds() {
        let store = InMemoryJobStore::arc();
        let calls = Arc::new(AtomicU32::new(0));

        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler(
            "sync.ingest",
            Arc::new(CountingHandler {
                calls: calls.clone(),
                fail_first: 2,
            }),
        );

        store
            .enqueue(
                Job::new(JobKind::Ingest, serde_json::json!({}))
                    .with_retry_policy(immediate_retry_policy(3)),
            )
            .unwrap();

        let config = quick_config();
        loop {
            let Some(mut job) = store.claim_next().unwrap() else {
                break;
            };
            executor.execute_one(&mut job, &config).await;
            if job.status.is_terminal() {
                assert!(matches!(job.status, JobStatus::Completed));
                break;
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_dead_letter() {
        let store = InMemoryJobStore::arc();
        let calls = Arc::new(AtomicU32::new(0));

        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler(
            "sync.ingest",
            Arc::new(CountingHandler {
                calls: calls.clone(),
                fail_first: u32::MAX,
            }),
        );

        store
            .enqueue(
                Job::new(JobKind::Ingest, serde_json::json!({}))
                    .with_retry_policy(immediate_retry_policy(3)),
            )
            .unwrap();

        let config = quick_config();
        while let Some(mut job) = store.claim_next().unwrap() {
            executor.execute_one(&mut job, &config).await;
        }

        // 1 initial attempt + 2 retries before attempt 3 exhausts the policy.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.list_dead_letters(10).unwrap().len(), 1);
    }

    struct SlowHandler;

    #[async_trait]
    impl JobHandler for SlowHandler {
        async fn run(&self, _job: &Job) -> JobResult {
            tokio::time::sleep(Duration::from_secs(60)).await;
            JobResult::Success
        }
    }

    #[tokio::test]
    async fn soft_deadline_interrupts_and_fails_the_attempt() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler("sync.ingest", Arc::new(SlowHandler));

        store
            .enqueue(Job::new(JobKind::Ingest, serde_json::json!({})))
            .unwrap();

        let mut job = store.claim_next().unwrap().unwrap();
        executor.execute_one(&mut job, &quick_config()).await;

        assert!(matches!(job.status, JobStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn spawned_executor_drains_the_queue() {
        let store = InMemoryJobStore::arc();
        let calls = Arc::new(AtomicU32::new(0));

        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler(
            "sync.capture",
            Arc::new(CountingHandler {
                calls: calls.clone(),
                fail_first: 0,
            }),
        );

        for _ in 0..3 {
            store
                .enqueue(Job::new(JobKind::Capture, serde_json::json!({})))
                .unwrap();
        }

        let handle = executor.spawn(quick_config());
        for _ in 0..100 {
            if calls.load(Ordering::SeqCst) == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.shutdown().await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
