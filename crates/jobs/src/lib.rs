//! Background job queue with retry, backoff, and dead-letter handling.
//!
//! The capture and ingestion pipelines run as jobs on this queue. Jobs are
//! typed by kind, retried with bounded exponential backoff, and moved to a
//! dead-letter queue once retries are exhausted; nothing fails silently.

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobId, JobKind, JobResult, JobStatus, RetryPolicy,
};
