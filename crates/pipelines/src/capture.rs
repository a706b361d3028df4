//! Capture pipeline: local mutations → ledger events, post-commit.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info};

use hubsync_core::{ChangeAction, EntityTag, ObjectId, SyncError, SyncResult};
use hubsync_entities::StationDirectory;
use hubsync_jobs::{Job, JobHandler, JobKind, JobResult, JobStore, RetryPolicy};
use hubsync_ledger::{NewChangeEvent, SyncLedger};
use hubsync_registry::{EntityRegistry, EntityStore, FileRendering, Payload};

/// Origin of a domain write.
///
/// `Replication` is the in-flight sync-operation marker: it travels with
/// the write call that the ingestion pipeline makes and suppresses capture,
/// so a replicated change is never re-captured into a second event. The
/// marker only exists for the duration of the call; it is never persisted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteOrigin {
    /// A request-path mutation on this hub.
    Local,
    /// A write performed while applying a pushed change.
    Replication,
}

impl WriteOrigin {
    pub fn is_replication(&self) -> bool {
        matches!(self, WriteOrigin::Replication)
    }
}

/// Typed envelope of one capture task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureJob {
    pub entity: EntityTag,
    pub object_id: ObjectId,
    pub action: ChangeAction,
    pub payload: JsonValue,
}

/// One staged capture record, not yet committed.
#[derive(Debug, Clone)]
struct StagedCapture {
    entity: EntityTag,
    object_id: ObjectId,
    action: ChangeAction,
    payload: Payload,
}

/// The capture hook domain write paths go through.
///
/// Registered as a write-through adapter: every repository commit opens a
/// session, records the mutations it persisted, and commits the session
/// together with its own transaction. Only [`CaptureSession::commit`]
/// enqueues work; a session dropped on rollback emits nothing.
#[derive(Clone)]
pub struct CapturePipeline {
    registry: EntityRegistry,
    jobs: Arc<dyn JobStore>,
    retry: RetryPolicy,
}

impl CapturePipeline {
    pub fn new(registry: EntityRegistry, jobs: Arc<dyn JobStore>, retry: RetryPolicy) -> Self {
        Self {
            registry,
            jobs,
            retry,
        }
    }

    /// Open a capture session for one domain transaction.
    pub fn session(&self) -> CaptureSession {
        CaptureSession {
            pipeline: self.clone(),
            staged: Vec::new(),
        }
    }
}

/// Per-transaction capture state.
///
/// Snapshots are taken synchronously at record time, while the mutated
/// instance is still in hand; job submission is deferred to `commit`.
pub struct CaptureSession {
    pipeline: CapturePipeline,
    staged: Vec<StagedCapture>,
}

impl CaptureSession {
    /// Record a persisted create/update.
    ///
    /// Inert for replicated writes (the sync-operation marker) and for
    /// entity types outside the registry allow-list.
    pub fn record_saved(
        &mut self,
        origin: WriteOrigin,
        entity: &EntityTag,
        object_id: &ObjectId,
        action: ChangeAction,
    ) -> SyncResult<()> {
        if origin.is_replication() {
            return Ok(());
        }
        if action.is_delete() {
            return Err(SyncError::validation(
                "deletes are recorded with their pre-image via record_deleted",
            ));
        }
        let Some(entry) = self.pipeline.registry.get(entity) else {
            return Ok(());
        };

        let payload = entry
            .store()
            .snapshot(object_id, FileRendering::Inline)?
            .ok_or_else(|| {
                SyncError::validation(format!(
                    "cannot capture {entity} {object_id}: instance not found after save"
                ))
            })?;

        self.staged.push(StagedCapture {
            entity: entity.clone(),
            object_id: object_id.clone(),
            action,
            payload,
        });
        Ok(())
    }

    /// Record a delete with the pre-image snapshot taken before the row was
    /// dropped.
    pub fn record_deleted(
        &mut self,
        origin: WriteOrigin,
        entity: &EntityTag,
        object_id: &ObjectId,
        pre_image: Payload,
    ) -> SyncResult<()> {
        if origin.is_replication() {
            return Ok(());
        }
        if !self.pipeline.registry.contains(entity) {
            return Ok(());
        }
        self.staged.push(StagedCapture {
            entity: entity.clone(),
            object_id: object_id.clone(),
            action: ChangeAction::Deleted,
            payload: pre_image,
        });
        Ok(())
    }

    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// The surrounding transaction committed: submit one capture job per
    /// staged record. Dropping the session instead emits nothing.
    pub fn commit(self) -> SyncResult<Vec<hubsync_jobs::JobId>> {
        let mut job_ids = Vec::with_capacity(self.staged.len());
        for staged in self.staged {
            let envelope = CaptureJob {
                entity: staged.entity,
                object_id: staged.object_id,
                action: staged.action,
                payload: JsonValue::Object(staged.payload),
            };
            let payload = serde_json::to_value(&envelope)
                .map_err(|e| SyncError::validation(format!("capture envelope: {e}")))?;
            let job = Job::new(JobKind::Capture, payload)
                .with_retry_policy(self.pipeline.retry.clone());
            let id = self
                .pipeline
                .jobs
                .enqueue(job)
                .map_err(|e| SyncError::validation(format!("capture enqueue: {e}")))?;
            debug!(job_id = %id, entity = %envelope.entity, object_id = %envelope.object_id,
                   action = %envelope.action, "capture job queued");
            job_ids.push(id);
        }
        Ok(job_ids)
    }
}

/// Background handler: creates the event row and its fan-out in a single
/// ledger transaction.
pub struct CaptureJobHandler {
    ledger: Arc<dyn SyncLedger>,
    stations: Arc<dyn StationDirectory>,
}

impl CaptureJobHandler {
    pub fn new(ledger: Arc<dyn SyncLedger>, stations: Arc<dyn StationDirectory>) -> Self {
        Self { ledger, stations }
    }
}

#[async_trait]
impl JobHandler for CaptureJobHandler {
    async fn run(&self, job: &Job) -> JobResult {
        // Schema-validate the envelope at dequeue.
        let envelope: CaptureJob = match serde_json::from_value(job.payload.clone()) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "malformed capture envelope");
                return JobResult::Failure(format!("malformed capture envelope: {e}"));
            }
        };

        // Locally-originated events fan out to every station.
        let destinations = self.stations.destinations_excluding(None);
        let event = NewChangeEvent::local(
            envelope.entity.clone(),
            envelope.object_id.clone(),
            envelope.action,
            envelope.payload,
        );

        match self.ledger.append_event(event, &destinations).await {
            Ok(stored) => {
                info!(event_id = %stored.id, entity = %stored.entity,
                      object_id = %stored.object_id, fan_out = destinations.len(),
                      "captured local change");
                JobResult::Success
            }
            Err(e) => JobResult::Failure(format!("ledger append failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hubsync_entities::{Driver, SyncDomain, WorkStation};
    use hubsync_jobs::{InMemoryJobStore, JobExecutor, JobExecutorConfig};
    use hubsync_ledger::InMemorySyncLedger;

    fn driver_tag() -> EntityTag {
        "drivers.Driver".parse().unwrap()
    }

    fn setup() -> (SyncDomain, CapturePipeline, Arc<InMemoryJobStore>) {
        let domain = SyncDomain::new("http://central.example/media");
        let registry = domain.full_registry().unwrap();
        let jobs = InMemoryJobStore::arc();
        let pipeline = CapturePipeline::new(registry, jobs.clone(), RetryPolicy::default());
        (domain, pipeline, jobs)
    }

    fn seed_driver(domain: &SyncDomain, id: i64) {
        let mut driver = Driver::new(id);
        driver.first_name = "X".into();
        driver.licence_number = format!("DL-{id}");
        domain.drivers.insert(driver);
    }

    #[test]
    fn commit_enqueues_one_job_per_record() {
        let (domain, pipeline, jobs) = setup();
        seed_driver(&domain, 1);
        seed_driver(&domain, 2);

        let mut session = pipeline.session();
        session
            .record_saved(
                WriteOrigin::Local,
                &driver_tag(),
                &ObjectId::from(1i64),
                ChangeAction::Created,
            )
            .unwrap();
        session
            .record_saved(
                WriteOrigin::Local,
                &driver_tag(),
                &ObjectId::from(2i64),
                ChangeAction::Created,
            )
            .unwrap();

        let ids = session.commit().unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(jobs.stats().unwrap().pending, 2);
    }

    #[test]
    fn dropped_session_emits_nothing() {
        let (domain, pipeline, jobs) = setup();
        seed_driver(&domain, 1);

        {
            let mut session = pipeline.session();
            session
                .record_saved(
                    WriteOrigin::Local,
                    &driver_tag(),
                    &ObjectId::from(1i64),
                    ChangeAction::Created,
                )
                .unwrap();
            // Transaction rolls back: session dropped without commit.
        }

        assert_eq!(jobs.stats().unwrap().pending, 0);
    }

    #[test]
    fn replicated_writes_are_suppressed() {
        let (domain, pipeline, jobs) = setup();
        seed_driver(&domain, 1);

        let mut session = pipeline.session();
        session
            .record_saved(
                WriteOrigin::Replication,
                &driver_tag(),
                &ObjectId::from(1i64),
                ChangeAction::Created,
            )
            .unwrap();
        assert_eq!(session.staged_count(), 0);

        session.commit().unwrap();
        assert_eq!(jobs.stats().unwrap().pending, 0);
    }

    #[test]
    fn unregistered_types_are_inert() {
        let (domain, _, jobs) = setup();
        seed_driver(&domain, 1);

        // Registry restricted to trucks only: driver writes are not captured.
        let registry = domain
            .registry(&["trucks.Truck".to_string()])
            .unwrap();
        let pipeline = CapturePipeline::new(registry, jobs.clone(), RetryPolicy::default());

        let mut session = pipeline.session();
        session
            .record_saved(
                WriteOrigin::Local,
                &driver_tag(),
                &ObjectId::from(1i64),
                ChangeAction::Created,
            )
            .unwrap();
        assert_eq!(session.staged_count(), 0);
    }

    #[tokio::test]
    async fn capture_job_fans_out_to_all_stations() {
        let (domain, pipeline, jobs) = setup();
        domain.stations.insert(WorkStation::new(1, "A"));
        domain.stations.insert(WorkStation::new(2, "B"));
        domain.stations.insert(WorkStation::new(3, "C"));
        seed_driver(&domain, 7);

        let mut session = pipeline.session();
        session
            .record_saved(
                WriteOrigin::Local,
                &driver_tag(),
                &ObjectId::from(7i64),
                ChangeAction::Created,
            )
            .unwrap();
        session.commit().unwrap();

        let ledger = Arc::new(InMemorySyncLedger::new());
        let mut executor = JobExecutor::new(jobs.clone());
        executor.register_handler(
            "sync.capture",
            Arc::new(CaptureJobHandler::new(ledger.clone(), domain.stations.clone())),
        );

        let mut job = jobs.claim_next().unwrap().unwrap();
        executor
            .execute_one(&mut job, &JobExecutorConfig::default())
            .await;

        let events = ledger.all_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source_station, None);

        let acks = ledger.acknowledgements_for(events[0].id).await.unwrap();
        let destinations: Vec<i64> = acks
            .iter()
            .map(|a| a.destination_station.as_i64())
            .collect();
        assert_eq!(destinations, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn capture_with_zero_stations_is_immediately_distributed() {
        let (domain, pipeline, jobs) = setup();
        seed_driver(&domain, 7);

        let mut session = pipeline.session();
        session
            .record_saved(
                WriteOrigin::Local,
                &driver_tag(),
                &ObjectId::from(7i64),
                ChangeAction::Created,
            )
            .unwrap();
        session.commit().unwrap();

        let ledger = Arc::new(InMemorySyncLedger::new());
        let mut executor = JobExecutor::new(jobs.clone());
        executor.register_handler(
            "sync.capture",
            Arc::new(CaptureJobHandler::new(ledger.clone(), domain.stations.clone())),
        );

        let mut job = jobs.claim_next().unwrap().unwrap();
        executor
            .execute_one(&mut job, &JobExecutorConfig::default())
            .await;

        let events = ledger.all_events();
        assert_eq!(events.len(), 1);
        assert!(
            ledger
                .acknowledgements_for(events[0].id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn delete_capture_carries_the_pre_image() {
        let (domain, pipeline, _jobs) = setup();
        seed_driver(&domain, 1);

        let tag = driver_tag();
        let pk = ObjectId::from(1i64);
        let pre_image = domain
            .drivers
            .snapshot(&pk, FileRendering::Inline)
            .unwrap()
            .unwrap();
        domain.drivers.delete_by_pk(&pk).unwrap();

        let mut session = pipeline.session();
        session
            .record_deleted(WriteOrigin::Local, &tag, &pk, pre_image)
            .unwrap();
        assert_eq!(session.staged_count(), 1);

        let ids = session.commit().unwrap();
        assert_eq!(ids.len(), 1);
    }
}
