//! Ingestion pipeline: pushed batches → local state + outbound fan-out.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use hubsync_core::{ChangeAction, EntityTag, EventId, ObjectId, StationId, SyncResult};
use hubsync_entities::StationDirectory;
use hubsync_jobs::{Job, JobHandler, JobResult};
use hubsync_ledger::{NewChangeEvent, SyncLedger};
use hubsync_registry::{EntityRegistry, EntityStore, FieldKind, FilePayload, Payload, value};

use crate::capture::{CapturePipeline, WriteOrigin};

/// One change item pushed by a workstation, as it arrives on the wire.
///
/// Kept loosely typed so the validation pre-pass can produce per-item
/// errors instead of rejecting the whole body at deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundChange {
    pub event_uuid: Uuid,
    pub model: String,
    pub action: String,
    pub object_id: JsonValue,
    pub data_payload: JsonValue,
}

/// A change that passed the validation pre-pass.
#[derive(Debug, Clone)]
pub struct ValidChange {
    pub event_uuid: Uuid,
    pub entity: EntityTag,
    pub action: ChangeAction,
    pub object_id: ObjectId,
    pub payload: Payload,
}

/// Validate every change independently.
///
/// Returns either the full validated batch or a map of item index →
/// error messages; one bad item fails the whole pre-pass, matching the
/// 400-with-per-change-errors contract of the push endpoint.
pub fn validate_changes(
    registry: &EntityRegistry,
    changes: &[InboundChange],
) -> Result<Vec<ValidChange>, BTreeMap<usize, Vec<String>>> {
    let mut valid = Vec::with_capacity(changes.len());
    let mut errors: BTreeMap<usize, Vec<String>> = BTreeMap::new();

    for (index, change) in changes.iter().enumerate() {
        let mut item_errors = Vec::new();

        let entity = match change.model.parse::<EntityTag>() {
            Ok(tag) => match registry.resolve(&tag) {
                Ok(_) => Some(tag),
                Err(_) => {
                    item_errors.push(format!(
                        "model '{}' not found or is not allowed to be synchronized",
                        change.model
                    ));
                    None
                }
            },
            Err(e) => {
                item_errors.push(format!("model: {e}"));
                None
            }
        };

        let action = match ChangeAction::from_code(&change.action) {
            Ok(action) => Some(action),
            Err(e) => {
                item_errors.push(e.to_string());
                None
            }
        };

        let object_id = match &change.object_id {
            JsonValue::String(s) if !s.is_empty() => Some(ObjectId::from(s.as_str())),
            JsonValue::Number(n) if n.as_i64().is_some() => {
                Some(ObjectId::from(n.as_i64().unwrap()))
            }
            _ => {
                item_errors.push("object_id must be a string or integer".to_string());
                None
            }
        };

        if let (Some(entity), Some(object_id)) = (&entity, &object_id) {
            if let Ok(entry) = registry.resolve(entity) {
                if let Err(e) = entry.descriptor().check_pk(object_id) {
                    item_errors.push(e.to_string());
                }
            }
        }

        let payload = match &change.data_payload {
            JsonValue::Object(map) => Some(map.clone()),
            _ => {
                item_errors.push("data_payload must be a JSON object".to_string());
                None
            }
        };

        if item_errors.is_empty() {
            valid.push(ValidChange {
                event_uuid: change.event_uuid,
                entity: entity.expect("validated"),
                action: action.expect("validated"),
                object_id: object_id.expect("validated"),
                payload: payload.expect("validated"),
            });
        } else {
            errors.insert(index, item_errors);
        }
    }

    if errors.is_empty() {
        Ok(valid)
    } else {
        Err(errors)
    }
}

/// Typed envelope of one ingestion task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    pub source_station_id: StationId,
    pub changes: Vec<InboundChange>,
}

/// Outcome of one applied change.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedChange {
    pub index: usize,
    pub entity: EntityTag,
    pub object_id: ObjectId,
    pub outcome: &'static str,
    pub event_id: Option<EventId>,
}

/// One change that failed to apply; the rest of the batch continues.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeFailure {
    pub index: usize,
    pub entity: EntityTag,
    pub object_id: ObjectId,
    pub error: String,
}

/// Batch application report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub applied: Vec<AppliedChange>,
    pub failed: Vec<ChangeFailure>,
}

/// Classified field buckets of one inbound payload.
#[derive(Debug, Default)]
struct FieldBuckets {
    scalars: Vec<(String, hubsync_registry::FieldValue)>,
    files: Vec<(String, FilePayload)>,
    fks: Vec<(String, EntityTag, ObjectId)>,
    m2ms: Vec<(String, EntityTag, Vec<ObjectId>)>,
}

/// A persisted instance awaiting relation fix-up.
#[derive(Debug)]
struct PendingRelations {
    entity: EntityTag,
    pk: ObjectId,
    fks: Vec<(String, EntityTag, ObjectId)>,
    m2ms: Vec<(String, EntityTag, Vec<ObjectId>)>,
}

/// Applies one pushed batch: two-pass apply plus outbound fan-out.
#[derive(Clone)]
pub struct IngestPipeline {
    registry: EntityRegistry,
    ledger: Arc<dyn SyncLedger>,
    stations: Arc<dyn StationDirectory>,
    capture: CapturePipeline,
}

impl IngestPipeline {
    pub fn new(
        registry: EntityRegistry,
        ledger: Arc<dyn SyncLedger>,
        stations: Arc<dyn StationDirectory>,
        capture: CapturePipeline,
    ) -> Self {
        Self {
            registry,
            ledger,
            stations,
            capture,
        }
    }

    /// Apply a validated batch pushed by `source`.
    ///
    /// Pass one persists scalar and file state (and appends one event with
    /// fan-out per applied change); pass two reattaches foreign keys and
    /// many-to-many membership once every base object of the batch exists.
    pub async fn apply_batch(
        &self,
        source: StationId,
        changes: Vec<ValidChange>,
    ) -> IngestReport {
        let mut report = IngestReport::default();
        let mut pending_relations: Vec<PendingRelations> = Vec::new();
        let destinations = self.stations.destinations_excluding(Some(source));

        // Replicated writes still pass through the capture hook; the
        // sync-operation marker keeps it inert.
        let mut capture_session = self.capture.session();

        for (index, change) in changes.into_iter().enumerate() {
            let entity = change.entity.clone();
            let object_id = change.object_id.clone();

            match self.apply_change(&change, &mut pending_relations, &mut capture_session) {
                Ok(outcome) => {
                    let event = NewChangeEvent::pushed(
                        change.entity,
                        change.object_id,
                        change.action,
                        JsonValue::Object(change.payload),
                        source,
                    );
                    match self.ledger.append_event(event, &destinations).await {
                        Ok(stored) => {
                            debug!(event_id = %stored.id, entity = %entity,
                                   object_id = %object_id, outcome,
                                   "applied pushed change");
                            report.applied.push(AppliedChange {
                                index,
                                entity,
                                object_id,
                                outcome,
                                event_id: Some(stored.id),
                            });
                        }
                        Err(e) => {
                            error!(entity = %entity, object_id = %object_id, error = %e,
                                   "change applied but event append failed");
                            report.failed.push(ChangeFailure {
                                index,
                                entity,
                                object_id,
                                error: format!("event append failed: {e}"),
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!(entity = %entity, object_id = %object_id, error = %e,
                          "failed to apply pushed change; batch continues");
                    report.failed.push(ChangeFailure {
                        index,
                        entity,
                        object_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.resolve_pending_relations(pending_relations);

        // Nothing was staged (marker), but close the session the way every
        // write path does.
        if let Err(e) = capture_session.commit() {
            error!(error = %e, "capture session commit failed during ingestion");
        }

        info!(
            source = %source,
            applied = report.applied.len(),
            failed = report.failed.len(),
            "ingested pushed batch"
        );
        report
    }

    /// First pass for one change.
    fn apply_change(
        &self,
        change: &ValidChange,
        pending_relations: &mut Vec<PendingRelations>,
        capture_session: &mut crate::capture::CaptureSession,
    ) -> SyncResult<&'static str> {
        let entry = self.registry.resolve(&change.entity)?;
        let store = entry.store();

        if change.action.is_delete() {
            store.delete_by_pk(&change.object_id)?;
            return Ok("deleted");
        }

        let buckets = self.classify(&change.entity, &change.payload)?;

        // Resolve the existing instance: primary key first, then any unique
        // scalar present in the payload.
        let mut resolved = change.object_id.clone();
        if !store.exists(&resolved)? {
            for field in entry.descriptor().unique_fields() {
                let Some((_, value)) = buckets
                    .scalars
                    .iter()
                    .find(|(name, _)| name == field.name)
                else {
                    continue;
                };
                if let Some(existing) = store.lookup_by_unique(field.name, value)? {
                    resolved = existing;
                    break;
                }
            }
        }

        let applied = store.apply_scalars(&resolved, &buckets.scalars)?;
        capture_session.record_saved(
            WriteOrigin::Replication,
            &change.entity,
            &resolved,
            if applied.created {
                ChangeAction::Created
            } else {
                ChangeAction::Updated
            },
        )?;

        for (field, file) in &buckets.files {
            store.write_file(&resolved, field, file)?;
        }

        if !buckets.fks.is_empty() || !buckets.m2ms.is_empty() {
            pending_relations.push(PendingRelations {
                entity: change.entity.clone(),
                pk: resolved,
                fks: buckets.fks,
                m2ms: buckets.m2ms,
            });
        }

        Ok(if applied.created { "created" } else { "updated" })
    }

    /// Classify payload keys through the type descriptor.
    fn classify(&self, entity: &EntityTag, payload: &Payload) -> SyncResult<FieldBuckets> {
        let entry = self.registry.resolve(entity)?;
        let descriptor = entry.descriptor();
        let mut buckets = FieldBuckets::default();

        for (key, raw) in payload {
            let Some(field) = descriptor.classify_key(key) else {
                // Unknown keys (including the pk echo) are ignored.
                continue;
            };

            match &field.kind {
                FieldKind::ForeignKey { target } => {
                    if raw.is_null() {
                        continue;
                    }
                    if let Some(target_pk) = value::decode_fk_target(field.name, raw)? {
                        buckets
                            .fks
                            .push((field.name.to_string(), target.clone(), target_pk));
                    }
                }
                FieldKind::ManyToMany { target } => {
                    if raw.is_null() {
                        continue;
                    }
                    let targets = value::decode_m2m_targets(field.name, raw)?;
                    buckets
                        .m2ms
                        .push((field.name.to_string(), target.clone(), targets));
                }
                FieldKind::File => {
                    buckets.files.push((
                        field.name.to_string(),
                        FilePayload::from_json(field.name, raw)?,
                    ));
                }
                kind => {
                    if raw.is_null() {
                        continue;
                    }
                    buckets.scalars.push((
                        field.name.to_string(),
                        value::decode_scalar(kind, field.name, raw)?,
                    ));
                }
            }
        }

        Ok(buckets)
    }

    /// Second pass: reattach relations now that base objects exist.
    ///
    /// Dangling targets are skipped silently; a later event carrying the
    /// target re-serializes the owner and a subsequent pull reattempts.
    fn resolve_pending_relations(&self, pending: Vec<PendingRelations>) {
        for item in pending {
            let Ok(entry) = self.registry.resolve(&item.entity) else {
                continue;
            };
            let store = entry.store();

            for (field, target_tag, target_pk) in &item.fks {
                let exists = self
                    .registry
                    .resolve(target_tag)
                    .and_then(|target| target.store().exists(target_pk));
                match exists {
                    Ok(true) => {
                        if let Err(e) = store.set_fk(&item.pk, field, Some(target_pk)) {
                            warn!(entity = %item.entity, object_id = %item.pk, field = %field,
                                  error = %e, "foreign key fix-up failed");
                        }
                    }
                    Ok(false) | Err(_) => {
                        debug!(entity = %item.entity, object_id = %item.pk, field = %field,
                               target = %target_pk, "foreign key target not yet present; skipped");
                    }
                }
            }

            for (field, target_tag, targets) in &item.m2ms {
                let Ok(target_entry) = self.registry.resolve(target_tag) else {
                    continue;
                };
                // Missing targets are dropped from the membership set.
                let existing: Vec<ObjectId> = targets
                    .iter()
                    .filter(|pk| {
                        target_entry.store().exists(pk).unwrap_or(false)
                    })
                    .cloned()
                    .collect();
                if let Err(e) = store.set_m2m(&item.pk, field, &existing) {
                    warn!(entity = %item.entity, object_id = %item.pk, field = %field,
                          error = %e, "many-to-many fix-up failed");
                }
            }
        }
    }
}

/// Background handler for pushed batches.
pub struct IngestJobHandler {
    pipeline: IngestPipeline,
    registry: EntityRegistry,
}

impl IngestJobHandler {
    pub fn new(pipeline: IngestPipeline, registry: EntityRegistry) -> Self {
        Self { pipeline, registry }
    }
}

#[async_trait]
impl JobHandler for IngestJobHandler {
    async fn run(&self, job: &Job) -> JobResult {
        // Schema-validate the envelope at dequeue.
        let envelope: IngestJob = match serde_json::from_value(job.payload.clone()) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "malformed ingest envelope");
                return JobResult::Failure(format!("malformed ingest envelope: {e}"));
            }
        };

        let changes = match validate_changes(&self.registry, &envelope.changes) {
            Ok(changes) => changes,
            Err(errors) => {
                // The push endpoint validated this batch already; failing
                // here means the envelope was corrupted in the queue.
                error!(job_id = %job.id, ?errors, "ingest envelope failed re-validation");
                return JobResult::Failure(format!(
                    "ingest envelope failed re-validation: {errors:?}"
                ));
            }
        };

        let report = self
            .pipeline
            .apply_batch(envelope.source_station_id, changes)
            .await;

        for failure in &report.failed {
            error!(
                index = failure.index,
                entity = %failure.entity,
                object_id = %failure.object_id,
                error = %failure.error,
                "pushed change failed to apply"
            );
        }

        JobResult::Success
    }
}
