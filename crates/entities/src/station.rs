//! Peer stations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hubsync_core::{EntityTag, ObjectId, StationId, SyncError, SyncResult};
use hubsync_registry::{
    AppliedWrite, EntityStore, FieldDescriptor, FieldValue, FilePayload, FileRendering, Payload,
    PkKind, TypeDescriptor,
};

use crate::convert;
use crate::table::Table;

/// A remote peer node. Provisioned out-of-band; the sync core only reads
/// the directory and stamps `last_seen`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkStation {
    pub id: StationId,
    pub name: String,
    pub last_seen: Option<DateTime<Utc>>,
}

impl WorkStation {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: StationId::new(id),
            name: name.into(),
            last_seen: None,
        }
    }
}

/// Read surface the fan-out and delivery paths need.
pub trait StationDirectory: Send + Sync {
    /// All known stations, id-ordered.
    fn all(&self) -> Vec<WorkStation>;

    fn get(&self, id: StationId) -> Option<WorkStation>;

    /// Stamp a station's `last_seen` to now; no-op for unknown ids.
    fn touch_last_seen(&self, id: StationId);

    /// Every station id except `source` (when given): the fan-out
    /// destination set for one event.
    fn destinations_excluding(&self, source: Option<StationId>) -> Vec<StationId> {
        self.all()
            .into_iter()
            .map(|ws| ws.id)
            .filter(|id| Some(*id) != source)
            .collect()
    }
}

/// Station table; doubles as the registered entity store for
/// `workstations.WorkStation`, since stations themselves replicate.
pub struct WorkStationStore {
    rows: Table<i64, WorkStation>,
    descriptor: TypeDescriptor,
}

pub fn workstation_tag() -> EntityTag {
    "workstations.WorkStation".parse().expect("static tag")
}

impl WorkStationStore {
    pub fn new() -> Self {
        Self {
            rows: Table::new(),
            descriptor: TypeDescriptor::new(
                workstation_tag(),
                PkKind::Int,
                vec![
                    FieldDescriptor::unique_scalar("name"),
                    FieldDescriptor::datetime("last_seen"),
                ],
            ),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert(&self, station: WorkStation) {
        self.rows.insert(station.id.as_i64(), station);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Default for WorkStationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StationDirectory for WorkStationStore {
    fn all(&self) -> Vec<WorkStation> {
        self.rows.values()
    }

    fn get(&self, id: StationId) -> Option<WorkStation> {
        self.rows.get(&id.as_i64())
    }

    fn touch_last_seen(&self, id: StationId) {
        self.rows.update(&id.as_i64(), |ws| {
            ws.last_seen = Some(Utc::now());
        });
    }
}

impl EntityStore for WorkStationStore {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn exists(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.contains(&pk.as_int()?))
    }

    fn snapshot(&self, pk: &ObjectId, _rendering: FileRendering) -> SyncResult<Option<Payload>> {
        let Some(ws) = self.rows.get(&pk.as_int()?) else {
            return Ok(None);
        };
        let mut payload = Payload::new();
        payload.insert("id".into(), ws.id.as_i64().into());
        payload.insert("name".into(), ws.name.clone().into());
        payload.insert(
            "last_seen".into(),
            ws.last_seen
                .map(|t| t.to_rfc3339().into())
                .unwrap_or(serde_json::Value::Null),
        );
        Ok(Some(payload))
    }

    fn lookup_by_unique(&self, field: &str, value: &FieldValue) -> SyncResult<Option<ObjectId>> {
        if field != "name" {
            return Ok(None);
        }
        let Some(wanted) = value.as_text() else {
            return Ok(None);
        };
        let matches = self.rows.keys_where(|ws| ws.name == wanted);
        match matches.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(ObjectId::from(*id))),
            _ => Err(SyncError::conflict(format!(
                "multiple stations share unique name '{wanted}'"
            ))),
        }
    }

    fn apply_scalars(
        &self,
        pk: &ObjectId,
        scalars: &[(String, FieldValue)],
    ) -> SyncResult<AppliedWrite> {
        let id = pk.as_int()?;
        let created = !self.rows.contains(&id);
        let mut ws = self
            .rows
            .get(&id)
            .unwrap_or_else(|| WorkStation::new(id, ""));
        for (field, value) in scalars {
            match field.as_str() {
                "id" => {}
                "name" => ws.name = convert::text(field, value)?,
                "last_seen" => ws.last_seen = convert::opt_datetime_utc(field, value)?,
                other => {
                    return Err(SyncError::validation(format!(
                        "workstations.WorkStation has no scalar field '{other}'"
                    )));
                }
            }
        }
        self.rows.insert(id, ws);
        Ok(AppliedWrite { created })
    }

    fn write_file(&self, _pk: &ObjectId, field: &str, _file: &FilePayload) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "workstations.WorkStation has no file field '{field}'"
        )))
    }

    fn set_fk(&self, _pk: &ObjectId, field: &str, _target: Option<&ObjectId>) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "workstations.WorkStation has no foreign key '{field}'"
        )))
    }

    fn set_m2m(&self, _pk: &ObjectId, field: &str, _targets: &[ObjectId]) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "workstations.WorkStation has no many-to-many field '{field}'"
        )))
    }

    fn delete_by_pk(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.remove(&pk.as_int()?).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destinations_exclude_the_source() {
        let store = WorkStationStore::new();
        store.insert(WorkStation::new(1, "A"));
        store.insert(WorkStation::new(2, "B"));
        store.insert(WorkStation::new(3, "C"));

        let all = store.destinations_excluding(None);
        assert_eq!(all, vec![StationId::new(1), StationId::new(2), StationId::new(3)]);

        let without_b = store.destinations_excluding(Some(StationId::new(2)));
        assert_eq!(without_b, vec![StationId::new(1), StationId::new(3)]);
    }

    #[test]
    fn touch_last_seen_stamps_known_stations_only() {
        let store = WorkStationStore::new();
        store.insert(WorkStation::new(1, "A"));

        store.touch_last_seen(StationId::new(1));
        assert!(store.get(StationId::new(1)).unwrap().last_seen.is_some());

        // Unknown id must not panic or create a row.
        store.touch_last_seen(StationId::new(99));
        assert!(store.get(StationId::new(99)).is_none());
    }

    #[test]
    fn unique_name_lookup_finds_single_match() {
        let store = WorkStationStore::new();
        store.insert(WorkStation::new(1, "A"));

        let hit = store
            .lookup_by_unique("name", &FieldValue::Text("A".into()))
            .unwrap();
        assert_eq!(hit, Some(ObjectId::from(1i64)));

        let miss = store
            .lookup_by_unique("name", &FieldValue::Text("Z".into()))
            .unwrap();
        assert_eq!(miss, None);
    }
}
