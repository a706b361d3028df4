//! Transit paths: ordered corridors of stations.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use hubsync_core::{EntityTag, ObjectId, StationId, SyncError, SyncResult};
use hubsync_registry::{
    AppliedWrite, EntityStore, FieldDescriptor, FieldValue, FilePayload, FileRendering, Payload,
    PkKind, TypeDescriptor,
};

use crate::convert;
use crate::station::workstation_tag;
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub id: i64,
    pub name: String,
    /// Station membership in corridor order.
    pub stations: Vec<StationId>,
}

impl Path {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            name: String::new(),
            stations: Vec::new(),
        }
    }
}

pub fn path_tag() -> EntityTag {
    "paths.Path".parse().expect("static tag")
}

pub struct PathStore {
    rows: Table<i64, Path>,
    descriptor: TypeDescriptor,
}

impl PathStore {
    pub fn new() -> Self {
        Self {
            rows: Table::new(),
            descriptor: TypeDescriptor::new(
                path_tag(),
                PkKind::Int,
                vec![
                    FieldDescriptor::unique_scalar("name"),
                    FieldDescriptor::many_to_many("stations", workstation_tag()),
                ],
            ),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert(&self, path: Path) {
        self.rows.insert(path.id, path);
    }

    pub fn get(&self, id: i64) -> Option<Path> {
        self.rows.get(&id)
    }
}

impl Default for PathStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for PathStore {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn exists(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.contains(&pk.as_int()?))
    }

    fn snapshot(&self, pk: &ObjectId, _rendering: FileRendering) -> SyncResult<Option<Payload>> {
        let Some(path) = self.rows.get(&pk.as_int()?) else {
            return Ok(None);
        };
        // Many-to-many membership is omitted from snapshots.
        let mut payload = Payload::new();
        payload.insert("id".into(), path.id.into());
        payload.insert("name".into(), path.name.clone().into());
        Ok(Some(payload))
    }

    fn lookup_by_unique(&self, field: &str, value: &FieldValue) -> SyncResult<Option<ObjectId>> {
        if field != "name" {
            return Ok(None);
        }
        let Some(wanted) = value.as_text() else {
            return Ok(None);
        };
        let matches = self.rows.keys_where(|p| p.name == wanted);
        match matches.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(ObjectId::from(*id))),
            _ => Err(SyncError::conflict(format!(
                "multiple paths share unique name '{wanted}'"
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
        let mut path = self.rows.get(&id).unwrap_or_else(|| Path::new(id));
        for (field, value) in scalars {
            match field.as_str() {
                "id" => {}
                "name" => path.name = convert::text(field, value)?,
                other => {
                    return Err(SyncError::validation(format!(
                        "paths.Path has no scalar field '{other}'"
                    )));
                }
            }
        }
        self.rows.insert(id, path);
        Ok(AppliedWrite { created })
    }

    fn write_file(&self, _pk: &ObjectId, field: &str, _file: &FilePayload) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "paths.Path has no file field '{field}'"
        )))
    }

    fn set_fk(&self, _pk: &ObjectId, field: &str, _target: Option<&ObjectId>) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "paths.Path has no foreign key '{field}'"
        )))
    }

    fn set_m2m(&self, pk: &ObjectId, field: &str, targets: &[ObjectId]) -> SyncResult<()> {
        if field != "stations" {
            return Err(SyncError::validation(format!(
                "paths.Path has no many-to-many field '{field}'"
            )));
        }
        let id = pk.as_int()?;
        let stations = targets
            .iter()
            .map(|t| t.as_int().map(StationId::new))
            .collect::<SyncResult<Vec<_>>>()?;
        if !self.rows.update(&id, |p| p.stations = stations) {
            return Err(SyncError::not_found());
        }
        Ok(())
    }

    fn delete_by_pk(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.remove(&pk.as_int()?).is_some())
    }
}
