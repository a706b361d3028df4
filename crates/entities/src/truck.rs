//! Trucks and their owners.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use hubsync_core::{EntityTag, ObjectId, SyncError, SyncResult};
use hubsync_registry::{
    AppliedWrite, EntityStore, FieldDescriptor, FieldValue, FilePayload, FileRendering, Payload,
    PkKind, TypeDescriptor,
};

use crate::convert;
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruckOwner {
    pub id: i64,
    pub name: String,
    pub phone: String,
}

impl TruckOwner {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            name: String::new(),
            phone: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truck {
    pub id: i64,
    pub plate_number: String,
    pub owner: Option<i64>,
}

impl Truck {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            plate_number: String::new(),
            owner: None,
        }
    }
}

pub fn truck_owner_tag() -> EntityTag {
    "trucks.TruckOwner".parse().expect("static tag")
}

pub fn truck_tag() -> EntityTag {
    "trucks.Truck".parse().expect("static tag")
}

pub struct TruckOwnerStore {
    rows: Table<i64, TruckOwner>,
    descriptor: TypeDescriptor,
}

impl TruckOwnerStore {
    pub fn new() -> Self {
        Self {
            rows: Table::new(),
            descriptor: TypeDescriptor::new(
                truck_owner_tag(),
                PkKind::Int,
                vec![
                    FieldDescriptor::scalar("name"),
                    FieldDescriptor::unique_scalar("phone"),
                ],
            ),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert(&self, owner: TruckOwner) {
        self.rows.insert(owner.id, owner);
    }

    pub fn get(&self, id: i64) -> Option<TruckOwner> {
        self.rows.get(&id)
    }
}

impl Default for TruckOwnerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for TruckOwnerStore {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn exists(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.contains(&pk.as_int()?))
    }

    fn snapshot(&self, pk: &ObjectId, _rendering: FileRendering) -> SyncResult<Option<Payload>> {
        let Some(owner) = self.rows.get(&pk.as_int()?) else {
            return Ok(None);
        };
        let mut payload = Payload::new();
        payload.insert("id".into(), owner.id.into());
        payload.insert("name".into(), owner.name.clone().into());
        payload.insert("phone".into(), owner.phone.clone().into());
        Ok(Some(payload))
    }

    fn lookup_by_unique(&self, field: &str, value: &FieldValue) -> SyncResult<Option<ObjectId>> {
        if field != "phone" {
            return Ok(None);
        }
        let Some(wanted) = value.as_text() else {
            return Ok(None);
        };
        let matches = self.rows.keys_where(|o| o.phone == wanted);
        match matches.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(ObjectId::from(*id))),
            _ => Err(SyncError::conflict(format!(
                "multiple truck owners share unique phone '{wanted}'"
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
        let mut owner = self.rows.get(&id).unwrap_or_else(|| TruckOwner::new(id));
        for (field, value) in scalars {
            match field.as_str() {
                "id" => {}
                "name" => owner.name = convert::text(field, value)?,
                "phone" => owner.phone = convert::text(field, value)?,
                other => {
                    return Err(SyncError::validation(format!(
                        "trucks.TruckOwner has no scalar field '{other}'"
                    )));
                }
            }
        }
        self.rows.insert(id, owner);
        Ok(AppliedWrite { created })
    }

    fn write_file(&self, _pk: &ObjectId, field: &str, _file: &FilePayload) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "trucks.TruckOwner has no file field '{field}'"
        )))
    }

    fn set_fk(&self, _pk: &ObjectId, field: &str, _target: Option<&ObjectId>) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "trucks.TruckOwner has no foreign key '{field}'"
        )))
    }

    fn set_m2m(&self, _pk: &ObjectId, field: &str, _targets: &[ObjectId]) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "trucks.TruckOwner has no many-to-many field '{field}'"
        )))
    }

    fn delete_by_pk(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.remove(&pk.as_int()?).is_some())
    }
}

pub struct TruckStore {
    rows: Table<i64, Truck>,
    descriptor: TypeDescriptor,
}

impl TruckStore {
    pub fn new() -> Self {
        Self {
            rows: Table::new(),
            descriptor: TypeDescriptor::new(
                truck_tag(),
                PkKind::Int,
                vec![
                    FieldDescriptor::unique_scalar("plate_number"),
                    FieldDescriptor::foreign_key("owner", truck_owner_tag()),
                ],
            ),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert(&self, truck: Truck) {
        self.rows.insert(truck.id, truck);
    }

    pub fn get(&self, id: i64) -> Option<Truck> {
        self.rows.get(&id)
    }
}

impl Default for TruckStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for TruckStore {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn exists(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.contains(&pk.as_int()?))
    }

    fn snapshot(&self, pk: &ObjectId, _rendering: FileRendering) -> SyncResult<Option<Payload>> {
        let Some(truck) = self.rows.get(&pk.as_int()?) else {
            return Ok(None);
        };
        let mut payload = Payload::new();
        payload.insert("id".into(), truck.id.into());
        payload.insert("plate_number".into(), truck.plate_number.clone().into());
        // Foreign references emit the foreign pk under `<name>_id`.
        payload.insert(
            "owner_id".into(),
            truck
                .owner
                .map(|o| o.to_string().into())
                .unwrap_or(serde_json::Value::Null),
        );
        Ok(Some(payload))
    }

    fn lookup_by_unique(&self, field: &str, value: &FieldValue) -> SyncResult<Option<ObjectId>> {
        if field != "plate_number" {
            return Ok(None);
        }
        let Some(wanted) = value.as_text() else {
            return Ok(None);
        };
        let matches = self.rows.keys_where(|t| t.plate_number == wanted);
        match matches.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(ObjectId::from(*id))),
            _ => Err(SyncError::conflict(format!(
                "multiple trucks share unique plate_number '{wanted}'"
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
        let mut truck = self.rows.get(&id).unwrap_or_else(|| Truck::new(id));
        for (field, value) in scalars {
            match field.as_str() {
                "id" => {}
                "plate_number" => truck.plate_number = convert::text(field, value)?,
                other => {
                    return Err(SyncError::validation(format!(
                        "trucks.Truck has no scalar field '{other}'"
                    )));
                }
            }
        }
        self.rows.insert(id, truck);
        Ok(AppliedWrite { created })
    }

    fn write_file(&self, _pk: &ObjectId, field: &str, _file: &FilePayload) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "trucks.Truck has no file field '{field}'"
        )))
    }

    fn set_fk(&self, pk: &ObjectId, field: &str, target: Option<&ObjectId>) -> SyncResult<()> {
        if field != "owner" {
            return Err(SyncError::validation(format!(
                "trucks.Truck has no foreign key '{field}'"
            )));
        }
        let id = pk.as_int()?;
        let owner = target.map(|t| t.as_int()).transpose()?;
        if !self.rows.update(&id, |t| t.owner = owner) {
            return Err(SyncError::not_found());
        }
        Ok(())
    }

    fn set_m2m(&self, _pk: &ObjectId, field: &str, _targets: &[ObjectId]) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "trucks.Truck has no many-to-many field '{field}'"
        )))
    }

    fn delete_by_pk(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.remove(&pk.as_int()?).is_some())
    }
}
