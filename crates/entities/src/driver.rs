//! Drivers.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hubsync_core::{EntityTag, ObjectId, SyncError, SyncResult};
use hubsync_registry::{
    AppliedWrite, EntityStore, FieldDescriptor, FieldValue, FilePayload, FileRendering, Payload,
    PkKind, TypeDescriptor,
};

use crate::convert;
use crate::media::MediaStore;
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub licence_number: String,
    pub licence_date: Option<NaiveDate>,
    pub salary: Option<Decimal>,
    /// Basename of the stored photo; the blob lives in the media store.
    pub photo: Option<String>,
}

impl Driver {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            first_name: String::new(),
            last_name: String::new(),
            licence_number: String::new(),
            licence_date: None,
            salary: None,
            photo: None,
        }
    }
}

pub fn driver_tag() -> EntityTag {
    "drivers.Driver".parse().expect("static tag")
}

pub struct DriverStore {
    rows: Table<i64, Driver>,
    media: Arc<MediaStore>,
    descriptor: TypeDescriptor,
}

impl DriverStore {
    pub fn new(media: Arc<MediaStore>) -> Self {
        Self {
            rows: Table::new(),
            media,
            descriptor: TypeDescriptor::new(
                driver_tag(),
                PkKind::Int,
                vec![
                    FieldDescriptor::scalar("first_name"),
                    FieldDescriptor::scalar("last_name"),
                    FieldDescriptor::unique_scalar("licence_number"),
                    FieldDescriptor::date("licence_date"),
                    FieldDescriptor::decimal("salary"),
                    FieldDescriptor::file("photo"),
                ],
            ),
        }
    }

    pub fn arc(media: Arc<MediaStore>) -> Arc<Self> {
        Arc::new(Self::new(media))
    }

    pub fn insert(&self, driver: Driver) {
        self.rows.insert(driver.id, driver);
    }

    pub fn get(&self, id: i64) -> Option<Driver> {
        self.rows.get(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl EntityStore for DriverStore {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn exists(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.contains(&pk.as_int()?))
    }

    fn snapshot(&self, pk: &ObjectId, rendering: FileRendering) -> SyncResult<Option<Payload>> {
        let Some(driver) = self.rows.get(&pk.as_int()?) else {
            return Ok(None);
        };

        let mut payload = Payload::new();
        payload.insert("id".into(), driver.id.into());
        payload.insert("first_name".into(), driver.first_name.clone().into());
        payload.insert("last_name".into(), driver.last_name.clone().into());
        payload.insert("licence_number".into(), driver.licence_number.clone().into());
        payload.insert(
            "licence_date".into(),
            driver
                .licence_date
                .map(|d| FieldValue::Date(d).to_json())
                .unwrap_or(serde_json::Value::Null),
        );
        payload.insert(
            "salary".into(),
            driver
                .salary
                .map(|s| FieldValue::Decimal(s).to_json())
                .unwrap_or(serde_json::Value::Null),
        );

        let tag = &self.descriptor.tag;
        let photo = match (&driver.photo, rendering) {
            (None, _) => FilePayload::Absent,
            (Some(_), FileRendering::Url) => self
                .media
                .url_for(tag, pk, "photo")
                .map(FilePayload::Url)
                .unwrap_or(FilePayload::Absent),
            (Some(filename), FileRendering::Inline) => match self.media.get(tag, pk, "photo") {
                Some(blob) => FilePayload::Inline {
                    filename: filename.clone(),
                    content: blob.bytes,
                },
                None => FilePayload::Absent,
            },
        };
        payload.insert("photo".into(), photo.to_json());

        Ok(Some(payload))
    }

    fn lookup_by_unique(&self, field: &str, value: &FieldValue) -> SyncResult<Option<ObjectId>> {
        if field != "licence_number" {
            return Ok(None);
        }
        let Some(wanted) = value.as_text() else {
            return Ok(None);
        };
        let matches = self.rows.keys_where(|d| d.licence_number == wanted);
        match matches.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(ObjectId::from(*id))),
            _ => Err(SyncError::conflict(format!(
                "multiple drivers share unique licence_number '{wanted}'"
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
        let mut driver = self.rows.get(&id).unwrap_or_else(|| Driver::new(id));
        for (field, value) in scalars {
            match field.as_str() {
                "id" => {}
                "first_name" => driver.first_name = convert::text(field, value)?,
                "last_name" => driver.last_name = convert::text(field, value)?,
                "licence_number" => driver.licence_number = convert::text(field, value)?,
                "licence_date" => driver.licence_date = convert::opt_date(field, value)?,
                "salary" => driver.salary = convert::opt_decimal(field, value)?,
                other => {
                    return Err(SyncError::validation(format!(
                        "drivers.Driver has no scalar field '{other}'"
                    )));
                }
            }
        }
        self.rows.insert(id, driver);
        Ok(AppliedWrite { created })
    }

    fn write_file(&self, pk: &ObjectId, field: &str, file: &FilePayload) -> SyncResult<()> {
        if field != "photo" {
            return Err(SyncError::validation(format!(
                "drivers.Driver has no file field '{field}'"
            )));
        }
        let id = pk.as_int()?;
        if !self.rows.contains(&id) {
            return Err(SyncError::not_found());
        }
        let tag = self.descriptor.tag.clone();
        match file {
            FilePayload::Inline { filename, content } => {
                self.media.save(&tag, pk, "photo", filename, content.clone());
                self.rows.update(&id, |d| d.photo = Some(filename.clone()));
            }
            FilePayload::Absent => {
                self.media.delete(&tag, pk, "photo");
                self.rows.update(&id, |d| d.photo = None);
            }
            // A URL form points back at this hub's own media; the blob is
            // already in place.
            FilePayload::Url(_) => {}
        }
        Ok(())
    }

    fn set_fk(&self, _pk: &ObjectId, field: &str, _target: Option<&ObjectId>) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "drivers.Driver has no foreign key '{field}'"
        )))
    }

    fn set_m2m(&self, _pk: &ObjectId, field: &str, _targets: &[ObjectId]) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "drivers.Driver has no many-to-many field '{field}'"
        )))
    }

    fn delete_by_pk(&self, pk: &ObjectId) -> SyncResult<bool> {
        let id = pk.as_int()?;
        let existed = self.rows.remove(&id).is_some();
        if existed {
            self.media.delete(&self.descriptor.tag, pk, "photo");
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DriverStore {
        DriverStore::new(Arc::new(MediaStore::new("http://central.example/media")))
    }

    fn seeded_driver() -> Driver {
        Driver {
            id: 3,
            first_name: "Ábébé".into(),
            last_name: "Kebede".into(),
            licence_number: "DL-0042".into(),
            licence_date: Some(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            salary: Some("1234.56".parse().unwrap()),
            photo: None,
        }
    }

    #[test]
    fn snapshot_serializes_dates_and_decimals_as_strings() {
        let store = store();
        store.insert(seeded_driver());

        let payload = store
            .snapshot(&ObjectId::from(3i64), FileRendering::Inline)
            .unwrap()
            .unwrap();
        assert_eq!(payload["licence_date"], serde_json::json!("2024-03-01"));
        assert_eq!(payload["salary"], serde_json::json!("1234.56"));
        assert_eq!(payload["photo"], serde_json::Value::Null);
    }

    #[test]
    fn photo_renders_inline_or_as_url_by_direction() {
        let store = store();
        store.insert(seeded_driver());
        let pk = ObjectId::from(3i64);

        store
            .write_file(
                &pk,
                "photo",
                &FilePayload::Inline {
                    filename: "face.jpg".into(),
                    content: vec![9, 9, 9],
                },
            )
            .unwrap();

        let inline = store.snapshot(&pk, FileRendering::Inline).unwrap().unwrap();
        assert_eq!(inline["photo"]["filename"], serde_json::json!("face.jpg"));

        let url = store.snapshot(&pk, FileRendering::Url).unwrap().unwrap();
        assert_eq!(
            url["photo"],
            serde_json::json!("http://central.example/media/drivers.Driver/3/photo/face.jpg")
        );
    }

    #[test]
    fn absent_file_payload_deletes_the_blob() {
        let store = store();
        store.insert(seeded_driver());
        let pk = ObjectId::from(3i64);

        store
            .write_file(
                &pk,
                "photo",
                &FilePayload::Inline {
                    filename: "face.jpg".into(),
                    content: vec![1],
                },
            )
            .unwrap();
        store.write_file(&pk, "photo", &FilePayload::Absent).unwrap();

        assert_eq!(store.get(3).unwrap().photo, None);
        let payload = store.snapshot(&pk, FileRendering::Url).unwrap().unwrap();
        assert_eq!(payload["photo"], serde_json::Value::Null);
    }

    #[test]
    fn duplicate_unique_licence_numbers_are_a_conflict() {
        let store = store();
        let mut a = seeded_driver();
        let mut b = seeded_driver();
        a.id = 1;
        b.id = 2;
        store.insert(a);
        store.insert(b);

        let result = store.lookup_by_unique("licence_number", &FieldValue::Text("DL-0042".into()));
        assert!(matches!(result, Err(SyncError::Conflict(_))));
    }
}
