//! Declarations: commodities, payment methods, and the declaration record
//! tying them to a driver and truck.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hubsync_core::{EntityTag, ObjectId, SyncError, SyncResult};
use hubsync_registry::{
    AppliedWrite, EntityStore, FieldDescriptor, FieldValue, FilePayload, FileRendering, Payload,
    PkKind, TypeDescriptor,
};

use crate::convert;
use crate::table::Table;
use crate::truck::truck_tag;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commodity {
    pub id: Uuid,
    pub name: String,
    pub unit_price: Option<Decimal>,
}

impl Commodity {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            name: String::new(),
            unit_price: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: i64,
    pub name: String,
}

impl PaymentMethod {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            name: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub id: Uuid,
    pub reference: String,
    pub driver: Option<i64>,
    pub truck: Option<i64>,
    pub commodity: Option<Uuid>,
    pub payment_method: Option<i64>,
    pub amount: Option<Decimal>,
    pub declared_at: Option<DateTime<Utc>>,
}

impl Declaration {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            reference: String::new(),
            driver: None,
            truck: None,
            commodity: None,
            payment_method: None,
            amount: None,
            declared_at: None,
        }
    }
}

pub fn commodity_tag() -> EntityTag {
    "declarations.Commodity".parse().expect("static tag")
}

pub fn payment_method_tag() -> EntityTag {
    "declarations.PaymentMethod".parse().expect("static tag")
}

pub fn declaration_tag() -> EntityTag {
    "declarations.Declaration".parse().expect("static tag")
}

pub struct CommodityStore {
    rows: Table<Uuid, Commodity>,
    descriptor: TypeDescriptor,
}

impl CommodityStore {
    pub fn new() -> Self {
        Self {
            rows: Table::new(),
            descriptor: TypeDescriptor::new(
                commodity_tag(),
                PkKind::Uuid,
                vec![
                    FieldDescriptor::unique_scalar("name"),
                    FieldDescriptor::decimal("unit_price"),
                ],
            ),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert(&self, commodity: Commodity) {
        self.rows.insert(commodity.id, commodity);
    }

    pub fn get(&self, id: Uuid) -> Option<Commodity> {
        self.rows.get(&id)
    }
}

impl Default for CommodityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for CommodityStore {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn exists(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.contains(&pk.as_uuid()?))
    }

    fn snapshot(&self, pk: &ObjectId, _rendering: FileRendering) -> SyncResult<Option<Payload>> {
        let Some(commodity) = self.rows.get(&pk.as_uuid()?) else {
            return Ok(None);
        };
        let mut payload = Payload::new();
        payload.insert("id".into(), commodity.id.to_string().into());
        payload.insert("name".into(), commodity.name.clone().into());
        payload.insert(
            "unit_price".into(),
            commodity
                .unit_price
                .map(|p| FieldValue::Decimal(p).to_json())
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
        let matches = self.rows.keys_where(|c| c.name == wanted);
        match matches.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(ObjectId::from(*id))),
            _ => Err(SyncError::conflict(format!(
                "multiple commodities share unique name '{wanted}'"
            ))),
        }
    }

    fn apply_scalars(
        &self,
        pk: &ObjectId,
        scalars: &[(String, FieldValue)],
    ) -> SyncResult<AppliedWrite> {
        let id = pk.as_uuid()?;
        let created = !self.rows.contains(&id);
        let mut commodity = self.rows.get(&id).unwrap_or_else(|| Commodity::new(id));
        for (field, value) in scalars {
            match field.as_str() {
                "id" => {}
                "name" => commodity.name = convert::text(field, value)?,
                "unit_price" => commodity.unit_price = convert::opt_decimal(field, value)?,
                other => {
                    return Err(SyncError::validation(format!(
                        "declarations.Commodity has no scalar field '{other}'"
                    )));
                }
            }
        }
        self.rows.insert(id, commodity);
        Ok(AppliedWrite { created })
    }

    fn write_file(&self, _pk: &ObjectId, field: &str, _file: &FilePayload) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "declarations.Commodity has no file field '{field}'"
        )))
    }

    fn set_fk(&self, _pk: &ObjectId, field: &str, _target: Option<&ObjectId>) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "declarations.Commodity has no foreign key '{field}'"
        )))
    }

    fn set_m2m(&self, _pk: &ObjectId, field: &str, _targets: &[ObjectId]) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "declarations.Commodity has no many-to-many field '{field}'"
        )))
    }

    fn delete_by_pk(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.remove(&pk.as_uuid()?).is_some())
    }
}

pub struct PaymentMethodStore {
    rows: Table<i64, PaymentMethod>,
    descriptor: TypeDescriptor,
}

impl PaymentMethodStore {
    pub fn new() -> Self {
        Self {
            rows: Table::new(),
            descriptor: TypeDescriptor::new(
                payment_method_tag(),
                PkKind::Int,
                vec![FieldDescriptor::unique_scalar("name")],
            ),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert(&self, method: PaymentMethod) {
        self.rows.insert(method.id, method);
    }

    pub fn get(&self, id: i64) -> Option<PaymentMethod> {
        self.rows.get(&id)
    }
}

impl Default for PaymentMethodStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for PaymentMethodStore {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn exists(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.contains(&pk.as_int()?))
    }

    fn snapshot(&self, pk: &ObjectId, _rendering: FileRendering) -> SyncResult<Option<Payload>> {
        let Some(method) = self.rows.get(&pk.as_int()?) else {
            return Ok(None);
        };
        let mut payload = Payload::new();
        payload.insert("id".into(), method.id.into());
        payload.insert("name".into(), method.name.clone().into());
        Ok(Some(payload))
    }

    fn lookup_by_unique(&self, field: &str, value: &FieldValue) -> SyncResult<Option<ObjectId>> {
        if field != "name" {
            return Ok(None);
        }
        let Some(wanted) = value.as_text() else {
            return Ok(None);
        };
        let matches = self.rows.keys_where(|m| m.name == wanted);
        match matches.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(ObjectId::from(*id))),
            _ => Err(SyncError::conflict(format!(
                "multiple payment methods share unique name '{wanted}'"
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
        let mut method = self.rows.get(&id).unwrap_or_else(|| PaymentMethod::new(id));
        for (field, value) in scalars {
            match field.as_str() {
                "id" => {}
                "name" => method.name = convert::text(field, value)?,
                other => {
                    return Err(SyncError::validation(format!(
                        "declarations.PaymentMethod has no scalar field '{other}'"
                    )));
                }
            }
        }
        self.rows.insert(id, method);
        Ok(AppliedWrite { created })
    }

    fn write_file(&self, _pk: &ObjectId, field: &str, _file: &FilePayload) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "declarations.PaymentMethod has no file field '{field}'"
        )))
    }

    fn set_fk(&self, _pk: &ObjectId, field: &str, _target: Option<&ObjectId>) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "declarations.PaymentMethod has no foreign key '{field}'"
        )))
    }

    fn set_m2m(&self, _pk: &ObjectId, field: &str, _targets: &[ObjectId]) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "declarations.PaymentMethod has no many-to-many field '{field}'"
        )))
    }

    fn delete_by_pk(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.remove(&pk.as_int()?).is_some())
    }
}

pub struct DeclarationStore {
    rows: Table<Uuid, Declaration>,
    descriptor: TypeDescriptor,
}

impl DeclarationStore {
    pub fn new() -> Self {
        Self {
            rows: Table::new(),
            descriptor: TypeDescriptor::new(
                declaration_tag(),
                PkKind::Uuid,
                vec![
                    FieldDescriptor::unique_scalar("reference"),
                    FieldDescriptor::foreign_key("driver", crate::driver::driver_tag()),
                    FieldDescriptor::foreign_key("truck", truck_tag()),
                    FieldDescriptor::foreign_key("commodity", commodity_tag()),
                    FieldDescriptor::foreign_key("payment_method", payment_method_tag()),
                    FieldDescriptor::decimal("amount"),
                    FieldDescriptor::datetime("declared_at"),
                ],
            ),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert(&self, declaration: Declaration) {
        self.rows.insert(declaration.id, declaration);
    }

    pub fn get(&self, id: Uuid) -> Option<Declaration> {
        self.rows.get(&id)
    }
}

impl Default for DeclarationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for DeclarationStore {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn exists(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.contains(&pk.as_uuid()?))
    }

    fn snapshot(&self, pk: &ObjectId, _rendering: FileRendering) -> SyncResult<Option<Payload>> {
        let Some(declaration) = self.rows.get(&pk.as_uuid()?) else {
            return Ok(None);
        };
        let mut payload = Payload::new();
        payload.insert("id".into(), declaration.id.to_string().into());
        payload.insert("reference".into(), declaration.reference.clone().into());
        payload.insert(
            "driver_id".into(),
            declaration
                .driver
                .map(|d| d.to_string().into())
                .unwrap_or(serde_json::Value::Null),
        );
        payload.insert(
            "truck_id".into(),
            declaration
                .truck
                .map(|t| t.to_string().into())
                .unwrap_or(serde_json::Value::Null),
        );
        payload.insert(
            "commodity_id".into(),
            declaration
                .commodity
                .map(|c| c.to_string().into())
                .unwrap_or(serde_json::Value::Null),
        );
        payload.insert(
            "payment_method_id".into(),
            declaration
                .payment_method
                .map(|p| p.to_string().into())
                .unwrap_or(serde_json::Value::Null),
        );
        payload.insert(
            "amount".into(),
            declaration
                .amount
                .map(|a| FieldValue::Decimal(a).to_json())
                .unwrap_or(serde_json::Value::Null),
        );
        payload.insert(
            "declared_at".into(),
            declaration
                .declared_at
                .map(|t| t.to_rfc3339().into())
                .unwrap_or(serde_json::Value::Null),
        );
        Ok(Some(payload))
    }

    fn lookup_by_unique(&self, field: &str, value: &FieldValue) -> SyncResult<Option<ObjectId>> {
        if field != "reference" {
            return Ok(None);
        }
        let Some(wanted) = value.as_text() else {
            return Ok(None);
        };
        let matches = self.rows.keys_where(|d| d.reference == wanted);
        match matches.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(ObjectId::from(*id))),
            _ => Err(SyncError::conflict(format!(
                "multiple declarations share unique reference '{wanted}'"
            ))),
        }
    }

    fn apply_scalars(
        &self,
        pk: &ObjectId,
        scalars: &[(String, FieldValue)],
    ) -> SyncResult<AppliedWrite> {
        let id = pk.as_uuid()?;
        let created = !self.rows.contains(&id);
        let mut declaration = self.rows.get(&id).unwrap_or_else(|| Declaration::new(id));
        for (field, value) in scalars {
            match field.as_str() {
                "id" => {}
                "reference" => declaration.reference = convert::text(field, value)?,
                "amount" => declaration.amount = convert::opt_decimal(field, value)?,
                "declared_at" => declaration.declared_at = convert::opt_datetime_utc(field, value)?,
                other => {
                    return Err(SyncError::validation(format!(
                        "declarations.Declaration has no scalar field '{other}'"
                    )));
                }
            }
        }
        self.rows.insert(id, declaration);
        Ok(AppliedWrite { created })
    }

    fn write_file(&self, _pk: &ObjectId, field: &str, _file: &FilePayload) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "declarations.Declaration has no file field '{field}'"
        )))
    }

    fn set_fk(&self, pk: &ObjectId, field: &str, target: Option<&ObjectId>) -> SyncResult<()> {
        let id = pk.as_uuid()?;
        let applied = match field {
            "driver" => {
                let value = target.map(|t| t.as_int()).transpose()?;
                self.rows.update(&id, |d| d.driver = value)
            }
            "truck" => {
                let value = target.map(|t| t.as_int()).transpose()?;
                self.rows.update(&id, |d| d.truck = value)
            }
            "commodity" => {
                let value = target.map(|t| t.as_uuid()).transpose()?;
                self.rows.update(&id, |d| d.commodity = value)
            }
            "payment_method" => {
                let value = target.map(|t| t.as_int()).transpose()?;
                self.rows.update(&id, |d| d.payment_method = value)
            }
            other => {
                return Err(SyncError::validation(format!(
                    "declarations.Declaration has no foreign key '{other}'"
                )));
            }
        };
        if !applied {
            return Err(SyncError::not_found());
        }
        Ok(())
    }

    fn set_m2m(&self, _pk: &ObjectId, field: &str, _targets: &[ObjectId]) -> SyncResult<()> {
        Err(SyncError::validation(format!(
            "declarations.Declaration has no many-to-many field '{field}'"
        )))
    }

    fn delete_by_pk(&self, pk: &ObjectId) -> SyncResult<bool> {
        Ok(self.rows.remove(&pk.as_uuid()?).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_snapshot_emits_fk_keys_with_id_suffix() {
        let store = DeclarationStore::new();
        let id = Uuid::new_v4();
        let commodity = Uuid::new_v4();
        store.insert(Declaration {
            id,
            reference: "DECL-001".into(),
            driver: Some(3),
            truck: Some(9),
            commodity: Some(commodity),
            payment_method: None,
            amount: Some("99.90".parse().unwrap()),
            declared_at: None,
        });

        let payload = store
            .snapshot(&ObjectId::from(id), FileRendering::Inline)
            .unwrap()
            .unwrap();
        assert_eq!(payload["driver_id"], serde_json::json!("3"));
        assert_eq!(payload["truck_id"], serde_json::json!("9"));
        assert_eq!(payload["commodity_id"], serde_json::json!(commodity.to_string()));
        assert_eq!(payload["payment_method_id"], serde_json::Value::Null);
        assert_eq!(payload["amount"], serde_json::json!("99.90"));
    }

    #[test]
    fn uuid_pk_rejects_integer_object_ids() {
        let store = CommodityStore::new();
        assert!(store.exists(&ObjectId::from(7i64)).is_err());
    }
}
