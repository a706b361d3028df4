//! Per-type descriptors: primary-key kind and field classification.

use hubsync_core::{EntityTag, ObjectId, SyncError, SyncResult};

/// Primary-key kind of a registered entity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PkKind {
    Int,
    Uuid,
}

impl PkKind {
    /// Validate that an object id parses as this pk kind.
    pub fn check(&self, object_id: &ObjectId) -> SyncResult<()> {
        match self {
            PkKind::Int => object_id.as_int().map(|_| ()),
            PkKind::Uuid => object_id.as_uuid().map(|_| ()),
        }
    }
}

/// Semantic kind of one field of a registered entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain scalar (string, integer, float, bool).
    Scalar,
    /// Calendar date, serialized `YYYY-MM-DD`.
    Date,
    /// Timestamp, serialized ISO-8601 with explicit zone.
    DateTime,
    /// Fixed-point decimal, serialized as a string to preserve precision.
    Decimal,
    /// UUID value field (not the primary key), serialized as a string.
    Uuid,
    /// Foreign reference; payloads carry the foreign pk under `<name>_id`.
    ForeignKey { target: EntityTag },
    /// Many-to-many membership; omitted from snapshots, replaced wholesale
    /// during ingestion.
    ManyToMany { target: EntityTag },
    /// Embedded file; inline base64 on push, absolute URL on pull.
    File,
}

impl FieldKind {
    pub fn is_relation(&self) -> bool {
        matches!(self, FieldKind::ForeignKey { .. } | FieldKind::ManyToMany { .. })
    }
}

/// One field of a registered entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Unique scalar fields participate in the inbound instance-resolution
    /// fallback when the primary key does not match an existing row.
    pub unique: bool,
}

impl FieldDescriptor {
    pub fn scalar(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Scalar,
            unique: false,
        }
    }

    pub fn unique_scalar(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Scalar,
            unique: true,
        }
    }

    pub fn date(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Date,
            unique: false,
        }
    }

    pub fn datetime(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::DateTime,
            unique: false,
        }
    }

    pub fn decimal(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Decimal,
            unique: false,
        }
    }

    pub fn file(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::File,
            unique: false,
        }
    }

    pub fn foreign_key(name: &'static str, target: EntityTag) -> Self {
        Self {
            name,
            kind: FieldKind::ForeignKey { target },
            unique: false,
        }
    }

    pub fn many_to_many(name: &'static str, target: EntityTag) -> Self {
        Self {
            name,
            kind: FieldKind::ManyToMany { target },
            unique: false,
        }
    }
}

/// Type descriptor: everything the pipelines need to know about one
/// registered entity type without touching its concrete Rust type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub tag: EntityTag,
    pub pk_kind: PkKind,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn new(tag: EntityTag, pk_kind: PkKind, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            tag,
            pk_kind,
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Unique scalar fields, in declaration order.
    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| f.unique && matches!(f.kind, FieldKind::Scalar))
    }

    /// Resolve an inbound payload key to a field.
    ///
    /// Exact field names win. A key `<name>_id` additionally resolves to a
    /// foreign-key field `<name>`; the suffix is never interpreted for any
    /// other field kind, so ordinary scalar fields ending in `_id` pass
    /// through untouched.
    pub fn classify_key(&self, key: &str) -> Option<&FieldDescriptor> {
        if let Some(field) = self.field(key) {
            return Some(field);
        }
        if let Some(base) = key.strip_suffix("_id") {
            if let Some(field) = self.field(base) {
                if matches!(field.kind, FieldKind::ForeignKey { .. }) {
                    return Some(field);
                }
            }
        }
        None
    }

    /// Validate an object id against this type's pk kind.
    pub fn check_pk(&self, object_id: &ObjectId) -> SyncResult<()> {
        self.pk_kind.check(object_id).map_err(|e| {
            SyncError::invalid_id(format!("{}: {e}", self.tag))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn truck_descriptor() -> TypeDescriptor {
        TypeDescriptor::new(
            "trucks.Truck".parse().unwrap(),
            PkKind::Int,
            vec![
                FieldDescriptor::unique_scalar("plate_number"),
                FieldDescriptor::scalar("national_id"),
                FieldDescriptor::foreign_key("owner", "trucks.TruckOwner".parse().unwrap()),
            ],
        )
    }

    #[test]
    fn classify_resolves_fk_under_both_spellings() {
        let desc = truck_descriptor();
        let by_name = desc.classify_key("owner").unwrap();
        let by_suffix = desc.classify_key("owner_id").unwrap();
        assert_eq!(by_name.name, "owner");
        assert_eq!(by_suffix.name, "owner");
    }

    #[test]
    fn classify_never_strips_id_from_scalars() {
        let desc = truck_descriptor();
        let field = desc.classify_key("national_id").unwrap();
        assert_eq!(field.name, "national_id");
        assert!(matches!(field.kind, FieldKind::Scalar));
        assert!(desc.classify_key("national").is_none());
    }

    #[test]
    fn pk_kind_checks_object_ids() {
        let desc = truck_descriptor();
        assert!(desc.check_pk(&ObjectId::from(9i64)).is_ok());
        assert!(desc.check_pk(&ObjectId::from("not-a-number")).is_err());
    }
}
