//! The per-type entity store capability.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use hubsync_core::{ObjectId, SyncResult};

use crate::descriptor::TypeDescriptor;
use crate::value::{FieldValue, FilePayload};

/// A snapshot payload: one JSON key per captured field.
pub type Payload = serde_json::Map<String, JsonValue>;

/// How file fields render in a snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileRendering {
    /// Inline `{filename, content}` objects (push direction).
    Inline,
    /// Absolute URLs against the media base (pull direction).
    Url,
}

/// Result of a scalar upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedWrite {
    /// True when a new instance was constructed, false when an existing one
    /// was updated.
    pub created: bool,
}

/// Capability interface one registered entity type exposes to the sync
/// pipelines.
///
/// Implementations are typed per entity; field names arriving here have
/// already been classified against the [`TypeDescriptor`], so an unknown
/// field name is an implementation bug, not peer input.
pub trait EntityStore: Send + Sync {
    fn descriptor(&self) -> &TypeDescriptor;

    /// True when a row with this primary key exists.
    fn exists(&self, pk: &ObjectId) -> SyncResult<bool>;

    /// Serialize the current state of an instance, or `None` when the
    /// instance does not exist (e.g. it was deleted after capture).
    fn snapshot(&self, pk: &ObjectId, rendering: FileRendering) -> SyncResult<Option<Payload>>;

    /// Find the single row whose unique scalar `field` equals `value`.
    ///
    /// Returns a conflict error when more than one row matches: a duplicate
    /// on a unique field means local state is corrupt and binding the
    /// inbound change to either row would be a guess.
    fn lookup_by_unique(&self, field: &str, value: &FieldValue) -> SyncResult<Option<ObjectId>>;

    /// Write scalar fields at `pk`, constructing the instance when absent.
    fn apply_scalars(&self, pk: &ObjectId, scalars: &[(String, FieldValue)])
    -> SyncResult<AppliedWrite>;

    /// Store or clear a file field's blob.
    fn write_file(&self, pk: &ObjectId, field: &str, file: &FilePayload) -> SyncResult<()>;

    /// Point a foreign-key field at `target` (already verified to exist),
    /// or clear it.
    fn set_fk(&self, pk: &ObjectId, field: &str, target: Option<&ObjectId>) -> SyncResult<()>;

    /// Replace a many-to-many field's membership with `targets`.
    fn set_m2m(&self, pk: &ObjectId, field: &str, targets: &[ObjectId]) -> SyncResult<()>;

    /// Drop the row; returns false when nothing existed (delete of an
    /// unknown object is a no-op).
    fn delete_by_pk(&self, pk: &ObjectId) -> SyncResult<bool>;
}

impl<S> EntityStore for Arc<S>
where
    S: EntityStore + ?Sized,
{
    fn descriptor(&self) -> &TypeDescriptor {
        (**self).descriptor()
    }

    fn exists(&self, pk: &ObjectId) -> SyncResult<bool> {
        (**self).exists(pk)
    }

    fn snapshot(&self, pk: &ObjectId, rendering: FileRendering) -> SyncResult<Option<Payload>> {
        (**self).snapshot(pk, rendering)
    }

    fn lookup_by_unique(&self, field: &str, value: &FieldValue) -> SyncResult<Option<ObjectId>> {
        (**self).lookup_by_unique(field, value)
    }

    fn apply_scalars(
        &self,
        pk: &ObjectId,
        scalars: &[(String, FieldValue)],
    ) -> SyncResult<AppliedWrite> {
        (**self).apply_scalars(pk, scalars)
    }

    fn write_file(&self, pk: &ObjectId, field: &str, file: &FilePayload) -> SyncResult<()> {
        (**self).write_file(pk, field, file)
    }

    fn set_fk(&self, pk: &ObjectId, field: &str, target: Option<&ObjectId>) -> SyncResult<()> {
        (**self).set_fk(pk, field, target)
    }

    fn set_m2m(&self, pk: &ObjectId, field: &str, targets: &[ObjectId]) -> SyncResult<()> {
        (**self).set_m2m(pk, field, targets)
    }

    fn delete_by_pk(&self, pk: &ObjectId) -> SyncResult<bool> {
        (**self).delete_by_pk(pk)
    }
}
