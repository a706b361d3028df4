//! The process-wide registry of synchronizable entity types.

use std::collections::BTreeMap;
use std::sync::Arc;

use hubsync_core::{EntityTag, ObjectId, SyncError, SyncResult};

use crate::descriptor::TypeDescriptor;
use crate::store::{EntityStore, FileRendering, Payload};

/// One registered entity type.
#[derive(Clone)]
pub struct RegistryEntry {
    store: Arc<dyn EntityStore>,
}

impl RegistryEntry {
    pub fn descriptor(&self) -> &TypeDescriptor {
        self.store.descriptor()
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }
}

/// Immutable map from entity tag to descriptor + store capability.
///
/// Built once at startup from the configured tag allow-list; lookups for
/// tags outside the list fail with [`SyncError::UnknownEntity`], which is
/// what rejects unknown models at inbound validation.
#[derive(Clone, Default)]
pub struct EntityRegistry {
    entries: BTreeMap<EntityTag, RegistryEntry>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store under its descriptor's tag. Last registration for a
    /// tag wins; callers build the registry once, so a duplicate is a
    /// wiring bug surfaced by the returned error.
    pub fn register(&mut self, store: Arc<dyn EntityStore>) -> SyncResult<()> {
        let tag = store.descriptor().tag.clone();
        if self.entries.contains_key(&tag) {
            return Err(SyncError::conflict(format!(
                "entity tag '{tag}' registered twice"
            )));
        }
        self.entries.insert(tag, RegistryEntry { store });
        Ok(())
    }

    pub fn contains(&self, tag: &EntityTag) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn get(&self, tag: &EntityTag) -> Option<&RegistryEntry> {
        self.entries.get(tag)
    }

    /// Resolve a tag or fail with the unknown-entity error the inbound
    /// validation layer surfaces as a 400.
    pub fn resolve(&self, tag: &EntityTag) -> SyncResult<&RegistryEntry> {
        self.entries
            .get(tag)
            .ok_or_else(|| SyncError::unknown_entity(tag.as_str()))
    }

    /// Registered tags in deterministic order.
    pub fn tags(&self) -> impl Iterator<Item = &EntityTag> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot an instance through the registry.
    pub fn snapshot(
        &self,
        tag: &EntityTag,
        pk: &ObjectId,
        rendering: FileRendering,
    ) -> SyncResult<Option<Payload>> {
        self.resolve(tag)?.store().snapshot(pk, rendering)
    }

    /// Keep only the tags named in `allowed`, erroring on allow-list
    /// entries that no store was registered for (a config typo would
    /// otherwise silently drop an entity from sync).
    pub fn restrict_to(mut self, allowed: &[String]) -> SyncResult<Self> {
        let mut kept = BTreeMap::new();
        for raw in allowed {
            let tag: EntityTag = raw.parse()?;
            match self.entries.remove(&tag) {
                Some(entry) => {
                    kept.insert(tag, entry);
                }
                None => {
                    return Err(SyncError::unknown_entity(format!(
                        "'{raw}' is not a registered entity type"
                    )));
                }
            }
        }
        Ok(Self { entries: kept })
    }
}
