//! Blob storage for embedded file fields.

use std::collections::BTreeMap;
use std::sync::RwLock;

use hubsync_core::{EntityTag, ObjectId};

/// One stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// In-memory media store keyed by `(entity tag, pk, field)`.
///
/// Pushed file payloads land here decoded; pulled snapshots resolve to
/// absolute URLs under the configured media base.
#[derive(Debug)]
pub struct MediaStore {
    base_url: String,
    blobs: RwLock<BTreeMap<String, StoredBlob>>,
}

impl MediaStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            blobs: RwLock::new(BTreeMap::new()),
        }
    }

    fn key(tag: &EntityTag, pk: &ObjectId, field: &str) -> String {
        format!("{tag}/{pk}/{field}")
    }

    pub fn save(&self, tag: &EntityTag, pk: &ObjectId, field: &str, filename: &str, bytes: Vec<u8>) {
        self.blobs.write().unwrap().insert(
            Self::key(tag, pk, field),
            StoredBlob {
                filename: filename.to_string(),
                bytes,
            },
        );
    }

    pub fn delete(&self, tag: &EntityTag, pk: &ObjectId, field: &str) {
        self.blobs.write().unwrap().remove(&Self::key(tag, pk, field));
    }

    pub fn get(&self, tag: &EntityTag, pk: &ObjectId, field: &str) -> Option<StoredBlob> {
        self.blobs.read().unwrap().get(&Self::key(tag, pk, field)).cloned()
    }

    /// Absolute URL of a stored blob, `None` when no blob exists.
    pub fn url_for(&self, tag: &EntityTag, pk: &ObjectId, field: &str) -> Option<String> {
        let blobs = self.blobs.read().unwrap();
        blobs
            .get(&Self::key(tag, pk, field))
            .map(|blob| format!("{}/{}/{}", self.base_url, Self::key(tag, pk, field), blob.filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_get_url_and_delete() {
        let store = MediaStore::new("http://central.example/media/");
        let tag: EntityTag = "drivers.Driver".parse().unwrap();
        let pk = ObjectId::from(3i64);

        store.save(&tag, &pk, "photo", "face.jpg", vec![1, 2, 3]);
        assert_eq!(
            store.get(&tag, &pk, "photo").unwrap().bytes,
            vec![1, 2, 3]
        );
        assert_eq!(
            store.url_for(&tag, &pk, "photo").unwrap(),
            "http://central.example/media/drivers.Driver/3/photo/face.jpg"
        );

        store.delete(&tag, &pk, "photo");
        assert!(store.get(&tag, &pk, "photo").is_none());
        assert!(store.url_for(&tag, &pk, "photo").is_none());
    }
}
