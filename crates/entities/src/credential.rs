//! Station credentials: the Api-Key binding for peer authentication.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hubsync_core::{StationId, SyncError, SyncResult};

use crate::station::{StationDirectory, WorkStation};
use crate::table::Table;

/// Binding between a station and its bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationCredential {
    pub id: i64,
    pub station_id: StationId,
    pub base_url: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Operator input for creating or replacing a credential.
#[derive(Debug, Clone, Deserialize)]
pub struct NewStationCredential {
    pub station_id: StationId,
    pub base_url: String,
    pub api_key: String,
}

/// Credential table with the invariant that (station, api_key) is a 1-1-1
/// triple: one credential per station, globally unique api_key.
pub struct CredentialStore {
    rows: Table<i64, StationCredential>,
    directory: Arc<dyn StationDirectory>,
    next_id: std::sync::atomic::AtomicI64,
}

impl CredentialStore {
    pub fn new(directory: Arc<dyn StationDirectory>) -> Self {
        Self {
            rows: Table::new(),
            directory,
            next_id: std::sync::atomic::AtomicI64::new(1),
        }
    }

    pub fn arc(directory: Arc<dyn StationDirectory>) -> Arc<Self> {
        Arc::new(Self::new(directory))
    }

    /// Resolve an api key to its station. The lookup key for inbound
    /// request authentication.
    pub fn resolve_api_key(&self, api_key: &str) -> Option<WorkStation> {
        let station_id = self
            .rows
            .values()
            .into_iter()
            .find(|c| c.api_key == api_key)?
            .station_id;
        self.directory.get(station_id)
    }

    pub fn list(&self) -> Vec<StationCredential> {
        self.rows.values()
    }

    pub fn get(&self, id: i64) -> Option<StationCredential> {
        self.rows.get(&id)
    }

    pub fn create(&self, new: NewStationCredential) -> SyncResult<StationCredential> {
        if self.directory.get(new.station_id).is_none() {
            return Err(SyncError::validation(format!(
                "unknown station {}",
                new.station_id
            )));
        }
        if self.rows.values().iter().any(|c| c.api_key == new.api_key) {
            return Err(SyncError::conflict("api_key already in use"));
        }
        if self
            .rows
            .values()
            .iter()
            .any(|c| c.station_id == new.station_id)
        {
            return Err(SyncError::conflict(format!(
                "station {} already has a credential",
                new.station_id
            )));
        }

        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let now = Utc::now();
        let credential = StationCredential {
            id,
            station_id: new.station_id,
            base_url: new.base_url,
            api_key: new.api_key,
            created_at: now,
            updated_at: now,
        };
        self.rows.insert(id, credential.clone());
        Ok(credential)
    }

    pub fn replace(&self, id: i64, new: NewStationCredential) -> SyncResult<StationCredential> {
        let existing = self.rows.get(&id).ok_or(SyncError::NotFound)?;
        if self
            .rows
            .values()
            .iter()
            .any(|c| c.id != id && c.api_key == new.api_key)
        {
            return Err(SyncError::conflict("api_key already in use"));
        }
        if self
            .rows
            .values()
            .iter()
            .any(|c| c.id != id && c.station_id == new.station_id)
        {
            return Err(SyncError::conflict(format!(
                "station {} already has a credential",
                new.station_id
            )));
        }

        let credential = StationCredential {
            id,
            station_id: new.station_id,
            base_url: new.base_url,
            api_key: new.api_key,
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };
        self.rows.insert(id, credential.clone());
        Ok(credential)
    }

    pub fn delete(&self, id: i64) -> SyncResult<()> {
        self.rows.remove(&id).map(|_| ()).ok_or(SyncError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::WorkStationStore;

    fn directory() -> Arc<WorkStationStore> {
        let store = WorkStationStore::arc();
        store.insert(WorkStation::new(1, "A"));
        store.insert(WorkStation::new(2, "B"));
        store
    }

    fn cred(station: i64, key: &str) -> NewStationCredential {
        NewStationCredential {
            station_id: StationId::new(station),
            base_url: format!("http://station-{station}.example"),
            api_key: key.to_string(),
        }
    }

    #[test]
    fn resolve_api_key_returns_bound_station() {
        let store = CredentialStore::new(directory());
        store.create(cred(1, "key-a")).unwrap();

        let station = store.resolve_api_key("key-a").unwrap();
        assert_eq!(station.id, StationId::new(1));
        assert!(store.resolve_api_key("nope").is_none());
    }

    #[test]
    fn api_keys_are_globally_unique() {
        let store = CredentialStore::new(directory());
        store.create(cred(1, "key")).unwrap();
        assert!(matches!(
            store.create(cred(2, "key")),
            Err(SyncError::Conflict(_))
        ));
    }

    #[test]
    fn one_credential_per_station() {
        let store = CredentialStore::new(directory());
        store.create(cred(1, "key-a")).unwrap();
        assert!(matches!(
            store.create(cred(1, "key-b")),
            Err(SyncError::Conflict(_))
        ));
    }

    #[test]
    fn replace_and_delete() {
        let store = CredentialStore::new(directory());
        let created = store.create(cred(1, "key-a")).unwrap();

        let replaced = store.replace(created.id, cred(1, "key-rotated")).unwrap();
        assert_eq!(replaced.api_key, "key-rotated");
        assert!(store.resolve_api_key("key-a").is_none());
        assert!(store.resolve_api_key("key-rotated").is_some());

        store.delete(created.id).unwrap();
        assert!(store.resolve_api_key("key-rotated").is_none());
        assert!(matches!(store.delete(created.id), Err(SyncError::NotFound)));
    }
}
