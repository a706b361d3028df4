//! Change events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use hubsync_core::{ChangeAction, EntityTag, EventId, ObjectId, StationId};

/// An event ready to be appended (not yet stamped with the log timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChangeEvent {
    pub id: EventId,
    pub entity: EntityTag,
    pub object_id: ObjectId,
    pub action: ChangeAction,
    /// Self-contained snapshot: the post-image for creates/updates, the
    /// last-known pre-image for deletes.
    pub payload: JsonValue,
    /// `None` for locally-originated mutations.
    pub source_station: Option<StationId>,
}

impl NewChangeEvent {
    pub fn local(
        entity: EntityTag,
        object_id: ObjectId,
        action: ChangeAction,
        payload: JsonValue,
    ) -> Self {
        Self {
            id: EventId::new(),
            entity,
            object_id,
            action,
            payload,
            source_station: None,
        }
    }

    pub fn pushed(
        entity: EntityTag,
        object_id: ObjectId,
        action: ChangeAction,
        payload: JsonValue,
        source: StationId,
    ) -> Self {
        Self {
            id: EventId::new(),
            entity,
            object_id,
            action,
            payload,
            source_station: Some(source),
        }
    }
}

/// A stored change event: written once, retained as history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: EventId,
    pub entity: EntityTag,
    pub object_id: ObjectId,
    pub action: ChangeAction,
    pub payload: JsonValue,
    pub source_station: Option<StationId>,
    /// Log position; monotonic within one database.
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn from_new(new: NewChangeEvent, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            entity: new.entity,
            object_id: new.object_id,
            action: new.action,
            payload: new.payload,
            source_station: new.source_station,
            timestamp,
        }
    }
}
