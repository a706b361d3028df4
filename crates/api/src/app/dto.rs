//! Wire DTOs for the delivery endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use hubsync_ledger::ChangeEvent;

/// One element of `pending_changes` in the pull response.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundChange {
    pub id: Uuid,
    pub model: String,
    pub action: String,
    pub object_id: String,
    pub data_payload: JsonValue,
    pub timestamp: DateTime<Utc>,
}

impl OutboundChange {
    /// Wrap a stored event with its (re-serialized) payload.
    pub fn from_event(event: &ChangeEvent, data_payload: JsonValue) -> Self {
        Self {
            id: *event.id.as_uuid(),
            model: event.entity.to_string(),
            action: event.action.as_code().to_string(),
            object_id: event.object_id.to_string(),
            data_payload,
            timestamp: event.timestamp,
        }
    }
}

/// Pull response body.
#[derive(Debug, Clone, Serialize)]
pub struct PendingResponse {
    pub pending_changes: Vec<OutboundChange>,
    pub acknowledged_events: Vec<Uuid>,
}

/// Acknowledge request body.
#[derive(Debug, Clone, Deserialize)]
pub struct AcknowledgeRequest {
    pub acknowledged_events: Vec<Uuid>,
}
