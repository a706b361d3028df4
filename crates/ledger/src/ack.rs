//! Acknowledgement rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hubsync_core::{EventId, StationId};

/// Delivery status of one event toward one destination.
///
/// The only transition is Pending → Acknowledged; acknowledged rows are
/// retained as history.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    #[serde(rename = "P")]
    Pending,
    #[serde(rename = "A")]
    Acknowledged,
}

impl AckStatus {
    pub fn as_code(&self) -> &'static str {
        match self {
            AckStatus::Pending => "P",
            AckStatus::Acknowledged => "A",
        }
    }
}

/// One (event, destination station) delivery row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub id: i64,
    pub event_id: EventId,
    pub destination_station: StationId,
    pub status: AckStatus,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Acknowledgement {
    pub fn is_pending(&self) -> bool {
        self.status == AckStatus::Pending
    }
}
