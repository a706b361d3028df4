//! The ledger abstraction.

use async_trait::async_trait;
use thiserror::Error;

use hubsync_core::{EventId, StationId};

use crate::ack::Acknowledgement;
use crate::event::{ChangeEvent, NewChangeEvent};

#[derive(Debug, Error)]
pub enum LedgerError {
    /// A uniqueness rule was violated (duplicate event id, duplicate
    /// (event, station) pair).
    #[error("ledger conflict: {0}")]
    Conflict(String),

    /// The append was malformed (e.g. a destination equal to the source).
    #[error("invalid append: {0}")]
    InvalidAppend(String),

    /// Backend failure (connection, transaction, serialization).
    #[error("ledger storage error: {0}")]
    Storage(String),
}

/// Append-only event log plus the per-destination delivery checklist.
///
/// `append_event` must create the event and all its acknowledgement rows in
/// one transaction; a half-fanned-out event would break the distributed
/// predicate ("no pending child remains").
#[async_trait]
pub trait SyncLedger: Send + Sync {
    /// Persist one event and one Pending acknowledgement per destination.
    ///
    /// Destinations must not contain the event's source station; duplicates
    /// in the slice collapse to one row.
    async fn append_event(
        &self,
        event: NewChangeEvent,
        destinations: &[StationId],
    ) -> Result<ChangeEvent, LedgerError>;

    /// Events with a Pending acknowledgement for `station`, in log order.
    async fn pending_for(&self, station: StationId) -> Result<Vec<ChangeEvent>, LedgerError>;

    /// Ids of events pushed by `station` for which no Pending
    /// acknowledgement remains anywhere, i.e. the "distributed" signal.
    async fn fully_acknowledged_from(
        &self,
        station: StationId,
    ) -> Result<Vec<EventId>, LedgerError>;

    /// Transition all matching (destination = `station`, event ∈ `events`,
    /// Pending) rows to Acknowledged in one statement. Returns the number
    /// of rows transitioned.
    async fn acknowledge(
        &self,
        station: StationId,
        events: &[EventId],
    ) -> Result<u64, LedgerError>;

    /// Load one event (administrative inspection).
    async fn event(&self, id: EventId) -> Result<Option<ChangeEvent>, LedgerError>;

    /// All acknowledgement rows of one event (administrative inspection).
    async fn acknowledgements_for(
        &self,
        id: EventId,
    ) -> Result<Vec<Acknowledgement>, LedgerError>;
}
