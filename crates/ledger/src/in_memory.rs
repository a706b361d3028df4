//! In-memory ledger.

use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use hubsync_core::{EventId, StationId};

use crate::ack::{AckStatus, Acknowledgement};
use crate::event::{ChangeEvent, NewChangeEvent};
use crate::store::{LedgerError, SyncLedger};

/// In-memory append-only ledger.
///
/// Intended for tests/dev. Events are kept in append order, which is also
/// timestamp order within one process.
#[derive(Debug, Default)]
pub struct InMemorySyncLedger {
    events: RwLock<Vec<ChangeEvent>>,
    acks: RwLock<Vec<Acknowledgement>>,
    next_ack_id: AtomicI64,
}

impl InMemorySyncLedger {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            acks: RwLock::new(Vec::new()),
            next_ack_id: AtomicI64::new(1),
        }
    }

    pub fn event_count(&self) -> usize {
        self.events.read().unwrap().len()
    }

    pub fn all_events(&self) -> Vec<ChangeEvent> {
        self.events.read().unwrap().clone()
    }
}

#[async_trait]
impl SyncLedger for InMemorySyncLedger {
    async fn append_event(
        &self,
        event: NewChangeEvent,
        destinations: &[StationId],
    ) -> Result<ChangeEvent, LedgerError> {
        if let Some(source) = event.source_station {
            if destinations.contains(&source) {
                return Err(LedgerError::InvalidAppend(format!(
                    "destination set contains source station {source}"
                )));
            }
        }

        let mut events = self.events.write().unwrap();
        let mut acks = self.acks.write().unwrap();

        if events.iter().any(|e| e.id == event.id) {
            return Err(LedgerError::Conflict(format!(
                "event {} already appended",
                event.id
            )));
        }

        let now = Utc::now();
        let stored = ChangeEvent::from_new(event, now);

        let mut seen = Vec::with_capacity(destinations.len());
        for destination in destinations {
            if seen.contains(destination) {
                continue;
            }
            seen.push(*destination);
            let id = self.next_ack_id.fetch_add(1, Ordering::SeqCst);
            acks.push(Acknowledgement {
                id,
                event_id: stored.id,
                destination_station: *destination,
                status: AckStatus::Pending,
                created_at: now,
                acknowledged_at: None,
            });
        }

        events.push(stored.clone());
        Ok(stored)
    }

    async fn pending_for(&self, station: StationId) -> Result<Vec<ChangeEvent>, LedgerError> {
        let acks = self.acks.read().unwrap();
        let events = self.events.read().unwrap();

        let pending_ids: Vec<EventId> = acks
            .iter()
            .filter(|a| a.destination_station == station && a.is_pending())
            .map(|a| a.event_id)
            .collect();

        // Log order comes from the event vector, not ack creation order.
        Ok(events
            .iter()
            .filter(|e| pending_ids.contains(&e.id))
            .cloned()
            .collect())
    }

    async fn fully_acknowledged_from(
        &self,
        station: StationId,
    ) -> Result<Vec<EventId>, LedgerError> {
        let acks = self.acks.read().unwrap();
        let events = self.events.read().unwrap();

        Ok(events
            .iter()
            .filter(|e| e.source_station == Some(station))
            .filter(|e| {
                !acks
                    .iter()
                    .any(|a| a.event_id == e.id && a.is_pending())
            })
            .map(|e| e.id)
            .collect())
    }

    async fn acknowledge(
        &self,
        station: StationId,
        events: &[EventId],
    ) -> Result<u64, LedgerError> {
        let mut acks = self.acks.write().unwrap();
        let now = Utc::now();
        let mut count = 0u64;
        for ack in acks.iter_mut() {
            if ack.destination_station == station
                && ack.is_pending()
                && events.contains(&ack.event_id)
            {
                ack.status = AckStatus::Acknowledged;
                ack.acknowledged_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn event(&self, id: EventId) -> Result<Option<ChangeEvent>, LedgerError> {
        Ok(self
            .events
            .read()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    async fn acknowledgements_for(
        &self,
        id: EventId,
    ) -> Result<Vec<Acknowledgement>, LedgerError> {
        Ok(self
            .acks
            .read()
            .unwrap()
            .iter()
            .filter(|a| a.event_id == id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hubsync_core::{ChangeAction, EntityTag, ObjectId};

    fn tag() -> EntityTag {
        "drivers.Driver".parse().unwrap()
    }

    fn local_event(object: i64) -> NewChangeEvent {
        NewChangeEvent::local(
            tag(),
            ObjectId::from(object),
            ChangeAction::Created,
            serde_json::json!({"id": object}),
        )
    }

    fn stations(ids: &[i64]) -> Vec<StationId> {
        ids.iter().map(|i| StationId::new(*i)).collect()
    }

    #[tokio::test]
    async fn append_fans_out_one_ack_per_destination() {
        let ledger = InMemorySyncLedger::new();
        let stored = ledger
            .append_event(local_event(1), &stations(&[1, 2, 3]))
            .await
            .unwrap();

        let acks = ledger.acknowledgements_for(stored.id).await.unwrap();
        assert_eq!(acks.len(), 3);
        assert!(acks.iter().all(|a| a.is_pending()));

        let destinations: Vec<i64> = acks
            .iter()
            .map(|a| a.destination_station.as_i64())
            .collect();
        assert_eq!(destinations, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn duplicate_destinations_collapse_to_one_row() {
        let ledger = InMemorySyncLedger::new();
        let stored = ledger
            .append_event(local_event(1), &stations(&[2, 2, 2]))
            .await
            .unwrap();
        assert_eq!(ledger.acknowledgements_for(stored.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn source_station_in_destinations_is_rejected() {
        let ledger = InMemorySyncLedger::new();
        let mut event = local_event(1);
        event.source_station = Some(StationId::new(2));
        let result = ledger.append_event(event, &stations(&[1, 2])).await;
        assert!(matches!(result, Err(LedgerError::InvalidAppend(_))));
    }

    #[tokio::test]
    async fn zero_destinations_make_an_immediately_distributed_event() {
        let ledger = InMemorySyncLedger::new();
        let mut event = local_event(1);
        event.source_station = Some(StationId::new(7));
        let stored = ledger.append_event(event, &[]).await.unwrap();

        assert!(ledger.acknowledgements_for(stored.id).await.unwrap().is_empty());
        let distributed = ledger
            .fully_acknowledged_from(StationId::new(7))
            .await
            .unwrap();
        assert_eq!(distributed, vec![stored.id]);
    }

    #[tokio::test]
    async fn acknowledge_transitions_matching_pending_rows_once() {
        let ledger = InMemorySyncLedger::new();
        let stored = ledger
            .append_event(local_event(1), &stations(&[1, 2]))
            .await
            .unwrap();

        let count = ledger
            .acknowledge(StationId::new(1), &[stored.id])
            .await
            .unwrap();
        assert_eq!(count, 1);

        // Idempotent: the row is no longer Pending.
        let again = ledger
            .acknowledge(StationId::new(1), &[stored.id])
            .await
            .unwrap();
        assert_eq!(again, 0);

        // Unknown event ids affect zero rows.
        let unknown = ledger
            .acknowledge(StationId::new(2), &[EventId::new()])
            .await
            .unwrap();
        assert_eq!(unknown, 0);
    }

    #[tokio::test]
    async fn pending_set_shrinks_as_stations_acknowledge() {
        let ledger = InMemorySyncLedger::new();
        let stored = ledger
            .append_event(local_event(1), &stations(&[1, 2]))
            .await
            .unwrap();

        assert_eq!(ledger.pending_for(StationId::new(1)).await.unwrap().len(), 1);
        ledger
            .acknowledge(StationId::new(1), &[stored.id])
            .await
            .unwrap();
        assert!(ledger.pending_for(StationId::new(1)).await.unwrap().is_empty());
        assert_eq!(ledger.pending_for(StationId::new(2)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fully_acknowledged_requires_every_destination() {
        let ledger = InMemorySyncLedger::new();
        let source = StationId::new(1);
        let mut event = local_event(1);
        event.source_station = Some(source);
        let stored = ledger
            .append_event(event, &stations(&[2, 3]))
            .await
            .unwrap();

        assert!(ledger.fully_acknowledged_from(source).await.unwrap().is_empty());

        ledger.acknowledge(StationId::new(2), &[stored.id]).await.unwrap();
        assert!(ledger.fully_acknowledged_from(source).await.unwrap().is_empty());

        ledger.acknowledge(StationId::new(3), &[stored.id]).await.unwrap();
        assert_eq!(
            ledger.fully_acknowledged_from(source).await.unwrap(),
            vec![stored.id]
        );
    }

    #[tokio::test]
    async fn duplicate_event_id_is_a_conflict() {
        let ledger = InMemorySyncLedger::new();
        let event = local_event(1);
        ledger.append_event(event.clone(), &[]).await.unwrap();
        assert!(matches!(
            ledger.append_event(event, &[]).await,
            Err(LedgerError::Conflict(_))
        ));
    }
}
