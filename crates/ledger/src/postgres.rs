//! Postgres-backed ledger.
//!
//! One central database is the ordering authority: events carry a
//! server-side `now()` timestamp with a covering index, and the unique
//! `(event_id, destination_station)` constraint enforces the checklist
//! invariant at the storage layer.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use hubsync_core::{ChangeAction, EntityTag, EventId, ObjectId, StationId};

use crate::ack::{AckStatus, Acknowledgement};
use crate::event::{ChangeEvent, NewChangeEvent};
use crate::store::{LedgerError, SyncLedger};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS change_events (
    id              UUID PRIMARY KEY,
    entity_tag      TEXT NOT NULL,
    object_id       TEXT NOT NULL,
    action          CHAR(1) NOT NULL CHECK (action IN ('C', 'U', 'D')),
    data_payload    JSONB NOT NULL,
    source_station  BIGINT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_change_events_created_at
    ON change_events (created_at);

CREATE TABLE IF NOT EXISTS sync_acknowledgements (
    id                   BIGSERIAL PRIMARY KEY,
    event_id             UUID NOT NULL REFERENCES change_events (id) ON DELETE CASCADE,
    destination_station  BIGINT NOT NULL,
    status               CHAR(1) NOT NULL DEFAULT 'P' CHECK (status IN ('P', 'A')),
    created_at           TIMESTAMPTZ NOT NULL DEFAULT now(),
    acknowledged_at      TIMESTAMPTZ NULL,
    UNIQUE (event_id, destination_station)
);

CREATE INDEX IF NOT EXISTS idx_sync_acknowledgements_status
    ON sync_acknowledgements (status);
"#;

/// Postgres ledger over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PostgresSyncLedger {
    pool: Arc<PgPool>,
}

impl PostgresSyncLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the ledger tables when absent.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_migrate", e))?;
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_migrate", e))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            LedgerError::Conflict(format!("{operation}: {db}"))
        }
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => {
            LedgerError::InvalidAppend(format!("{operation}: {db}"))
        }
        _ => LedgerError::Storage(format!("{operation}: {err}")),
    }
}

fn event_from_row(row: &sqlx::postgres::PgRow) -> Result<ChangeEvent, LedgerError> {
    let id: Uuid = row
        .try_get("id")
        .map_err(|e| LedgerError::Storage(format!("row decode: {e}")))?;
    let entity_tag: String = row
        .try_get("entity_tag")
        .map_err(|e| LedgerError::Storage(format!("row decode: {e}")))?;
    let object_id: String = row
        .try_get("object_id")
        .map_err(|e| LedgerError::Storage(format!("row decode: {e}")))?;
    let action: String = row
        .try_get("action")
        .map_err(|e| LedgerError::Storage(format!("row decode: {e}")))?;
    let payload: serde_json::Value = row
        .try_get("data_payload")
        .map_err(|e| LedgerError::Storage(format!("row decode: {e}")))?;
    let source_station: Option<i64> = row
        .try_get("source_station")
        .map_err(|e| LedgerError::Storage(format!("row decode: {e}")))?;
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| LedgerError::Storage(format!("row decode: {e}")))?;

    let entity: EntityTag = entity_tag
        .parse()
        .map_err(|e| LedgerError::Storage(format!("stored entity tag: {e}")))?;
    let action = ChangeAction::from_code(action.trim())
        .map_err(|e| LedgerError::Storage(format!("stored action: {e}")))?;

    Ok(ChangeEvent {
        id: EventId::from_uuid(id),
        entity,
        object_id: ObjectId::from(object_id),
        action,
        payload,
        source_station: source_station.map(StationId::new),
        timestamp: created_at,
    })
}

fn ack_from_row(row: &sqlx::postgres::PgRow) -> Result<Acknowledgement, LedgerError> {
    let id: i64 = row
        .try_get("id")
        .map_err(|e| LedgerError::Storage(format!("row decode: {e}")))?;
    let event_id: Uuid = row
        .try_get("event_id")
        .map_err(|e| LedgerError::Storage(format!("row decode: {e}")))?;
    let destination: i64 = row
        .try_get("destination_station")
        .map_err(|e| LedgerError::Storage(format!("row decode: {e}")))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| LedgerError::Storage(format!("row decode: {e}")))?;
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| LedgerError::Storage(format!("row decode: {e}")))?;
    let acknowledged_at: Option<DateTime<Utc>> = row
        .try_get("acknowledged_at")
        .map_err(|e| LedgerError::Storage(format!("row decode: {e}")))?;

    let status = match status.trim() {
        "P" => AckStatus::Pending,
        "A" => AckStatus::Acknowledged,
        other => {
            return Err(LedgerError::Storage(format!(
                "stored ack status '{other}'"
            )));
        }
    };

    Ok(Acknowledgement {
        id,
        event_id: EventId::from_uuid(event_id),
        destination_station: StationId::new(destination),
        status,
        created_at,
        acknowledged_at,
    })
}

#[async_trait]
impl SyncLedger for PostgresSyncLedger {
    #[instrument(skip(self, event, destinations), fields(event_id = %event.id, fan_out = destinations.len()), err)]
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_append", e))?;

        let row = sqlx::query(
            r#"
            INSERT INTO change_events (id, entity_tag, object_id, action, data_payload, source_station)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, entity_tag, object_id, action, data_payload, source_station, created_at
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.entity.as_str())
        .bind(event.object_id.as_str())
        .bind(event.action.as_code())
        .bind(&event.payload)
        .bind(event.source_station.map(|s| s.as_i64()))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_event", e))?;

        let stored = event_from_row(&row)?;

        let mut seen = Vec::with_capacity(destinations.len());
        for destination in destinations {
            if seen.contains(destination) {
                continue;
            }
            seen.push(*destination);
            sqlx::query(
                r#"
                INSERT INTO sync_acknowledgements (event_id, destination_station)
                VALUES ($1, $2)
                "#,
            )
            .bind(stored.id.as_uuid())
            .bind(destination.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_acknowledgement", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_append", e))?;

        Ok(stored)
    }

    #[instrument(skip(self), fields(station = %station), err)]
    async fn pending_for(&self, station: StationId) -> Result<Vec<ChangeEvent>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.entity_tag, e.object_id, e.action, e.data_payload,
                   e.source_station, e.created_at
            FROM change_events e
            JOIN sync_acknowledgements a ON a.event_id = e.id
            WHERE a.destination_station = $1 AND a.status = 'P'
            ORDER BY e.created_at ASC
            "#,
        )
        .bind(station.as_i64())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("pending_for", e))?;

        rows.iter().map(event_from_row).collect()
    }

    #[instrument(skip(self), fields(station = %station), err)]
    async fn fully_acknowledged_from(
        &self,
        station: StationId,
    ) -> Result<Vec<EventId>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT e.id
            FROM change_events e
            WHERE e.source_station = $1
              AND NOT EXISTS (
                  SELECT 1 FROM sync_acknowledgements a
                  WHERE a.event_id = e.id AND a.status = 'P'
              )
            ORDER BY e.created_at ASC
            "#,
        )
        .bind(station.as_i64())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fully_acknowledged_from", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<Uuid, _>("id")
                    .map(EventId::from_uuid)
                    .map_err(|e| LedgerError::Storage(format!("row decode: {e}")))
            })
            .collect()
    }

    #[instrument(skip(self, events), fields(station = %station, batch = events.len()), err)]
    async fn acknowledge(
        &self,
        station: StationId,
        events: &[EventId],
    ) -> Result<u64, LedgerError> {
        let ids: Vec<Uuid> = events.iter().map(|e| *e.as_uuid()).collect();
        let result = sqlx::query(
            r#"
            UPDATE sync_acknowledgements
            SET status = 'A', acknowledged_at = now()
            WHERE destination_station = $1
              AND event_id = ANY($2)
              AND status = 'P'
            "#,
        )
        .bind(station.as_i64())
        .bind(&ids)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("acknowledge", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(event_id = %id), err)]
    async fn event(&self, id: EventId) -> Result<Option<ChangeEvent>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT id, entity_tag, object_id, action, data_payload, source_station, created_at
            FROM change_events
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("event", e))?;

        row.as_ref().map(event_from_row).transpose()
    }

    #[instrument(skip(self), fields(event_id = %id), err)]
    async fn acknowledgements_for(
        &self,
        id: EventId,
    ) -> Result<Vec<Acknowledgement>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_id, destination_station, status, created_at, acknowledged_at
            FROM sync_acknowledgements
            WHERE event_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("acknowledgements_for", e))?;

        rows.iter().map(ack_from_row).collect()
    }
}
