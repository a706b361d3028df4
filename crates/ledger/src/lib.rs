//! Event log and acknowledgement ledger.
//!
//! Change events are written once and never modified; acknowledgements are
//! the per-destination delivery checklist created in the same transaction
//! as their event. The [`SyncLedger`] trait abstracts over the in-memory
//! backend (tests/dev) and the Postgres backend (production).

pub mod ack;
pub mod event;
pub mod in_memory;
pub mod postgres;
pub mod store;

pub use ack::{AckStatus, Acknowledgement};
pub use event::{ChangeEvent, NewChangeEvent};
pub use in_memory::InMemorySyncLedger;
pub use postgres::PostgresSyncLedger;
pub use store::{LedgerError, SyncLedger};
