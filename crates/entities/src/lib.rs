//! Registered domain entities and their stores.
//!
//! Every type here participates in sync through an explicit
//! [`hubsync_registry::EntityStore`] implementation: snapshots enumerate
//! fields by hand, scalar application matches field names by hand. The
//! stores are in-memory tables; the station directory and credential store
//! additionally back the delivery API's fan-out and authentication.

pub mod convert;
pub mod credential;
pub mod declaration;
pub mod domain;
pub mod driver;
pub mod media;
pub mod path;
pub mod station;
pub mod table;
pub mod truck;

pub use credential::{CredentialStore, NewStationCredential, StationCredential};
pub use domain::SyncDomain;
pub use driver::{Driver, DriverStore};
pub use media::MediaStore;
pub use station::{StationDirectory, WorkStation, WorkStationStore};
