//! Request contexts attached by the auth middleware.

use hubsync_core::StationId;
use hubsync_entities::WorkStation;

/// The authenticated peer station for a request.
///
/// Present on every peer route; the Api-Key middleware inserts it after
/// resolving the bearer token against the credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationContext {
    station: WorkStation,
}

impl StationContext {
    pub fn new(station: WorkStation) -> Self {
        Self { station }
    }

    pub fn station_id(&self) -> StationId {
        self.station.id
    }

    pub fn station(&self) -> &WorkStation {
        &self.station
    }
}
