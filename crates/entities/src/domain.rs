//! Domain wiring: every registered store plus the registry built over them.

use std::sync::Arc;

use hubsync_core::SyncResult;
use hubsync_registry::EntityRegistry;

use crate::credential::CredentialStore;
use crate::declaration::{CommodityStore, DeclarationStore, PaymentMethodStore};
use crate::driver::DriverStore;
use crate::media::MediaStore;
use crate::path::PathStore;
use crate::station::WorkStationStore;
use crate::truck::{TruckOwnerStore, TruckStore};

/// The full set of domain stores behind one hub instance.
///
/// Typed handles are kept alongside the registry so tests and local write
/// paths can mutate entities directly while the pipelines dispatch through
/// the registry.
#[derive(Clone)]
pub struct SyncDomain {
    pub media: Arc<MediaStore>,
    pub stations: Arc<WorkStationStore>,
    pub credentials: Arc<CredentialStore>,
    pub drivers: Arc<DriverStore>,
    pub truck_owners: Arc<TruckOwnerStore>,
    pub trucks: Arc<TruckStore>,
    pub commodities: Arc<CommodityStore>,
    pub payment_methods: Arc<PaymentMethodStore>,
    pub declarations: Arc<DeclarationStore>,
    pub paths: Arc<PathStore>,
}

impl SyncDomain {
    pub fn new(media_base_url: impl Into<String>) -> Self {
        let media = Arc::new(MediaStore::new(media_base_url));
        let stations = WorkStationStore::arc();
        let credentials = CredentialStore::arc(stations.clone());
        Self {
            drivers: DriverStore::arc(media.clone()),
            truck_owners: TruckOwnerStore::arc(),
            trucks: TruckStore::arc(),
            commodities: CommodityStore::arc(),
            payment_methods: PaymentMethodStore::arc(),
            declarations: DeclarationStore::arc(),
            paths: PathStore::arc(),
            credentials,
            stations,
            media,
        }
    }

    /// Registry over every store this domain ships.
    pub fn full_registry(&self) -> SyncResult<EntityRegistry> {
        let mut registry = EntityRegistry::new();
        registry.register(self.stations.clone())?;
        registry.register(self.drivers.clone())?;
        registry.register(self.truck_owners.clone())?;
        registry.register(self.trucks.clone())?;
        registry.register(self.commodities.clone())?;
        registry.register(self.payment_methods.clone())?;
        registry.register(self.declarations.clone())?;
        registry.register(self.paths.clone())?;
        Ok(registry)
    }

    /// Registry restricted to the configured `SYNCHRONIZABLE_MODELS` list.
    pub fn registry(&self, synchronizable_models: &[String]) -> SyncResult<EntityRegistry> {
        self.full_registry()?.restrict_to(synchronizable_models)
    }
}
