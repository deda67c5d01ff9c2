use std::sync::{Arc, Mutex};

use tracing::info;

use id_migration_proto::{Identity, MigrationError, MigrationRecord, SignedEvent};

use super::lazy_fetch::{LazyFetchCoordinator, MigrationTransport};
use super::resolver;
use super::store::MigrationStore;
use super::util::now_ms;
use super::verifier::verify_migration_event;

/// The one migration service instance a host constructs at startup and
/// hands to every consumer. Owns the store, wires the verifier and the
/// lazy-fetch coordinator, and exposes the resolution API.
pub struct MigrationService {
    store: Arc<Mutex<MigrationStore>>,
    coordinator: LazyFetchCoordinator,
}

impl MigrationService {
    pub fn new(transport: Arc<dyn MigrationTransport>, store: MigrationStore) -> Self {
        let store = Arc::new(Mutex::new(store));
        let coordinator = LazyFetchCoordinator::new(transport, store.clone());
        Self { store, coordinator }
    }

    /// Restores the mapping from the store's persistence backend. Called
    /// once at startup before serving resolutions.
    pub fn load_persisted(&self) -> Result<usize, MigrationError> {
        let loaded = self.store.lock().expect("lock store").load_persisted()?;
        info!(edges = loaded, "loaded persisted migration mapping");
        Ok(loaded)
    }

    /// Inbound push path: verifies a raw event from the transport and, on
    /// acceptance, records its edge. Rejections leave the store untouched.
    pub fn ingest(&self, raw: &SignedEvent) -> Result<MigrationRecord, MigrationError> {
        let record = verify_migration_event(raw, now_ms())?;
        self.store.lock().expect("lock store").record(&record)?;
        info!(from = %record.from, to = %record.to, "accepted identity migration");
        Ok(record)
    }

    /// Cache-only resolution; never touches the network.
    pub fn resolve(&self, id: &Identity) -> Identity {
        resolver::resolve_identity(&self.store.lock().expect("lock store"), id)
    }

    pub fn has_migrated(&self, id: &Identity) -> bool {
        resolver::has_migrated(&self.store.lock().expect("lock store"), id)
    }

    pub fn migration_history(&self, id: &Identity) -> Vec<Identity> {
        resolver::migration_history(&self.store.lock().expect("lock store"), id)
    }

    /// Resolution with on-demand evidence fetch. Resolves from the cache
    /// when it already answers; otherwise awaits one (deduplicated)
    /// transport query scoped to `scope` and re-resolves. An identity with
    /// no discoverable migration resolves to itself; only genuine
    /// transport failure is an error.
    pub async fn resolve_lazy(
        &self,
        id: &Identity,
        scope: &str,
    ) -> Result<Identity, MigrationError> {
        let resolved = self.resolve(id);
        if resolved != *id {
            return Ok(resolved);
        }
        self.coordinator.fetch(id, scope).await?;
        Ok(self.resolve(id))
    }

    pub fn snapshot(&self) -> id_migration_proto::MappingSnapshot {
        self.store.lock().expect("lock store").snapshot()
    }
}
