//! Identity migration and resolution engine.
//!
//! Verifies doubly-signed migration events, maintains the local
//! old-identity to new-identity mapping, resolves identities across
//! migration chains, fetches missing evidence on demand, and waits for
//! derived effects of a migration to converge.

mod lazy_fetch;
mod poll;
mod resolver;
mod service;
mod signer;
mod store;
mod util;
mod verifier;

#[cfg(test)]
mod engine_tests;

pub use lazy_fetch::{InMemoryMigrationTransport, LazyFetchCoordinator, MigrationTransport};
pub use poll::{
    ConvergencePollWatcher, PollCancelHandle, PollConfig, PollOutcome, DEFAULT_POLL_INTERVAL,
    DEFAULT_POLL_TIMEOUT,
};
pub use resolver::{has_migrated, migration_history, resolve_identity, MAX_RESOLUTION_HOPS};
pub use service::MigrationService;
pub use signer::{build_migration_event, MigrationSigner};
pub use store::{
    FileMappingPersistence, InMemoryMappingPersistence, MappingPersistence, MigrationStore,
};
pub use util::now_ms;
pub use verifier::verify_migration_event;
