//! Identity migration protocol types and wire conventions.

mod error;
mod event;
mod identity;
mod record;

pub use error::MigrationError;
pub use event::{
    event_id_digest, EventSigningPayload, SignedEvent, MIGRATION_EVENT_KIND, P_TAG,
};
pub use identity::Identity;
pub use record::{MappingSnapshot, MigrationRecord};
