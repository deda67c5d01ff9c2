use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::identity::Identity;

/// Validated outcome of accepting a migration event. Immutable once
/// created; a later accepted record for the same `from` supersedes the
/// stored edge rather than mutating this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub from: Identity,
    pub to: Identity,
    pub observed_at_ms: i64,
    pub source_event_id: String,
}

/// Persisted mapping schema: flat dictionary of lowercase-hex old identity
/// to lowercase-hex new identity. No nesting, no version field.
pub type MappingSnapshot = BTreeMap<String, String>;
