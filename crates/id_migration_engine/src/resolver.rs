use std::collections::HashSet;

use tracing::warn;

use id_migration_proto::Identity;

use super::store::MigrationStore;

/// Hop bound for chain walking. A chain this deep is treated as store
/// corruption, not a legitimate rotation history.
pub const MAX_RESOLUTION_HOPS: usize = 64;

/// Maps an identity to its current successor by walking migration edges.
/// Cache-only and synchronous; never touches the network. On a detected
/// cycle or hop exhaustion, returns the last well-formed identity reached
/// instead of failing the caller.
pub fn resolve_identity(store: &MigrationStore, id: &Identity) -> Identity {
    migration_history(store, id)
        .pop()
        .unwrap_or_else(|| id.clone())
}

pub fn has_migrated(store: &MigrationStore, id: &Identity) -> bool {
    store.lookup_direct(id).is_some()
}

/// Full visited sequence from `id` to its terminal resolved identity,
/// inclusive. Length 1 when the identity never migrated.
pub fn migration_history(store: &MigrationStore, id: &Identity) -> Vec<Identity> {
    let mut history = vec![id.clone()];
    let mut visited: HashSet<Identity> = HashSet::from([id.clone()]);
    let mut current = id.clone();

    loop {
        let Some(next) = store.lookup_direct(&current) else {
            return history;
        };
        if !visited.insert(next.clone()) {
            warn!(identity = %id, at = %next, "migration chain cycle detected, stopping");
            return history;
        }
        if history.len() >= MAX_RESOLUTION_HOPS {
            warn!(identity = %id, "migration chain exceeded hop bound, stopping");
            return history;
        }
        history.push(next.clone());
        current = next;
    }
}
