use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

use id_migration_proto::{Identity, MappingSnapshot, MigrationError, MigrationRecord};

/// Persistence boundary for the migration mapping. The engine only ever
/// reads and writes the flat snapshot schema; the medium is the host's
/// choice.
pub trait MappingPersistence: Send + Sync {
    fn load(&self) -> Result<MappingSnapshot, MigrationError>;
    fn persist(&self, snapshot: &MappingSnapshot) -> Result<(), MigrationError>;
}

#[derive(Debug, Default)]
pub struct InMemoryMappingPersistence {
    snapshot: Mutex<MappingSnapshot>,
}

impl InMemoryMappingPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: MappingSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }
}

impl MappingPersistence for InMemoryMappingPersistence {
    fn load(&self) -> Result<MappingSnapshot, MigrationError> {
        Ok(self.snapshot.lock().expect("lock snapshot").clone())
    }

    fn persist(&self, snapshot: &MappingSnapshot) -> Result<(), MigrationError> {
        *self.snapshot.lock().expect("lock snapshot") = snapshot.clone();
        Ok(())
    }
}

/// JSON file persistence. A missing file loads as an empty mapping so
/// first startup needs no provisioning step.
#[derive(Debug, Clone)]
pub struct FileMappingPersistence {
    path: PathBuf,
}

impl FileMappingPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MappingPersistence for FileMappingPersistence {
    fn load(&self) -> Result<MappingSnapshot, MigrationError> {
        if !self.path.exists() {
            return Ok(MappingSnapshot::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn persist(&self, snapshot: &MappingSnapshot) -> Result<(), MigrationError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string(snapshot)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

/// Local view of `from -> to` migration edges. One outgoing edge per
/// identity; a later accepted record for the same `from` overwrites the
/// previous edge. Records are never deleted as a side effect of
/// resolution.
pub struct MigrationStore {
    edges: HashMap<Identity, Identity>,
    persistence: Box<dyn MappingPersistence>,
}

impl MigrationStore {
    pub fn new(persistence: Box<dyn MappingPersistence>) -> Self {
        Self {
            edges: HashMap::new(),
            persistence,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(InMemoryMappingPersistence::new()))
    }

    /// Upserts the edge for `record.from`, persisting the updated snapshot.
    /// Returns whether the in-memory edge changed.
    pub fn record(&mut self, record: &MigrationRecord) -> Result<bool, MigrationError> {
        if record.from == record.to {
            return Err(MigrationError::ValidationFailed {
                reason: "migration record cannot map an identity to itself".to_string(),
            });
        }
        if self.edges.get(&record.from) == Some(&record.to) {
            return Ok(false);
        }
        // Persist first: a persistence failure must not leave the
        // in-memory map ahead of what the caller was told was written.
        let mut snapshot = self.snapshot();
        snapshot.insert(
            record.from.as_str().to_string(),
            record.to.as_str().to_string(),
        );
        self.persistence.persist(&snapshot)?;
        self.edges.insert(record.from.clone(), record.to.clone());
        Ok(true)
    }

    pub fn lookup_direct(&self, id: &Identity) -> Option<Identity> {
        self.edges.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn snapshot(&self) -> MappingSnapshot {
        self.edges
            .iter()
            .map(|(from, to)| (from.as_str().to_string(), to.as_str().to_string()))
            .collect()
    }

    /// Replaces in-memory state from the persistence backend. Entries that
    /// are not valid identities, or that form self-loops, are skipped.
    /// Returns the number of edges loaded.
    pub fn load_persisted(&mut self) -> Result<usize, MigrationError> {
        let snapshot = self.persistence.load()?;
        self.edges.clear();
        for (from_hex, to_hex) in snapshot {
            let edge = Identity::parse(&from_hex).and_then(|from| {
                let to = Identity::parse(&to_hex)?;
                Ok((from, to))
            });
            match edge {
                Ok((from, to)) if from != to => {
                    self.edges.insert(from, to);
                }
                Ok(_) => {
                    warn!(from = %from_hex, "skipping persisted self-loop edge");
                }
                Err(error) => {
                    warn!(from = %from_hex, %error, "skipping malformed persisted edge");
                }
            }
        }
        Ok(self.edges.len())
    }
}
