use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::MigrationError;

/// Event kind shared by the outer migration statement and the embedded
/// proof; the two are distinguished only by nesting.
pub const MIGRATION_EVENT_KIND: u32 = 1776;

pub const P_TAG: &str = "p";

/// Signed statement as it travels over the relay network.
///
/// For an outer migration event, `content` carries the exact JSON
/// serialization of the complete inner proof event, not a digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl SignedEvent {
    /// First `["p", <hex>]` tag value, if any.
    pub fn first_p_tag(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.len() >= 2 && tag[0] == P_TAG)
            .map(|tag| tag[1].as_str())
    }

    /// Recomputes the canonical id digest for this event's fields.
    pub fn signing_digest(&self) -> Result<[u8; 32], MigrationError> {
        event_id_digest(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }
}

/// Canonical signing payload: serialized as the JSON array
/// `[0, pubkey, created_at, kind, tags, content]`.
#[derive(Serialize)]
pub struct EventSigningPayload<'a>(
    pub u8,
    pub &'a str,
    pub i64,
    pub u32,
    pub &'a [Vec<String>],
    pub &'a str,
);

/// SHA-256 over the canonical signing payload. The lowercase hex of this
/// digest is the event `id`, and signatures are made over the digest bytes.
pub fn event_id_digest(
    pubkey: &str,
    created_at: i64,
    kind: u32,
    tags: &[Vec<String>],
    content: &str,
) -> Result<[u8; 32], MigrationError> {
    let payload = EventSigningPayload(0, pubkey, created_at, kind, tags, content);
    let serialized = serde_json::to_string(&payload)?;
    let digest = Sha256::digest(serialized.as_bytes());
    Ok(digest.into())
}
