use ed25519_dalek::{Signature, Signer, SigningKey};

use id_migration_proto::{
    event_id_digest, Identity, MigrationError, SignedEvent, MIGRATION_EVENT_KIND, P_TAG,
};

/// Signing capability for one identity. Key storage stays with the caller;
/// this wraps an already-loaded key and cross-checks it against the
/// identity it claims to speak for.
#[derive(Debug, Clone)]
pub struct MigrationSigner {
    signing_key: SigningKey,
    identity: Identity,
}

impl MigrationSigner {
    pub fn new(signing_key: SigningKey, identity: Identity) -> Result<Self, MigrationError> {
        let expected = hex::encode(signing_key.verifying_key().to_bytes());
        if expected != identity.as_str() {
            return Err(MigrationError::ValidationFailed {
                reason: "signing public key does not match identity".to_string(),
            });
        }
        Ok(Self {
            signing_key,
            identity,
        })
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let identity = Identity::parse(&hex::encode(signing_key.verifying_key().to_bytes()))
            .expect("verifying key is 32-byte hex");
        Self {
            signing_key,
            identity,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn sign_event(
        &self,
        kind: u32,
        tags: Vec<Vec<String>>,
        content: String,
        created_at: i64,
    ) -> Result<SignedEvent, MigrationError> {
        let pubkey = self.identity.as_str().to_string();
        let digest = event_id_digest(&pubkey, created_at, kind, &tags, &content)?;
        let signature: Signature = self.signing_key.sign(&digest);
        Ok(SignedEvent {
            id: hex::encode(digest),
            pubkey,
            created_at,
            kind,
            tags,
            content,
            sig: hex::encode(signature.to_bytes()),
        })
    }
}

/// Assembles the doubly-signed migration pair: an inner proof authored by
/// the new identity naming the old one, embedded verbatim inside an outer
/// statement authored by the old identity naming the new one.
pub fn build_migration_event(
    old: &MigrationSigner,
    new: &MigrationSigner,
    created_at: i64,
) -> Result<SignedEvent, MigrationError> {
    if old.identity() == new.identity() {
        return Err(MigrationError::ValidationFailed {
            reason: "cannot migrate an identity to itself".to_string(),
        });
    }

    let proof = new.sign_event(
        MIGRATION_EVENT_KIND,
        vec![vec![P_TAG.to_string(), old.identity().as_str().to_string()]],
        String::new(),
        created_at,
    )?;
    let proof_json = serde_json::to_string(&proof)?;

    old.sign_event(
        MIGRATION_EVENT_KIND,
        vec![vec![P_TAG.to_string(), new.identity().as_str().to_string()]],
        proof_json,
        created_at,
    )
}
