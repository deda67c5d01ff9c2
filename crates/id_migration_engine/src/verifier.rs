use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use tracing::debug;

use id_migration_proto::{
    Identity, MigrationError, MigrationRecord, SignedEvent, MIGRATION_EVENT_KIND,
};

/// Validates that a raw signed event is a legitimate, bidirectionally
/// bound migration and extracts the record, or rejects it.
///
/// Every check must pass; the first failure rejects with no partial
/// effect. A rejection is a diagnostic, never fatal: callers drop the
/// event and move on.
pub fn verify_migration_event(
    raw: &SignedEvent,
    observed_at_ms: i64,
) -> Result<MigrationRecord, MigrationError> {
    let record = check_migration_event(raw, observed_at_ms);
    if let Err(error) = &record {
        debug!(event_id = %raw.id, %error, "rejected migration event");
    }
    record
}

fn check_migration_event(
    raw: &SignedEvent,
    observed_at_ms: i64,
) -> Result<MigrationRecord, MigrationError> {
    if raw.kind != MIGRATION_EVENT_KIND {
        return Err(MigrationError::validation(format!(
            "outer event kind {} is not a migration",
            raw.kind
        )));
    }

    let proof: SignedEvent = serde_json::from_str(&raw.content).map_err(|error| {
        MigrationError::validation(format!("embedded proof is not well-formed JSON: {error}"))
    })?;

    if proof.kind != MIGRATION_EVENT_KIND {
        return Err(MigrationError::validation(format!(
            "embedded proof kind {} is not a migration",
            proof.kind
        )));
    }

    // Outer signature authenticates the old identity's migration claim.
    verify_event_signature(raw, "outer event")?;
    // Proof signature authenticates the new identity's acknowledgment. An
    // attacker holding only the old key cannot produce this.
    verify_event_signature(&proof, "embedded proof")?;

    let from = Identity::parse(&raw.pubkey)?;
    let to = Identity::parse(&proof.pubkey)?;

    // The old identity must name the exact identity that signed the proof,
    // not an arbitrary third pubkey.
    match raw.first_p_tag().map(Identity::parse) {
        Some(Ok(named)) if named == to => {}
        _ => {
            return Err(MigrationError::validation(
                "outer event p-tag does not name the proof signer",
            ));
        }
    }

    // The new identity must acknowledge the specific old identity.
    match proof.first_p_tag().map(Identity::parse) {
        Some(Ok(named)) if named == from => {}
        _ => {
            return Err(MigrationError::validation(
                "embedded proof p-tag does not name the migrating identity",
            ));
        }
    }

    if from == to {
        return Err(MigrationError::validation(
            "self-migration is degenerate and rejected",
        ));
    }

    Ok(MigrationRecord {
        from,
        to,
        observed_at_ms,
        source_event_id: raw.id.clone(),
    })
}

fn verify_event_signature(event: &SignedEvent, field: &str) -> Result<(), MigrationError> {
    let digest = event.signing_digest()?;
    if event.id != hex::encode(digest) {
        return Err(MigrationError::validation(format!(
            "{field} id does not match its canonical digest"
        )));
    }

    let pubkey_bytes = Identity::parse(&event.pubkey)
        .map_err(|_| MigrationError::validation(format!("{field} pubkey must be 32-byte hex")))?
        .to_bytes();
    let verifying_key = VerifyingKey::from_bytes(&pubkey_bytes)
        .map_err(|_| MigrationError::validation(format!("{field} pubkey is not a valid key")))?;

    let sig_bytes: [u8; 64] = hex::decode(&event.sig)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| {
            MigrationError::validation(format!("{field} signature must be 64-byte hex"))
        })?;
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify(&digest, &signature)
        .map_err(|_| MigrationError::validation(format!("{field} signature verification failed")))
}
