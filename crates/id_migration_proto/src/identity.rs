use serde::{Deserialize, Serialize};

use super::error::MigrationError;

pub const IDENTITY_BYTE_LEN: usize = 32;

/// Public-key account handle, held in canonical lowercase hex.
///
/// Construction goes through [`Identity::parse`], so equality on two
/// `Identity` values is byte-exact comparison of the underlying key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn parse(public_key_hex: &str) -> Result<Self, MigrationError> {
        let bytes = parse_identity_bytes(public_key_hex, "identity public key")?;
        Ok(Identity(hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn to_bytes(&self) -> [u8; IDENTITY_BYTE_LEN] {
        let mut bytes = [0u8; IDENTITY_BYTE_LEN];
        // Invariant: the inner string is always valid 64-char hex.
        hex::decode_to_slice(&self.0, &mut bytes).expect("canonical identity hex");
        bytes
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn parse_identity_bytes(
    public_key_hex: &str,
    field: &str,
) -> Result<[u8; IDENTITY_BYTE_LEN], MigrationError> {
    let normalized = public_key_hex.trim();
    if normalized.is_empty() {
        return Err(MigrationError::ValidationFailed {
            reason: format!("{field} cannot be empty"),
        });
    }
    let bytes = hex::decode(normalized).map_err(|_| MigrationError::ValidationFailed {
        reason: format!("{field} must be valid hex"),
    })?;
    bytes
        .try_into()
        .map_err(|_| MigrationError::ValidationFailed {
            reason: format!("{field} must be 32-byte hex"),
        })
}
