use std::io;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    ValidationFailed {
        reason: String,
    },
    TransportFailed {
        reason: String,
        retryable: bool,
    },
    Serde(String),
    Io(String),
}

impl MigrationError {
    pub fn validation(reason: impl Into<String>) -> Self {
        MigrationError::ValidationFailed {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>, retryable: bool) -> Self {
        MigrationError::TransportFailed {
            reason: reason.into(),
            retryable,
        }
    }
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::ValidationFailed { reason } => {
                write!(f, "migration validation failed: {reason}")
            }
            MigrationError::TransportFailed { reason, retryable } => {
                write!(f, "migration transport failed (retryable={retryable}): {reason}")
            }
            MigrationError::Serde(message) => write!(f, "serde error: {message}"),
            MigrationError::Io(message) => write!(f, "io error: {message}"),
        }
    }
}

impl std::error::Error for MigrationError {}

impl From<serde_json::Error> for MigrationError {
    fn from(error: serde_json::Error) -> Self {
        MigrationError::Serde(error.to_string())
    }
}

impl From<io::Error> for MigrationError {
    fn from(error: io::Error) -> Self {
        MigrationError::Io(error.to_string())
    }
}
