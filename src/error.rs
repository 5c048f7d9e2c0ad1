// src/error.rs

//! Error types for wixbind
//!
//! Stage-internal validation problems are recorded as diagnostics on the
//! [`Messaging`](crate::messaging::Messaging) sink. The variants here are the
//! conditions that abort an operation outright.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Nonzero status from the installer database service
    #[error("Installer database error {code}: {message}")]
    Database { code: i32, message: String },

    /// Sharing or lock violation reported by the installer database service
    #[error("Installer database is locked ({code}): {message}")]
    LockViolation { code: i32, message: String },

    /// Malformed IDT archive passed to import
    #[error("Invalid IDT file {}: {message}", path.display())]
    InvalidIdt { path: PathBuf, message: String },

    /// A typed field accessor was used against a column of another kind
    #[error("Type mismatch in column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Unrecoverable condition that aborts the whole bind
    #[error("Toolchain error: {0}")]
    Toolchain(String),

    #[error("Invalid GUID: {0}")]
    InvalidGuid(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Manifest(#[from] crate::bundle::manifest::ManifestError),

    #[error(transparent)]
    Version(#[from] crate::bundle::version::VersionError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// True for the lock-violation subclass that commit retries
    pub fn is_lock_violation(&self) -> bool {
        matches!(self, Error::LockViolation { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ffi, message) => {
                let code = ffi.extended_code;
                let message = message.unwrap_or_else(|| ffi.to_string());
                match ffi.code {
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                        Error::LockViolation { code, message }
                    }
                    _ => Error::Database { code, message },
                }
            }
            other => Error::Database {
                code: -1,
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::SerializationError(format!("XML: {e}"))
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::ParseError(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Error::SerializationError(format!("CBOR: {e}"))
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::SerializationError(format!("CBOR: {e}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::ConfigError(e.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(e: uuid::Error) -> Self {
        Error::InvalidGuid(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_maps_to_lock_violation() {
        let ffi = rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY);
        let err: Error = rusqlite::Error::SqliteFailure(ffi, Some("busy".into())).into();
        assert!(err.is_lock_violation());
    }

    #[test]
    fn test_constraint_maps_to_database_error() {
        let ffi = rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT);
        let err: Error = rusqlite::Error::SqliteFailure(ffi, None).into();
        assert!(matches!(err, Error::Database { .. }));
        assert!(!err.is_lock_violation());
    }
}
