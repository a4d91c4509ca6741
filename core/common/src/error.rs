//! Common error types for ConsignVault.

use thiserror::Error;

/// Top-level error type for ConsignVault operations.
///
/// Authorization failures, cryptographic failures and malformed input are
/// separate variants so callers can tell "you don't have access" apart from
/// "this file is corrupted".
#[derive(Debug, Error)]
pub enum Error {
    /// The principal holds no grant for the artifact.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The principal has no registered keypair.
    #[error("No key material: {0}")]
    NoKeyMaterial(String),

    /// No existing grant could be unwrapped to re-wrap the content key.
    #[error("No usable existing grant: {0}")]
    NoExistingGrant(String),

    /// AEAD authentication failed.
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// The stored blob no longer matches the hash recorded in the grant.
    #[error("Tamper detected: {0}")]
    TamperDetected(String),

    /// A wrapped key could not be opened with the supplied private key.
    #[error("Key mismatch: {0}")]
    KeyMismatch(String),

    /// Unknown vault reference.
    #[error("Vault miss: {0}")]
    VaultMiss(String),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not permitted.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

/// Coarse classification of an [`Error`] for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller is not allowed to do this.
    Authorization,
    /// Data failed a cryptographic or hash check.
    Integrity,
    /// The request or the stream was malformed.
    Input,
    /// Backing storage failed or a record is missing.
    Storage,
}

impl Error {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::AccessDenied(_)
            | Error::NoKeyMaterial(_)
            | Error::NoExistingGrant(_)
            | Error::KeyMismatch(_)
            | Error::NotPermitted(_) => ErrorClass::Authorization,
            Error::Integrity(_) | Error::TamperDetected(_) | Error::Crypto(_) => {
                ErrorClass::Integrity
            }
            Error::InvalidInput(_) | Error::Serialization(_) | Error::AlreadyExists(_) => {
                ErrorClass::Input
            }
            Error::VaultMiss(_) | Error::Storage(_) | Error::Io(_) | Error::NotFound(_) => {
                ErrorClass::Storage
            }
        }
    }

    /// Whether this error means the caller simply has no access.
    pub fn is_access_failure(&self) -> bool {
        self.class() == ErrorClass::Authorization
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
