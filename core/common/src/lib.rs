//! Common utilities and types shared across ConsignVault modules.
//!
//! This module provides foundational types that are used throughout the codebase,
//! ensuring consistency and type safety.

pub mod error;
pub mod types;

pub use error::{Error, ErrorClass, Result};
pub use types::{
    ArtifactId, ArtifactState, ContentHash, PrincipalId, Role, SensitiveBytes, ShipmentId,
    VaultRef,
};
