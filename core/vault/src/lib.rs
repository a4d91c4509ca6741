//! Envelope encryption and multi-principal key vault for ConsignVault.
//!
//! This module provides:
//! - Vault configuration with a master key derived once per unlock
//! - A private key vault sealing principal keys at rest
//! - The principal key registry and the access grant table
//! - The artifact manager: encrypt once, wrap the content key per principal
//! - An on-disk workspace tying settings, records and blobs together
//!
//! # Architecture
//! The vault crate sits between the surrounding application and the
//! storage backends. Plaintext only ever exists in the caller's streams.

pub mod artifact;
pub mod config;
pub mod grants;
pub mod keyvault;
pub mod manager;
pub mod principal;
pub mod roster;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use artifact::{Artifact, ArtifactOptions};
pub use config::{VaultConfig, VaultSettings, VaultVersion};
pub use grants::{AccessGrant, AccessGrantTable};
pub use keyvault::PrivateKeyVault;
pub use manager::ArtifactManager;
pub use principal::{Principal, PrincipalKeys};
pub use roster::{audience, Recipient, RosterMember, ShipmentRoster, StaticRoster};
pub use workspace::Workspace;
