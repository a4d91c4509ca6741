//! Metadata records and the record store trait.
//!
//! The record store holds everything except blob bytes: principals and their
//! public keys, sealed vault records, artifact metadata and access grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use consignvault_common::{
    ArtifactId, ArtifactState, ContentHash, Error, PrincipalId, Result, Role, ShipmentId, VaultRef,
};

/// A principal with registered key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRecord {
    pub principal_id: PrincipalId,
    /// SubjectPublicKeyInfo PEM.
    pub public_key_pem: String,
    /// Hex SHA-256 of the public key DER.
    pub fingerprint: String,
    /// Where the matching private key lives.
    pub vault_ref: VaultRef,
    pub created_at: DateTime<Utc>,
}

/// Sealed private key material of one principal.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    pub vault_ref: VaultRef,
    pub principal_id: PrincipalId,
    /// Per-record salt feeding the record key derivation.
    pub salt: Vec<u8>,
    /// nonce || ciphertext || tag.
    pub ciphertext: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for VaultRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultRecord")
            .field("vault_ref", &self.vault_ref)
            .field("principal_id", &self.principal_id)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Persisted metadata of an encrypted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub artifact_id: ArtifactId,
    pub shipment_id: Option<ShipmentId>,
    /// Original file name as supplied by the uploader.
    pub file_name: Option<String>,
    /// SHA-256 of the complete stored blob.
    pub content_hash: ContentHash,
    pub plaintext_len: u64,
    pub blob_size: u64,
    pub state: ArtifactState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One principal's wrapped copy of an artifact's content key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecord {
    pub artifact_id: ArtifactId,
    pub principal_id: PrincipalId,
    pub role: Role,
    /// RSA-OAEP ciphertext of the content key.
    pub wrapped_key: Vec<u8>,
    /// Artifact content hash when the grant was written.
    pub content_hash: ContentHash,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GrantRecord {
    /// Whether this row covers the same (artifact, principal, role) triple.
    pub fn same_triple(&self, other: &GrantRecord) -> bool {
        self.artifact_id == other.artifact_id
            && self.principal_id == other.principal_id
            && self.role == other.role
    }
}

impl std::fmt::Debug for GrantRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantRecord")
            .field("artifact_id", &self.artifact_id)
            .field("principal_id", &self.principal_id)
            .field("role", &self.role)
            .field("content_hash", &self.content_hash.short())
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Persistence for principals, vault records, artifacts and grants.
///
/// Every method is a single atomic unit: either all of its writes land or
/// none do.
pub trait RecordStore: Send + Sync {
    /// Get the store name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// Insert or replace a principal.
    fn put_principal(&self, record: &PrincipalRecord) -> Result<()>;

    /// Look up a principal.
    fn get_principal(&self, id: &PrincipalId) -> Result<Option<PrincipalRecord>>;

    /// All principals, ordered by id.
    fn list_principals(&self) -> Result<Vec<PrincipalRecord>>;

    /// Store a vault record, removing any earlier record of the same
    /// principal.
    fn put_vault_record(&self, record: &VaultRecord) -> Result<()>;

    /// Store a principal's vault record and its principal row together.
    ///
    /// Earlier vault records of the principal are removed in the same unit,
    /// so the principal row always points at a live vault record.
    ///
    /// # Errors
    /// - `InvalidInput` if the two records disagree on principal or vault
    ///   reference
    fn register_principal(&self, vault: &VaultRecord, principal: &PrincipalRecord) -> Result<()>;

    /// Look up a vault record by reference.
    fn get_vault_record(&self, vault_ref: &VaultRef) -> Result<Option<VaultRecord>>;

    /// Persist a new artifact together with its initial grants.
    ///
    /// # Errors
    /// - `AlreadyExists` if the artifact id is taken
    fn create_artifact(&self, artifact: &ArtifactRecord, grants: &[GrantRecord]) -> Result<()>;

    /// Look up an artifact.
    fn get_artifact(&self, id: &ArtifactId) -> Result<Option<ArtifactRecord>>;

    /// All artifacts, oldest first.
    fn list_artifacts(&self) -> Result<Vec<ArtifactRecord>>;

    /// Record a lifecycle transition.
    ///
    /// # Errors
    /// - `NotFound` if the artifact does not exist
    fn update_artifact_state(
        &self,
        id: &ArtifactId,
        state: ArtifactState,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Insert a grant, or refresh the wrapped key, hash and `updated_at` of
    /// the existing row with the same triple. Returns the stored row.
    ///
    /// # Errors
    /// - `NotFound` if the artifact does not exist
    fn upsert_grant(&self, grant: &GrantRecord) -> Result<GrantRecord>;

    /// All grants of an artifact.
    fn list_grants(&self, artifact: &ArtifactId) -> Result<Vec<GrantRecord>>;

    /// Grants of one principal on one artifact (at most one per role).
    fn grants_for(&self, artifact: &ArtifactId, principal: &PrincipalId)
        -> Result<Vec<GrantRecord>>;
}

/// Check that a vault record and a principal row describe the same
/// registration.
pub(crate) fn check_registration(vault: &VaultRecord, principal: &PrincipalRecord) -> Result<()> {
    if vault.principal_id != principal.principal_id {
        return Err(Error::InvalidInput(format!(
            "Vault record of {} cannot register {}",
            vault.principal_id, principal.principal_id
        )));
    }
    if vault.vault_ref != principal.vault_ref {
        return Err(Error::InvalidInput(format!(
            "Principal {} points at {}, not {}",
            principal.principal_id, principal.vault_ref, vault.vault_ref
        )));
    }
    Ok(())
}
