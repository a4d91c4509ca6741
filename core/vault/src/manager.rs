//! Artifact manager: envelope encryption of uploaded files.
//!
//! Every artifact is encrypted under its own content key. The key is never
//! stored; each authorized principal receives a copy wrapped under its
//! public key, recorded as an access grant.

use chrono::Utc;
use std::collections::{BTreeSet, HashSet};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::artifact::{verify_blob, Artifact, ArtifactOptions};
use crate::config::VaultConfig;
use crate::grants::{AccessGrant, AccessGrantTable};
use crate::keyvault::PrivateKeyVault;
use crate::principal::PrincipalKeys;
use crate::roster::{audience, Recipient, ShipmentRoster};
use consignvault_common::{
    ArtifactId, ArtifactState, ContentHash, Error, PrincipalId, Result, Role, ShipmentId,
};
use consignvault_crypto::stream::DEFAULT_CHUNK_SIZE;
use consignvault_crypto::{content_hash, unwrap_key, ContentKey, DecryptingStream, EncryptingStream};
use consignvault_storage::{ArtifactRecord, BlobStore, RecordStore};

/// Creates, reads and shares encrypted artifacts.
///
/// All state lives in the blob and record stores, so a manager can be
/// shared across threads behind an `Arc`.
pub struct ArtifactManager {
    vault: PrivateKeyVault,
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    principals: Arc<PrincipalKeys>,
    grants: AccessGrantTable,
    chunk_size: usize,
}

impl ArtifactManager {
    /// Create a manager over the given stores.
    pub fn new(
        config: VaultConfig,
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        let vault = PrivateKeyVault::new(config, records.clone());
        let principals = Arc::new(PrincipalKeys::new(vault.clone(), records.clone()));
        let grants = AccessGrantTable::new(records.clone(), blobs.clone(), principals.clone());
        Self {
            vault,
            blobs,
            records,
            principals,
            grants,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the streaming chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set the RSA modulus size for generated key pairs.
    pub fn with_key_bits(mut self, bits: usize) -> Self {
        let principals = Arc::new(
            PrincipalKeys::new(self.vault.clone(), self.records.clone()).with_key_bits(bits),
        );
        self.grants =
            AccessGrantTable::new(self.records.clone(), self.blobs.clone(), principals.clone());
        self.principals = principals;
        self
    }

    /// The principal key registry.
    pub fn principals(&self) -> &PrincipalKeys {
        &self.principals
    }

    /// The access grant table.
    pub fn grant_table(&self) -> &AccessGrantTable {
        &self.grants
    }

    /// Encrypt a plaintext stream and grant access to `recipients`.
    ///
    /// # Preconditions
    /// - At least one recipient
    /// - Every recipient has a registered key pair
    ///
    /// # Postconditions
    /// - The blob is committed and the artifact is ENCRYPTED
    /// - One grant per distinct (principal, role) pair
    ///
    /// # Errors
    /// - `InvalidInput` if there are no recipients
    /// - `NoKeyMaterial` if any recipient lacks a key pair; nothing is
    ///   encrypted or stored
    ///
    /// # Security
    /// - Fresh content key and nonce per call
    /// - On failure no blob and no grant remain
    pub fn create<R: Read>(
        &self,
        reader: R,
        recipients: &[Recipient],
        options: &ArtifactOptions,
    ) -> Result<Artifact> {
        if recipients.is_empty() {
            return Err(Error::InvalidInput(
                "An artifact needs at least one recipient".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            if seen.insert(recipient) {
                let principal = self.principals.principal(&recipient.principal_id)?;
                resolved.push((principal, recipient.role));
            }
        }

        let id = ArtifactId::generate();
        let key = ContentKey::generate();
        debug!(artifact = %id, state = %ArtifactState::PendingEncryption, "Encrypting artifact");

        let mut staged = self.blobs.stage(&id)?;
        let header = EncryptingStream::new(&key)
            .with_chunk_size(self.chunk_size)
            .encrypt_stream(reader, &mut staged)?;
        staged.seek(SeekFrom::Start(0))?;
        let hash = content_hash(&mut staged)?;

        let grants = resolved
            .iter()
            .map(|(principal, role)| self.grants.prepare(&id, principal, *role, &key, &hash))
            .collect::<Result<Vec<_>>>()?;

        let metadata = staged.commit()?;
        let now = Utc::now();
        let record = ArtifactRecord {
            artifact_id: id,
            shipment_id: options.shipment_id.clone(),
            file_name: options.file_name.clone(),
            content_hash: hash,
            plaintext_len: header.plaintext_len,
            blob_size: metadata.size,
            state: ArtifactState::Encrypted,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.records.create_artifact(&record, &grants) {
            if let Err(cleanup) = self.blobs.delete(&id) {
                warn!(artifact = %id, error = %cleanup, "Failed to remove blob after aborted create");
            }
            return Err(e);
        }

        info!(
            artifact = %id,
            bytes = header.plaintext_len,
            grants = grants.len(),
            hash = %hash.short(),
            "Artifact created"
        );
        Ok(record.into())
    }

    /// Encrypt an upload for a shipment.
    ///
    /// The uploader becomes OWNER, active assigned handlers ASSIGNED and the
    /// active authority pool AUTHORITY. Roster members without a key pair
    /// are skipped.
    ///
    /// # Errors
    /// - `NoKeyMaterial` if the uploader has no key pair
    pub fn create_for_shipment<R: Read>(
        &self,
        reader: R,
        shipment: &ShipmentId,
        uploader: &PrincipalId,
        roster: &dyn ShipmentRoster,
        file_name: Option<String>,
    ) -> Result<Artifact> {
        self.principals.principal(uploader)?;

        let mut recipients = Vec::new();
        for recipient in audience(uploader, shipment, roster)? {
            if recipient.role != Role::Owner
                && !self.principals.has_key_material(&recipient.principal_id)?
            {
                warn!(
                    shipment = %shipment,
                    principal = %recipient.principal_id,
                    role = %recipient.role,
                    "Skipping recipient without key pair"
                );
                continue;
            }
            recipients.push(recipient);
        }

        let options = ArtifactOptions {
            shipment_id: Some(shipment.clone()),
            file_name,
        };
        self.create(reader, &recipients, &options)
    }

    /// Decrypt an artifact for `principal_id` into `writer`.
    ///
    /// Nothing is written unless the ciphertext authenticates. Returns the
    /// number of plaintext bytes written.
    ///
    /// # Errors
    /// - `NotFound` if the artifact does not exist
    /// - `AccessDenied` if the principal holds no grant
    /// - `TamperDetected` if the blob no longer matches the grant's hash
    /// - `KeyMismatch` if the grant does not open with the principal's
    ///   current private key
    /// - `Integrity` if AEAD authentication fails
    pub fn read<W: Write>(
        &self,
        id: &ArtifactId,
        principal_id: &PrincipalId,
        writer: W,
    ) -> Result<u64> {
        let artifact = self.record(id)?;
        let grant = self.grants.resolve(id, principal_id)?.ok_or_else(|| {
            Error::AccessDenied(format!("{} holds no grant on {}", principal_id, id))
        })?;

        let mut blob = self.blobs.open(id)?;
        let current = content_hash(&mut blob)?;
        if current != grant.content_hash {
            warn!(artifact = %id, principal = %principal_id, "Blob hash does not match grant");
            return Err(Error::TamperDetected(format!(
                "Artifact {} changed since access was granted",
                id
            )));
        }

        let principal = self.principals.principal(principal_id)?;
        let private = self.principals.private_key(&principal)?;
        let key = unwrap_key(&grant.wrapped_key, &private)?;

        blob.seek(SeekFrom::Start(0))?;
        let written = DecryptingStream::new(&key)
            .with_chunk_size(self.chunk_size)
            .decrypt_stream(&mut blob, writer)?;

        // The plaintext is already out; a failed state write must not turn
        // the read into an error.
        if let Err(e) = self.advance(&artifact, ArtifactState::Readable) {
            warn!(artifact = %id, error = %e, "Failed to record read state");
        }
        info!(artifact = %id, principal = %principal_id, role = %grant.role, "Artifact read");
        Ok(written)
    }

    /// Decrypt an artifact into memory.
    pub fn read_to_vec(&self, id: &ArtifactId, principal_id: &PrincipalId) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.read(id, principal_id, &mut out)?;
        Ok(out.into_inner())
    }

    /// Give a further principal access without touching the blob.
    ///
    /// # Errors
    /// - `NotFound` if the artifact does not exist
    /// - `TamperDetected` if the blob no longer matches its recorded hash
    /// - `NoKeyMaterial` if the principal has no key pair
    /// - `NoExistingGrant` if no existing grant can be unwrapped
    pub fn add_access(
        &self,
        id: &ArtifactId,
        principal_id: &PrincipalId,
        role: Role,
    ) -> Result<AccessGrant> {
        let artifact = self.record(id)?;
        let grant = self.grants.grant(id, principal_id, role)?;
        self.advance(&artifact, ArtifactState::AccessExpanded)?;
        Ok(grant)
    }

    /// Recompute the blob hash and compare it with the recorded one.
    ///
    /// # Errors
    /// - `TamperDetected` on mismatch
    pub fn verify(&self, id: &ArtifactId) -> Result<ContentHash> {
        let artifact = self.record(id)?;
        verify_blob(self.blobs.as_ref(), &artifact)
    }

    /// Look up an artifact.
    pub fn artifact(&self, id: &ArtifactId) -> Result<Artifact> {
        self.record(id).map(Artifact::from)
    }

    /// All artifacts, oldest first.
    pub fn list_artifacts(&self) -> Result<Vec<Artifact>> {
        Ok(self
            .records
            .list_artifacts()?
            .into_iter()
            .map(Artifact::from)
            .collect())
    }

    /// All grants of an artifact.
    pub fn grants(&self, id: &ArtifactId) -> Result<Vec<AccessGrant>> {
        self.record(id)?;
        self.grants.grants(id)
    }

    /// Principals able to read the artifact without re-wrapping.
    pub fn authorized_principals(&self, id: &ArtifactId) -> Result<BTreeSet<PrincipalId>> {
        self.record(id)?;
        self.grants.authorized_principals(id)
    }

    fn record(&self, id: &ArtifactId) -> Result<ArtifactRecord> {
        self.records
            .get_artifact(id)?
            .ok_or_else(|| Error::NotFound(format!("Artifact not found: {}", id)))
    }

    fn advance(&self, artifact: &ArtifactRecord, next: ArtifactState) -> Result<()> {
        if artifact.state == next {
            return Ok(());
        }
        if !artifact.state.can_transition_to(next) {
            return Err(Error::NotPermitted(format!(
                "Artifact {} cannot move from {} to {}",
                artifact.artifact_id, artifact.state, next
            )));
        }
        self.records
            .update_artifact_state(&artifact.artifact_id, next, Utc::now())?;
        debug!(artifact = %artifact.artifact_id, from = %artifact.state, to = %next, "State changed");
        Ok(())
    }
}
