//! Private key vault.
//!
//! Private key material is sealed at rest with XChaCha20-Poly1305 under a
//! per-record key derived from the master key and a fresh random salt. The
//! associated data binds each record to its principal and vault reference,
//! so a sealed row cannot be replayed under another principal.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::VaultConfig;
use consignvault_common::{Error, PrincipalId, Result, SensitiveBytes, VaultRef};
use consignvault_crypto::{aead, Salt};
use consignvault_storage::{RecordStore, VaultRecord};

fn record_aad(principal_id: &PrincipalId, vault_ref: &VaultRef) -> Vec<u8> {
    let mut aad = Vec::with_capacity(principal_id.as_str().len() + 37);
    aad.extend_from_slice(principal_id.as_str().as_bytes());
    aad.push(0);
    aad.extend_from_slice(vault_ref.to_hyphenated().as_bytes());
    aad
}

/// Stores and retrieves private key material for principals.
#[derive(Clone)]
pub struct PrivateKeyVault {
    config: VaultConfig,
    records: Arc<dyn RecordStore>,
}

impl PrivateKeyVault {
    /// Create a vault over a record store.
    pub fn new(config: VaultConfig, records: Arc<dyn RecordStore>) -> Self {
        Self { config, records }
    }

    /// Seal and store a principal's private key, replacing any earlier
    /// record of that principal.
    ///
    /// # Postconditions
    /// - Returns a fresh vault reference
    /// - References previously issued to this principal now miss
    ///
    /// # Security
    /// - The key bytes are never logged
    pub fn store(&self, principal_id: &PrincipalId, private_key: &[u8]) -> Result<VaultRef> {
        let record = self.seal(principal_id, private_key)?;
        self.records.put_vault_record(&record)?;

        info!(principal = %principal_id, vault_ref = %record.vault_ref, "Private key stored");
        Ok(record.vault_ref)
    }

    /// Seal a principal's private key under a fresh vault reference without
    /// writing it. The caller persists the record.
    pub(crate) fn seal(&self, principal_id: &PrincipalId, private_key: &[u8]) -> Result<VaultRecord> {
        if private_key.is_empty() {
            return Err(Error::InvalidInput("Private key material is empty".to_string()));
        }

        let vault_ref = VaultRef::generate();
        let salt = Salt::generate();
        let record_key = self.config.master_key().derive_record_key(&salt);
        let ciphertext = aead::seal(
            record_key.as_bytes(),
            private_key,
            &record_aad(principal_id, &vault_ref),
        )?;

        Ok(VaultRecord {
            vault_ref,
            principal_id: principal_id.clone(),
            salt: salt.as_bytes().to_vec(),
            ciphertext,
            created_at: Utc::now(),
        })
    }

    /// Retrieve private key material by vault reference.
    ///
    /// # Errors
    /// - `VaultMiss` if the reference is unknown or was superseded
    /// - `Integrity` if the record fails authentication (tampered row or
    ///   wrong master key)
    pub fn retrieve(&self, vault_ref: &VaultRef) -> Result<SensitiveBytes> {
        let record = self
            .records
            .get_vault_record(vault_ref)?
            .ok_or_else(|| Error::VaultMiss(format!("No vault record for {}", vault_ref)))?;

        let salt = Salt::from_slice(&record.salt)?;
        let record_key = self.config.master_key().derive_record_key(&salt);
        let plaintext = aead::open(
            record_key.as_bytes(),
            &record.ciphertext,
            &record_aad(&record.principal_id, vault_ref),
        )?;

        debug!(vault_ref = %vault_ref, "Private key retrieved");
        Ok(SensitiveBytes::new(plaintext))
    }
}
