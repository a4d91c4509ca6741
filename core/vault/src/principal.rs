//! Principal key registry.
//!
//! A principal is usable for envelope encryption once it has a registered
//! key pair: the public key is recorded openly, the private key is sealed in
//! the [`PrivateKeyVault`].

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::keyvault::PrivateKeyVault;
use consignvault_common::{Error, PrincipalId, Result, VaultRef};
use consignvault_crypto::{PrincipalKeyPair, PrivateKey, PublicKey, DEFAULT_KEY_BITS};
use consignvault_storage::{PrincipalRecord, RecordStore};

/// A principal with key material: the capability needed to grant or read.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: PrincipalId,
    pub public_key: PublicKey,
    pub vault_ref: VaultRef,
    pub registered_at: DateTime<Utc>,
}

/// Registry of principal key pairs.
pub struct PrincipalKeys {
    vault: PrivateKeyVault,
    records: Arc<dyn RecordStore>,
    key_bits: usize,
}

impl PrincipalKeys {
    /// Create a registry generating keys of [`DEFAULT_KEY_BITS`].
    pub fn new(vault: PrivateKeyVault, records: Arc<dyn RecordStore>) -> Self {
        Self {
            vault,
            records,
            key_bits: DEFAULT_KEY_BITS,
        }
    }

    /// Set the modulus size for generated keys.
    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Generate and register a fresh key pair.
    ///
    /// Regenerating replaces the previous pair. Grants wrapped under the old
    /// public key stop unwrapping until access is re-granted.
    ///
    /// # Errors
    /// - `InvalidInput` if the configured key size is below the minimum
    pub fn generate_keypair(&self, id: &PrincipalId) -> Result<Principal> {
        let pair = PrincipalKeyPair::generate(self.key_bits)?;
        self.register(id, pair)
    }

    /// Register an existing private key (PKCS#8 or PKCS#1 PEM).
    pub fn import_keypair(&self, id: &PrincipalId, private_pem: &str) -> Result<Principal> {
        let private = PrivateKey::from_pem(private_pem)?;
        self.register(id, PrincipalKeyPair::from_private(private)?)
    }

    fn register(&self, id: &PrincipalId, pair: PrincipalKeyPair) -> Result<Principal> {
        let der = pair.private().to_der()?;
        let sealed = self.vault.seal(id, &der)?;
        let vault_ref = sealed.vault_ref;

        let record = PrincipalRecord {
            principal_id: id.clone(),
            public_key_pem: pair.public().to_pem()?,
            fingerprint: pair.public().fingerprint().to_string(),
            vault_ref,
            created_at: Utc::now(),
        };
        // Both rows land together so the principal never points at a
        // superseded vault record.
        self.records.register_principal(&sealed, &record)?;

        info!(
            principal = %id,
            fingerprint = &record.fingerprint[..16],
            "Key pair registered"
        );

        let (_, public_key) = pair.into_parts();
        Ok(Principal {
            id: id.clone(),
            public_key,
            vault_ref,
            registered_at: record.created_at,
        })
    }

    /// Look up a principal's capability.
    ///
    /// # Errors
    /// - `NoKeyMaterial` if the principal has no registered key pair
    pub fn principal(&self, id: &PrincipalId) -> Result<Principal> {
        let record = self
            .records
            .get_principal(id)?
            .ok_or_else(|| Error::NoKeyMaterial(format!("Principal {} has no key pair", id)))?;

        Ok(Principal {
            id: record.principal_id,
            public_key: PublicKey::from_pem(&record.public_key_pem)?,
            vault_ref: record.vault_ref,
            registered_at: record.created_at,
        })
    }

    /// Check if the principal has a registered key pair.
    pub fn has_key_material(&self, id: &PrincipalId) -> Result<bool> {
        Ok(self.records.get_principal(id)?.is_some())
    }

    /// SubjectPublicKeyInfo PEM of the principal's public key.
    pub fn public_key_pem(&self, id: &PrincipalId) -> Result<String> {
        self.records
            .get_principal(id)?
            .map(|record| record.public_key_pem)
            .ok_or_else(|| Error::NoKeyMaterial(format!("Principal {} has no key pair", id)))
    }

    /// All registered principals.
    pub fn list(&self) -> Result<Vec<PrincipalRecord>> {
        self.records.list_principals()
    }

    /// Fetch the principal's private key from the vault.
    pub(crate) fn private_key(&self, principal: &Principal) -> Result<PrivateKey> {
        let der = self.vault.retrieve(&principal.vault_ref)?;
        PrivateKey::from_der(der.as_bytes())
    }
}
