//! Vault settings and the unlocked vault configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use consignvault_common::{Error, Result};
use consignvault_crypto::{aead, derive_key, KdfParams, MasterKey, Salt};

/// Constant sealed under the verification key to check the master secret.
const VERIFICATION_PLAINTEXT: &[u8] = b"CONSIGNVAULT_KEY_VERIFICATION_V1";

/// Settings format version for migration support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultVersion {
    pub major: u32,
    pub minor: u32,
}

impl VaultVersion {
    /// Current settings format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if this version is compatible with the current version.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for VaultVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Persisted vault settings.
///
/// Contains everything needed to re-derive the master key and locate the
/// blob store, but never the key itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSettings {
    /// Settings format version.
    pub version: VaultVersion,
    /// Salt for master key derivation.
    pub salt: Salt,
    /// KDF parameters.
    pub kdf_params: KdfParams,
    /// Blob store provider name (e.g., "local", "memory").
    pub blob_provider: String,
    /// Provider-specific configuration.
    pub blob_config: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub modified_at: DateTime<Utc>,
    /// Verification constant sealed under a key derived from the master key.
    /// Lets a wrong secret be rejected without touching any record.
    pub key_verification: Vec<u8>,
}

impl VaultSettings {
    /// Serialize settings to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize settings from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Unlocked vault configuration: settings plus the derived master key.
///
/// The master key is derived exactly once, when the configuration is built,
/// and shared read-only afterwards. Cloning is cheap.
#[derive(Clone)]
pub struct VaultConfig {
    settings: VaultSettings,
    master_key: Arc<MasterKey>,
}

impl VaultConfig {
    /// Create fresh settings for a new vault and unlock them.
    ///
    /// # Preconditions
    /// - `secret` must not be empty
    /// - `kdf_params` must pass validation
    ///
    /// # Postconditions
    /// - Salt is randomly generated
    /// - Settings carry a sealed verification constant
    ///
    /// # Errors
    /// - Secret empty
    /// - KDF parameters too weak
    pub fn initialize(
        secret: &[u8],
        kdf_params: KdfParams,
        blob_provider: impl Into<String>,
        blob_config: serde_json::Value,
    ) -> Result<Self> {
        let salt = Salt::generate();
        let master_key = derive_key(secret, &salt, &kdf_params)?;
        let key_verification = aead::seal(
            master_key.derive_verification_key().as_bytes(),
            VERIFICATION_PLAINTEXT,
            b"",
        )?;

        let now = Utc::now();
        let settings = VaultSettings {
            version: VaultVersion::CURRENT,
            salt,
            kdf_params,
            blob_provider: blob_provider.into(),
            blob_config,
            created_at: now,
            modified_at: now,
            key_verification,
        };

        debug!(provider = %settings.blob_provider, "Vault settings initialized");
        Ok(Self {
            settings,
            master_key: Arc::new(master_key),
        })
    }

    /// Unlock existing settings with the master secret.
    ///
    /// # Errors
    /// - `InvalidInput` for an incompatible settings version
    /// - `NotPermitted` if the secret is wrong
    pub fn unlock(settings: VaultSettings, secret: &[u8]) -> Result<Self> {
        if !settings.version.is_compatible() {
            return Err(Error::InvalidInput(format!(
                "Incompatible vault version: {}.{}",
                settings.version.major, settings.version.minor
            )));
        }

        let master_key = derive_key(secret, &settings.salt, &settings.kdf_params)?;
        let opened = aead::open(
            master_key.derive_verification_key().as_bytes(),
            &settings.key_verification,
            b"",
        );
        match opened {
            Ok(plaintext) if plaintext == VERIFICATION_PLAINTEXT => {}
            _ => return Err(Error::NotPermitted("Invalid master secret".to_string())),
        }

        Ok(Self {
            settings,
            master_key: Arc::new(master_key),
        })
    }

    /// Persisted settings.
    pub fn settings(&self) -> &VaultSettings {
        &self.settings
    }

    /// The derived master key.
    pub fn master_key(&self) -> &MasterKey {
        &self.master_key
    }
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("settings", &self.settings)
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_version_compatibility() {
        assert!(VaultVersion::CURRENT.is_compatible());
        assert!(!VaultVersion { major: 2, minor: 0 }.is_compatible());
    }

    #[test]
    fn test_initialize_and_unlock() {
        let config = VaultConfig::initialize(
            b"long-lived master secret",
            KdfParams::minimum(),
            "memory",
            serde_json::Value::Null,
        )
        .unwrap();

        let reopened =
            VaultConfig::unlock(config.settings().clone(), b"long-lived master secret").unwrap();
        assert_eq!(
            reopened.master_key().as_bytes(),
            config.master_key().as_bytes()
        );
    }

    #[test]
    fn test_wrong_secret_not_permitted() {
        let config = VaultConfig::initialize(
            b"correct",
            KdfParams::minimum(),
            "memory",
            serde_json::Value::Null,
        )
        .unwrap();

        assert!(matches!(
            VaultConfig::unlock(config.settings().clone(), b"incorrect"),
            Err(Error::NotPermitted(_))
        ));
    }

    #[test]
    fn test_settings_serialization() {
        let config = VaultConfig::initialize(
            b"secret",
            KdfParams::minimum(),
            "local",
            serde_json::json!({"root": "/tmp/artifacts"}),
        )
        .unwrap();

        let json = config.settings().to_json().unwrap();
        assert!(!json.contains("master_key"));
        let restored = VaultSettings::from_json(&json).unwrap();

        assert_eq!(restored.blob_provider, "local");
        assert_eq!(restored.kdf_params, KdfParams::minimum());
        assert!(VaultConfig::unlock(restored, b"secret").is_ok());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = VaultConfig::initialize(
            b"secret",
            KdfParams::minimum(),
            "memory",
            serde_json::Value::Null,
        )
        .unwrap();
        assert!(format!("{:?}", config).contains("[REDACTED]"));
    }
}
