//! Master key derivation.
//!
//! The vault master key is derived once per process from the long-lived
//! master secret. PBKDF2-HMAC-SHA256 is the default; Argon2id is available
//! for deployments that prefer a memory-hard function.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::keys::{MasterKey, Salt, KEY_LENGTH};
use consignvault_common::{Error, Result};

/// Lowest accepted PBKDF2 iteration count.
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// Default PBKDF2 iteration count.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

/// Parameters for master key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum KdfParams {
    /// PBKDF2 with HMAC-SHA256.
    Pbkdf2Sha256 {
        /// Number of iterations.
        iterations: u32,
    },
    /// Argon2id.
    Argon2id {
        /// Memory cost in KiB (e.g., 65536 = 64 MiB).
        memory_cost: u32,
        /// Number of iterations.
        time_cost: u32,
        /// Degree of parallelism.
        parallelism: u32,
    },
}

impl KdfParams {
    /// Production default: PBKDF2-HMAC-SHA256 with 600,000 iterations.
    pub fn standard() -> Self {
        Self::Pbkdf2Sha256 {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }

    /// The weakest accepted setting. Intended for tests and constrained hosts.
    pub fn minimum() -> Self {
        Self::Pbkdf2Sha256 {
            iterations: MIN_PBKDF2_ITERATIONS,
        }
    }

    /// Argon2id with interactive parameters (64 MiB, 3 passes).
    pub fn argon2id() -> Self {
        Self::Argon2id {
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Reject parameters below the accepted floor.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Pbkdf2Sha256 { iterations } if *iterations < MIN_PBKDF2_ITERATIONS => {
                Err(Error::InvalidInput(format!(
                    "PBKDF2 iterations {} below minimum {}",
                    iterations, MIN_PBKDF2_ITERATIONS
                )))
            }
            Self::Pbkdf2Sha256 { .. } => Ok(()),
            Self::Argon2id {
                memory_cost,
                time_cost,
                parallelism,
            } => Params::new(*memory_cost, *time_cost, *parallelism, Some(KEY_LENGTH))
                .map(|_| ())
                .map_err(|e| Error::InvalidInput(format!("Invalid Argon2id parameters: {}", e))),
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::standard()
    }
}

/// Derive a master key from a secret and salt.
///
/// # Preconditions
/// - `secret` must not be empty
/// - `params` must pass [`KdfParams::validate`]
///
/// # Postconditions
/// - Returns a MasterKey derived from the secret
/// - The derived key is deterministic given the same inputs
///
/// # Security
/// - The secret is not stored or logged
/// - Intermediate buffers are zeroized
pub fn derive_key(secret: &[u8], salt: &Salt, params: &KdfParams) -> Result<MasterKey> {
    if secret.is_empty() {
        return Err(Error::InvalidInput("Master secret cannot be empty".to_string()));
    }
    params.validate()?;

    let mut key_bytes = Zeroizing::new([0u8; KEY_LENGTH]);
    match params {
        KdfParams::Pbkdf2Sha256 { iterations } => {
            pbkdf2::pbkdf2_hmac::<Sha256>(secret, salt.as_bytes(), *iterations, &mut key_bytes[..]);
        }
        KdfParams::Argon2id {
            memory_cost,
            time_cost,
            parallelism,
        } => {
            let argon2_params = Params::new(*memory_cost, *time_cost, *parallelism, Some(KEY_LENGTH))
                .map_err(|e| Error::Crypto(format!("Invalid KDF parameters: {}", e)))?;
            Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params)
                .hash_password_into(secret, salt.as_bytes(), &mut key_bytes[..])
                .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;
        }
    }

    Ok(MasterKey::from_bytes(*key_bytes))
}

/// Verify that a secret produces the expected key.
///
/// This performs constant-time comparison to prevent timing attacks.
pub fn verify_secret(
    secret: &[u8],
    salt: &Salt,
    params: &KdfParams,
    expected: &MasterKey,
) -> Result<bool> {
    let derived = derive_key(secret, salt, params)?;
    Ok(derived.as_bytes().ct_eq(expected.as_bytes()).into())
}
