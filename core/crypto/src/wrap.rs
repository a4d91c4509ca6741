//! Asymmetric key wrapping with RSA-OAEP (SHA-256).
//!
//! Each principal owns an RSA key pair. Content keys are wrapped once per
//! recipient under the recipient's public key, and only the matching
//! private key can recover them.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::Zeroizing;

use crate::keys::{ContentKey, KEY_LENGTH};
use consignvault_common::{Error, Result};

/// Smallest accepted modulus size.
pub const MIN_KEY_BITS: usize = 2048;

/// Modulus size used for newly generated principal keys.
pub const DEFAULT_KEY_BITS: usize = 2048;

fn oaep() -> Oaep {
    Oaep::new::<Sha256>()
}

fn check_strength(bits: usize) -> Result<()> {
    if bits < MIN_KEY_BITS {
        return Err(Error::InvalidInput(format!(
            "RSA key of {} bits is below the {}-bit minimum",
            bits, MIN_KEY_BITS
        )));
    }
    Ok(())
}

/// A principal's public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
    fingerprint: String,
}

impl PublicKey {
    fn from_rsa(inner: RsaPublicKey) -> Result<Self> {
        check_strength(inner.size() * 8)?;
        let der = inner
            .to_public_key_der()
            .map_err(|e| Error::Crypto(format!("Failed to encode public key: {}", e)))?;
        let fingerprint = hex::encode(Sha256::digest(der.as_bytes()));
        Ok(Self { inner, fingerprint })
    }

    /// Parse an SPKI PEM public key.
    ///
    /// # Errors
    /// - `InvalidInput` if the PEM is malformed or the key is too small
    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| Error::InvalidInput(format!("Invalid public key PEM: {}", e)))?;
        Self::from_rsa(inner)
    }

    /// Encode as SPKI PEM.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::Crypto(format!("Failed to encode public key: {}", e)))
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.inner.size() * 8
    }

    /// Hex SHA-256 of the DER-encoded SubjectPublicKeyInfo.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &self.bits())
            .field("fingerprint", &&self.fingerprint[..16])
            .finish()
    }
}

/// A principal's private key. The underlying key material is zeroized on drop.
#[derive(Clone)]
pub struct PrivateKey {
    inner: RsaPrivateKey,
}

impl PrivateKey {
    fn from_rsa(inner: RsaPrivateKey) -> Result<Self> {
        check_strength(inner.size() * 8)?;
        Ok(Self { inner })
    }

    /// Parse a PEM private key. PKCS#8 is preferred; PKCS#1 is accepted
    /// for imported keys.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| Error::InvalidInput(format!("Invalid private key PEM: {}", e)))?;
        Self::from_rsa(inner)
    }

    /// Parse a PKCS#8 DER private key.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| Error::InvalidInput(format!("Invalid private key encoding: {}", e)))?;
        Self::from_rsa(inner)
    }

    /// Encode as PKCS#8 PEM.
    pub fn to_pem(&self) -> Result<Zeroizing<String>> {
        self.inner
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::Crypto(format!("Failed to encode private key: {}", e)))
    }

    /// Encode as PKCS#8 DER.
    pub fn to_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let document = self
            .inner
            .to_pkcs8_der()
            .map_err(|e| Error::Crypto(format!("Failed to encode private key: {}", e)))?;
        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }

    /// Derive the matching public key.
    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_rsa(self.inner.to_public_key())
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.inner.size() * 8
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// Freshly generated key pair for a principal.
#[derive(Debug, Clone)]
pub struct PrincipalKeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl PrincipalKeyPair {
    /// Generate a new RSA key pair.
    ///
    /// # Errors
    /// - `InvalidInput` if `bits` is below [`MIN_KEY_BITS`]
    /// - `Crypto` if generation fails
    pub fn generate(bits: usize) -> Result<Self> {
        check_strength(bits)?;
        let inner = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| Error::Crypto(format!("RSA key generation failed: {}", e)))?;
        let private = PrivateKey::from_rsa(inner)?;
        let public = private.public_key()?;
        debug!(bits, fingerprint = &public.fingerprint()[..16], "Generated key pair");
        Ok(Self { private, public })
    }

    /// Build a pair from an existing private key.
    pub fn from_private(private: PrivateKey) -> Result<Self> {
        let public = private.public_key()?;
        Ok(Self { private, public })
    }

    /// The public half.
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// The private half.
    pub fn private(&self) -> &PrivateKey {
        &self.private
    }

    /// Split into private and public halves.
    pub fn into_parts(self) -> (PrivateKey, PublicKey) {
        (self.private, self.public)
    }
}

/// A content key wrapped under one recipient's public key.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    /// Wrap raw bytes read back from storage.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Decode from standard base64.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        BASE64
            .decode(encoded.trim())
            .map(Self)
            .map_err(|e| Error::Serialization(format!("Invalid wrapped key encoding: {}", e)))
    }

    /// Encode as standard base64.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    /// Raw ciphertext bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedKey({} bytes)", self.0.len())
    }
}

impl fmt::Display for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl Serialize for WrappedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for WrappedKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Wrap a content key for one recipient.
///
/// OAEP is randomized, so wrapping the same key twice yields different
/// ciphertexts.
pub fn wrap_key(key: &ContentKey, recipient: &PublicKey) -> Result<WrappedKey> {
    recipient
        .inner
        .encrypt(&mut OsRng, oaep(), key.as_bytes())
        .map(WrappedKey)
        .map_err(|e| Error::Crypto(format!("Key wrapping failed: {}", e)))
}

/// Recover a content key with the recipient's private key.
///
/// # Errors
/// - `KeyMismatch` for any failure: wrong private key, corrupted ciphertext,
///   wrong length. The cause is not distinguished.
pub fn unwrap_key(wrapped: &WrappedKey, private: &PrivateKey) -> Result<ContentKey> {
    let mismatch = || Error::KeyMismatch("Wrapped key does not open with this private key".to_string());

    if wrapped.0.len() != private.inner.size() {
        return Err(mismatch());
    }

    let plain = Zeroizing::new(
        private
            .inner
            .decrypt(oaep(), &wrapped.0)
            .map_err(|_| mismatch())?,
    );
    let bytes: [u8; KEY_LENGTH] = plain.as_slice().try_into().map_err(|_| mismatch())?;
    Ok(ContentKey::from_bytes(bytes))
}
