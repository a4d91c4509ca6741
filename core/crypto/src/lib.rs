//! Cryptographic primitives for ConsignVault.
//!
//! This module provides:
//! - Streaming AES-256-GCM for artifact blobs
//! - RSA-OAEP key wrapping and principal key pairs
//! - Master key derivation (PBKDF2-HMAC-SHA256 or Argon2id)
//! - XChaCha20-Poly1305 sealing for vault records
//! - SHA-256 content hashing
//!
//! # Security Guarantees
//! - All symmetric key material is zeroized on drop
//! - No plaintext or key material is ever logged
//! - Tag and hash comparisons are constant-time

pub mod aead;
pub mod digest;
pub mod kdf;
pub mod keys;
pub mod stream;
pub mod wrap;

pub use aead::{open, seal};
pub use digest::{content_hash, hash_bytes};
pub use kdf::{derive_key, KdfParams};
pub use keys::{ContentKey, MasterKey, RecordKey, Salt};
pub use stream::{
    decrypt_bytes, encrypt_bytes, ArtifactHeader, DecryptingStream, EncryptingStream, HEADER_SIZE,
};
pub use wrap::{
    unwrap_key, wrap_key, PrincipalKeyPair, PrivateKey, PublicKey, WrappedKey, DEFAULT_KEY_BITS,
    MIN_KEY_BITS,
};
