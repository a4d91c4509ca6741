//! Shared fixtures for unit tests.
//!
//! RSA generation is slow, so each test key is generated once per test
//! binary and handed out as PEM.

use std::sync::{Arc, OnceLock};

use crate::config::VaultConfig;
use crate::manager::ArtifactManager;
use consignvault_common::PrincipalId;
use consignvault_crypto::{KdfParams, PrincipalKeyPair, DEFAULT_KEY_BITS};
use consignvault_storage::{MemoryBlobStore, MemoryRecordStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TestKey {
    A,
    B,
    C,
    D,
    E,
}

static KEY_A: OnceLock<PrincipalKeyPair> = OnceLock::new();
static KEY_B: OnceLock<PrincipalKeyPair> = OnceLock::new();
static KEY_C: OnceLock<PrincipalKeyPair> = OnceLock::new();
static KEY_D: OnceLock<PrincipalKeyPair> = OnceLock::new();
static KEY_E: OnceLock<PrincipalKeyPair> = OnceLock::new();

pub(crate) fn test_pair(key: TestKey) -> &'static PrincipalKeyPair {
    let cell = match key {
        TestKey::A => &KEY_A,
        TestKey::B => &KEY_B,
        TestKey::C => &KEY_C,
        TestKey::D => &KEY_D,
        TestKey::E => &KEY_E,
    };
    cell.get_or_init(|| PrincipalKeyPair::generate(DEFAULT_KEY_BITS).unwrap())
}

/// PKCS#8 PEM of a shared test key.
pub(crate) fn test_pem(key: TestKey) -> String {
    test_pair(key).private().to_pem().unwrap().to_string()
}

pub(crate) fn id(name: &str) -> PrincipalId {
    PrincipalId::new(name).unwrap()
}

/// An in-memory manager plus direct access to its blob store.
pub(crate) fn memory_manager() -> (ArtifactManager, MemoryBlobStore) {
    let config =
        VaultConfig::initialize(b"test secret", KdfParams::minimum(), "memory", serde_json::Value::Null)
            .unwrap();
    let blobs = MemoryBlobStore::new();
    let manager = ArtifactManager::new(
        config,
        Arc::new(blobs.clone()),
        Arc::new(MemoryRecordStore::new()),
    )
    .with_chunk_size(4096);
    (manager, blobs)
}

/// Register `name` with a shared test key.
pub(crate) fn register(manager: &ArtifactManager, name: &str, key: TestKey) -> PrincipalId {
    let principal = id(name);
    manager
        .principals()
        .import_keypair(&principal, &test_pem(key))
        .unwrap();
    principal
}
