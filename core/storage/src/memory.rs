//! In-memory blob and record stores for testing.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, PoisonError, RwLock};

use crate::provider::{BlobMetadata, BlobReader, BlobStore, StagedBlob};
use crate::records::{
    check_registration, ArtifactRecord, GrantRecord, PrincipalRecord, RecordStore, VaultRecord,
};
use consignvault_common::{
    ArtifactId, ArtifactState, Error, PrincipalId, Result, VaultRef,
};

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::Storage("In-memory store lock poisoned".to_string())
}

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Arc<[u8]>,
    modified: DateTime<Utc>,
}

type BlobMap = Arc<RwLock<HashMap<ArtifactId, StoredBlob>>>;

/// In-memory blob store.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Clones share the same storage.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: BlobMap,
}

impl MemoryBlobStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes of a committed blob.
    pub fn raw(&self, id: &ArtifactId) -> Result<Vec<u8>> {
        let blobs = self.blobs.read().map_err(poisoned)?;
        blobs
            .get(id)
            .map(|blob| blob.data.to_vec())
            .ok_or_else(|| Error::NotFound(format!("Blob not found: {}", id)))
    }

    /// Replace the bytes of a committed blob, bypassing write-once
    /// semantics. Simulates out-of-band modification of the storage medium.
    pub fn overwrite_raw(&self, id: &ArtifactId, data: Vec<u8>) -> Result<()> {
        let mut blobs = self.blobs.write().map_err(poisoned)?;
        let blob = blobs
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Blob not found: {}", id)))?;
        blob.data = data.into();
        blob.modified = Utc::now();
        Ok(())
    }

    fn describe(id: &ArtifactId, blob: &StoredBlob) -> BlobMetadata {
        BlobMetadata {
            id: *id,
            size: blob.data.len() as u64,
            modified: blob.modified,
            location: format!("memory:{}", id),
        }
    }
}

struct MemoryStagedBlob {
    id: ArtifactId,
    buffer: Cursor<Vec<u8>>,
    blobs: BlobMap,
}

impl Read for MemoryStagedBlob {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffer.read(buf)
    }
}

impl Write for MemoryStagedBlob {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryStagedBlob {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buffer.seek(pos)
    }
}

impl StagedBlob for MemoryStagedBlob {
    fn commit(self: Box<Self>) -> Result<BlobMetadata> {
        let MemoryStagedBlob { id, buffer, blobs } = *self;
        let mut blobs = blobs.write().map_err(poisoned)?;
        if blobs.contains_key(&id) {
            return Err(Error::AlreadyExists(format!("Blob already exists: {}", id)));
        }
        let blob = StoredBlob {
            data: buffer.into_inner().into(),
            modified: Utc::now(),
        };
        let metadata = MemoryBlobStore::describe(&id, &blob);
        blobs.insert(id, blob);
        Ok(metadata)
    }
}

impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn stage(&self, id: &ArtifactId) -> Result<Box<dyn StagedBlob>> {
        if self.exists(id)? {
            return Err(Error::AlreadyExists(format!("Blob already exists: {}", id)));
        }
        Ok(Box::new(MemoryStagedBlob {
            id: *id,
            buffer: Cursor::new(Vec::new()),
            blobs: Arc::clone(&self.blobs),
        }))
    }

    fn open(&self, id: &ArtifactId) -> Result<Box<dyn BlobReader>> {
        let blobs = self.blobs.read().map_err(poisoned)?;
        let blob = blobs
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("Blob not found: {}", id)))?;
        Ok(Box::new(Cursor::new(Arc::clone(&blob.data))))
    }

    fn exists(&self, id: &ArtifactId) -> Result<bool> {
        Ok(self.blobs.read().map_err(poisoned)?.contains_key(id))
    }

    fn delete(&self, id: &ArtifactId) -> Result<()> {
        self.blobs
            .write()
            .map_err(poisoned)?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Blob not found: {}", id)))
    }

    fn metadata(&self, id: &ArtifactId) -> Result<BlobMetadata> {
        let blobs = self.blobs.read().map_err(poisoned)?;
        blobs
            .get(id)
            .map(|blob| Self::describe(id, blob))
            .ok_or_else(|| Error::NotFound(format!("Blob not found: {}", id)))
    }

    fn list(&self) -> Result<Vec<ArtifactId>> {
        let mut ids: Vec<ArtifactId> = self.blobs.read().map_err(poisoned)?.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

#[derive(Default)]
struct Records {
    principals: BTreeMap<PrincipalId, PrincipalRecord>,
    vault: HashMap<VaultRef, VaultRecord>,
    artifacts: HashMap<ArtifactId, ArtifactRecord>,
    grants: Vec<GrantRecord>,
}

impl Records {
    /// Insert or refresh one grant. Caller holds the write lock.
    fn upsert_grant(&mut self, grant: &GrantRecord) -> GrantRecord {
        match self.grants.iter_mut().find(|g| g.same_triple(grant)) {
            Some(existing) => {
                existing.wrapped_key = grant.wrapped_key.clone();
                existing.content_hash = grant.content_hash;
                existing.updated_at = grant.updated_at;
                existing.clone()
            }
            None => {
                self.grants.push(grant.clone());
                grant.clone()
            }
        }
    }
}

/// In-memory record store.
///
/// A single `RwLock` serializes writers, which makes every trait method
/// atomic and enforces uniqueness per grant triple.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<Records>,
}

impl MemoryRecordStore {
    /// Create a new empty record store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn put_principal(&self, record: &PrincipalRecord) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records
            .principals
            .insert(record.principal_id.clone(), record.clone());
        Ok(())
    }

    fn get_principal(&self, id: &PrincipalId) -> Result<Option<PrincipalRecord>> {
        Ok(self.records.read().map_err(poisoned)?.principals.get(id).cloned())
    }

    fn list_principals(&self) -> Result<Vec<PrincipalRecord>> {
        Ok(self
            .records
            .read()
            .map_err(poisoned)?
            .principals
            .values()
            .cloned()
            .collect())
    }

    fn put_vault_record(&self, record: &VaultRecord) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records
            .vault
            .retain(|_, existing| existing.principal_id != record.principal_id);
        records.vault.insert(record.vault_ref, record.clone());
        Ok(())
    }

    fn register_principal(&self, vault: &VaultRecord, principal: &PrincipalRecord) -> Result<()> {
        check_registration(vault, principal)?;
        let mut records = self.records.write().map_err(poisoned)?;
        records
            .vault
            .retain(|_, existing| existing.principal_id != vault.principal_id);
        records.vault.insert(vault.vault_ref, vault.clone());
        records
            .principals
            .insert(principal.principal_id.clone(), principal.clone());
        Ok(())
    }

    fn get_vault_record(&self, vault_ref: &VaultRef) -> Result<Option<VaultRecord>> {
        Ok(self.records.read().map_err(poisoned)?.vault.get(vault_ref).cloned())
    }

    fn create_artifact(&self, artifact: &ArtifactRecord, grants: &[GrantRecord]) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        if records.artifacts.contains_key(&artifact.artifact_id) {
            return Err(Error::AlreadyExists(format!(
                "Artifact already exists: {}",
                artifact.artifact_id
            )));
        }
        if let Some(stray) = grants.iter().find(|g| g.artifact_id != artifact.artifact_id) {
            return Err(Error::InvalidInput(format!(
                "Grant for {} does not belong to artifact {}",
                stray.artifact_id, artifact.artifact_id
            )));
        }

        records.artifacts.insert(artifact.artifact_id, artifact.clone());
        for grant in grants {
            records.upsert_grant(grant);
        }
        Ok(())
    }

    fn get_artifact(&self, id: &ArtifactId) -> Result<Option<ArtifactRecord>> {
        Ok(self.records.read().map_err(poisoned)?.artifacts.get(id).cloned())
    }

    fn list_artifacts(&self) -> Result<Vec<ArtifactRecord>> {
        let mut artifacts: Vec<ArtifactRecord> = self
            .records
            .read()
            .map_err(poisoned)?
            .artifacts
            .values()
            .cloned()
            .collect();
        artifacts.sort_by_key(|a| (a.created_at, a.artifact_id));
        Ok(artifacts)
    }

    fn update_artifact_state(
        &self,
        id: &ArtifactId,
        state: ArtifactState,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        let artifact = records
            .artifacts
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Artifact not found: {}", id)))?;
        artifact.state = state;
        artifact.updated_at = at;
        Ok(())
    }

    fn upsert_grant(&self, grant: &GrantRecord) -> Result<GrantRecord> {
        let mut records = self.records.write().map_err(poisoned)?;
        if !records.artifacts.contains_key(&grant.artifact_id) {
            return Err(Error::NotFound(format!(
                "Artifact not found: {}",
                grant.artifact_id
            )));
        }
        Ok(records.upsert_grant(grant))
    }

    fn list_grants(&self, artifact: &ArtifactId) -> Result<Vec<GrantRecord>> {
        Ok(self
            .records
            .read()
            .map_err(poisoned)?
            .grants
            .iter()
            .filter(|g| g.artifact_id == *artifact)
            .cloned()
            .collect())
    }

    fn grants_for(
        &self,
        artifact: &ArtifactId,
        principal: &PrincipalId,
    ) -> Result<Vec<GrantRecord>> {
        Ok(self
            .records
            .read()
            .map_err(poisoned)?
            .grants
            .iter()
            .filter(|g| g.artifact_id == *artifact && g.principal_id == *principal)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consignvault_common::{ContentHash, Role};

    fn write_blob(store: &MemoryBlobStore, id: &ArtifactId, data: &[u8]) -> BlobMetadata {
        let mut staged = store.stage(id).unwrap();
        staged.write_all(data).unwrap();
        staged.commit().unwrap()
    }

    fn artifact(id: ArtifactId) -> ArtifactRecord {
        ArtifactRecord {
            artifact_id: id,
            shipment_id: None,
            file_name: Some("invoice.pdf".to_string()),
            content_hash: ContentHash::from_bytes([1u8; 32]),
            plaintext_len: 10,
            blob_size: 54,
            state: ArtifactState::Encrypted,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn grant(id: ArtifactId, who: &str, role: Role, key: u8) -> GrantRecord {
        GrantRecord {
            artifact_id: id,
            principal_id: PrincipalId::new(who).unwrap(),
            role,
            wrapped_key: vec![key; 4],
            content_hash: ContentHash::from_bytes([1u8; 32]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_stage_commit_open() {
        let store = MemoryBlobStore::new();
        let id = ArtifactId::generate();

        let meta = write_blob(&store, &id, b"Hello, World!");
        assert_eq!(meta.size, 13);

        let mut data = Vec::new();
        store.open(&id).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"Hello, World!");
        assert_eq!(store.list().unwrap(), vec![id]);
    }

    #[test]
    fn test_uncommitted_blob_is_invisible() {
        let store = MemoryBlobStore::new();
        let id = ArtifactId::generate();

        let mut staged = store.stage(&id).unwrap();
        staged.write_all(b"partial").unwrap();
        assert!(!store.exists(&id).unwrap());
        drop(staged);

        assert!(matches!(store.open(&id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_blobs_are_write_once() {
        let store = MemoryBlobStore::new();
        let id = ArtifactId::generate();
        write_blob(&store, &id, b"first");

        assert!(matches!(store.stage(&id), Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_concurrent_stage_second_commit_fails() {
        let store = MemoryBlobStore::new();
        let id = ArtifactId::generate();

        let first = store.stage(&id).unwrap();
        let second = store.stage(&id).unwrap();
        first.commit().unwrap();
        assert!(matches!(second.commit(), Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_overwrite_raw_and_delete() {
        let store = MemoryBlobStore::new();
        let id = ArtifactId::generate();
        write_blob(&store, &id, b"original");

        store.overwrite_raw(&id, b"tampered".to_vec()).unwrap();
        assert_eq!(store.raw(&id).unwrap(), b"tampered");

        store.delete(&id).unwrap();
        assert!(matches!(store.delete(&id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_grant_upsert_keeps_one_row() {
        let records = MemoryRecordStore::new();
        let id = ArtifactId::generate();
        records.create_artifact(&artifact(id), &[]).unwrap();

        let first = records.upsert_grant(&grant(id, "alice", Role::Owner, 1)).unwrap();
        let second = records.upsert_grant(&grant(id, "alice", Role::Owner, 2)).unwrap();

        assert_eq!(records.list_grants(&id).unwrap().len(), 1);
        assert_eq!(second.wrapped_key, vec![2; 4]);
        assert_eq!(second.created_at, first.created_at);

        records.upsert_grant(&grant(id, "alice", Role::Authority, 3)).unwrap();
        let alice = PrincipalId::new("alice").unwrap();
        assert_eq!(records.grants_for(&id, &alice).unwrap().len(), 2);
    }

    #[test]
    fn test_grant_requires_artifact() {
        let records = MemoryRecordStore::new();
        let result = records.upsert_grant(&grant(ArtifactId::generate(), "bob", Role::Owner, 1));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_create_artifact_rejects_duplicates() {
        let records = MemoryRecordStore::new();
        let id = ArtifactId::generate();
        records
            .create_artifact(&artifact(id), &[grant(id, "alice", Role::Owner, 1)])
            .unwrap();

        let again = records.create_artifact(&artifact(id), &[grant(id, "mallory", Role::Owner, 9)]);
        assert!(matches!(again, Err(Error::AlreadyExists(_))));
        assert_eq!(records.list_grants(&id).unwrap().len(), 1);
    }

    #[test]
    fn test_vault_record_replaces_previous() {
        let records = MemoryRecordStore::new();
        let alice = PrincipalId::new("alice").unwrap();
        let old = VaultRecord {
            vault_ref: VaultRef::generate(),
            principal_id: alice.clone(),
            salt: vec![0; 32],
            ciphertext: vec![1; 64],
            created_at: Utc::now(),
        };
        let new = VaultRecord {
            vault_ref: VaultRef::generate(),
            ..old.clone()
        };

        records.put_vault_record(&old).unwrap();
        records.put_vault_record(&new).unwrap();

        assert!(records.get_vault_record(&old.vault_ref).unwrap().is_none());
        assert!(records.get_vault_record(&new.vault_ref).unwrap().is_some());
    }

    #[test]
    fn test_register_principal_swaps_both_rows() {
        let records = MemoryRecordStore::new();
        let alice = PrincipalId::new("alice").unwrap();
        let sealed = |salt: u8| VaultRecord {
            vault_ref: VaultRef::generate(),
            principal_id: alice.clone(),
            salt: vec![salt; 32],
            ciphertext: vec![1; 64],
            created_at: Utc::now(),
        };
        let row = |vault: &VaultRecord| PrincipalRecord {
            principal_id: alice.clone(),
            public_key_pem: "-----BEGIN PUBLIC KEY-----".to_string(),
            fingerprint: "cd".repeat(32),
            vault_ref: vault.vault_ref,
            created_at: Utc::now(),
        };

        let first = sealed(0);
        records.register_principal(&first, &row(&first)).unwrap();
        let second = sealed(1);
        records.register_principal(&second, &row(&second)).unwrap();

        let current = records.get_principal(&alice).unwrap().unwrap();
        assert_eq!(current.vault_ref, second.vault_ref);
        assert!(records.get_vault_record(&first.vault_ref).unwrap().is_none());
        assert!(records.get_vault_record(&current.vault_ref).unwrap().is_some());

        // A row pointing elsewhere is refused and nothing changes.
        let third = sealed(2);
        let result = records.register_principal(&third, &row(&first));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(records.get_vault_record(&third.vault_ref).unwrap().is_none());
        assert_eq!(records.get_principal(&alice).unwrap().unwrap().vault_ref, second.vault_ref);
    }
}
