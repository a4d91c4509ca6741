//! Blob store trait definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Read, Seek, Write};

use consignvault_common::{ArtifactId, Result};

/// Metadata for a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    /// Artifact the blob belongs to.
    pub id: ArtifactId,
    /// Size in bytes, header included.
    pub size: u64,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Provider-specific location (file path, memory key, ...).
    pub location: String,
}

/// A blob being written.
///
/// The artifact is invisible to readers until [`StagedBlob::commit`]
/// succeeds. Dropping a staged blob without committing discards it.
pub trait StagedBlob: Read + Write + Seek + Send {
    /// Publish the blob under its artifact id.
    ///
    /// # Errors
    /// - `AlreadyExists` if a blob was committed under the same id meanwhile
    /// - I/O errors
    fn commit(self: Box<Self>) -> Result<BlobMetadata>;
}

/// Readable, seekable handle onto a committed blob.
pub trait BlobReader: Read + Seek + Send {}

impl<T: Read + Seek + Send> BlobReader for T {}

/// Storage backend for encrypted artifact blobs.
///
/// Blobs are write-once: a committed artifact id can never be overwritten.
/// Implementations must be shareable across threads.
pub trait BlobStore: Send + Sync {
    /// Get the provider name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Start writing a new blob.
    ///
    /// # Preconditions
    /// - No blob is committed under `id`
    ///
    /// # Errors
    /// - `AlreadyExists` if a blob is already committed under `id`
    fn stage(&self, id: &ArtifactId) -> Result<Box<dyn StagedBlob>>;

    /// Open a committed blob for reading.
    ///
    /// # Errors
    /// - `NotFound` if no blob is committed under `id`
    fn open(&self, id: &ArtifactId) -> Result<Box<dyn BlobReader>>;

    /// Check if a blob is committed under `id`.
    fn exists(&self, id: &ArtifactId) -> Result<bool>;

    /// Delete a committed blob.
    ///
    /// Only used to roll back a `create` whose records could not be
    /// persisted.
    ///
    /// # Errors
    /// - `NotFound` if no blob is committed under `id`
    fn delete(&self, id: &ArtifactId) -> Result<()>;

    /// Get metadata for a committed blob.
    fn metadata(&self, id: &ArtifactId) -> Result<BlobMetadata>;

    /// List all committed blob ids.
    fn list(&self) -> Result<Vec<ArtifactId>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_serialization() {
        let metadata = BlobMetadata {
            id: ArtifactId::generate(),
            size: 1024,
            modified: Utc::now(),
            location: "memory".to_string(),
        };

        let json = serde_json::to_string(&metadata).unwrap();
        let deserialized: BlobMetadata = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, metadata);
    }
}
