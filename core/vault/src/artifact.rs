//! Artifact handles returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use consignvault_common::{ArtifactId, ArtifactState, ContentHash, Error, Result, ShipmentId};
use consignvault_crypto::content_hash;
use consignvault_storage::{ArtifactRecord, BlobStore};

/// An encrypted artifact as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub shipment_id: Option<ShipmentId>,
    pub file_name: Option<String>,
    /// SHA-256 of the complete stored blob, header included.
    pub content_hash: ContentHash,
    pub plaintext_len: u64,
    pub blob_size: u64,
    pub state: ArtifactState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ArtifactRecord> for Artifact {
    fn from(record: ArtifactRecord) -> Self {
        Self {
            id: record.artifact_id,
            shipment_id: record.shipment_id,
            file_name: record.file_name,
            content_hash: record.content_hash,
            plaintext_len: record.plaintext_len,
            blob_size: record.blob_size,
            state: record.state,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Descriptive metadata supplied at upload time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactOptions {
    pub shipment_id: Option<ShipmentId>,
    pub file_name: Option<String>,
}

impl ArtifactOptions {
    /// Attach the artifact to a shipment.
    pub fn shipment(mut self, shipment_id: ShipmentId) -> Self {
        self.shipment_id = Some(shipment_id);
        self
    }

    /// Record the original file name.
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}

/// Rehash the stored blob and compare it with the recorded content hash.
///
/// # Errors
/// - `TamperDetected` on mismatch
pub(crate) fn verify_blob(blobs: &dyn BlobStore, artifact: &ArtifactRecord) -> Result<ContentHash> {
    let current = content_hash(blobs.open(&artifact.artifact_id)?)?;
    if current != artifact.content_hash {
        warn!(artifact = %artifact.artifact_id, "Blob hash does not match record");
        return Err(Error::TamperDetected(format!(
            "Artifact {} does not match its recorded hash",
            artifact.artifact_id
        )));
    }
    Ok(current)
}
