//! Local filesystem blob store.

use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::provider::{BlobMetadata, BlobReader, BlobStore, StagedBlob};
use consignvault_common::{ArtifactId, Error, Result};

const BLOB_EXTENSION: &str = "enc";
const STAGING_DIR: &str = ".staging";

/// Local filesystem blob store.
///
/// Committed blobs live at `<root>/<artifact-id>.enc`. Blobs are written to
/// `<root>/.staging/` first and hard-linked into place on commit, so a
/// reader never observes a partially written artifact.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a new local store with the given root directory.
    ///
    /// # Postconditions
    /// - Root and staging directories exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: &ArtifactId) -> PathBuf {
        self.root.join(format!("{}.{}", id.to_hyphenated(), BLOB_EXTENSION))
    }

    fn describe(&self, id: &ArtifactId, path: &Path, fs_meta: fs::Metadata) -> BlobMetadata {
        let modified: DateTime<Utc> = fs_meta
            .modified()
            .map(|t| t.into())
            .unwrap_or_else(|_| Utc::now());

        BlobMetadata {
            id: *id,
            size: fs_meta.len(),
            modified,
            location: path.display().to_string(),
        }
    }
}

struct LocalStagedBlob {
    id: ArtifactId,
    file: File,
    staging_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl Read for LocalStagedBlob {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for LocalStagedBlob {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for LocalStagedBlob {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl StagedBlob for LocalStagedBlob {
    fn commit(mut self: Box<Self>) -> Result<BlobMetadata> {
        self.file.sync_all()?;

        // hard_link refuses to replace an existing file, which keeps blobs
        // write-once even when two writers race on the same id.
        fs::hard_link(&self.staging_path, &self.final_path).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => {
                Error::AlreadyExists(format!("Blob already exists: {}", self.id))
            }
            _ => Error::Io(e),
        })?;
        self.committed = true;

        if let Err(e) = fs::remove_file(&self.staging_path) {
            warn!(artifact = %self.id, error = %e, "Failed to remove staging file");
        }

        let fs_meta = fs::metadata(&self.final_path)?;
        let modified: DateTime<Utc> = fs_meta
            .modified()
            .map(|t| t.into())
            .unwrap_or_else(|_| Utc::now());
        debug!(artifact = %self.id, size = fs_meta.len(), "Blob committed");

        Ok(BlobMetadata {
            id: self.id,
            size: fs_meta.len(),
            modified,
            location: self.final_path.display().to_string(),
        })
    }
}

impl Drop for LocalStagedBlob {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.staging_path);
        }
    }
}

impl BlobStore for LocalBlobStore {
    fn name(&self) -> &str {
        "local"
    }

    fn stage(&self, id: &ArtifactId) -> Result<Box<dyn StagedBlob>> {
        let final_path = self.blob_path(id);
        if final_path.exists() {
            return Err(Error::AlreadyExists(format!("Blob already exists: {}", id)));
        }

        let staging_path = self
            .root
            .join(STAGING_DIR)
            .join(format!("{}-{}.part", id.to_hyphenated(), Uuid::new_v4().simple()));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&staging_path)?;

        Ok(Box::new(LocalStagedBlob {
            id: *id,
            file,
            staging_path,
            final_path,
            committed: false,
        }))
    }

    fn open(&self, id: &ArtifactId) -> Result<Box<dyn BlobReader>> {
        let path = self.blob_path(id);
        match File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Blob not found: {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, id: &ArtifactId) -> Result<bool> {
        Ok(self.blob_path(id).is_file())
    }

    fn delete(&self, id: &ArtifactId) -> Result<()> {
        let path = self.blob_path(id);
        if !path.exists() {
            return Err(Error::NotFound(format!("Blob not found: {}", id)));
        }
        fs::remove_file(&path)?;
        Ok(())
    }

    fn metadata(&self, id: &ArtifactId) -> Result<BlobMetadata> {
        let path = self.blob_path(id);
        if !path.exists() {
            return Err(Error::NotFound(format!("Blob not found: {}", id)));
        }
        let fs_meta = fs::metadata(&path)?;
        Ok(self.describe(id, &path, fs_meta))
    }

    fn list(&self) -> Result<Vec<ArtifactId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BLOB_EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| ArtifactId::parse(s).ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
