//! On-disk workspace: settings, record database and artifact blobs under
//! one directory.
//!
//! ```text
//! <root>/custody.json   vault settings (salt, KDF parameters, verifier)
//! <root>/records.db     SQLite record store
//! <root>/artifacts/     local blob store
//! ```

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::{VaultConfig, VaultSettings};
use crate::manager::ArtifactManager;
use consignvault_common::{Error, Result};
use consignvault_crypto::KdfParams;
use consignvault_storage::{create_default_registry, BlobStoreRegistry, SqliteRecordStore};

/// Settings file name.
pub const SETTINGS_FILENAME: &str = "custody.json";

/// Record database file name.
pub const RECORDS_FILENAME: &str = "records.db";

/// Blob directory name.
pub const ARTIFACTS_DIRNAME: &str = "artifacts";

/// An unlocked workspace.
pub struct Workspace {
    root: PathBuf,
    config: VaultConfig,
    manager: ArtifactManager,
}

impl Workspace {
    /// Create a new workspace at `root`.
    ///
    /// # Preconditions
    /// - `root` holds no workspace yet
    ///
    /// # Postconditions
    /// - Settings, record database and blob directory exist
    /// - The returned workspace is unlocked
    ///
    /// # Errors
    /// - `AlreadyExists` if `root` already holds a workspace
    /// - Secret empty or KDF parameters too weak
    pub fn create(root: impl AsRef<Path>, secret: &[u8], kdf_params: KdfParams) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if Self::exists(&root) {
            return Err(Error::AlreadyExists(format!(
                "Workspace already exists at {}",
                root.display()
            )));
        }
        fs::create_dir_all(&root)?;

        let config = VaultConfig::initialize(
            secret,
            kdf_params,
            "local",
            json!({ "root": ARTIFACTS_DIRNAME }),
        )?;
        fs::write(root.join(SETTINGS_FILENAME), config.settings().to_json()?)?;

        info!(root = %root.display(), "Workspace created");
        Self::assemble(root, config, &create_default_registry())
    }

    /// Open and unlock an existing workspace with the built-in blob stores.
    ///
    /// # Errors
    /// - `NotFound` if `root` holds no workspace
    /// - `NotPermitted` if the secret is wrong
    pub fn open(root: impl AsRef<Path>, secret: &[u8]) -> Result<Self> {
        Self::open_with_registry(root, secret, &create_default_registry())
    }

    /// Open and unlock a workspace, resolving its blob store through
    /// `registry`.
    pub fn open_with_registry(
        root: impl AsRef<Path>,
        secret: &[u8],
        registry: &BlobStoreRegistry,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let settings_path = root.join(SETTINGS_FILENAME);
        if !settings_path.exists() {
            return Err(Error::NotFound(format!(
                "No workspace at {}",
                root.display()
            )));
        }

        let settings = VaultSettings::from_json(&fs::read_to_string(&settings_path)?)?;
        let config = VaultConfig::unlock(settings, secret)?;

        info!(root = %root.display(), "Workspace unlocked");
        Self::assemble(root, config, registry)
    }

    /// Check if `root` holds a workspace.
    pub fn exists(root: impl AsRef<Path>) -> bool {
        root.as_ref().join(SETTINGS_FILENAME).exists()
    }

    fn assemble(root: PathBuf, config: VaultConfig, registry: &BlobStoreRegistry) -> Result<Self> {
        let settings = config.settings();
        let blobs = registry.resolve(
            &settings.blob_provider,
            anchor(&settings.blob_config, &root),
        )?;
        let records = SqliteRecordStore::open(root.join(RECORDS_FILENAME))?;
        let manager = ArtifactManager::new(config.clone(), blobs, Arc::new(records));

        Ok(Self {
            root,
            config,
            manager,
        })
    }

    /// Workspace directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Unlocked configuration.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// The artifact manager over this workspace's stores.
    pub fn manager(&self) -> &ArtifactManager {
        &self.manager
    }

    /// Replace the manager, e.g. to change chunk or key sizes.
    pub fn map_manager(mut self, f: impl FnOnce(ArtifactManager) -> ArtifactManager) -> Self {
        self.manager = f(self.manager);
        self
    }
}

/// Resolve a relative `root` in a blob config against the workspace root.
fn anchor(config: &Value, root: &Path) -> Value {
    let mut config = config.clone();
    let anchored = config
        .get("root")
        .and_then(Value::as_str)
        .map(Path::new)
        .filter(|dir| dir.is_relative())
        .map(|dir| root.join(dir).to_string_lossy().into_owned());
    if let Some(dir) = anchored {
        config["root"] = Value::String(dir);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactOptions;
    use crate::roster::Recipient;
    use crate::testing::{id, test_pem, TestKey};
    use tempfile::TempDir;

    #[test]
    fn test_create_and_reopen() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("custody");

        let artifact_id = {
            let workspace = Workspace::create(&root, b"master", KdfParams::minimum()).unwrap();
            assert!(Workspace::exists(&root));
            assert!(root.join(ARTIFACTS_DIRNAME).is_dir());

            let manager = workspace.manager();
            manager
                .principals()
                .import_keypair(&id("alice"), &test_pem(TestKey::A))
                .unwrap();
            manager
                .create(
                    &b"commercial invoice"[..],
                    &[Recipient::owner(id("alice"))],
                    &ArtifactOptions::default(),
                )
                .unwrap()
                .id
        };

        let workspace = Workspace::open(&root, b"master").unwrap();
        assert_eq!(
            workspace
                .manager()
                .read_to_vec(&artifact_id, &id("alice"))
                .unwrap(),
            b"commercial invoice"
        );
        assert!(root
            .join(ARTIFACTS_DIRNAME)
            .join(format!("{}.enc", artifact_id))
            .exists());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let temp = TempDir::new().unwrap();
        Workspace::create(temp.path(), b"right", KdfParams::minimum()).unwrap();

        assert!(matches!(
            Workspace::open(temp.path(), b"wrong"),
            Err(Error::NotPermitted(_))
        ));
    }

    #[test]
    fn test_create_twice_fails() {
        let temp = TempDir::new().unwrap();
        Workspace::create(temp.path(), b"secret", KdfParams::minimum()).unwrap();

        assert!(matches!(
            Workspace::create(temp.path(), b"secret", KdfParams::minimum()),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_open_missing_workspace() {
        let temp = TempDir::new().unwrap();
        assert!(!Workspace::exists(temp.path()));
        assert!(matches!(
            Workspace::open(temp.path(), b"secret"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_anchor_relative_root() {
        let anchored = anchor(&json!({ "root": "artifacts" }), Path::new("/srv/custody"));
        assert_eq!(anchored["root"], json!("/srv/custody/artifacts"));

        let absolute = anchor(&json!({ "root": "/data/blobs" }), Path::new("/srv/custody"));
        assert_eq!(absolute["root"], json!("/data/blobs"));
        assert_eq!(anchor(&Value::Null, Path::new("/srv")), Value::Null);
    }
}
