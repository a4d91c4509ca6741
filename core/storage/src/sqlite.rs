//! SQLite implementation of the RecordStore trait.
//!
//! This is the persistent record backend used by on-disk workspaces. It uses
//! rusqlite with bundled SQLite. Grant uniqueness per (artifact, principal,
//! role) is a table constraint, and every multi-row write runs in one
//! transaction.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::migration;
use crate::records::{
    check_registration, ArtifactRecord, GrantRecord, PrincipalRecord, RecordStore, VaultRecord,
};
use consignvault_common::{
    ArtifactId, ArtifactState, ContentHash, Error, PrincipalId, Result, Role, ShipmentId, VaultRef,
};

const PRINCIPAL_COLUMNS: &str = "principal_id, public_key_pem, fingerprint, vault_ref, created_at";

const VAULT_COLUMNS: &str = "vault_ref, principal_id, salt, ciphertext, created_at";

const ARTIFACT_COLUMNS: &str = "artifact_id, shipment_id, file_name, content_hash, plaintext_len, \
     blob_size, state, created_at, updated_at";

const GRANT_COLUMNS: &str =
    "artifact_id, principal_id, role, wrapped_key, content_hash, created_at, updated_at";

const UPSERT_GRANT: &str = "INSERT INTO access_grants
        (artifact_id, principal_id, role, wrapped_key, content_hash, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT (artifact_id, principal_id, role) DO UPDATE SET
        wrapped_key = excluded.wrapped_key,
        content_hash = excluded.content_hash,
        updated_at = excluded.updated_at";

/// Map a rusqlite error into the shared error type.
pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    Error::Storage(format!("Database error: {}", e))
}

/// Fixed-width timestamp so lexical order equals chronological order.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parsed<T>(row: &Row<'_>, idx: usize, parse: impl FnOnce(&str) -> Result<T>) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    parse(&text).map_err(|e| conversion(idx, e))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

fn row_to_principal(row: &Row<'_>) -> rusqlite::Result<PrincipalRecord> {
    Ok(PrincipalRecord {
        principal_id: parsed(row, 0, |s| PrincipalId::new(s))?,
        public_key_pem: row.get(1)?,
        fingerprint: row.get(2)?,
        vault_ref: parsed(row, 3, VaultRef::parse)?,
        created_at: time_at(row, 4)?,
    })
}

fn row_to_vault_record(row: &Row<'_>) -> rusqlite::Result<VaultRecord> {
    Ok(VaultRecord {
        vault_ref: parsed(row, 0, VaultRef::parse)?,
        principal_id: parsed(row, 1, |s| PrincipalId::new(s))?,
        salt: row.get(2)?,
        ciphertext: row.get(3)?,
        created_at: time_at(row, 4)?,
    })
}

fn row_to_artifact(row: &Row<'_>) -> rusqlite::Result<ArtifactRecord> {
    let shipment: Option<String> = row.get(1)?;
    let plaintext_len: i64 = row.get(4)?;
    let blob_size: i64 = row.get(5)?;

    Ok(ArtifactRecord {
        artifact_id: parsed(row, 0, ArtifactId::parse)?,
        shipment_id: shipment
            .map(ShipmentId::new)
            .transpose()
            .map_err(|e| conversion(1, e))?,
        file_name: row.get(2)?,
        content_hash: parsed(row, 3, ContentHash::from_hex)?,
        plaintext_len: plaintext_len as u64,
        blob_size: blob_size as u64,
        state: parsed(row, 6, |s| s.parse())?,
        created_at: time_at(row, 7)?,
        updated_at: time_at(row, 8)?,
    })
}

fn row_to_grant(row: &Row<'_>) -> rusqlite::Result<GrantRecord> {
    Ok(GrantRecord {
        artifact_id: parsed(row, 0, ArtifactId::parse)?,
        principal_id: parsed(row, 1, |s| PrincipalId::new(s))?,
        role: parsed(row, 2, |s| s.parse::<Role>())?,
        wrapped_key: row.get(3)?,
        content_hash: parsed(row, 4, ContentHash::from_hex)?,
        created_at: time_at(row, 5)?,
        updated_at: time_at(row, 6)?,
    })
}

fn artifact_exists(conn: &Connection, id: &ArtifactId) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM artifacts WHERE artifact_id = ?1",
        params![id.to_hyphenated()],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(db_err)
}

fn upsert_principal_row(conn: &Connection, record: &PrincipalRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO principals (principal_id, public_key_pem, fingerprint, vault_ref, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (principal_id) DO UPDATE SET
            public_key_pem = excluded.public_key_pem,
            fingerprint = excluded.fingerprint,
            vault_ref = excluded.vault_ref,
            created_at = excluded.created_at",
        params![
            record.principal_id.as_str(),
            record.public_key_pem,
            record.fingerprint,
            record.vault_ref.to_hyphenated(),
            timestamp(&record.created_at),
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Delete the principal's earlier vault rows and insert `record`.
fn replace_vault_row(conn: &Connection, record: &VaultRecord) -> Result<()> {
    conn.execute(
        "DELETE FROM vault_records WHERE principal_id = ?1",
        params![record.principal_id.as_str()],
    )
    .map_err(db_err)?;
    conn.execute(
        &format!("INSERT INTO vault_records ({}) VALUES (?1, ?2, ?3, ?4, ?5)", VAULT_COLUMNS),
        params![
            record.vault_ref.to_hyphenated(),
            record.principal_id.as_str(),
            record.salt,
            record.ciphertext,
            timestamp(&record.created_at),
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

fn upsert_grant_row(conn: &Connection, grant: &GrantRecord) -> Result<()> {
    conn.execute(
        UPSERT_GRANT,
        params![
            grant.artifact_id.to_hyphenated(),
            grant.principal_id.as_str(),
            grant.role.as_str(),
            grant.wrapped_key,
            grant.content_hash.to_hex(),
            timestamp(&grant.created_at),
            timestamp(&grant.updated_at),
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

/// SQLite-based record store.
///
/// Thread-safe via an internal Mutex around the single connection.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(db_err)?;
        debug!(path = %path.as_ref().display(), "Opened record database");
        Self::init(conn)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(db_err)?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true).map_err(db_err)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Storage(format!("Connection mutex poisoned: {}", e)))?;
        f(&conn)
    }

    fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| Error::Storage(format!("Connection mutex poisoned: {}", e)))?;
        f(&mut conn)
    }
}

impl RecordStore for SqliteRecordStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn put_principal(&self, record: &PrincipalRecord) -> Result<()> {
        self.with_conn(|conn| upsert_principal_row(conn, record))
    }

    fn get_principal(&self, id: &PrincipalId) -> Result<Option<PrincipalRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM principals WHERE principal_id = ?1", PRINCIPAL_COLUMNS),
                params![id.as_str()],
                row_to_principal,
            )
            .optional()
            .map_err(db_err)
        })
    }

    fn list_principals(&self) -> Result<Vec<PrincipalRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM principals ORDER BY principal_id",
                    PRINCIPAL_COLUMNS
                ))
                .map_err(db_err)?;
            let rows = stmt.query_map([], row_to_principal).map_err(db_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
        })
    }

    fn put_vault_record(&self, record: &VaultRecord) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction().map_err(db_err)?;
            replace_vault_row(&tx, record)?;
            tx.commit().map_err(db_err)
        })
    }

    fn register_principal(&self, vault: &VaultRecord, principal: &PrincipalRecord) -> Result<()> {
        check_registration(vault, principal)?;
        self.with_conn_mut(|conn| {
            let tx = conn.transaction().map_err(db_err)?;
            replace_vault_row(&tx, vault)?;
            upsert_principal_row(&tx, principal)?;
            tx.commit().map_err(db_err)
        })
    }

    fn get_vault_record(&self, vault_ref: &VaultRef) -> Result<Option<VaultRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM vault_records WHERE vault_ref = ?1", VAULT_COLUMNS),
                params![vault_ref.to_hyphenated()],
                row_to_vault_record,
            )
            .optional()
            .map_err(db_err)
        })
    }

    fn create_artifact(&self, artifact: &ArtifactRecord, grants: &[GrantRecord]) -> Result<()> {
        if let Some(stray) = grants.iter().find(|g| g.artifact_id != artifact.artifact_id) {
            return Err(Error::InvalidInput(format!(
                "Grant for {} does not belong to artifact {}",
                stray.artifact_id, artifact.artifact_id
            )));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction().map_err(db_err)?;
            if artifact_exists(&tx, &artifact.artifact_id)? {
                return Err(Error::AlreadyExists(format!(
                    "Artifact already exists: {}",
                    artifact.artifact_id
                )));
            }

            tx.execute(
                &format!(
                    "INSERT INTO artifacts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    ARTIFACT_COLUMNS
                ),
                params![
                    artifact.artifact_id.to_hyphenated(),
                    artifact.shipment_id.as_ref().map(|s| s.as_str()),
                    artifact.file_name,
                    artifact.content_hash.to_hex(),
                    artifact.plaintext_len as i64,
                    artifact.blob_size as i64,
                    artifact.state.as_str(),
                    timestamp(&artifact.created_at),
                    timestamp(&artifact.updated_at),
                ],
            )
            .map_err(db_err)?;

            for grant in grants {
                upsert_grant_row(&tx, grant)?;
            }

            tx.commit().map_err(db_err)?;
            debug!(artifact = %artifact.artifact_id, grants = grants.len(), "Artifact persisted");
            Ok(())
        })
    }

    fn get_artifact(&self, id: &ArtifactId) -> Result<Option<ArtifactRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM artifacts WHERE artifact_id = ?1", ARTIFACT_COLUMNS),
                params![id.to_hyphenated()],
                row_to_artifact,
            )
            .optional()
            .map_err(db_err)
        })
    }

    fn list_artifacts(&self) -> Result<Vec<ArtifactRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM artifacts ORDER BY created_at, artifact_id",
                    ARTIFACT_COLUMNS
                ))
                .map_err(db_err)?;
            let rows = stmt.query_map([], row_to_artifact).map_err(db_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
        })
    }

    fn update_artifact_state(
        &self,
        id: &ArtifactId,
        state: ArtifactState,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE artifacts SET state = ?2, updated_at = ?3 WHERE artifact_id = ?1",
                    params![id.to_hyphenated(), state.as_str(), timestamp(&at)],
                )
                .map_err(db_err)?;
            if changed == 0 {
                return Err(Error::NotFound(format!("Artifact not found: {}", id)));
            }
            Ok(())
        })
    }

    fn upsert_grant(&self, grant: &GrantRecord) -> Result<GrantRecord> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction().map_err(db_err)?;
            if !artifact_exists(&tx, &grant.artifact_id)? {
                return Err(Error::NotFound(format!(
                    "Artifact not found: {}",
                    grant.artifact_id
                )));
            }

            upsert_grant_row(&tx, grant)?;
            let stored = tx
                .query_row(
                    &format!(
                        "SELECT {} FROM access_grants
                         WHERE artifact_id = ?1 AND principal_id = ?2 AND role = ?3",
                        GRANT_COLUMNS
                    ),
                    params![
                        grant.artifact_id.to_hyphenated(),
                        grant.principal_id.as_str(),
                        grant.role.as_str(),
                    ],
                    row_to_grant,
                )
                .map_err(db_err)?;

            tx.commit().map_err(db_err)?;
            Ok(stored)
        })
    }

    fn list_grants(&self, artifact: &ArtifactId) -> Result<Vec<GrantRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM access_grants WHERE artifact_id = ?1 ORDER BY id",
                    GRANT_COLUMNS
                ))
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![artifact.to_hyphenated()], row_to_grant)
                .map_err(db_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
        })
    }

    fn grants_for(
        &self,
        artifact: &ArtifactId,
        principal: &PrincipalId,
    ) -> Result<Vec<GrantRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM access_grants
                     WHERE artifact_id = ?1 AND principal_id = ?2 ORDER BY id",
                    GRANT_COLUMNS
                ))
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![artifact.to_hyphenated(), principal.as_str()], row_to_grant)
                .map_err(db_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn artifact(id: ArtifactId) -> ArtifactRecord {
        ArtifactRecord {
            artifact_id: id,
            shipment_id: Some(ShipmentId::new("SHP-2024-0042").unwrap()),
            file_name: Some("packing-list.pdf".to_string()),
            content_hash: ContentHash::from_bytes([7u8; 32]),
            plaintext_len: 1000,
            blob_size: 1044,
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
            wrapped_key: vec![key; 256],
            content_hash: ContentHash::from_bytes([7u8; 32]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_artifact_roundtrip() {
        let store = SqliteRecordStore::open_memory().unwrap();
        let id = ArtifactId::generate();
        let record = artifact(id);
        store
            .create_artifact(&record, &[grant(id, "alice", Role::Owner, 1)])
            .unwrap();

        assert_eq!(store.get_artifact(&id).unwrap(), Some(record));
        assert_eq!(store.list_artifacts().unwrap().len(), 1);
        assert!(store.get_artifact(&ArtifactId::generate()).unwrap().is_none());
    }

    #[test]
    fn test_create_artifact_is_atomic() {
        let store = SqliteRecordStore::open_memory().unwrap();
        let id = ArtifactId::generate();
        store.create_artifact(&artifact(id), &[]).unwrap();

        let result = store.create_artifact(&artifact(id), &[grant(id, "mallory", Role::Owner, 9)]);
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
        assert!(store.list_grants(&id).unwrap().is_empty());
    }

    #[test]
    fn test_state_update() {
        let store = SqliteRecordStore::open_memory().unwrap();
        let id = ArtifactId::generate();
        store.create_artifact(&artifact(id), &[]).unwrap();

        store
            .update_artifact_state(&id, ArtifactState::Readable, Utc::now())
            .unwrap();
        assert_eq!(
            store.get_artifact(&id).unwrap().unwrap().state,
            ArtifactState::Readable
        );
        assert!(matches!(
            store.update_artifact_state(&ArtifactId::generate(), ArtifactState::Readable, Utc::now()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_grant_upsert_refreshes_existing_row() {
        let store = SqliteRecordStore::open_memory().unwrap();
        let id = ArtifactId::generate();
        store.create_artifact(&artifact(id), &[]).unwrap();

        let first = store.upsert_grant(&grant(id, "bob", Role::Assigned, 1)).unwrap();
        let second = store.upsert_grant(&grant(id, "bob", Role::Assigned, 2)).unwrap();

        assert_eq!(store.list_grants(&id).unwrap().len(), 1);
        assert_eq!(second.wrapped_key, vec![2; 256]);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);

        store.upsert_grant(&grant(id, "bob", Role::Authority, 3)).unwrap();
        let bob = PrincipalId::new("bob").unwrap();
        assert_eq!(store.grants_for(&id, &bob).unwrap().len(), 2);
    }

    #[test]
    fn test_grant_for_unknown_artifact() {
        let store = SqliteRecordStore::open_memory().unwrap();
        let result = store.upsert_grant(&grant(ArtifactId::generate(), "bob", Role::Owner, 1));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_principal_and_vault_records() {
        let store = SqliteRecordStore::open_memory().unwrap();
        let alice = PrincipalId::new("alice").unwrap();
        let first_ref = VaultRef::generate();

        store
            .put_vault_record(&VaultRecord {
                vault_ref: first_ref,
                principal_id: alice.clone(),
                salt: vec![1; 32],
                ciphertext: vec![2; 100],
                created_at: Utc::now(),
            })
            .unwrap();
        let second_ref = VaultRef::generate();
        store
            .put_vault_record(&VaultRecord {
                vault_ref: second_ref,
                principal_id: alice.clone(),
                salt: vec![3; 32],
                ciphertext: vec![4; 100],
                created_at: Utc::now(),
            })
            .unwrap();

        assert!(store.get_vault_record(&first_ref).unwrap().is_none());
        assert_eq!(store.get_vault_record(&second_ref).unwrap().unwrap().salt, vec![3; 32]);

        let principal = PrincipalRecord {
            principal_id: alice.clone(),
            public_key_pem: "-----BEGIN PUBLIC KEY-----".to_string(),
            fingerprint: "ab".repeat(32),
            vault_ref: second_ref,
            created_at: Utc::now(),
        };
        store.put_principal(&principal).unwrap();
        assert_eq!(store.get_principal(&alice).unwrap(), Some(principal));
        assert_eq!(store.list_principals().unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_registrations_stay_consistent() {
        let store = SqliteRecordStore::open_memory().unwrap();
        let alice = PrincipalId::new("alice").unwrap();

        std::thread::scope(|scope| {
            for salt in 0..4u8 {
                let store = &store;
                let alice = alice.clone();
                scope.spawn(move || {
                    for _ in 0..10 {
                        let vault = VaultRecord {
                            vault_ref: VaultRef::generate(),
                            principal_id: alice.clone(),
                            salt: vec![salt; 32],
                            ciphertext: vec![salt; 100],
                            created_at: Utc::now(),
                        };
                        let principal = PrincipalRecord {
                            principal_id: alice.clone(),
                            public_key_pem: format!("key {}", salt),
                            fingerprint: "ef".repeat(32),
                            vault_ref: vault.vault_ref,
                            created_at: Utc::now(),
                        };
                        store.register_principal(&vault, &principal).unwrap();
                    }
                });
            }
        });

        let current = store.get_principal(&alice).unwrap().unwrap();
        let sealed = store.get_vault_record(&current.vault_ref).unwrap().unwrap();
        assert_eq!(current.public_key_pem, format!("key {}", sealed.salt[0]));
    }

    #[test]
    fn test_register_principal_rejects_mismatched_rows() {
        let store = SqliteRecordStore::open_memory().unwrap();
        let vault = VaultRecord {
            vault_ref: VaultRef::generate(),
            principal_id: PrincipalId::new("alice").unwrap(),
            salt: vec![1; 32],
            ciphertext: vec![2; 100],
            created_at: Utc::now(),
        };
        let principal = PrincipalRecord {
            principal_id: PrincipalId::new("bob").unwrap(),
            public_key_pem: "-----BEGIN PUBLIC KEY-----".to_string(),
            fingerprint: "ab".repeat(32),
            vault_ref: vault.vault_ref,
            created_at: Utc::now(),
        };

        let result = store.register_principal(&vault, &principal);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(store.get_vault_record(&vault.vault_ref).unwrap().is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("records.db");
        let id = ArtifactId::generate();

        {
            let store = SqliteRecordStore::open(&path).unwrap();
            store
                .create_artifact(&artifact(id), &[grant(id, "carol", Role::Authority, 5)])
                .unwrap();
        }

        let store = SqliteRecordStore::open(&path).unwrap();
        assert!(store.get_artifact(&id).unwrap().is_some());
        assert_eq!(store.list_grants(&id).unwrap()[0].role, Role::Authority);
    }

    #[test]
    fn test_concurrent_upserts_leave_one_row() {
        let store = Arc::new(SqliteRecordStore::open_memory().unwrap());
        let id = ArtifactId::generate();
        store.create_artifact(&artifact(id), &[]).unwrap();

        std::thread::scope(|scope| {
            for n in 0..8u8 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    store.upsert_grant(&grant(id, "dave", Role::Owner, n)).unwrap();
                });
            }
        });

        assert_eq!(store.list_grants(&id).unwrap().len(), 1);
    }
}
