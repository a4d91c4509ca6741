//! Database schema migrations for the SQLite record store.
//!
//! Each migration transforms the schema from version N to N+1. Applied
//! versions are recorded in `schema_migrations`.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::sqlite::db_err;
use consignvault_common::{Error, Result};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent: running it against an up-to-date database is a no-op.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )
    .map_err(db_err)?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(db_err)?;

    if current > CURRENT_VERSION {
        return Err(Error::Storage(format!(
            "Database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction().map_err(db_err)?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(Error::Storage(format!("Unknown migration version: {}", version))),
    }
}

/// Migration v1: initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE principals (
            principal_id TEXT PRIMARY KEY,
            public_key_pem TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            vault_ref TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        -- One live record per principal; regeneration replaces the row.
        CREATE TABLE vault_records (
            vault_ref TEXT PRIMARY KEY,
            principal_id TEXT NOT NULL UNIQUE,
            salt BLOB NOT NULL,
            ciphertext BLOB NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE artifacts (
            artifact_id TEXT PRIMARY KEY,
            shipment_id TEXT,
            file_name TEXT,
            content_hash TEXT NOT NULL,
            plaintext_len INTEGER NOT NULL,
            blob_size INTEGER NOT NULL,
            state TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX idx_artifacts_shipment ON artifacts(shipment_id);

        CREATE TABLE access_grants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            artifact_id TEXT NOT NULL REFERENCES artifacts(artifact_id),
            principal_id TEXT NOT NULL,
            role TEXT NOT NULL,
            wrapped_key BLOB NOT NULL,
            content_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (artifact_id, principal_id, role)
        );

        CREATE INDEX idx_grants_principal ON access_grants(artifact_id, principal_id);
        "#,
    )
    .map_err(db_err)
}
