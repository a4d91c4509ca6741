//! Storage abstraction for ConsignVault.
//!
//! Two kinds of storage sit behind traits:
//! - [`BlobStore`]: write-once encrypted artifact blobs (memory, local
//!   filesystem), resolvable by name through a [`BlobStoreRegistry`]
//! - [`RecordStore`]: principals, sealed vault records, artifact metadata
//!   and access grants (memory, SQLite)
//!
//! # Design Principles
//! - Provider isolation: no backend-specific logic in vault or crypto modules
//! - Streaming: blobs are read and written through `Read`/`Write`/`Seek`
//! - Atomicity: a staged blob is invisible until committed, and every
//!   record store method is a single transaction

pub mod local;
pub mod memory;
mod migration;
pub mod provider;
pub mod records;
pub mod registry;
pub mod sqlite;

pub use local::LocalBlobStore;
pub use memory::{MemoryBlobStore, MemoryRecordStore};
pub use provider::{BlobMetadata, BlobReader, BlobStore, StagedBlob};
pub use records::{ArtifactRecord, GrantRecord, PrincipalRecord, RecordStore, VaultRecord};
pub use registry::{create_default_registry, BlobStoreFactory, BlobStoreRegistry};
pub use sqlite::SqliteRecordStore;
