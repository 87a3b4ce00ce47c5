//! Durable resource records, store layout, and the credential vault for logstack.
//!
//! This crate provides the storage layer: `StoreLayout` for the directory
//! structure, `ResourceStore` for checksummed resource records written
//! atomically, and the `SecretVault` backends (`FileVault`, `EnvVault`,
//! `MemoryVault`) the orchestrator pulls credentials from.

pub mod layout;
pub mod records;
pub mod vault;

pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use records::{FailureRecord, ResourceRecord, ResourceStore};
pub use vault::{EnvVault, FileVault, MemoryVault, SecretVault, VaultError};

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

/// Write `content` to `dest` through a temp file in the same directory.
pub(crate) fn write_atomic(dir: &Path, dest: &Path, content: &[u8]) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for resource '{id}': expected {expected}, got {actual}")]
    IntegrityFailure {
        id: String,
        expected: String,
        actual: String,
    },
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("resource '{0}' already exists")]
    Duplicate(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid resource id: {0}")]
    InvalidId(String),
}
