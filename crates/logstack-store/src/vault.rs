//! Credential vault backends.
//!
//! The orchestrator only ever talks to [`SecretVault`]; which backend sits
//! behind it is a configuration choice.

use crate::layout::StoreLayout;
use crate::fsync_dir;
use fs2::FileExt;
use logstack_schema::{Secret, SecretRef};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("secret '{0}' not found in vault")]
    NotFound(String),
    #[error("the {0} vault is read-only")]
    ReadOnly(&'static str),
    #[error("vault I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("vault file is corrupted: {0}")]
    Corrupted(#[from] serde_json::Error),
}

pub trait SecretVault: Send + Sync {
    fn name(&self) -> &str;
    fn get_secret(&self, key: &SecretRef) -> Result<Secret, VaultError>;
    fn put_secret(&self, key: &SecretRef, value: &Secret) -> Result<(), VaultError>;
}

/// Secrets stored as a JSON map in `<store>/vault.json`, mode 0600.
pub struct FileVault {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileVault {
    pub fn new(layout: &StoreLayout) -> Self {
        let path = layout.vault_file();
        Self {
            lock_path: path.with_extension("lock"),
            path,
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, VaultError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), VaultError> {
        let dir = self
            .path
            .parent()
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        fs::create_dir_all(&dir)?;
        let content = serde_json::to_string_pretty(entries)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        set_owner_only(tmp.as_file())?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| VaultError::Io(e.error))?;
        fsync_dir(&dir)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_owner_only(file: &File) -> Result<(), std::io::Error> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only(_file: &File) -> Result<(), std::io::Error> {
    Ok(())
}

impl SecretVault for FileVault {
    fn name(&self) -> &str {
        "file"
    }

    fn get_secret(&self, key: &SecretRef) -> Result<Secret, VaultError> {
        self.read_all()?
            .remove(key.as_str())
            .map(Secret::from)
            .ok_or_else(|| VaultError::NotFound(key.to_string()))
    }

    fn put_secret(&self, key: &SecretRef, value: &Secret) -> Result<(), VaultError> {
        if let Some(dir) = self.lock_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        lock.lock_exclusive()?;

        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.expose().to_owned());
        let result = self.write_all(&entries);

        let _ = fs2::FileExt::unlock(&lock);
        tracing::debug!("stored secret '{key}' in file vault");
        result
    }
}

/// Read-only vault over `LOGSTACK_SECRET_<REF>` environment variables.
pub struct EnvVault;

impl EnvVault {
    /// `grafana/admin-pw` becomes `LOGSTACK_SECRET_GRAFANA_ADMIN_PW`.
    pub fn var_name(key: &SecretRef) -> String {
        let suffix: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("LOGSTACK_SECRET_{suffix}")
    }
}

impl SecretVault for EnvVault {
    fn name(&self) -> &str {
        "env"
    }

    fn get_secret(&self, key: &SecretRef) -> Result<Secret, VaultError> {
        std::env::var(Self::var_name(key))
            .map(Secret::from)
            .map_err(|_| VaultError::NotFound(key.to_string()))
    }

    fn put_secret(&self, _key: &SecretRef, _value: &Secret) -> Result<(), VaultError> {
        Err(VaultError::ReadOnly("env"))
    }
}

/// In-process vault for tests and embedding.
#[derive(Default)]
pub struct MemoryVault {
    entries: Mutex<BTreeMap<String, Secret>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(self, key: &str, value: &str) -> Self {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_owned(), Secret::new(value));
        }
        self
    }
}

impl SecretVault for MemoryVault {
    fn name(&self) -> &str {
        "memory"
    }

    fn get_secret(&self, key: &SecretRef) -> Result<Secret, VaultError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| VaultError::NotFound(key.to_string()))?;
        entries
            .get(key.as_str())
            .cloned()
            .ok_or_else(|| VaultError::NotFound(key.to_string()))
    }

    fn put_secret(&self, key: &SecretRef, value: &Secret) -> Result<(), VaultError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> (tempfile::TempDir, StoreLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        (dir, layout)
    }

    #[test]
    fn file_vault_put_and_get() {
        let (_dir, layout) = layout();
        let vault = FileVault::new(&layout);
        let key = SecretRef::new("qw-api-token");
        vault.put_secret(&key, &Secret::new("tok")).unwrap();
        assert_eq!(vault.get_secret(&key).unwrap().expose(), "tok");

        let reopened = FileVault::new(&layout);
        assert_eq!(reopened.get_secret(&key).unwrap().expose(), "tok");
    }

    #[test]
    fn file_vault_missing_key() {
        let (_dir, layout) = layout();
        let vault = FileVault::new(&layout);
        assert!(matches!(
            vault.get_secret(&SecretRef::new("nope")),
            Err(VaultError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn file_vault_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, layout) = layout();
        let vault = FileVault::new(&layout);
        vault
            .put_secret(&SecretRef::new("k"), &Secret::new("v"))
            .unwrap();
        let mode = fs::metadata(layout.vault_file())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn env_var_name_is_normalized() {
        assert_eq!(
            EnvVault::var_name(&SecretRef::new("grafana/admin-pw")),
            "LOGSTACK_SECRET_GRAFANA_ADMIN_PW"
        );
    }

    #[test]
    fn env_vault_is_read_only() {
        assert!(matches!(
            EnvVault.put_secret(&SecretRef::new("k"), &Secret::new("v")),
            Err(VaultError::ReadOnly("env"))
        ));
        assert!(EnvVault
            .get_secret(&SecretRef::new("surely-not-set-anywhere-4711"))
            .is_err());
    }

    #[test]
    fn memory_vault() {
        let vault = MemoryVault::new().with("a", "1");
        assert_eq!(vault.get_secret(&SecretRef::new("a")).unwrap().expose(), "1");
        vault
            .put_secret(&SecretRef::new("b"), &Secret::new("2"))
            .unwrap();
        assert_eq!(vault.get_secret(&SecretRef::new("b")).unwrap().expose(), "2");
    }
}
