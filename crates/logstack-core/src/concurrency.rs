use crate::CoreError;
use fs2::FileExt;
use logstack_store::StoreLayout;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

fn open_lock_file(lock_path: &Path) -> Result<File, CoreError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?)
}

/// Exclusive advisory lock over one resource id.
///
/// Every status mutation happens while this is held, after re-reading the
/// record.
pub struct ResourceLock {
    lock_file: File,
}

impl ResourceLock {
    /// Block until the lock for `id` is free.
    pub fn acquire(layout: &StoreLayout, id: &str) -> Result<Self, CoreError> {
        let file = open_lock_file(&layout.resource_lock(id))?;
        file.lock_exclusive()
            .map_err(|e| CoreError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, e)))?;
        Ok(Self { lock_file: file })
    }

    /// `None` when another holder is alive.
    pub fn try_acquire(layout: &StoreLayout, id: &str) -> Result<Option<Self>, CoreError> {
        let file = open_lock_file(&layout.resource_lock(id))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}

/// Store-wide lock, taken only while recovering interrupted runs.
pub struct StoreLock {
    lock_file: File,
}

impl StoreLock {
    pub fn try_acquire(layout: &StoreLayout) -> Result<Option<Self>, CoreError> {
        let file = open_lock_file(&layout.lock_file())?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(1);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\nshutdown requested, no further stages will be dispatched...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
