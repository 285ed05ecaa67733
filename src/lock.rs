//! Advisory locking of the status document.
//!
//! The lock lives on a sidecar `<document>.lock` file rather than the
//! document itself, because saves replace the document by rename.

use eyre::{Context, Result};
use log::debug;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Outcome of trying to take the lock.
pub enum LockAttempt {
    Acquired(DocumentLock),
    Contended,
}

/// Exclusive lock held until dropped.
#[derive(Debug)]
pub struct DocumentLock {
    path: PathBuf,
    #[cfg_attr(not(unix), allow(dead_code))]
    file: File,
}

impl DocumentLock {
    /// Path of the lock file guarding `document`.
    pub fn lock_path(document: &Path) -> PathBuf {
        let mut name = document.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".lock");
        document.with_file_name(name)
    }

    /// Try to take the lock without waiting.
    pub fn try_acquire(document: &Path) -> Result<LockAttempt> {
        let path = Self::lock_path(document);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        if !try_lock_exclusive(&file)? {
            debug!("Lock contended: {}", path.display());
            return Ok(LockAttempt::Contended);
        }

        debug!("Lock acquired: {}", path.display());
        Ok(LockAttempt::Acquired(Self { path, file }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        debug!("Lock released: {}", self.path.display());
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> Result<bool> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Ok(false);
    }
    Err(err).context("flock failed")
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> Result<bool> {
    Ok(true)
}
