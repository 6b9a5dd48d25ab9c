//! # Data Directory Lock
//!
//! One ledger process per data directory. The lock is an `fs2` exclusive
//! lock on `<data_dir>/LOCK`, held for the lifetime of [`DataDirLock`] and
//! released on drop.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to open lock file {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("Data directory already in use by {} ({})", holder_label(*pid), path.display())]
    AlreadyLocked { pid: Option<u32>, path: PathBuf },

    #[error("Failed to record pid in lock file: {0}")]
    WriteFailed(io::Error),
}

fn holder_label(pid: Option<u32>) -> String {
    pid.map(|p| format!("process {p}"))
        .unwrap_or_else(|| "another process".to_string())
}

pub struct DataDirLock {
    file: File,
    path: PathBuf,
}

impl DataDirLock {
    const LOCK_FILE: &'static str = "LOCK";

    /// Take the lock without waiting. The directory must exist.
    pub fn acquire(data_dir: &Path) -> Result<Self, LockError> {
        let path = data_dir.join(Self::LOCK_FILE);
        // Not truncated before locking: the pid belongs to the current holder.
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;

        if file.try_lock_exclusive().is_err() {
            let pid = read_pid(&mut file);
            warn!(lock = %path.display(), ?pid, "data directory is locked");
            return Err(LockError::AlreadyLocked { pid, path });
        }

        let pid = std::process::id();
        file.set_len(0).map_err(LockError::WriteFailed)?;
        file.seek(SeekFrom::Start(0)).map_err(LockError::WriteFailed)?;
        writeln!(file, "{pid}").map_err(LockError::WriteFailed)?;
        file.sync_all().map_err(LockError::WriteFailed)?;

        debug!(lock = %path.display(), pid, "data directory lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn read_pid(file: &mut File) -> Option<u32> {
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}
