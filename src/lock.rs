use std::fs;
use std::path::{Path, PathBuf};

use crate::log_warn;
use crate::tw_error::TwError;

pub const LOCK_FILE_NAME: &str = "taskweave.lock";

/// Exclusive hold on a runtime directory, so two schedulers never drive the
/// same task tree. The holder's PID lives in the lock file while it is held.
#[must_use = "the run lock is released when RunLock is dropped"]
pub struct RunLock {
    file: fslock::LockFile,
    path: PathBuf,
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock").field("path", &self.path).finish()
    }
}

impl RunLock {
    /// Take the run lock for `runtime_dir`, creating the directory if needed.
    ///
    /// Fails with [`TwError::RunLocked`] naming the holder's PID when another
    /// run owns it. The OS drops the lock with its owner, so a lock file left
    /// behind by a dead run never blocks.
    pub fn acquire(runtime_dir: &Path) -> Result<RunLock, TwError> {
        fs::create_dir_all(runtime_dir).map_err(|e| {
            TwError::Lock(format!("Failed to create {}: {}", runtime_dir.display(), e))
        })?;

        let path = runtime_dir.join(LOCK_FILE_NAME);
        let mut file = fslock::LockFile::open(&path)
            .map_err(|e| TwError::Lock(format!("Failed to open {}: {}", path.display(), e)))?;

        let acquired = file
            .try_lock_with_pid()
            .map_err(|e| TwError::Lock(format!("Failed to lock {}: {}", path.display(), e)))?;
        if !acquired {
            let holder = read_holder(&path);
            return Err(TwError::RunLocked { path, holder });
        }

        Ok(RunLock { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            log_warn!("Warning: Failed to release {}: {}", self.path.display(), e);
        }
    }
}

/// PID recorded in a lock file, if it holds one.
pub fn read_holder(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holder_is_none_for_empty_or_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        assert_eq!(read_holder(&path), None);

        fs::write(&path, "").unwrap();
        assert_eq!(read_holder(&path), None);

        fs::write(&path, "4242\n").unwrap();
        assert_eq!(read_holder(&path), Some(4242));
    }
}
