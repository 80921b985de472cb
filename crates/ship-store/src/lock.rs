use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::StoreError;

/// Advisory exclusive lock on `ship.lock` inside a data directory.
///
/// Held for the lifetime of the engine process. A second instance pointed
/// at the same data directory fails to acquire it and must refuse to
/// start. The OS releases the lock automatically if the holding process
/// dies, so a crash never leaves a stale lock behind.
pub struct DataDirLock {
    _file: File,
    path: PathBuf,
}

impl DataDirLock {
    pub fn acquire(data_dir: &Path) -> Result<Self, StoreError> {
        let path = data_dir.join("ship.lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|source| StoreError::Io {
                path: path.display().to_string(),
                source,
            })?;

        file.try_lock_exclusive().map_err(|_| StoreError::LockHeld {
            path: path.display().to_string(),
        })?;

        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self._file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_on_same_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let first = DataDirLock::acquire(dir.path()).unwrap();
        let second = DataDirLock::acquire(dir.path());
        assert!(second.is_err());
        drop(first);
        // released once the first lock drops
        assert!(DataDirLock::acquire(dir.path()).is_ok());
    }
}
