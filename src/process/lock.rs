use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Advisory lock on the data directory.
///
/// Two orchestrators sharing a pid table would kill each other's processes
/// on startup. The lock does not prevent that; it makes it visible. The lock
/// is released when the value is dropped.
pub struct DataDirLock {
    path: PathBuf,
    file: Option<File>,
}

impl DataDirLock {
    pub const FILE_NAME: &'static str = ".swapd.lock";

    /// Try to take the lock. Contention is logged and the lock is reported as
    /// not held rather than failing.
    pub fn acquire(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(Self::FILE_NAME);
        let mut file = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::Process(format!("Failed to open lock file: {}", e)))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                let _ = file.set_len(0);
                let _ = writeln!(file, "{}", std::process::id());
                tracing::debug!("Acquired advisory lock on {:?}", path);
                Ok(Self {
                    path,
                    file: Some(file),
                })
            }
            Err(e) => {
                let owner = std::fs::read_to_string(&path).unwrap_or_default();
                tracing::warn!(
                    "Another swapd (pid {}) holds {}: {}. Recorded pids may be killed by both instances.",
                    owner.trim(),
                    path.display(),
                    e
                );
                Ok(Self { path, file: None })
            }
        }
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_not_held() {
        let dir = tempfile::tempdir().unwrap();
        let first = DataDirLock::acquire(dir.path()).unwrap();
        assert!(first.is_held());

        let second = DataDirLock::acquire(dir.path()).unwrap();
        assert!(!second.is_held());

        drop(first);
        let third = DataDirLock::acquire(dir.path()).unwrap();
        assert!(third.is_held());
    }
}
