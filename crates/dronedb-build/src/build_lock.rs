//! Cross-process exclusive BuildLock (spec §4.9): `<output_path>.building`
//! is created with an OS-level atomic exclusive-create primitive so two
//! processes racing to build the same artifact can never both proceed.
//! Move-only; release happens on drop, on every exit path including a
//! panic unwind.

use chrono::Utc;
use dronedb_core::error::{DdbError, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub struct BuildLock {
    lock_path: PathBuf,
}

impl BuildLock {
    /// Attempts to acquire the lock for `output_path`.
    ///
    /// `wait == true` does not currently poll — a lock already held still
    /// raises `BuildInProgress` immediately. This is a known quirk of the
    /// original design, preserved deliberately (spec §4.9, §9).
    pub fn acquire(output_path: &Path, _wait: bool) -> Result<Self> {
        let lock_path = lock_path_for(output_path);

        let mut file = OpenOptions::new().write(true).create_new(true).open(&lock_path).map_err(|e| {
            match e.kind() {
                ErrorKind::AlreadyExists => DdbError::BuildInProgress(lock_path.clone()),
                ErrorKind::PermissionDenied => DdbError::LockPermission(lock_path.clone()),
                ErrorKind::NotFound => DdbError::LockDirectoryMissing(lock_path.clone()),
                _ if e.raw_os_error() == Some(28) => DdbError::LockDiskFull(lock_path.clone()),
                _ => DdbError::fs(&lock_path, e.to_string()),
            }
        })?;

        let diagnostic = format!(
            "pid={}\ntimestamp={}\nprocess={}\n",
            std::process::id(),
            Utc::now().to_rfc3339(),
            std::env::current_exe().ok().and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string())).unwrap_or_default(),
        );
        let _ = file.write_all(diagnostic.as_bytes());

        Ok(Self { lock_path })
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            tracing::warn!(path = %self.lock_path.display(), error = %e, "failed to release build lock");
        }
    }
}

fn lock_path_for(output_path: &Path) -> PathBuf {
    let mut s = output_path.as_os_str().to_owned();
    s.push(".building");
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_concurrent_acquire_fails_with_build_in_progress() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("cog.tif");
        let first = BuildLock::acquire(&output, false).unwrap();
        let second = BuildLock::acquire(&output, false);
        assert!(matches!(second.unwrap_err(), DdbError::BuildInProgress(_)));
        drop(first);
    }

    #[test]
    fn lock_is_released_on_drop_and_can_be_reacquired() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("cog.tif");
        {
            let _g = BuildLock::acquire(&output, false).unwrap();
            assert!(lock_path_for(&output).exists());
        }
        assert!(!lock_path_for(&output).exists());
        let _g2 = BuildLock::acquire(&output, false).unwrap();
    }

    #[test]
    fn wait_true_still_fails_fast_per_preserved_quirk() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("cog.tif");
        let _first = BuildLock::acquire(&output, false).unwrap();
        let second = BuildLock::acquire(&output, true);
        assert!(matches!(second.unwrap_err(), DdbError::BuildInProgress(_)));
    }
}
