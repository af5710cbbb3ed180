use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Advisory start lock: whoever creates the file first starts the daemon.
/// The file is removed when the guard drops.
#[derive(Debug)]
pub struct StartLock {
    path: PathBuf,
}

impl StartLock {
    /// `Ok(None)` means another process holds a fresh lock. A lock older than
    /// `stale_after` is taken over once.
    ///
    /// # Errors
    /// Returns an I/O error other than "already exists".
    pub fn acquire(path: &Path, stale_after: Duration) -> std::io::Result<Option<Self>> {
        if let Some(lock) = Self::try_create(path)? {
            return Ok(Some(lock));
        }
        if !is_stale(path, stale_after) {
            debug!(lock = %path.display(), "daemon start lock held elsewhere");
            return Ok(None);
        }
        warn!(lock = %path.display(), "removing stale daemon start lock");
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Self::try_create(path)
    }

    fn try_create(path: &Path) -> std::io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(Some(Self {
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// True when a lock file exists at `path` and is younger than `stale_after`,
    /// i.e. some process is starting the daemon right now.
    #[must_use]
    pub fn is_held(path: &Path, stale_after: Duration) -> bool {
        path.exists() && !is_stale(path, stale_after)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StartLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(lock = %self.path.display(), error = %e, "failed to release daemon start lock");
            }
        }
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > stale_after)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::StartLock;
    use std::time::Duration;

    #[test]
    fn when_lock_is_free_then_it_is_acquired_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tldr-x.lock");

        let lock = StartLock::acquire(&path, Duration::from_secs(10)).unwrap();
        assert!(lock.is_some());
        assert!(path.exists());

        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn when_fresh_lock_is_held_then_second_acquire_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tldr-x.lock");
        let _held = StartLock::acquire(&path, Duration::from_secs(10)).unwrap().unwrap();

        let second = StartLock::acquire(&path, Duration::from_secs(10)).unwrap();

        assert!(second.is_none());
    }

    #[test]
    fn when_lock_is_stale_then_it_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tldr-x.lock");
        std::fs::write(&path, "999999\n").unwrap();
        std::thread::sleep(Duration::from_millis(30));

        let lock = StartLock::acquire(&path, Duration::from_millis(10)).unwrap();

        assert!(lock.is_some());
    }
}
