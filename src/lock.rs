//! File locking and atomic writes
//!
//! Every mutation of a log or counter file goes through this module:
//! - Exclusive advisory locks (fs2/flock) on a `<file>.lock` sidecar
//! - Bounded wait on contention, surfaced as `Error::Locked`
//! - Atomic replace (write temp in the same directory + fsync + rename)
//!
//! The lock lives on a sidecar because an atomic rename swaps the inode of
//! the data file, which would silently drop a lock held on it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Default lock timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Default retry interval when waiting for a lock
const LOCK_RETRY_INTERVAL_MS: u64 = 25;

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // On Windows, fs2/libc can surface lock/sharing violations as "Other".
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// Sidecar lock path guarding `path`
pub fn lock_path_for(path: impl AsRef<Path>) -> PathBuf {
    PathBuf::from(format!("{}.lock", path.as_ref().display()))
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

/// A file lock guard that releases the lock when dropped
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire an exclusive lock on a file with timeout
    ///
    /// If the file doesn't exist, it will be created.
    /// Returns `Error::Locked` if the lock cannot be acquired within the timeout.
    pub fn acquire(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let retry_interval = Duration::from_millis(LOCK_RETRY_INTERVAL_MS);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(FileLock {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if is_lock_contended(&e) => {
                    if start.elapsed() >= timeout {
                        tracing::debug!(path = %path.display(), "lock wait timed out");
                        return Err(Error::Locked(path.to_path_buf()));
                    }
                    std::thread::sleep(retry_interval);
                }
                Err(e) => {
                    return Err(Error::Io(e));
                }
            }
        }
    }

    /// Acquire the sidecar lock that guards `data_path`
    pub fn for_file(data_path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        Self::acquire(lock_path_for(data_path), timeout_ms)
    }

    /// Acquire an exclusive lock without timeout (blocking)
    pub fn acquire_blocking(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;
        file.lock_exclusive()?;

        Ok(FileLock {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Get the path to the locked file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Unlock the file - ignore errors during drop
        let _ = self.file.unlock();
    }
}

/// Atomically replace a file's contents
///
/// Writes to a uniquely named temp file in the target's directory, syncs it,
/// then renames it over the target. Readers see either the old or the new
/// contents, never a truncated file.
///
/// Note: This does NOT acquire a lock. Callers coordinating with other
/// processes hold the sidecar lock around it.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut temp = NamedTempFile::new_in(&parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| Error::Io(err.error))?;

    Ok(())
}

/// Atomically write string data to a file
pub fn write_atomic_str(path: impl AsRef<Path>, data: &str) -> Result<()> {
    write_atomic(path, data.as_bytes())
}

/// Write data atomically while holding the file's sidecar lock
pub fn write_atomic_locked(path: impl AsRef<Path>, data: &[u8], timeout_ms: u64) -> Result<()> {
    let path = path.as_ref();
    let _lock = FileLock::for_file(path, timeout_ms)?;
    write_atomic(path, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_file_lock_acquire_release() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("current.log.lock");

        let lock = FileLock::acquire(&lock_path, 1000).unwrap();
        assert!(lock_path.exists());
        assert_eq!(lock.path(), lock_path.as_path());

        let err = FileLock::acquire(&lock_path, 50).unwrap_err();
        assert!(matches!(err, Error::Locked(_)));

        drop(lock);

        let lock2 = FileLock::acquire(&lock_path, 50).unwrap();
        assert_eq!(lock2.path(), lock_path.as_path());
    }

    #[test]
    fn sidecar_path_appends_lock_suffix() {
        let path = Path::new("/tmp/work/current.log");
        assert_eq!(lock_path_for(path), PathBuf::from("/tmp/work/current.log.lock"));
    }

    #[test]
    fn test_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("taskid");

        write_atomic_str(&file_path, "1").unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "1");

        write_atomic_str(&file_path, "2").unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "2");

        // no temp files left behind
        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn timeout_returns_locked() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("timeout.lock");

        let _lock = FileLock::acquire(&lock_path, 1000).unwrap();
        let result = FileLock::acquire(&lock_path, 50);
        assert!(matches!(result, Err(Error::Locked(_))));
    }

    #[test]
    fn stress_single_lock_holder() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("stress.lock");

        let threads = 12;
        let barrier = Arc::new(Barrier::new(threads));
        let in_lock = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));
        let acquired = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(threads);
        for _ in 0..threads {
            let barrier = Arc::clone(&barrier);
            let in_lock = Arc::clone(&in_lock);
            let max_concurrent = Arc::clone(&max_concurrent);
            let acquired = Arc::clone(&acquired);
            let lock_path = lock_path.clone();

            handles.push(thread::spawn(move || {
                barrier.wait();
                let _lock = FileLock::acquire(&lock_path, 2000).unwrap();

                let current = in_lock.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = max_concurrent.fetch_max(current, Ordering::SeqCst);

                thread::sleep(Duration::from_millis(10));

                in_lock.fetch_sub(1, Ordering::SeqCst);
                acquired.fetch_add(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(acquired.load(Ordering::SeqCst), threads);
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn atomic_write_locked_is_consistent() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("current.log");

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let mut handles = Vec::with_capacity(threads);
        let mut expected = Vec::with_capacity(threads);

        for idx in 0..threads {
            let barrier = Arc::clone(&barrier);
            let file_path = file_path.clone();
            let payload = format!("{idx} - [ ] - writer {}\n", "x".repeat(64));
            expected.push(payload.clone());

            handles.push(thread::spawn(move || {
                barrier.wait();
                write_atomic_locked(&file_path, payload.as_bytes(), 2000).unwrap();
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let final_contents = fs::read_to_string(&file_path).unwrap();
        assert!(expected.contains(&final_contents));
    }
}
