//! Task id allocation.
//!
//! The `taskid` file of an organization holds the last allocated id as a
//! single integer. Reads and writes of the counter happen under the
//! `taskid.lock` sidecar, and the guard can be held across the append that
//! uses the id so a concurrent `add --id N` cannot claim the same number.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::lock::{self, FileLock};
use crate::storage::LogStore;
use crate::task::TaskId;

/// Allocator bound to one organization's counter file
#[derive(Debug, Clone)]
pub struct IdAllocator {
    path: PathBuf,
    lock_timeout_ms: u64,
}

/// Exclusive access to the counter, released on drop
#[derive(Debug)]
pub struct CounterGuard {
    _lock: FileLock,
    path: PathBuf,
    last: TaskId,
}

fn read_counter(path: &Path) -> Result<TaskId> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };

    let value = content.lines().next().unwrap_or("").trim();
    if value.is_empty() {
        return Ok(0);
    }
    value.parse().map_err(|_| {
        Error::OperationFailed(format!(
            "invalid task counter in {}: '{value}'",
            path.display()
        ))
    })
}

impl IdAllocator {
    pub fn new(path: impl Into<PathBuf>, lock_timeout_ms: u64) -> Self {
        Self {
            path: path.into(),
            lock_timeout_ms,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last allocated id as persisted (no lock)
    pub fn last(&self) -> Result<TaskId> {
        read_counter(&self.path)
    }

    /// Take the counter lock
    pub fn lock(&self) -> Result<CounterGuard> {
        let lock = FileLock::for_file(&self.path, self.lock_timeout_ms)?;
        let last = read_counter(&self.path)?;
        Ok(CounterGuard {
            _lock: lock,
            path: self.path.clone(),
            last,
        })
    }

    /// Allocate the next id
    pub fn next_id(&self, store: &LogStore) -> Result<TaskId> {
        self.lock()?.next(store)
    }

    /// Claim a specific id
    pub fn reserve(&self, store: &LogStore, id: TaskId) -> Result<()> {
        self.lock()?.reserve(store, id)
    }
}

impl CounterGuard {
    pub fn last(&self) -> TaskId {
        self.last
    }

    fn persist(&mut self, id: TaskId) -> Result<()> {
        lock::write_atomic_str(&self.path, &id.to_string())?;
        self.last = id;
        Ok(())
    }

    /// Allocate one past the high-water mark.
    ///
    /// The high-water mark also covers ids present in the logs, so a counter
    /// that fell behind (restored backup, hand edit) never hands out a used id.
    pub fn next(&mut self, store: &LogStore) -> Result<TaskId> {
        let high = self.last.max(store.max_id()?);
        let id = high
            .checked_add(1)
            .ok_or_else(|| Error::OperationFailed("task id space exhausted".to_string()))?;
        self.persist(id)?;
        tracing::debug!(id, "allocated task id");
        Ok(id)
    }

    /// Claim `id` if no log uses it, advancing the counter past it if needed
    pub fn reserve(&mut self, store: &LogStore, id: TaskId) -> Result<()> {
        if id == 0 {
            return Err(Error::InvalidArgument(
                "task id must be a positive integer".to_string(),
            ));
        }
        if store.contains(id)? {
            return Err(Error::DuplicateId(id));
        }
        if id > self.last {
            self.persist(id)?;
        }
        tracing::debug!(id, "reserved task id");
        Ok(())
    }

    /// Raise the counter to at least `id`. Returns true if it moved.
    pub fn raise_to(&mut self, id: TaskId) -> Result<bool> {
        if id <= self.last {
            return Ok(false);
        }
        self.persist(id)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse_body;
    use crate::storage::LogKind;
    use crate::task::Task;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LogStore, IdAllocator) {
        let dir = TempDir::new().expect("tempdir");
        let store = LogStore::new(dir.path(), 1000);
        store.init().expect("init");
        let ids = IdAllocator::new(dir.path().join("taskid"), 1000);
        (dir, store, ids)
    }

    fn task(id: TaskId) -> Task {
        Task::new(id, parse_body("something").unwrap())
    }

    #[test]
    fn ids_increase_and_persist() {
        let (_dir, store, ids) = setup();
        assert_eq!(ids.last().unwrap(), 0);
        assert_eq!(ids.next_id(&store).unwrap(), 1);
        assert_eq!(ids.next_id(&store).unwrap(), 2);
        assert_eq!(fs::read_to_string(ids.path()).unwrap(), "2");

        let reopened = IdAllocator::new(ids.path(), 1000);
        assert_eq!(reopened.next_id(&store).unwrap(), 3);
    }

    #[test]
    fn stale_counter_skips_used_ids() {
        let (_dir, store, ids) = setup();
        store.append(LogKind::Deleted, &task(41)).unwrap();
        fs::write(ids.path(), "3\n").unwrap();
        assert_eq!(ids.next_id(&store).unwrap(), 42);
    }

    #[test]
    fn reserve_rejects_used_ids() {
        let (_dir, store, ids) = setup();
        store.append(LogKind::Archived, &task(5)).unwrap();
        assert!(matches!(ids.reserve(&store, 5), Err(Error::DuplicateId(5))));
        assert!(matches!(
            ids.reserve(&store, 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn reserve_advances_counter_only_upwards() {
        let (_dir, store, ids) = setup();
        ids.reserve(&store, 10).unwrap();
        assert_eq!(ids.last().unwrap(), 10);

        ids.reserve(&store, 4).unwrap();
        assert_eq!(ids.last().unwrap(), 10);
        assert_eq!(ids.next_id(&store).unwrap(), 11);
    }

    #[test]
    fn garbage_counter_is_an_error() {
        let (_dir, store, ids) = setup();
        fs::write(ids.path(), "twelve").unwrap();
        assert!(matches!(
            ids.next_id(&store),
            Err(Error::OperationFailed(_))
        ));
    }

    #[test]
    fn held_guard_blocks_other_allocators() {
        let (_dir, store, ids) = setup();
        let _guard = ids.lock().unwrap();
        let contender = IdAllocator::new(ids.path(), 50);
        assert!(matches!(contender.next_id(&store), Err(Error::Locked(_))));
    }

    #[test]
    fn raise_to_only_moves_forward() {
        let (_dir, _store, ids) = setup();
        let mut guard = ids.lock().unwrap();
        assert!(guard.raise_to(7).unwrap());
        assert!(!guard.raise_to(3).unwrap());
        assert_eq!(guard.last(), 7);
    }
}
