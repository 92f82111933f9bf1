//! Organizations and the active-organization pointer
//!
//! # Directory Structure
//!
//! ```text
//! $TASKS_DIRECTORY/             # default ~/.tasks
//!   org                         # name of the active organization
//!   config.toml                 # optional configuration
//!   <name>/                     # one directory per organization
//!     current.log
//!     archived.log
//!     deleted.log
//!     taskid                    # last allocated id
//! ```
//!
//! The active organization is resolved once per invocation and handed to
//! the task manager as an `Organization` value.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::id::IdAllocator;
use crate::lock::{self, FileLock};
use crate::storage::{LogKind, LogStore};

/// Organization used when no pointer exists
pub const DEFAULT_ORGANIZATION: &str = "default";

/// Pointer file naming the active organization
pub const POINTER_FILE: &str = "org";

/// Counter file inside each organization directory
pub const COUNTER_FILE: &str = "taskid";

/// Directory name under the home directory when no root is configured
pub const DEFAULT_ROOT_DIR: &str = ".tasks";

/// Default root: `~/.tasks`
pub fn default_root() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(DEFAULT_ROOT_DIR))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT_DIR))
}

/// Check that a name is usable as an organization directory
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument(
            "organization name cannot be empty".to_string(),
        ));
    }
    if name.starts_with('.') {
        return Err(Error::InvalidArgument(format!(
            "organization name cannot start with '.': {name}"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::InvalidArgument(format!(
            "organization name may only contain letters, digits, '-', '_' and '.': {name}"
        )));
    }
    Ok(())
}

/// A resolved organization
#[derive(Debug, Clone, Serialize)]
pub struct Organization {
    name: String,
    dir: PathBuf,
    #[serde(skip)]
    lock_timeout_ms: u64,
}

impl Organization {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn counter_path(&self) -> PathBuf {
        self.dir.join(COUNTER_FILE)
    }

    pub fn log_path(&self, kind: LogKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn store(&self) -> LogStore {
        LogStore::new(&self.dir, self.lock_timeout_ms)
    }

    pub fn ids(&self) -> IdAllocator {
        IdAllocator::new(self.counter_path(), self.lock_timeout_ms)
    }

    /// Create the directory, empty logs and a zero counter where missing.
    ///
    /// Returns true if the organization directory was created.
    pub fn ensure_layout(&self) -> Result<bool> {
        let created = !self.exists();
        self.store().init()?;

        let counter = self.counter_path();
        if !counter.exists() {
            let _lock = FileLock::for_file(&counter, self.lock_timeout_ms)?;
            if !counter.exists() {
                lock::write_atomic_str(&counter, "0")?;
            }
        }

        if created {
            tracing::debug!(org = %self.name, dir = %self.dir.display(), "created organization");
        }
        Ok(created)
    }
}

/// Result of switching organizations
#[derive(Debug, Clone, Serialize)]
pub struct UseReport {
    pub organization: String,
    pub previous: String,
    pub created: bool,
    pub path: PathBuf,
}

/// The set of organizations under a root directory
#[derive(Debug, Clone)]
pub struct Registry {
    root: PathBuf,
    default_org: String,
    lock_timeout_ms: u64,
}

impl Registry {
    pub fn new(root: impl Into<PathBuf>, default_org: impl Into<String>, lock_timeout_ms: u64) -> Self {
        Self {
            root: root.into(),
            default_org: default_org.into(),
            lock_timeout_ms,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pointer_path(&self) -> PathBuf {
        self.root.join(POINTER_FILE)
    }

    /// Names of all organization directories, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Name of the active organization
    pub fn active(&self) -> Result<String> {
        let content = match fs::read_to_string(self.pointer_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(self.default_org.clone())
            }
            Err(err) => return Err(err.into()),
        };

        let name = content.lines().next().unwrap_or("").trim();
        if name.is_empty() {
            return Ok(self.default_org.clone());
        }
        validate_name(name)?;
        Ok(name.to_string())
    }

    /// Resolve an organization by name (nothing is created)
    pub fn open(&self, name: &str) -> Result<Organization> {
        validate_name(name)?;
        Ok(Organization {
            name: name.to_string(),
            dir: self.root.join(name),
            lock_timeout_ms: self.lock_timeout_ms,
        })
    }

    pub fn open_active(&self) -> Result<Organization> {
        let name = self.active()?;
        self.open(&name)
    }

    /// Create `name` if needed and make it the active organization
    pub fn use_org(&self, name: &str) -> Result<UseReport> {
        let org = self.open(name)?;
        let created = org.ensure_layout()?;
        let previous = self.active()?;

        let pointer = self.pointer_path();
        lock::write_atomic_locked(&pointer, format!("{name}\n").as_bytes(), self.lock_timeout_ms)?;

        tracing::debug!(from = %previous, to = %name, "switched organization");
        Ok(UseReport {
            organization: name.to_string(),
            previous,
            created,
            path: org.dir().to_path_buf(),
        })
    }
}
