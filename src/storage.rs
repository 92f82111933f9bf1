//! Log storage for one organization
//!
//! Each organization keeps three line-oriented logs, one task per line in
//! canonical markup:
//!
//! ```text
//! <org>/
//!   current.log                 # open and recently finished tasks
//!   archived.log                # finished tasks moved out of current
//!   deleted.log                 # removed tasks, kept for the audit trail
//! ```
//!
//! Line order is insertion order. Every mutation holds the sidecar lock of
//! the file it touches (`current.log.lock`, ...). Whole-file rewrites go
//! through temp file + rename, appends through a single synced write.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::lock::{self, FileLock};
use crate::markup::{self, RenderMode};
use crate::task::{Task, TaskId};

/// The three logs of an organization, in move order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Current,
    Archived,
    Deleted,
}

impl LogKind {
    pub const ALL: [LogKind; 3] = [LogKind::Current, LogKind::Archived, LogKind::Deleted];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Current => "current",
            LogKind::Archived => "archived",
            LogKind::Deleted => "deleted",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            LogKind::Current => "current.log",
            LogKind::Archived => "archived.log",
            LogKind::Deleted => "deleted.log",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "current" => Ok(LogKind::Current),
            "archived" | "archive" => Ok(LogKind::Archived),
            "deleted" => Ok(LogKind::Deleted),
            _ => Err(Error::InvalidArgument(format!(
                "invalid log '{s}': must be current, archived or deleted"
            ))),
        }
    }
}

/// A task together with where it is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredTask {
    pub log: LogKind,
    /// Zero-based physical line in the log file, blank lines counted
    pub line: usize,
    #[serde(flatten)]
    pub task: Task,
}

impl AsRef<Task> for StoredTask {
    fn as_ref(&self) -> &Task {
        &self.task
    }
}

/// Result of an in-place update
#[derive(Debug, Clone, Serialize)]
pub struct Updated {
    pub task: Task,
    pub changed: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompactReport {
    /// Records kept across all logs
    pub records: usize,
    /// Extra copies dropped (left behind by an interrupted move)
    pub duplicates_removed: usize,
    /// Blank or torn lines dropped
    pub lines_dropped: usize,
    /// Logs whose contents changed
    pub rewritten: Vec<LogKind>,
    /// Highest id present in any log
    pub max_id: TaskId,
}

/// Raw contents of a log file split into lines
struct LogLines {
    path: PathBuf,
    lines: Vec<String>,
}

impl LogLines {
    fn read(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };
        let terminated = content.is_empty() || content.ends_with('\n');
        let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

        // A final line without newline that doesn't parse is a torn append
        if !terminated {
            if let Some(last) = lines.last() {
                if markup::parse_line(last).is_err() {
                    tracing::warn!(path = %path.display(), "ignoring torn last line");
                    lines.pop();
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            lines,
        })
    }

    fn parse(&self, kind: LogKind) -> Result<Vec<StoredTask>> {
        let mut tasks = Vec::with_capacity(self.lines.len());
        for (idx, line) in self.lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let task = markup::parse_line(line).map_err(|source| Error::CorruptLog {
                path: self.path.clone(),
                line: idx + 1,
                source,
            })?;
            tasks.push(StoredTask {
                log: kind,
                line: idx,
                task,
            });
        }
        Ok(tasks)
    }

    fn write(&self) -> Result<()> {
        let mut data = self.lines.join("\n");
        if !data.is_empty() {
            data.push('\n');
        }
        lock::write_atomic(&self.path, data.as_bytes())
    }
}

/// Line log storage rooted at an organization directory
#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
    lock_timeout_ms: u64,
}

impl LogStore {
    pub fn new(dir: impl Into<PathBuf>, lock_timeout_ms: u64) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout_ms,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self, kind: LogKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    fn lock(&self, kind: LogKind) -> Result<FileLock> {
        FileLock::for_file(self.log_path(kind), self.lock_timeout_ms)
    }

    /// Create the directory and any missing log files (existing ones untouched)
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        for kind in LogKind::ALL {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.log_path(kind))?;
        }
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Load every task of one log in file order
    pub fn load(&self, kind: LogKind) -> Result<Vec<StoredTask>> {
        LogLines::read(&self.log_path(kind))?.parse(kind)
    }

    /// Load several logs, concatenated in the order given
    pub fn load_many(&self, kinds: &[LogKind]) -> Result<Vec<StoredTask>> {
        let mut tasks = Vec::new();
        for kind in kinds {
            tasks.extend(self.load(*kind)?);
        }
        Ok(tasks)
    }

    /// Look a task up across current, archived and deleted
    pub fn find(&self, id: TaskId) -> Result<StoredTask> {
        self.find_opt(id)?.ok_or(Error::NotFound(id))
    }

    pub fn find_opt(&self, id: TaskId) -> Result<Option<StoredTask>> {
        for kind in LogKind::ALL {
            if let Some(found) = self.load(kind)?.into_iter().find(|t| t.task.id == id) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    pub fn contains(&self, id: TaskId) -> Result<bool> {
        Ok(self.find_opt(id)?.is_some())
    }

    /// Highest id in any log, 0 when all are empty
    pub fn max_id(&self) -> Result<TaskId> {
        let tasks = self.load_many(&LogKind::ALL)?;
        Ok(tasks.iter().map(|t| t.task.id).max().unwrap_or(0))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Append a task as the last line of a log
    pub fn append(&self, kind: LogKind, task: &Task) -> Result<()> {
        let _lock = self.lock(kind)?;
        self.append_unlocked(kind, task)
    }

    fn append_unlocked(&self, kind: LogKind, task: &Task) -> Result<()> {
        let path = self.log_path(kind);
        fs::create_dir_all(&self.dir)?;

        let mut data = String::new();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        if !content.is_empty() && !content.ends_with('\n') {
            let tail_start = content.rfind('\n').map(|idx| idx + 1).unwrap_or(0);
            if markup::parse_line(&content[tail_start..]).is_ok() {
                data.push('\n');
            } else {
                tracing::warn!(path = %path.display(), "truncating torn last line");
                file.set_len(tail_start as u64)?;
            }
        }

        data.push_str(&markup::render(task, RenderMode::Raw));
        data.push('\n');
        file.write_all(data.as_bytes())?;
        file.sync_all()?;

        tracing::debug!(log = %kind, id = task.id, "appended task");
        Ok(())
    }

    /// Replace the task on `line` of a log.
    ///
    /// The line must still hold a task with the same id, otherwise the log
    /// changed underneath the caller and nothing is written.
    pub fn rewrite_line(&self, kind: LogKind, line: usize, task: &Task) -> Result<()> {
        let _lock = self.lock(kind)?;
        let mut log = LogLines::read(&self.log_path(kind))?;

        let current = log
            .lines
            .get(line)
            .map(|raw| markup::parse_line(raw))
            .transpose()
            .map_err(|source| Error::CorruptLog {
                path: log.path.clone(),
                line: line + 1,
                source,
            })?;
        match current {
            Some(existing) if existing.id == task.id => {}
            _ => {
                return Err(Error::OperationFailed(format!(
                    "{} line {} no longer holds task {}",
                    kind,
                    line + 1,
                    task.id
                )))
            }
        }

        log.lines[line] = markup::render(task, RenderMode::Raw);
        log.write()?;
        tracing::debug!(log = %kind, id = task.id, line, "rewrote task");
        Ok(())
    }

    /// Locate a task in one log and modify it in place under the log lock.
    ///
    /// `update` returns whether it changed anything; unchanged tasks are not
    /// written back.
    pub fn update_task<F>(&self, kind: LogKind, id: TaskId, update: F) -> Result<Updated>
    where
        F: FnOnce(&mut Task) -> Result<bool>,
    {
        let _lock = self.lock(kind)?;
        let mut log = LogLines::read(&self.log_path(kind))?;
        let stored = log
            .parse(kind)?
            .into_iter()
            .find(|t| t.task.id == id)
            .ok_or(Error::NotFound(id))?;

        let mut task = stored.task;
        let changed = update(&mut task)?;
        if changed {
            log.lines[stored.line] = markup::render(&task, RenderMode::Raw);
            log.write()?;
            tracing::debug!(log = %kind, id, line = stored.line, "updated task");
        }

        Ok(Updated { task, changed })
    }

    /// Move one task between logs, transforming it on the way
    pub fn move_task<F>(&self, id: TaskId, from: LogKind, to: LogKind, transform: F) -> Result<Task>
    where
        F: FnMut(&mut Task),
    {
        let mut moved = self.move_matching(from, to, |task| task.id == id, transform)?;
        moved.pop().ok_or(Error::NotFound(id))
    }

    /// Move every task of `from` selected by `select` into `to`.
    ///
    /// The destination is appended first and the source rewritten second, so
    /// an interruption leaves a duplicate rather than losing the task.
    /// `compact` removes such duplicates.
    pub fn move_matching<S, F>(
        &self,
        from: LogKind,
        to: LogKind,
        mut select: S,
        mut transform: F,
    ) -> Result<Vec<Task>>
    where
        S: FnMut(&Task) -> bool,
        F: FnMut(&mut Task),
    {
        if from == to {
            return Err(Error::InvalidArgument(format!(
                "cannot move tasks from {from} to itself"
            )));
        }

        let _source_lock = self.lock(from)?;
        let mut source = LogLines::read(&self.log_path(from))?;
        let selected: Vec<StoredTask> = source
            .parse(from)?
            .into_iter()
            .filter(|stored| select(&stored.task))
            .collect();
        if selected.is_empty() {
            return Ok(Vec::new());
        }

        let mut moved = Vec::with_capacity(selected.len());
        {
            let _dest_lock = self.lock(to)?;
            for stored in &selected {
                let mut task = stored.task.clone();
                transform(&mut task);
                self.append_unlocked(to, &task)?;
                moved.push(task);
            }
        }

        let mut drop_lines: Vec<usize> = selected.iter().map(|s| s.line).collect();
        drop_lines.sort_unstable();
        let mut idx = 0;
        source.lines.retain(|_| {
            let keep = drop_lines.binary_search(&idx).is_err();
            idx += 1;
            keep
        });
        source.write()?;

        tracing::debug!(from = %from, to = %to, count = moved.len(), "moved tasks");
        Ok(moved)
    }

    /// Rewrite all logs canonically and drop duplicate ids.
    ///
    /// For an id present in several logs the copy in the furthest log wins
    /// (deleted over archived over current), since a move writes its
    /// destination first. Within one log the last copy wins.
    pub fn compact(&self) -> Result<CompactReport> {
        let mut locks = Vec::with_capacity(LogKind::ALL.len());
        for kind in LogKind::ALL {
            locks.push(self.lock(kind)?);
        }

        let mut logs = Vec::with_capacity(LogKind::ALL.len());
        let mut winners: HashMap<TaskId, (LogKind, usize)> = HashMap::new();
        let mut report = CompactReport::default();

        for kind in LogKind::ALL {
            let log = LogLines::read(&self.log_path(kind))?;
            let tasks = log.parse(kind)?;
            for stored in &tasks {
                // later logs and later lines overwrite earlier ones
                winners.insert(stored.task.id, (kind, stored.line));
            }
            logs.push((kind, log, tasks));
        }

        for (kind, mut log, tasks) in logs {
            let raw_count = fs::read_to_string(&log.path)
                .map(|content| content.lines().count())
                .unwrap_or(0);

            let kept: Vec<String> = tasks
                .iter()
                .filter(|stored| winners.get(&stored.task.id) == Some(&(kind, stored.line)))
                .map(|stored| markup::render(&stored.task, RenderMode::Raw))
                .collect();

            report.duplicates_removed += tasks.len() - kept.len();
            report.lines_dropped += raw_count.saturating_sub(tasks.len());
            report.records += kept.len();

            if kept != log.lines || raw_count != log.lines.len() {
                log.lines = kept;
                log.write()?;
                report.rewritten.push(kind);
            }
        }

        report.max_id = winners.keys().copied().max().unwrap_or(0);
        drop(locks);

        tracing::debug!(
            records = report.records,
            duplicates = report.duplicates_removed,
            "compacted logs"
        );
        Ok(report)
    }
}
