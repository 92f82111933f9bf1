//! Task operations for one organization.
//!
//! `TaskManager` is what the CLI talks to. It owns no state beyond paths and
//! settings; every call reads the logs fresh and holds file locks only for
//! its own duration.

use chrono::{Duration, Local, NaiveDate};
use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::id::IdAllocator;
use crate::markup;
use crate::org::Organization;
use crate::query::{Filter, Standup, Summary, SummaryOptions};
use crate::storage::{CompactReport, LogKind, LogStore, StoredTask, Updated};
use crate::task::{Priority, Task, TaskId, ARCHIVED, BLOCKED, DELAYED, DELETED};

#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    /// Record the task as already completed today
    pub completed: bool,
    /// Use this id instead of the next free one
    pub id: Option<TaskId>,
}

#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Logs to read, listed in this order
    pub logs: Vec<LogKind>,
    pub filter: Filter,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            logs: vec![LogKind::Current],
            filter: Filter::default(),
        }
    }
}

/// Outcome of `clean`
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    #[serde(flatten)]
    pub compact: CompactReport,
    /// Counter value after cleaning
    pub counter: TaskId,
    pub counter_raised: bool,
}

pub struct TaskManager {
    org: Organization,
    store: LogStore,
    ids: IdAllocator,
    archive_after_days: u32,
    today: NaiveDate,
}

impl TaskManager {
    pub fn new(org: Organization, config: &Config) -> Self {
        Self {
            store: org.store(),
            ids: org.ids(),
            org,
            archive_after_days: config.archive.after_days,
            today: Local::now().date_naive(),
        }
    }

    /// Pin the date used for stamps and relative dates
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn organization(&self) -> &Organization {
        &self.org
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn add(&self, text: &str, options: AddOptions) -> Result<Task> {
        let mut parsed = markup::parse_input(text, self.today)?;
        parsed.created.get_or_insert(self.today);
        if options.completed {
            parsed.completed.get_or_insert(self.today);
        }

        self.org.ensure_layout()?;

        // the counter lock is held until the line is appended
        let mut counter = self.ids.lock()?;
        let id = match options.id {
            Some(id) => {
                counter.reserve(&self.store, id)?;
                id
            }
            None => counter.next(&self.store)?,
        };

        let task = Task::new(id, parsed);
        self.store.append(LogKind::Current, &task)?;
        drop(counter);

        tracing::debug!(org = %self.org.name(), id, "added task");
        Ok(task)
    }

    pub fn list(&self, options: &ListOptions) -> Result<Vec<StoredTask>> {
        let tasks = self.store.load_many(&options.logs)?;
        Ok(options.filter.apply(tasks).collect())
    }

    pub fn show(&self, id: TaskId) -> Result<StoredTask> {
        self.store.find(id)
    }

    pub fn complete(&self, id: TaskId) -> Result<Updated> {
        let today = self.today;
        self.update_current(id, |task| task.complete(today))
    }

    pub fn uncomplete(&self, id: TaskId) -> Result<Updated> {
        self.update_current(id, Task::uncomplete)
    }

    pub fn cancel(&self, id: TaskId) -> Result<Updated> {
        let today = self.today;
        self.update_current(id, |task| task.cancel(today))
    }

    /// Replace the text of a task, keeping its lifecycle dates
    pub fn edit(&self, id: TaskId, text: &str) -> Result<Updated> {
        let parsed = markup::parse_input(text, self.today)?;
        self.update_current(id, move |task| {
            let before = task.clone();
            task.apply_edit(parsed);
            *task != before
        })
    }

    /// Set or clear the priority from a level such as `high`, `h`, `3` or `none`
    pub fn set_priority(&self, id: TaskId, level: &str) -> Result<Updated> {
        let priority: Option<Priority> = Priority::parse_level(level)?;
        self.update_current(id, |task| task.set_priority(priority))
    }

    pub fn block(&self, id: TaskId) -> Result<Updated> {
        self.update_current(id, |task| task.set_flag(BLOCKED))
    }

    pub fn unblock(&self, id: TaskId) -> Result<Updated> {
        self.update_current(id, |task| task.clear_flag(BLOCKED))
    }

    pub fn delay(&self, id: TaskId) -> Result<Updated> {
        self.update_current(id, |task| task.set_flag(DELAYED))
    }

    pub fn undelay(&self, id: TaskId) -> Result<Updated> {
        self.update_current(id, |task| task.clear_flag(DELAYED))
    }

    /// Move a task to the deleted log
    pub fn remove(&self, id: TaskId) -> Result<Task> {
        self.org.ensure_layout()?;
        let today = self.today;
        match self
            .store
            .move_task(id, LogKind::Current, LogKind::Deleted, |task| {
                task.stamp(DELETED, today)
            }) {
            Err(Error::NotFound(_)) => Err(self.not_in_current(id)),
            other => other,
        }
    }

    /// Move finished tasks at least `days` old to the archived log.
    ///
    /// `None` uses the configured `archive.after_days`.
    pub fn archive(&self, days: Option<u32>) -> Result<Vec<Task>> {
        self.org.ensure_layout()?;
        let days = days.unwrap_or(self.archive_after_days);
        let today = self.today;
        // a cutoff before the earliest representable date matches nothing
        let Some(cutoff) = today.checked_sub_signed(Duration::days(i64::from(days))) else {
            tracing::debug!(org = %self.org.name(), days, "archive cutoff out of range");
            return Ok(Vec::new());
        };

        let moved = self.store.move_matching(
            LogKind::Current,
            LogKind::Archived,
            |task| task.finished_on().is_some_and(|date| date <= cutoff),
            |task| task.stamp(ARCHIVED, today),
        )?;

        tracing::debug!(org = %self.org.name(), count = moved.len(), days, "archived tasks");
        Ok(moved)
    }

    /// Drop duplicates and torn lines, then bring the counter up to date
    pub fn clean(&self) -> Result<CleanReport> {
        self.org.ensure_layout()?;

        // same order as add: counter first, then logs
        let mut counter = self.ids.lock()?;
        let compact = self.store.compact()?;
        let counter_raised = counter.raise_to(compact.max_id)?;

        Ok(CleanReport {
            counter: counter.last(),
            counter_raised,
            compact,
        })
    }

    /// Aggregate current and archived tasks
    pub fn summary(&self, filter: &Filter, options: SummaryOptions) -> Result<Summary> {
        let tasks = self
            .store
            .load_many(&[LogKind::Current, LogKind::Archived])?;
        let selected: Vec<StoredTask> = filter.apply(tasks).collect();
        Ok(Summary::build(
            selected.iter().map(|stored| &stored.task),
            options,
        ))
    }

    pub fn standup(&self) -> Result<Standup> {
        let tasks = self.store.load(LogKind::Current)?;
        Ok(Standup::build(
            tasks.iter().map(|stored| &stored.task),
            self.today,
        ))
    }

    fn update_current<F>(&self, id: TaskId, update: F) -> Result<Updated>
    where
        F: FnOnce(&mut Task) -> bool,
    {
        self.org.ensure_layout()?;
        match self
            .store
            .update_task(LogKind::Current, id, |task| Ok(update(task)))
        {
            Err(Error::NotFound(_)) => Err(self.not_in_current(id)),
            other => other,
        }
    }

    /// Error for an id that is not in the current log
    fn not_in_current(&self, id: TaskId) -> Error {
        match self.store.find_opt(id) {
            Ok(Some(stored)) => Error::InvalidArgument(format!(
                "task {id} is in the {} log; only current tasks can be changed",
                stored.log
            )),
            Ok(None) => Error::NotFound(id),
            Err(err) => err,
        }
    }
}
