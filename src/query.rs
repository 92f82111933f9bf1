//! Filtering and summaries over loaded tasks.
//!
//! Everything here is pure: callers load tasks from the store and pass them
//! in, together with `today` where the result depends on it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::task::{Priority, Task, TaskState, DELAYED};

/// Group label for tasks without any project or tag
pub const NO_GROUP: &str = "(none)";

/// Inclusive date range, either end optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(since: Option<NaiveDate>, until: Option<NaiveDate>) -> Result<Self> {
        if let (Some(since), Some(until)) = (since, until) {
            if since > until {
                return Err(Error::InvalidArgument(format!(
                    "empty date range: {since} is after {until}"
                )));
            }
        }
        Ok(Self { since, until })
    }

    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }

    /// Whether `date` falls inside the range. An undated task only matches
    /// an unbounded range.
    pub fn contains(&self, date: Option<NaiveDate>) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let Some(date) = date else {
            return false;
        };
        self.since.map_or(true, |since| date >= since) && self.until.map_or(true, |until| date <= until)
    }
}

/// Task selection criteria. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    pub range: DateRange,
    /// `Some(true)`: finished tasks only, `Some(false)`: open tasks only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl Filter {
    pub fn matches(&self, task: &Task) -> bool {
        let markup = &task.markup;
        if let Some(project) = &self.project {
            if !markup.projects.contains(project) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !markup.tags.contains(tag) {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if markup.priority != Some(priority) {
                return false;
            }
        }
        if let Some(finished) = self.completed {
            if task.is_finished() != finished {
                return false;
            }
        }
        self.range.contains(task.activity_date())
    }

    /// Lazily keep the matching items, in input order
    pub fn apply<'a, I, T>(&'a self, items: I) -> impl Iterator<Item = T> + 'a
    where
        I: IntoIterator<Item = T> + 'a,
        I::IntoIter: 'a,
        T: AsRef<Task> + 'a,
    {
        items
            .into_iter()
            .filter(move |item| self.matches(item.as_ref()))
    }
}

/// Bucket width for summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Day,
    Week,
}

impl Period {
    /// Bucket key for a date: `2024-05-02` or `2024-W18`
    pub fn key(&self, date: NaiveDate) -> String {
        match self {
            Period::Day => date.format("%Y-%m-%d").to_string(),
            Period::Week => {
                let week = date.iso_week();
                format!("{:04}-W{:02}", week.year(), week.week())
            }
        }
    }
}

/// What the per-bucket group counts are keyed by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Project,
    Tag,
    None,
}

impl GroupBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::Project => "project",
            GroupBy::Tag => "tag",
            GroupBy::None => "none",
        }
    }

    fn groups<'a>(&self, task: &'a Task) -> Vec<&'a str> {
        let keys = match self {
            GroupBy::Project => &task.markup.projects,
            GroupBy::Tag => &task.markup.tags,
            GroupBy::None => return Vec::new(),
        };
        if keys.is_empty() {
            vec![NO_GROUP]
        } else {
            keys.iter().map(String::as_str).collect()
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupBy {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "project" | "projects" => Ok(GroupBy::Project),
            "tag" | "tags" => Ok(GroupBy::Tag),
            "none" => Ok(GroupBy::None),
            _ => Err(Error::InvalidArgument(format!(
                "invalid grouping '{s}': must be project, tag or none"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryOptions {
    pub period: Period,
    pub group_by: GroupBy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub total: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub open: usize,
}

impl Counts {
    fn add(&mut self, task: &Task) {
        self.total += 1;
        match task.state() {
            TaskState::Open => self.open += 1,
            TaskState::Completed => self.completed += 1,
            TaskState::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub period: String,
    #[serde(flatten)]
    pub counts: Counts,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub period: Period,
    pub group_by: GroupBy,
    pub buckets: Vec<Bucket>,
    pub totals: Counts,
    pub undated: usize,
}

impl Summary {
    pub fn build<'a, I>(tasks: I, options: SummaryOptions) -> Self
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();
        let mut totals = Counts::default();
        let mut undated = 0;

        for task in tasks {
            totals.add(task);
            let Some(date) = task.activity_date() else {
                undated += 1;
                continue;
            };

            let key = options.period.key(date);
            let bucket = buckets.entry(key.clone()).or_insert_with(|| Bucket {
                period: key,
                counts: Counts::default(),
                groups: BTreeMap::new(),
            });
            bucket.counts.add(task);
            for group in options.group_by.groups(task) {
                *bucket.groups.entry(group.to_string()).or_default() += 1;
            }
        }

        Summary {
            period: options.period,
            group_by: options.group_by,
            // keys are zero-padded, so string order is date order
            buckets: buckets.into_values().collect(),
            totals,
            undated,
        }
    }
}

/// Yesterday / today view for a daily standup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standup {
    pub date: NaiveDate,
    pub yesterday: Vec<Task>,
    pub today: Vec<Task>,
}

impl Standup {
    pub fn build<'a, I>(tasks: I, today: NaiveDate) -> Self
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let previous = today - Duration::days(1);
        let mut yesterday = Vec::new();
        let mut done_today = Vec::new();
        let mut open = Vec::new();

        for task in tasks {
            match task.state() {
                TaskState::Completed if task.markup.completed == Some(previous) => {
                    yesterday.push(task.clone())
                }
                TaskState::Completed if task.markup.completed == Some(today) => {
                    done_today.push(task.clone())
                }
                TaskState::Open if !task.has_flag(DELAYED) => open.push(task.clone()),
                _ => {}
            }
        }

        done_today.extend(open);
        Standup {
            date: today,
            yesterday,
            today: done_today,
        }
    }
}
