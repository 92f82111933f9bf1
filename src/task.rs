//! Task records.
//!
//! A task is one line of markup text. The structured fields here are always
//! derived from (and rendered back to) that line by the `markup` module; no
//! field is stored anywhere else.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::markup;

/// Numeric task identifier, unique across all logs of an organization
pub type TaskId = u64;

/// Flag attribute marking a task as blocked
pub const BLOCKED: &str = "blocked";
/// Flag attribute hiding an open task from the standup view
pub const DELAYED: &str = "delayed";
/// Stamp added when a task is moved to the archived log
pub const ARCHIVED: &str = "archived";
/// Stamp added when a task is moved to the deleted log
pub const DELETED: &str = "deleted";

/// Task priority.
///
/// Covers both vocabularies found in old logs (`critical`, `important`,
/// `high`, `low`) and newer ones (`low`, `medium`, `high`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Important,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Important,
        Priority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Important => "important",
            Priority::Critical => "critical",
        }
    }

    /// Match a markup keyword (`@high`) to a priority
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == keyword)
    }

    /// Parse a user-supplied level, including shorthands.
    ///
    /// Returns `Ok(None)` for an explicit "no priority".
    pub fn parse_level(level: &str) -> Result<Option<Self>> {
        let level = level.trim().to_lowercase();
        let priority = match level.as_str() {
            "none" | "n" | "0" => return Ok(None),
            "low" | "l" | "1" => Priority::Low,
            "medium" | "m" | "2" => Priority::Medium,
            "high" | "h" | "3" => Priority::High,
            "important" | "i" => Priority::Important,
            "critical" | "c" => Priority::Critical,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "invalid priority '{level}': expected none, low, medium, high, important or critical"
                )))
            }
        };
        Ok(Some(priority))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Priority::parse_level(s)?.ok_or_else(|| {
            Error::InvalidArgument("priority filter cannot be 'none'".to_string())
        })
    }
}

/// Completion state, derived from the date attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Open,
    Completed,
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Open => "open",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
        }
    }

    /// Marker character used in the stored line prefix
    pub fn marker(&self) -> char {
        match self {
            TaskState::Open => ' ',
            TaskState::Completed => 'x',
            TaskState::Cancelled => '-',
        }
    }

    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            ' ' => Some(TaskState::Open),
            'x' => Some(TaskState::Completed),
            '-' => Some(TaskState::Cancelled),
            _ => None,
        }
    }
}

/// An `@name` or `@name(value)` attribute outside the first-class set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Attribute {
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn valued(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

/// The structured content of a task line, without its id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Markup {
    pub description: String,
    pub tags: BTreeSet<String>,
    pub projects: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
}

impl Markup {
    pub fn state(&self) -> TaskState {
        if self.completed.is_some() {
            TaskState::Completed
        } else if self.cancelled.is_some() {
            TaskState::Cancelled
        } else {
            TaskState::Open
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Insert or replace an opaque attribute. Returns true if anything changed.
    pub fn set_attribute(&mut self, attribute: Attribute) -> bool {
        match self.attributes.iter_mut().find(|a| a.name == attribute.name) {
            Some(existing) if *existing == attribute => false,
            Some(existing) => {
                *existing = attribute;
                true
            }
            None => {
                self.attributes.push(attribute);
                true
            }
        }
    }

    /// Remove an opaque attribute by name. Returns true if it was present.
    pub fn remove_attribute(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|attr| attr.name != name);
        self.attributes.len() != before
    }
}

/// A task: id plus parsed markup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(flatten)]
    pub markup: Markup,
}

impl Task {
    pub fn new(id: TaskId, markup: Markup) -> Self {
        Self { id, markup }
    }

    pub fn state(&self) -> TaskState {
        self.markup.state()
    }

    /// Completed or cancelled
    pub fn is_finished(&self) -> bool {
        self.state() != TaskState::Open
    }

    /// Date the task was completed or cancelled
    pub fn finished_on(&self) -> Option<NaiveDate> {
        self.markup.completed.or(self.markup.cancelled)
    }

    /// Date used for range filters and summary buckets
    pub fn activity_date(&self) -> Option<NaiveDate> {
        self.finished_on().or(self.markup.created)
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.markup.has_flag(name)
    }

    /// Mark completed on `today`. Already completed tasks keep their date.
    pub fn complete(&mut self, today: NaiveDate) -> bool {
        if self.markup.completed.is_some() {
            return false;
        }
        self.markup.completed = Some(today);
        true
    }

    /// Clear both completion and cancellation
    pub fn uncomplete(&mut self) -> bool {
        let changed = self.markup.completed.is_some() || self.markup.cancelled.is_some();
        self.markup.completed = None;
        self.markup.cancelled = None;
        changed
    }

    pub fn cancel(&mut self, today: NaiveDate) -> bool {
        if self.markup.cancelled.is_some() {
            return false;
        }
        self.markup.cancelled = Some(today);
        true
    }

    pub fn set_priority(&mut self, priority: Option<Priority>) -> bool {
        if self.markup.priority == priority {
            return false;
        }
        self.markup.priority = priority;
        true
    }

    pub fn set_flag(&mut self, name: &str) -> bool {
        self.markup.set_attribute(Attribute::flag(name))
    }

    pub fn clear_flag(&mut self, name: &str) -> bool {
        self.markup.remove_attribute(name)
    }

    /// Record a dated transition such as `@deleted(2024-05-01)`
    pub fn stamp(&mut self, name: &str, date: NaiveDate) {
        self.markup
            .set_attribute(Attribute::valued(name, markup::format_date(date)));
    }

    /// Replace the editable content with freshly parsed text.
    ///
    /// Lifecycle dates survive unless the new text sets them.
    pub fn apply_edit(&mut self, edit: Markup) {
        let previous = std::mem::replace(&mut self.markup, edit);
        self.markup.completed = self.markup.completed.or(previous.completed);
        self.markup.cancelled = self.markup.cancelled.or(previous.cancelled);
        self.markup.created = self.markup.created.or(previous.created);
    }
}

impl AsRef<Task> for Task {
    fn as_ref(&self) -> &Task {
        self
    }
}
