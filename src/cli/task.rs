//! tasks add/list/show/change/remove/archive/clean command implementations

use serde::Serialize;

use crate::cli::{Context, FilterArgs};
use crate::error::Result;
use crate::manager::{AddOptions as NewTask, ListOptions as TaskQuery};
use crate::output::{emit_success, task_line, HumanOutput};
use crate::query::Filter;
use crate::storage::{LogKind, StoredTask, Updated};
use crate::task::{Priority, Task, TaskId};

/// Options for the add command
pub struct AddOptions {
    pub text: String,
    pub completed: bool,
    pub id: Option<TaskId>,
    pub ctx: Context,
}

/// Options for the list command
pub struct ListOptions {
    pub filter: FilterArgs,
    pub completed: bool,
    pub open: bool,
    pub archived: bool,
    pub deleted: bool,
    pub ctx: Context,
}

/// Options for the show command
pub struct ShowOptions {
    pub id: TaskId,
    pub ctx: Context,
}

/// An in-place change to one task of the current log
#[derive(Debug, Clone)]
pub enum Change {
    Complete,
    Uncomplete,
    Cancel,
    Edit(String),
    Priority(String),
    Block,
    Unblock,
    Delay,
    Undelay,
}

impl Change {
    fn command(&self) -> &'static str {
        match self {
            Change::Complete => "complete",
            Change::Uncomplete => "uncomplete",
            Change::Cancel => "cancel",
            Change::Edit(_) => "edit",
            Change::Priority(_) => "priority",
            Change::Block => "block",
            Change::Unblock => "unblock",
            Change::Delay => "delay",
            Change::Undelay => "undelay",
        }
    }

    fn done(&self) -> &'static str {
        match self {
            Change::Complete => "Completed",
            Change::Uncomplete => "Reopened",
            Change::Cancel => "Cancelled",
            Change::Edit(_) => "Edited",
            Change::Priority(_) => "Updated priority of",
            Change::Block => "Blocked",
            Change::Unblock => "Unblocked",
            Change::Delay => "Delayed",
            Change::Undelay => "Undelayed",
        }
    }
}

/// Options for single-task changes
pub struct ChangeOptions {
    pub id: TaskId,
    pub change: Change,
    pub ctx: Context,
}

/// Options for the remove command
pub struct RemoveOptions {
    pub id: TaskId,
    pub ctx: Context,
}

/// Options for the archive command
pub struct ArchiveOptions {
    pub days: Option<u32>,
    pub ctx: Context,
}

/// Options for the clean command
pub struct CleanOptions {
    pub ctx: Context,
}

#[derive(Serialize)]
struct TaskReport<'a> {
    organization: &'a str,
    task: &'a Task,
}

#[derive(Serialize)]
struct ListReport<'a> {
    organization: &'a str,
    logs: &'a [LogKind],
    filter: &'a Filter,
    count: usize,
    tasks: &'a [StoredTask],
}

#[derive(Serialize)]
struct ChangeReport<'a> {
    organization: &'a str,
    #[serde(flatten)]
    updated: &'a Updated,
}

#[derive(Serialize)]
struct MoveReport<'a> {
    organization: &'a str,
    to: LogKind,
    count: usize,
    tasks: &'a [Task],
}

/// Build a `Filter` from command-line filter flags
pub(crate) fn build_filter(args: &FilterArgs, completed: Option<bool>) -> Result<Filter> {
    let priority = args
        .priority
        .as_deref()
        .map(str::parse::<Priority>)
        .transpose()?;
    Ok(Filter {
        project: args.project.clone(),
        tag: args.tag.clone(),
        priority,
        range: args.range(super::today())?,
        completed,
    })
}

pub fn run_add(options: AddOptions) -> Result<()> {
    let manager = options.ctx.manager()?;
    let task = manager.add(
        &options.text,
        NewTask {
            completed: options.completed,
            id: options.id,
        },
    )?;

    let mut human = HumanOutput::new(format!("Added task {}", task.id));
    human.push_line(task_line(&task));

    emit_success(
        options.ctx.output,
        "add",
        &TaskReport {
            organization: manager.organization().name(),
            task: &task,
        },
        Some(&human),
    )
}

pub fn run_list(options: ListOptions) -> Result<()> {
    let manager = options.ctx.manager()?;

    let mut logs = vec![LogKind::Current];
    if options.archived {
        logs.push(LogKind::Archived);
    }
    if options.deleted {
        logs.push(LogKind::Deleted);
    }
    let completed = if options.completed {
        Some(true)
    } else if options.open {
        Some(false)
    } else {
        None
    };
    let list = TaskQuery {
        logs,
        filter: build_filter(&options.filter, completed)?,
    };

    let tasks = manager.list(&list)?;

    let human = if tasks.is_empty() {
        HumanOutput::new("No tasks")
    } else {
        HumanOutput::lines(tasks.iter().map(|stored| match stored.log {
            LogKind::Current => task_line(&stored.task),
            other => format!("{} ({other})", task_line(&stored.task)),
        }))
    };

    emit_success(
        options.ctx.output,
        "list",
        &ListReport {
            organization: manager.organization().name(),
            logs: &list.logs,
            filter: &list.filter,
            count: tasks.len(),
            tasks: &tasks,
        },
        Some(&human),
    )
}

pub fn run_show(options: ShowOptions) -> Result<()> {
    let manager = options.ctx.manager()?;
    let stored = manager.show(options.id)?;

    let task = &stored.task;
    let mut human = HumanOutput::new(task_line(task));
    human.push_summary("log", stored.log.as_str());
    human.push_summary("state", task.state().as_str());
    if let Some(priority) = task.markup.priority {
        human.push_summary("priority", priority.as_str());
    }
    for (name, date) in [
        ("due", task.markup.due),
        ("created", task.markup.created),
        ("completed", task.markup.completed),
        ("cancelled", task.markup.cancelled),
    ] {
        if let Some(date) = date {
            human.push_summary(name, date.to_string());
        }
    }

    emit_success(options.ctx.output, "show", &stored, Some(&human))
}

pub fn run_change(options: ChangeOptions) -> Result<()> {
    let manager = options.ctx.manager()?;
    let id = options.id;

    let updated = match &options.change {
        Change::Complete => manager.complete(id)?,
        Change::Uncomplete => manager.uncomplete(id)?,
        Change::Cancel => manager.cancel(id)?,
        Change::Edit(text) => manager.edit(id, text)?,
        Change::Priority(level) => manager.set_priority(id, level)?,
        Change::Block => manager.block(id)?,
        Change::Unblock => manager.unblock(id)?,
        Change::Delay => manager.delay(id)?,
        Change::Undelay => manager.undelay(id)?,
    };

    let header = if updated.changed {
        format!("{} task {id}", options.change.done())
    } else {
        format!("Task {id} unchanged")
    };
    let mut human = HumanOutput::new(header);
    human.push_line(task_line(&updated.task));

    emit_success(
        options.ctx.output,
        options.change.command(),
        &ChangeReport {
            organization: manager.organization().name(),
            updated: &updated,
        },
        Some(&human),
    )
}

pub fn run_remove(options: RemoveOptions) -> Result<()> {
    let manager = options.ctx.manager()?;
    let task = manager.remove(options.id)?;

    let human = HumanOutput::new(format!("Removed task {}", task.id));
    let tasks = [task];

    emit_success(
        options.ctx.output,
        "remove",
        &MoveReport {
            organization: manager.organization().name(),
            to: LogKind::Deleted,
            count: 1,
            tasks: &tasks,
        },
        Some(&human),
    )
}

pub fn run_archive(options: ArchiveOptions) -> Result<()> {
    let manager = options.ctx.manager()?;
    let moved = manager.archive(options.days)?;

    let mut human = HumanOutput::new(match moved.len() {
        0 => "Nothing to archive".to_string(),
        1 => "Archived 1 task".to_string(),
        n => format!("Archived {n} tasks"),
    });
    for task in &moved {
        human.push_line(task_line(task));
    }

    emit_success(
        options.ctx.output,
        "archive",
        &MoveReport {
            organization: manager.organization().name(),
            to: LogKind::Archived,
            count: moved.len(),
            tasks: &moved,
        },
        Some(&human),
    )
}

pub fn run_clean(options: CleanOptions) -> Result<()> {
    let manager = options.ctx.manager()?;
    let report = manager.clean()?;

    let mut human = HumanOutput::new(format!(
        "Cleaned organization {}",
        manager.organization().name()
    ));
    human.push_summary("records", report.compact.records.to_string());
    human.push_summary(
        "duplicates removed",
        report.compact.duplicates_removed.to_string(),
    );
    human.push_summary("lines dropped", report.compact.lines_dropped.to_string());
    human.push_summary("counter", report.counter.to_string());
    if report.counter_raised {
        human.push_warning(format!("id counter was behind; raised to {}", report.counter));
    }

    emit_success(options.ctx.output, "clean", &report, Some(&human))
}
