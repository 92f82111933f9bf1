//! Command-line interface for tasks
//!
//! This module defines the CLI structure using clap derive macros.
//! Commands are implemented in submodules grouped by what they touch.

use std::path::PathBuf;

use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::manager::TaskManager;
use crate::markup;
use crate::org::{self, Organization, Registry};
use crate::output::OutputOptions;
use crate::query::DateRange;

mod orgs;
mod summary;
mod task;

/// tasks - a plain-text task tracker
///
/// Tasks are stored one per line in per-organization logs under
/// `~/.tasks` (or `$TASKS_DIRECTORY`).
#[derive(Parser, Debug)]
#[command(name = "tasks")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Root directory holding all organizations
    #[arg(long, global = true, env = "TASKS_DIRECTORY")]
    pub root: Option<PathBuf>,

    /// Organization to use for this invocation only
    #[arg(long, global = true, env = "TASKS_ORG")]
    pub org: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a task
    #[command(visible_alias = "a")]
    Add {
        /// Record the task as already completed
        #[arg(short, long)]
        completed: bool,

        /// Use this id instead of the next free one
        #[arg(long)]
        id: Option<u64>,

        /// Task text: description, +tags, #projects, @attributes
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// List tasks
    #[command(visible_alias = "ls")]
    List {
        #[command(flatten)]
        filter: FilterArgs,

        /// Only completed or cancelled tasks
        #[arg(long, conflicts_with = "open")]
        completed: bool,

        /// Only open tasks
        #[arg(long)]
        open: bool,

        /// Include the archived log
        #[arg(long)]
        archived: bool,

        /// Include the deleted log
        #[arg(long)]
        deleted: bool,

        /// Include every log
        #[arg(long)]
        all: bool,
    },

    /// Show one task
    Show {
        id: u64,
    },

    /// Mark a task completed
    #[command(visible_alias = "c")]
    Complete {
        id: u64,
    },

    /// Reopen a completed or cancelled task
    #[command(visible_aliases = ["u", "C"])]
    Uncomplete {
        id: u64,
    },

    /// Mark a task cancelled
    Cancel {
        id: u64,
    },

    /// Move a task to the deleted log
    #[command(visible_alias = "rm")]
    Remove {
        id: u64,
    },

    /// Replace the text of a task
    #[command(visible_alias = "e")]
    Edit {
        id: u64,

        /// New task text
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// Set the priority of a task (low, medium, high, important, critical, none)
    #[command(visible_alias = "p")]
    Priority {
        id: u64,
        level: String,
    },

    /// Flag a task as blocked
    #[command(visible_alias = "b")]
    Block {
        id: u64,
    },

    /// Remove the blocked flag
    #[command(visible_alias = "B")]
    Unblock {
        id: u64,
    },

    /// Hide an open task from the standup view
    #[command(visible_alias = "d")]
    Delay {
        id: u64,
    },

    /// Remove the delayed flag
    #[command(visible_alias = "D")]
    Undelay {
        id: u64,
    },

    /// Move finished tasks to the archived log
    Archive {
        /// Only archive tasks finished at least this many days ago
        #[arg(long)]
        days: Option<u32>,
    },

    /// Drop duplicate and torn lines, resync the id counter
    Clean,

    /// Summarize activity per day or week
    #[command(visible_alias = "s")]
    Summary {
        #[command(flatten)]
        filter: FilterArgs,

        /// Bucket by ISO week
        #[arg(long)]
        weekly: bool,

        /// Group counts by: project, tag, none
        #[arg(long = "by")]
        group_by: Option<String>,

        /// Show yesterday/today instead of buckets
        #[arg(long)]
        standup: bool,
    },

    /// Switch the active organization, creating it if needed
    Use {
        name: String,
    },

    /// List organizations
    Orgs,
}

/// Filters shared by `list` and `summary`
#[derive(clap::Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only tasks in this project
    #[arg(short, long)]
    pub project: Option<String>,

    /// Only tasks with this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Only tasks with this priority
    #[arg(long)]
    pub priority: Option<String>,

    /// Earliest activity date (YYYY-MM-DD, today, yesterday, or Nd for N days ago)
    #[arg(long)]
    pub since: Option<String>,

    /// Latest activity date
    #[arg(long)]
    pub until: Option<String>,
}

impl FilterArgs {
    pub fn range(&self, today: NaiveDate) -> Result<DateRange> {
        let since = self
            .since
            .as_deref()
            .map(|value| parse_date_arg(value, today))
            .transpose()?;
        let until = self
            .until
            .as_deref()
            .map(|value| parse_date_arg(value, today))
            .transpose()?;
        DateRange::new(since, until)
    }
}

/// Parse a date given on the command line. Relative forms count backwards.
pub fn parse_date_arg(value: &str, today: NaiveDate) -> Result<NaiveDate> {
    let value = value.trim();
    let relative = match value {
        "today" => Some(0),
        "yesterday" => Some(1),
        _ => value
            .strip_suffix('d')
            .filter(|days| !days.is_empty() && days.chars().all(|c| c.is_ascii_digit()))
            .and_then(|days| days.parse::<i64>().ok()),
    };

    let date = match relative {
        Some(days) => Duration::try_days(days).and_then(|span| today.checked_sub_signed(span)),
        None => markup::parse_date(value),
    };
    date.ok_or_else(|| {
        Error::InvalidArgument(format!(
            "invalid date '{value}': expected YYYY-MM-DD, today, yesterday or Nd"
        ))
    })
}

/// Everything a command needs to find its data
#[derive(Debug, Clone)]
pub struct Context {
    pub root: PathBuf,
    pub config: Config,
    pub registry: Registry,
    org_override: Option<String>,
    pub output: OutputOptions,
}

impl Context {
    pub fn load(
        root: Option<PathBuf>,
        org_override: Option<String>,
        output: OutputOptions,
    ) -> Result<Self> {
        let root = root.unwrap_or_else(org::default_root);
        let config = Config::load_from_root(&root)?;
        let registry = Registry::new(
            &root,
            config.default_organization.clone(),
            config.lock_timeout_ms,
        );
        tracing::debug!(root = %root.display(), "resolved tasks root");

        Ok(Self {
            root,
            config,
            registry,
            org_override: org_override.filter(|name| !name.trim().is_empty()),
            output,
        })
    }

    /// The organization this invocation works on
    pub fn organization(&self) -> Result<Organization> {
        match &self.org_override {
            Some(name) => self.registry.open(name),
            None => self.registry.open_active(),
        }
    }

    pub fn manager(&self) -> Result<TaskManager> {
        Ok(TaskManager::new(self.organization()?, &self.config))
    }
}

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };
        let ctx = Context::load(self.root, self.org, output)?;

        match self.command {
            Commands::Add { completed, id, text } => task::run_add(task::AddOptions {
                text: text.join(" "),
                completed,
                id,
                ctx,
            }),
            Commands::List {
                filter,
                completed,
                open,
                archived,
                deleted,
                all,
            } => task::run_list(task::ListOptions {
                filter,
                completed,
                open,
                archived: archived || all,
                deleted: deleted || all,
                ctx,
            }),
            Commands::Show { id } => task::run_show(task::ShowOptions { id, ctx }),
            Commands::Complete { id } => task::run_change(task::ChangeOptions {
                id,
                change: task::Change::Complete,
                ctx,
            }),
            Commands::Uncomplete { id } => task::run_change(task::ChangeOptions {
                id,
                change: task::Change::Uncomplete,
                ctx,
            }),
            Commands::Cancel { id } => task::run_change(task::ChangeOptions {
                id,
                change: task::Change::Cancel,
                ctx,
            }),
            Commands::Edit { id, text } => task::run_change(task::ChangeOptions {
                id,
                change: task::Change::Edit(text.join(" ")),
                ctx,
            }),
            Commands::Priority { id, level } => task::run_change(task::ChangeOptions {
                id,
                change: task::Change::Priority(level),
                ctx,
            }),
            Commands::Block { id } => task::run_change(task::ChangeOptions {
                id,
                change: task::Change::Block,
                ctx,
            }),
            Commands::Unblock { id } => task::run_change(task::ChangeOptions {
                id,
                change: task::Change::Unblock,
                ctx,
            }),
            Commands::Delay { id } => task::run_change(task::ChangeOptions {
                id,
                change: task::Change::Delay,
                ctx,
            }),
            Commands::Undelay { id } => task::run_change(task::ChangeOptions {
                id,
                change: task::Change::Undelay,
                ctx,
            }),
            Commands::Remove { id } => task::run_remove(task::RemoveOptions { id, ctx }),
            Commands::Archive { days } => task::run_archive(task::ArchiveOptions { days, ctx }),
            Commands::Clean => task::run_clean(task::CleanOptions { ctx }),
            Commands::Summary {
                filter,
                weekly,
                group_by,
                standup,
            } => {
                if standup {
                    summary::run_standup(summary::StandupOptions { ctx })
                } else {
                    summary::run_summary(summary::SummaryOptions {
                        filter,
                        weekly,
                        group_by,
                        ctx,
                    })
                }
            }
            Commands::Use { name } => orgs::run_use(orgs::UseOptions { name, ctx }),
            Commands::Orgs => orgs::run_list(orgs::ListOptions { ctx }),
        }
    }
}
