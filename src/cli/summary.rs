//! tasks summary command implementation
//!
//! Buckets current and archived tasks by day or ISO week, or prints the
//! yesterday/today standup view with `--standup`.

use serde::Serialize;

use crate::cli::task::build_filter;
use crate::cli::{Context, FilterArgs};
use crate::error::Result;
use crate::output::{emit_success, task_brief, HumanOutput};
use crate::query::{Bucket, GroupBy, Period, Standup, Summary, NO_GROUP};

/// Options for the summary command
pub struct SummaryOptions {
    pub filter: FilterArgs,
    pub weekly: bool,
    pub group_by: Option<String>,
    pub ctx: Context,
}

/// Options for `summary --standup`
pub struct StandupOptions {
    pub ctx: Context,
}

#[derive(Serialize)]
struct SummaryReport<'a> {
    organization: &'a str,
    #[serde(flatten)]
    summary: &'a Summary,
}

#[derive(Serialize)]
struct StandupReport<'a> {
    organization: &'a str,
    #[serde(flatten)]
    standup: &'a Standup,
}

pub fn run_summary(options: SummaryOptions) -> Result<()> {
    let manager = options.ctx.manager()?;

    let mut summary_options = options.ctx.config.summary.options();
    if options.weekly {
        summary_options.period = Period::Week;
    }
    if let Some(group_by) = options.group_by.as_deref() {
        summary_options.group_by = group_by.parse::<GroupBy>()?;
    }

    let filter = build_filter(&options.filter, None)?;
    let summary = manager.summary(&filter, summary_options)?;

    let mut human = HumanOutput::new(format!(
        "Summary for {} ({}, by {})",
        manager.organization().name(),
        match summary.period {
            Period::Day => "daily",
            Period::Week => "weekly",
        },
        summary.group_by
    ));
    if summary.buckets.is_empty() {
        human.push_line("No dated tasks");
    }
    for bucket in &summary.buckets {
        human.push_line(bucket_line(bucket));
    }
    human.push_summary("total", summary.totals.total.to_string());
    human.push_summary("completed", summary.totals.completed.to_string());
    human.push_summary("cancelled", summary.totals.cancelled.to_string());
    human.push_summary("open", summary.totals.open.to_string());
    if summary.undated > 0 {
        human.push_summary("undated", summary.undated.to_string());
    }

    emit_success(
        options.ctx.output,
        "summary",
        &SummaryReport {
            organization: manager.organization().name(),
            summary: &summary,
        },
        Some(&human),
    )
}

pub fn run_standup(options: StandupOptions) -> Result<()> {
    let manager = options.ctx.manager()?;
    let standup = manager.standup()?;

    let mut human = HumanOutput::new(format!("Standup for {}", standup.date));
    human.push_line("");
    human.push_line("Yesterday:");
    if standup.yesterday.is_empty() {
        human.push_line("   (nothing completed)");
    }
    for task in &standup.yesterday {
        human.push_line(task_brief(task));
    }
    human.push_line("");
    human.push_line("Today:");
    if standup.today.is_empty() {
        human.push_line("   (nothing planned)");
    }
    for task in &standup.today {
        human.push_line(task_brief(task));
    }

    emit_success(
        options.ctx.output,
        "standup",
        &StandupReport {
            organization: manager.organization().name(),
            standup: &standup,
        },
        Some(&human),
    )
}

/// `2024-05-02  total 3  done 1  cancelled 0  open 2  web:2 (none):1`
fn bucket_line(bucket: &Bucket) -> String {
    let counts = &bucket.counts;
    let mut line = format!(
        "{:<10}  total {}  done {}  cancelled {}  open {}",
        bucket.period, counts.total, counts.completed, counts.cancelled, counts.open
    );

    // named groups first, the catch-all last
    let mut groups: Vec<(&String, &usize)> = bucket
        .groups
        .iter()
        .filter(|(name, _)| name.as_str() != NO_GROUP)
        .collect();
    if let Some(entry) = bucket.groups.get_key_value(NO_GROUP) {
        groups.push(entry);
    }
    if !groups.is_empty() {
        line.push(' ');
        for (name, count) in groups {
            line.push_str(&format!(" {name}:{count}"));
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Counts;
    use std::collections::BTreeMap;

    #[test]
    fn bucket_line_lists_groups_with_none_last() {
        let mut groups = BTreeMap::new();
        groups.insert("(none)".to_string(), 1);
        groups.insert("web".to_string(), 2);
        let bucket = Bucket {
            period: "2024-05-02".to_string(),
            counts: Counts {
                total: 3,
                completed: 1,
                cancelled: 0,
                open: 2,
            },
            groups,
        };

        assert_eq!(
            bucket_line(&bucket),
            "2024-05-02  total 3  done 1  cancelled 0  open 2  web:2 (none):1"
        );
    }
}
