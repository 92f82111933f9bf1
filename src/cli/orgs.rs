//! tasks use/orgs command implementations

use serde::Serialize;

use crate::cli::Context;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};

/// Options for the use command
pub struct UseOptions {
    pub name: String,
    pub ctx: Context,
}

/// Options for the orgs command
pub struct ListOptions {
    pub ctx: Context,
}

#[derive(Serialize)]
struct OrgEntry {
    name: String,
    active: bool,
}

#[derive(Serialize)]
struct OrgList {
    active: String,
    organizations: Vec<OrgEntry>,
}

pub fn run_use(options: UseOptions) -> Result<()> {
    let report = options.ctx.registry.use_org(&options.name)?;

    let mut human = HumanOutput::new(format!("Using organization {}", report.organization));
    if report.created {
        human.push_detail(format!("created {}", report.path.display()));
    }
    if report.previous != report.organization {
        human.push_summary("previous", report.previous.clone());
    }

    emit_success(options.ctx.output, "use", &report, Some(&human))
}

pub fn run_list(options: ListOptions) -> Result<()> {
    let registry = &options.ctx.registry;
    let active = options.ctx.organization()?.name().to_string();

    let organizations: Vec<OrgEntry> = registry
        .list()?
        .into_iter()
        .map(|name| OrgEntry {
            active: name == active,
            name,
        })
        .collect();

    let human = if organizations.is_empty() {
        let mut human = HumanOutput::new("No organizations yet");
        human.push_next_step("tasks use <name>");
        human
    } else {
        HumanOutput::lines(organizations.iter().map(|org| {
            let marker = if org.active { "*" } else { " " };
            format!("{marker} {}", org.name)
        }))
    };

    emit_success(
        options.ctx.output,
        "orgs",
        &OrgList {
            active,
            organizations,
        },
        Some(&human),
    )
}
