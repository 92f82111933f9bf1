//! Shared output formatting for tasks CLI commands.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::markup::{self, RenderMode};
use crate::task::Task;

pub const SCHEMA_VERSION: &str = "tasks.v1";

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HumanOutput {
    header: String,
    lines: Vec<String>,
    summary: Vec<(String, String)>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            ..Self::default()
        }
    }

    /// Output that is just a list of lines, without a header
    pub fn lines(lines: impl IntoIterator<Item = String>) -> Self {
        Self {
            lines: lines.into_iter().collect(),
            ..Self::default()
        }
    }

    /// A line printed as-is below the header
    pub fn push_line(&mut self, value: impl Into<String>) {
        self.lines.push(value.into());
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let warnings = human.map(|h| h.warnings.clone()).unwrap_or_default();
        let next_steps = human.map(|h| h.next_steps.clone()).unwrap_or_default();

        #[derive(Serialize)]
        struct Envelope<'a, T: Serialize> {
            schema_version: &'static str,
            command: &'a str,
            status: &'static str,
            data: &'a T,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            warnings: Vec<String>,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            next_steps: Vec<String>,
        }

        let payload = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            data,
            warnings,
            next_steps,
        };

        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if options.quiet {
        return Ok(());
    }

    if let Some(human) = human {
        let text = format_human(human);
        if !text.is_empty() {
            println!("{text}");
        }
    }

    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let next_steps = error_next_steps(err);
    let hint = next_steps.first().map(|step| step.as_str());
    if json {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            message: &'a str,
            code: i32,
            kind: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<serde_json::Value>,
        }

        #[derive(Serialize)]
        struct Envelope<'a> {
            schema_version: &'static str,
            command: &'a str,
            status: &'static str,
            error: ErrorBody<'a>,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            next_steps: Vec<String>,
        }

        let payload = Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            error: ErrorBody {
                message: &err.to_string(),
                code: err.exit_code(),
                kind: error_kind(err),
                details: err.details(),
            },
            next_steps,
        };

        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    eprintln!("error: {err}");
    if let Some(hint) = hint {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

pub fn format_human(output: &HumanOutput) -> String {
    let mut lines = Vec::new();
    if !output.header.is_empty() {
        lines.push(output.header.clone());
    }
    lines.extend(output.lines.iter().cloned());

    push_summary(&mut lines, &output.summary);
    push_section(&mut lines, "Details", &output.details);
    push_section(&mut lines, "Warnings", &output.warnings);
    push_section(&mut lines, "Next steps", &output.next_steps);

    lines.join("\n")
}

/// One task for terminal listings: `  12 [x] text +tag #project @high`
pub fn task_line(task: &Task) -> String {
    format!(
        "{:>4} [{}] {}",
        task.id,
        task.state().marker(),
        markup::render_body(&task.markup)
    )
}

/// Description only, for compact views such as the standup
pub fn task_brief(task: &Task) -> String {
    format!("{:>4} {}", task.id, markup::render(task, RenderMode::Plain))
}

pub fn infer_command_name_from_args() -> String {
    let mut args = std::env::args().skip(1);
    let mut skip_value = false;

    for arg in args.by_ref() {
        if skip_value {
            skip_value = false;
            continue;
        }
        if matches!(arg.as_str(), "--root" | "--org") {
            skip_value = true;
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        return arg;
    }

    "tasks".to_string()
}

fn error_kind(err: &Error) -> &'static str {
    match err.exit_code() {
        2 => "user_error",
        3 => "busy",
        _ => "operation_failed",
    }
}

fn error_next_steps(err: &Error) -> Vec<String> {
    match err {
        Error::NotFound(_) => vec!["tasks list --all".to_string()],
        Error::DuplicateId(_) => vec!["omit --id to use the next free id".to_string()],
        Error::Locked(_) => vec!["retry once the other tasks command finishes".to_string()],
        Error::CorruptLog { .. } => vec!["fix or remove the reported line, then run tasks clean".to_string()],
        Error::InvalidConfig(_) | Error::TomlParse(_) => {
            vec!["fix config.toml then retry".to_string()]
        }
        _ => Vec::new(),
    }
}

fn push_summary(lines: &mut Vec<String>, summary: &[(String, String)]) {
    if summary.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push("Summary:".to_string());
    for (key, value) in summary {
        if value.is_empty() {
            lines.push(format!("- {key}"));
        } else {
            lines.push(format!("- {key}: {value}"));
        }
    }
}

fn push_section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push(format!("{title}:"));
    for item in items {
        lines.push(format!("- {item}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse_line;

    #[test]
    fn human_output_sections() {
        let mut human = HumanOutput::new("tasks: added 3");
        human.push_summary("organization", "work");
        human.push_warning("counter was behind");

        let text = format_human(&human);
        assert_eq!(
            text,
            "tasks: added 3\n\nSummary:\n- organization: work\n\nWarnings:\n- counter was behind"
        );
    }

    #[test]
    fn header_less_output_is_just_lines() {
        let human = HumanOutput::lines(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(format_human(&human), "a\nb");
        assert_eq!(format_human(&HumanOutput::default()), "");
    }

    #[test]
    fn task_lines_render_markup() {
        let task = parse_line("12 - [x] - ship it #web @completed(2024-05-02)").unwrap();
        assert_eq!(task_line(&task), "  12 [x] ship it #web @completed(2024-05-02)");
        assert_eq!(task_brief(&task), "  12 ship it");
    }
}
