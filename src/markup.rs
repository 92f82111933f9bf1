//! Task line codec.
//!
//! A stored line looks like:
//!
//! ```text
//! 12 - [x] - fix the flaky test +ci #backend @high @completed(2024-05-02)
//! ```
//!
//! The body is split on whitespace. `+word` is a tag, `#word` a project,
//! `@name` / `@name(value)` an attribute; everything else is description.
//! Rendering always emits the canonical order: description, tags, projects,
//! priority, due, completed, cancelled, created, then other attributes.
//!
//! When a first-class attribute (priority or a date) appears more than once,
//! the first occurrence wins and the rest are dropped.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use thiserror::Error;

use crate::task::{Attribute, Markup, Priority, Task, TaskState};

/// The only date format accepted in stored lines
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const DUE: &str = "due";
const COMPLETED: &str = "completed";
const CANCELLED: &str = "cancelled";
const CREATED: &str = "created";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    EmptyTag,
    EmptyProject,
    EmptyAttribute,
    InvalidName,
    UnmatchedParen,
    InvalidDate,
    MissingValue,
    UnexpectedValue,
    EmptyTask,
    MalformedLine,
    InvalidId,
    StateMismatch,
}

impl ParseErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseErrorKind::EmptyTag => "empty_tag",
            ParseErrorKind::EmptyProject => "empty_project",
            ParseErrorKind::EmptyAttribute => "empty_attribute",
            ParseErrorKind::InvalidName => "invalid_name",
            ParseErrorKind::UnmatchedParen => "unmatched_paren",
            ParseErrorKind::InvalidDate => "invalid_date",
            ParseErrorKind::MissingValue => "missing_value",
            ParseErrorKind::UnexpectedValue => "unexpected_value",
            ParseErrorKind::EmptyTask => "empty_task",
            ParseErrorKind::MalformedLine => "malformed_line",
            ParseErrorKind::InvalidId => "invalid_id",
            ParseErrorKind::StateMismatch => "state_mismatch",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            ParseErrorKind::EmptyTag => "tag name is empty",
            ParseErrorKind::EmptyProject => "project name is empty",
            ParseErrorKind::EmptyAttribute => "attribute name is empty",
            ParseErrorKind::InvalidName => "name may only contain letters, digits, '_' and '-'",
            ParseErrorKind::UnmatchedParen => "unmatched parenthesis",
            ParseErrorKind::InvalidDate => "invalid date (expected YYYY-MM-DD)",
            ParseErrorKind::MissingValue => "attribute requires a value",
            ParseErrorKind::UnexpectedValue => "attribute does not take a value",
            ParseErrorKind::EmptyTask => "task text is empty",
            ParseErrorKind::MalformedLine => "expected '<id> - [<state>] - <text>'",
            ParseErrorKind::InvalidId => "task id must be a positive integer",
            ParseErrorKind::StateMismatch => "state marker disagrees with attributes",
        }
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A markup error with the offending token and its byte offset in the input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} at offset {offset}: '{token}'", kind.describe())]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
    pub token: String,
}

impl ParseError {
    fn new(kind: ParseErrorKind, offset: usize, token: impl Into<String>) -> Self {
        Self {
            kind,
            offset,
            token: token.into(),
        }
    }
}

type ParseResult<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Full stored line, markup included
    Raw,
    /// Description only
    Plain,
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    // chrono accepts unpadded fields; the stored format is strictly padded
    if value.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

/// Resolve a due value typed by a user: `today`, `now`, `tomorrow`, `Nd`
/// or a plain date.
///
/// Dates outside years 0..=9999 are rejected since they cannot be stored.
pub fn resolve_due(value: &str, today: NaiveDate) -> Option<NaiveDate> {
    relative_due(value, today)
        .or_else(|| parse_date(value))
        .filter(|date| (0..=9999).contains(&date.year()))
}

fn relative_due(value: &str, today: NaiveDate) -> Option<NaiveDate> {
    match value {
        "today" | "now" => Some(today),
        "tomorrow" => today.checked_add_signed(Duration::days(1)),
        _ => {
            let days = value.strip_suffix('d')?;
            if days.is_empty() || !days.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let days: i64 = days.parse().ok()?;
            today.checked_add_signed(Duration::try_days(days)?)
        }
    }
}

/// Parse a stored log line
pub fn parse_line(line: &str) -> ParseResult<Task> {
    let malformed = || ParseError::new(ParseErrorKind::MalformedLine, 0, line);

    let (id_part, rest) = line.split_once(" - [").ok_or_else(malformed)?;
    let marker = rest.chars().next().ok_or_else(malformed)?;
    let body = rest[marker.len_utf8()..]
        .strip_prefix("] - ")
        .ok_or_else(malformed)?;

    let id = match id_part.trim().parse::<u64>() {
        Ok(id) if id > 0 => id,
        _ => return Err(ParseError::new(ParseErrorKind::InvalidId, 0, id_part)),
    };

    let marker_state = TaskState::from_marker(marker).ok_or_else(malformed)?;
    let body_offset = line.len() - body.len();
    let markup = parse_tokens(body, body_offset, &parse_date)?;

    if markup.state() != marker_state {
        let marker_offset = id_part.len() + 4;
        return Err(ParseError::new(
            ParseErrorKind::StateMismatch,
            marker_offset,
            format!("[{marker}]"),
        ));
    }

    Ok(Task::new(id, markup))
}

/// Parse task text without an id prefix, dates strictly `YYYY-MM-DD`
pub fn parse_body(text: &str) -> ParseResult<Markup> {
    parse_tokens(text, 0, &parse_date)
}

/// Parse task text typed by a user; `@due(...)` may be relative to `today`
pub fn parse_input(text: &str, today: NaiveDate) -> ParseResult<Markup> {
    parse_tokens(text, 0, &|value: &str| resolve_due(value, today))
}

/// Render a task in the requested mode
pub fn render(task: &Task, mode: RenderMode) -> String {
    match mode {
        RenderMode::Raw => format!(
            "{} - [{}] - {}",
            task.id,
            task.state().marker(),
            render_body(&task.markup)
        ),
        RenderMode::Plain => task.markup.description.clone(),
    }
}

/// Render the canonical markup text of a task body
pub fn render_body(markup: &Markup) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !markup.description.is_empty() {
        parts.push(markup.description.clone());
    }
    parts.extend(markup.tags.iter().map(|tag| format!("+{tag}")));
    parts.extend(markup.projects.iter().map(|project| format!("#{project}")));
    if let Some(priority) = markup.priority {
        parts.push(format!("@{priority}"));
    }

    let dates = [
        (DUE, markup.due),
        (COMPLETED, markup.completed),
        (CANCELLED, markup.cancelled),
        (CREATED, markup.created),
    ];
    for (name, date) in dates {
        if let Some(date) = date {
            parts.push(format!("@{name}({})", format_date(date)));
        }
    }

    for attr in &markup.attributes {
        match &attr.value {
            Some(value) => parts.push(format!("@{}({value})", attr.name)),
            None => parts.push(format!("@{}", attr.name)),
        }
    }

    parts.join(" ")
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn validate_name(name: &str, offset: usize, token: &str) -> ParseResult<()> {
    if name.chars().all(is_name_char) {
        Ok(())
    } else {
        Err(ParseError::new(ParseErrorKind::InvalidName, offset, token))
    }
}

/// Whitespace-separated tokens with their byte offsets
fn tokenize(text: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut start = None;

    for (idx, ch) in text.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push((s, &text[s..idx]));
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push((s, &text[s..]));
    }

    tokens
}

fn parse_tokens(
    text: &str,
    base_offset: usize,
    date_of: &dyn Fn(&str) -> Option<NaiveDate>,
) -> ParseResult<Markup> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Err(ParseError::new(ParseErrorKind::EmptyTask, base_offset, text));
    }

    let mut markup = Markup::default();
    let mut words: Vec<&str> = Vec::new();
    let mut idx = 0;

    while idx < tokens.len() {
        let (local_offset, token) = tokens[idx];
        let offset = base_offset + local_offset;
        idx += 1;

        if let Some(name) = token.strip_prefix('+') {
            if name.is_empty() {
                return Err(ParseError::new(ParseErrorKind::EmptyTag, offset, token));
            }
            validate_name(name, offset, token)?;
            markup.tags.insert(name.to_string());
        } else if let Some(name) = token.strip_prefix('#') {
            if name.is_empty() {
                return Err(ParseError::new(ParseErrorKind::EmptyProject, offset, token));
            }
            validate_name(name, offset, token)?;
            markup.projects.insert(name.to_string());
        } else if let Some(rest) = token.strip_prefix('@') {
            let (name, value) = match rest.find('(') {
                None => {
                    if rest.contains(')') {
                        return Err(ParseError::new(
                            ParseErrorKind::UnmatchedParen,
                            offset,
                            token,
                        ));
                    }
                    (rest, None)
                }
                Some(open) => {
                    let mut value = rest[open + 1..].to_string();
                    while !value.ends_with(')') {
                        let Some(&(_, next)) = tokens.get(idx) else {
                            return Err(ParseError::new(
                                ParseErrorKind::UnmatchedParen,
                                offset,
                                token,
                            ));
                        };
                        value.push(' ');
                        value.push_str(next);
                        idx += 1;
                    }
                    value.pop();
                    if value.contains('(') || value.contains(')') {
                        return Err(ParseError::new(
                            ParseErrorKind::UnmatchedParen,
                            offset,
                            token,
                        ));
                    }
                    (&rest[..open], Some(value))
                }
            };

            if name.is_empty() {
                return Err(ParseError::new(ParseErrorKind::EmptyAttribute, offset, token));
            }
            validate_name(name, offset, token)?;
            apply_attribute(&mut markup, &name.to_lowercase(), value, offset, token, date_of)?;
        } else {
            words.push(token);
        }
    }

    markup.description = words.join(" ");
    Ok(markup)
}

fn apply_attribute(
    markup: &mut Markup,
    name: &str,
    value: Option<String>,
    offset: usize,
    token: &str,
    date_of: &dyn Fn(&str) -> Option<NaiveDate>,
) -> ParseResult<()> {
    if let Some(priority) = Priority::from_keyword(name) {
        if value.is_some() {
            return Err(ParseError::new(ParseErrorKind::UnexpectedValue, offset, token));
        }
        markup.priority.get_or_insert(priority);
        return Ok(());
    }

    let slot = match name {
        DUE => &mut markup.due,
        COMPLETED => &mut markup.completed,
        CANCELLED => &mut markup.cancelled,
        CREATED => &mut markup.created,
        _ => {
            if !markup.has_flag(name) {
                markup.attributes.push(Attribute {
                    name: name.to_string(),
                    value,
                });
            }
            return Ok(());
        }
    };

    let value = value.ok_or_else(|| ParseError::new(ParseErrorKind::MissingValue, offset, token))?;
    let date = date_of(value.trim())
        .ok_or_else(|| ParseError::new(ParseErrorKind::InvalidDate, offset, token))?;
    slot.get_or_insert(date);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    fn kind_of(result: ParseResult<Markup>) -> ParseErrorKind {
        result.expect_err("expected parse error").kind
    }

    #[test]
    fn extracts_tags_and_projects() {
        let markup = parse_body("+feature ability to add new #tasks").unwrap();
        assert_eq!(markup.description, "ability to add new");
        assert_eq!(markup.tags.iter().collect::<Vec<_>>(), vec!["feature"]);
        assert_eq!(markup.projects.iter().collect::<Vec<_>>(), vec!["tasks"]);
        assert_eq!(markup.priority, None);
        assert_eq!(markup.state(), TaskState::Open);
    }

    #[test]
    fn duplicate_tags_collapse() {
        let markup = parse_body("a +x +y +x").unwrap();
        assert_eq!(markup.tags.len(), 2);
    }

    #[test]
    fn first_priority_and_date_win() {
        let markup =
            parse_body("pick one @low @critical @due(2024-01-01) @due(2024-02-02)").unwrap();
        assert_eq!(markup.priority, Some(Priority::Low));
        assert_eq!(markup.due, Some(date(2024, 1, 1)));
        assert_eq!(
            render_body(&markup),
            "pick one @low @due(2024-01-01)"
        );
    }

    #[test]
    fn unknown_attributes_pass_through() {
        let markup = parse_body("call @blocked @waiting(on bob) @Blocked").unwrap();
        assert_eq!(markup.description, "call");
        assert_eq!(
            markup.attributes,
            vec![
                Attribute::flag("blocked"),
                Attribute::valued("waiting", "on bob"),
            ]
        );
        assert_eq!(render_body(&markup), "call @blocked @waiting(on bob)");
    }

    #[test]
    fn renders_canonical_order() {
        let markup = parse_body(
            "@created(2024-01-01) #web +ui fix @high header +css @completed(2024-01-03) layout",
        )
        .unwrap();
        let task = Task::new(7, markup);
        assert_eq!(
            render(&task, RenderMode::Raw),
            "7 - [x] - fix header layout +css +ui #web @high @completed(2024-01-03) @created(2024-01-01)"
        );
        assert_eq!(render(&task, RenderMode::Plain), "fix header layout");
    }

    #[test]
    fn parses_stored_line() {
        let task = parse_line("12 - [-] - drop legacy api #core @cancelled(2024-03-04)").unwrap();
        assert_eq!(task.id, 12);
        assert_eq!(task.state(), TaskState::Cancelled);
        assert_eq!(task.markup.cancelled, Some(date(2024, 3, 4)));
    }

    #[test]
    fn rejects_malformed_markup() {
        assert_eq!(kind_of(parse_body("a + b")), ParseErrorKind::EmptyTag);
        assert_eq!(kind_of(parse_body("a # b")), ParseErrorKind::EmptyProject);
        assert_eq!(kind_of(parse_body("a @ b")), ParseErrorKind::EmptyAttribute);
        assert_eq!(kind_of(parse_body("a @(x)")), ParseErrorKind::EmptyAttribute);
        assert_eq!(kind_of(parse_body("a +foo,bar")), ParseErrorKind::InvalidName);
        assert_eq!(kind_of(parse_body("a @due(2024-01-01")), ParseErrorKind::UnmatchedParen);
        assert_eq!(kind_of(parse_body("a @note(x(y))")), ParseErrorKind::UnmatchedParen);
        assert_eq!(kind_of(parse_body("a @blocked)")), ParseErrorKind::UnmatchedParen);
        assert_eq!(kind_of(parse_body("a @due(2024-13-01)")), ParseErrorKind::InvalidDate);
        assert_eq!(kind_of(parse_body("a @due(2024-1-1)")), ParseErrorKind::InvalidDate);
        assert_eq!(kind_of(parse_body("a @due")), ParseErrorKind::MissingValue);
        assert_eq!(kind_of(parse_body("a @high(now)")), ParseErrorKind::UnexpectedValue);
        assert_eq!(kind_of(parse_body("   ")), ParseErrorKind::EmptyTask);
    }

    #[test]
    fn error_reports_offset_and_token() {
        let err = parse_body("write tests @due(someday)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidDate);
        assert_eq!(err.offset, 12);
        assert_eq!(err.token, "@due(someday)");

        let err = parse_line("3 - [ ] - ok +").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::EmptyTag);
        assert_eq!(err.offset, 13);
    }

    #[test]
    fn rejects_bad_line_prefix() {
        assert_eq!(
            parse_line("no prefix here").unwrap_err().kind,
            ParseErrorKind::MalformedLine
        );
        assert_eq!(
            parse_line("0 - [ ] - zero").unwrap_err().kind,
            ParseErrorKind::InvalidId
        );
        assert_eq!(
            parse_line("abc - [ ] - letters").unwrap_err().kind,
            ParseErrorKind::InvalidId
        );
        assert_eq!(
            parse_line("4 - [?] - odd marker").unwrap_err().kind,
            ParseErrorKind::MalformedLine
        );
        assert_eq!(
            parse_line("4 - [x] - not actually done").unwrap_err().kind,
            ParseErrorKind::StateMismatch
        );
    }

    #[test]
    fn relative_due_only_on_input() {
        let today = date(2024, 2, 28);
        assert_eq!(
            parse_input("x @due(tomorrow)", today).unwrap().due,
            Some(date(2024, 2, 29))
        );
        assert_eq!(
            parse_input("x @due(3d)", today).unwrap().due,
            Some(date(2024, 3, 2))
        );
        assert_eq!(parse_input("x @due(today)", today).unwrap().due, Some(today));
        assert_eq!(kind_of(parse_body("x @due(tomorrow)")), ParseErrorKind::InvalidDate);
    }

    #[test]
    fn relative_due_past_year_9999_is_invalid() {
        let today = date(2024, 5, 10);
        let err = parse_input("x @due(3000000d)", today).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidDate);
        assert_eq!(err.token, "@due(3000000d)");
        assert_eq!(kind_of(parse_input("x @due(99999999999999999d)", today)), ParseErrorKind::InvalidDate);

        let last = parse_input("x @due(9999-12-31)", today).unwrap();
        assert_eq!(last.due, Some(date(9999, 12, 31)));
    }

    #[test]
    fn render_is_idempotent() {
        let line = "5 - [ ] - a   b +t #p @note( spaced   out ) @medium";
        let first = parse_line(line).unwrap();
        let rendered = render(&first, RenderMode::Raw);
        let second = parse_line(&rendered).unwrap();
        assert_eq!(first, second);
        assert_eq!(render(&second, RenderMode::Raw), rendered);
    }

    fn token_strategy() -> impl Strategy<Value = String> {
        let name = "[a-z][a-z0-9_-]{0,6}";
        prop_oneof![
            4 => "[a-z]{1,8}",
            2 => name.prop_map(|n| format!("+{n}")),
            2 => name.prop_map(|n| format!("#{n}")),
            1 => prop::sample::select(vec![
                "@low", "@medium", "@high", "@important", "@critical", "@High", "@LOW", "@Critical",
            ])
            .prop_map(str::to_string),
            1 => (2000i32..2100, 1u32..13, 1u32..29)
                .prop_map(|(y, m, d)| format!("@due({y:04}-{m:02}-{d:02})")),
            1 => (2000i32..2100, 1u32..13, 1u32..29)
                .prop_map(|(y, m, d)| format!("@completed({y:04}-{m:02}-{d:02})")),
            1 => (2000i32..2100, 1u32..13, 1u32..29)
                .prop_map(|(y, m, d)| format!("@cancelled({y:04}-{m:02}-{d:02})")),
            1 => (2000i32..2100, 1u32..13, 1u32..29)
                .prop_map(|(y, m, d)| format!("@Created({y:04}-{m:02}-{d:02})")),
            1 => "[a-zA-Z][a-zA-Z0-9_-]{0,6}".prop_map(|n| format!("@x{n}")),
            1 => (name, "[a-z ]{0,10}").prop_map(|(n, v)| format!("@v{n}({v})")),
        ]
    }

    proptest! {
        #[test]
        fn round_trip_preserves_fields(
            id in 1u64..100_000,
            tokens in prop::collection::vec(token_strategy(), 1..12),
        ) {
            let markup = parse_body(&tokens.join(" ")).unwrap();
            let task = Task::new(id, markup);
            let line = render(&task, RenderMode::Raw);
            let reparsed = parse_line(&line).unwrap();
            prop_assert_eq!(&reparsed, &task);
            prop_assert_eq!(render(&reparsed, RenderMode::Raw), line);
        }
    }
}
