//! Sprint document grammar
//!
//! A sprint document is markdown with three required fields and one
//! checklist section:
//!
//! ```text
//! # Current Sprint: Sprint 1.2 Sensors
//! **Objective**: Read the temperature sensor
//! **Status**: PLANNING
//!
//! ## 📋 Backlog
//! - [x] **Wire up I2C**
//! - [ ] Write `src/sensor.rs`
//!   Free text and fenced code belong to the task above.
//! ```
//!
//! Tolerated variance:
//! - field labels as `**Status**:`, `**Status:**` or `Status:` in any case
//! - `-`, `*` or `+` bullets, `[x]` or `[X]` marks, bold task titles
//! - emoji or extra words in the backlog heading
//! - level-3+ headings inside the backlog (grouping only)
//! - indented checkboxes, which are read as description text
//!
//! Everything inside fenced code is opaque: it never yields fields,
//! headings or tasks.
//!
//! The transforms ([`set_status`], [`mark_complete`], title rewrites)
//! rewrite one span of one line and copy every other byte unchanged.

use regex::Regex;
use sprig_core::{BacklogDocument, Result, SprigError, SprintStatus, Task};
use std::sync::OnceLock;
use tracing::warn;

/// Title marker of the active document
pub const TITLE_PREFIX: &str = "Current Sprint:";

fn field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*\*{0,2}(objective|status)\*{0,2}\s*:\s*\*{0,2}[ \t]*(.*?)[ \t]*$")
            .expect("field pattern is valid")
    })
}

fn task_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([ \t]*)[-*+][ \t]+\[([ xX])\][ \t]*(.*?)[ \t]*$")
            .expect("task pattern is valid")
    })
}

/// One physical line of a document
#[derive(Debug, Clone)]
pub(crate) struct Line<'a> {
    /// Byte offset of the line start
    pub start: usize,
    /// Line text without its terminator
    pub text: &'a str,
    /// Inside a fenced block, fence markers included
    pub fenced: bool,
}

impl Line<'_> {
    /// Heading level (1 for `#`), outside fences only
    pub fn heading_level(&self) -> Option<usize> {
        if self.fenced {
            return None;
        }
        let hashes = self.text.chars().take_while(|c| *c == '#').count();
        let rest = &self.text[hashes..];
        if hashes > 0 && (rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t')) {
            Some(hashes)
        } else {
            None
        }
    }
}

pub(crate) fn is_fence(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Split into lines, tracking fenced regions
pub(crate) fn scan_lines(content: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0;
    let mut in_fence = false;

    for raw in content.split_inclusive('\n') {
        let text = raw.trim_end_matches('\n').trim_end_matches('\r');
        let fence = is_fence(text);
        let fenced = in_fence || fence;
        if fence {
            in_fence = !in_fence;
        }
        lines.push(Line {
            start: offset,
            text,
            fenced,
        });
        offset += raw.len();
    }
    lines
}

/// Index range of the backlog section body (heading excluded)
fn backlog_range(lines: &[Line<'_>]) -> Option<(usize, usize)> {
    let heading = lines.iter().position(|l| {
        l.heading_level().is_some_and(|lvl| lvl >= 2) && l.text.to_lowercase().contains("backlog")
    })?;

    let end = lines[heading + 1..]
        .iter()
        .position(|l| l.heading_level().is_some_and(|lvl| lvl <= 2))
        .map(|i| heading + 1 + i)
        .unwrap_or(lines.len());

    Some((heading + 1, end))
}

fn in_backlog(range: Option<(usize, usize)>, index: usize) -> bool {
    range.is_some_and(|(start, end)| index >= start && index < end)
}

/// A labelled field line and the byte span of its value
struct Field {
    label: String,
    value: String,
    span: (usize, usize),
}

/// Header fields, first occurrence wins, backlog and fences excluded
fn find_field(lines: &[Line<'_>], label: &str) -> Option<Field> {
    let backlog = backlog_range(lines);
    lines.iter().enumerate().find_map(|(i, line)| {
        if line.fenced || in_backlog(backlog, i) {
            return None;
        }
        let caps = field_regex().captures(line.text)?;
        let found = caps.get(1)?.as_str().to_lowercase();
        if found != label {
            return None;
        }
        let value = caps.get(2)?;
        Some(Field {
            label: found,
            value: value.as_str().to_string(),
            span: (line.start + value.start(), line.start + value.end()),
        })
    })
}

fn clean_value(value: &str) -> &str {
    value.trim_matches(|c: char| c == '*' || c == '`').trim()
}

fn title_line<'a>(lines: &'a [Line<'a>]) -> Option<&'a Line<'a>> {
    lines.iter().find(|l| l.heading_level() == Some(1))
}

/// Document name from a title line, marker stripped
fn title_name(line: &Line<'_>) -> String {
    let heading = line.text.trim_start_matches('#').trim();
    heading
        .strip_prefix(TITLE_PREFIX)
        .unwrap_or(heading)
        .trim()
        .to_string()
}

/// Clean a checklist title: bold markers removed, whitespace trimmed
pub fn clean_task_name(raw: &str) -> String {
    raw.replace("**", "").trim().to_string()
}

/// Parse document text
///
/// Fails with [`SprigError::Parse`] when the title, objective or status
/// line is missing. An unrecognized status value is read as IDLE.
pub fn parse_document(content: &str) -> Result<BacklogDocument> {
    let lines = scan_lines(content);

    let name = title_line(&lines)
        .map(title_name)
        .ok_or_else(|| SprigError::Parse("missing '# ' title line".to_string()))?;

    let objective = find_field(&lines, "objective")
        .map(|f| clean_value(&f.value).to_string())
        .ok_or_else(|| SprigError::Parse("missing Objective line".to_string()))?;

    let status_field = find_field(&lines, "status")
        .ok_or_else(|| SprigError::Parse("missing Status line".to_string()))?;
    let raw_status = clean_value(&status_field.value);
    let status = raw_status.parse().unwrap_or_else(|_| {
        warn!("Unrecognized {} value '{}', reading as IDLE", status_field.label, raw_status);
        SprintStatus::Idle
    });

    Ok(BacklogDocument {
        name,
        objective,
        status,
        tasks: parse_tasks(&lines),
    })
}

fn parse_tasks(lines: &[Line<'_>]) -> Vec<Task> {
    let Some((start, end)) = backlog_range(lines) else {
        return Vec::new();
    };

    let mut tasks = Vec::new();
    let mut current: Option<Task> = None;
    let mut description: Vec<&str> = Vec::new();

    for line in &lines[start..end] {
        if !line.fenced {
            if let Some(caps) = task_regex().captures(line.text) {
                if caps[1].len() < 2 {
                    if let Some(task) = current.take() {
                        tasks.push(task.with_description(description.join("\n").trim()));
                    }
                    description.clear();
                    let completed = !caps[2].trim().is_empty();
                    current = Some(Task::new(clean_task_name(&caps[3]), completed));
                    continue;
                }
            }
            // Grouping headings are not part of any description
            if line.heading_level().is_some() {
                continue;
            }
        }
        if current.is_some() {
            description.push(line.text);
        }
    }

    if let Some(task) = current {
        tasks.push(task.with_description(description.join("\n").trim()));
    }
    tasks
}

/// Rewrite the status value
pub fn set_status(content: &str, status: SprintStatus) -> Result<String> {
    let lines = scan_lines(content);
    let field = find_field(&lines, "status")
        .ok_or_else(|| SprigError::Parse("missing Status line".to_string()))?;

    let (from, to) = field.span;
    Ok(format!("{}{}{}", &content[..from], status.as_str(), &content[to..]))
}

/// Tick the first unticked task named `task_name`
///
/// Returns the new text and whether anything changed. Ticking a task that
/// is already complete, or is absent, leaves the text untouched.
pub fn mark_complete(content: &str, task_name: &str) -> (String, bool) {
    let lines = scan_lines(content);
    let Some((start, end)) = backlog_range(&lines) else {
        return (content.to_string(), false);
    };
    let wanted = clean_task_name(task_name);

    for line in &lines[start..end] {
        if line.fenced {
            continue;
        }
        let Some(caps) = task_regex().captures(line.text) else {
            continue;
        };
        if caps[1].len() >= 2 || !caps[2].trim().is_empty() {
            continue;
        }
        if clean_task_name(&caps[3]) != wanted {
            continue;
        }
        let Some(mark) = caps.get(2) else { continue };
        let at = line.start + mark.start();
        let updated = format!("{}x{}", &content[..at], &content[at + 1..]);
        return (updated, true);
    }

    (content.to_string(), false)
}

/// Title rewritten without the active-document marker
pub fn strip_title_prefix(content: &str) -> String {
    let lines = scan_lines(content);
    let Some(title) = title_line(&lines) else {
        return content.to_string();
    };
    let hashes = title.text.len() - title.text.trim_start_matches('#').len();
    let heading = title.text[hashes..].trim_start();
    let Some(rest) = heading.strip_prefix(TITLE_PREFIX) else {
        return content.to_string();
    };

    let from = title.start;
    let to = title.start + title.text.len();
    format!("{}# {}{}", &content[..from], rest.trim_start(), &content[to..])
}

/// Title rewritten with the active-document marker (no-op if present)
pub fn add_title_prefix(content: &str) -> String {
    let lines = scan_lines(content);
    let Some(title) = title_line(&lines) else {
        return content.to_string();
    };
    let hashes = title.text.len() - title.text.trim_start_matches('#').len();
    let heading = title.text[hashes..].trim_start();
    if heading.starts_with(TITLE_PREFIX) {
        return content.to_string();
    }

    let from = title.start;
    let to = title.start + title.text.len();
    format!("{}# {} {}{}", &content[..from], TITLE_PREFIX, heading, &content[to..])
}

/// Insert `line` directly after the status line
pub(crate) fn insert_after_status(content: &str, line: &str) -> Result<String> {
    let lines = scan_lines(content);
    let field = find_field(&lines, "status")
        .ok_or_else(|| SprigError::Parse("missing Status line".to_string()))?;

    let status_line = lines
        .iter()
        .find(|l| l.start <= field.span.0 && field.span.0 <= l.start + l.text.len())
        .ok_or_else(|| SprigError::Parse("status line out of range".to_string()))?;

    let end_of_text = status_line.start + status_line.text.len();
    let rest = &content[end_of_text..];
    let newline = if rest.starts_with("\r\n") { "\r\n" } else { "\n" };
    Ok(format!(
        "{}{}{}{}",
        &content[..end_of_text],
        newline,
        line,
        rest
    ))
}
