//! Fenced code and path extraction from task text
//!
//! The applier and verifier both read task descriptions; all the pattern
//! matching over that free text lives here.

use regex::Regex;
use sprig_core::PathResolution;
use std::sync::OnceLock;

use crate::parser::is_fence;

fn backtick_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([^`]+\.[a-zA-Z]+)`").expect("backtick pattern is valid"))
}

fn extension_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.[A-Za-z0-9]+$").expect("extension pattern is valid"))
}

/// A closed fenced code block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    /// Info string after the opening fence (may be empty)
    pub lang: String,
    /// Block body, opening-fence indentation removed
    pub content: String,
    /// Nearest non-blank line above the opening fence
    pub preceding: Option<String>,
}

/// Where a block's target path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSource {
    FirstLine,
    PrecedingText,
}

/// All closed fenced blocks, in order. An unclosed trailing fence is ignored.
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut last_text: Option<&str> = None;
    let mut open: Option<(String, usize, Option<String>, Vec<&str>)> = None;

    for raw in text.lines() {
        match open.as_mut() {
            None if is_fence(raw) => {
                let indent = raw.len() - raw.trim_start().len();
                let lang = raw.trim_start()[3..].trim().to_string();
                open = Some((lang, indent, last_text.map(str::to_string), Vec::new()));
            }
            None => {
                if !raw.trim().is_empty() {
                    last_text = Some(raw);
                }
            }
            Some(_) if is_fence(raw) => {
                if let Some((lang, _, preceding, body)) = open.take() {
                    blocks.push(FencedBlock {
                        lang,
                        content: body.join("\n"),
                        preceding,
                    });
                }
                last_text = None;
            }
            Some((_, indent, _, body)) => {
                body.push(strip_indent(raw, *indent));
            }
        }
    }

    blocks
}

fn strip_indent(line: &str, indent: usize) -> &str {
    let leading = line.len() - line.trim_start().len();
    &line[leading.min(indent)..]
}

/// Path named by a comment on the first line of a block
///
/// Accepts `# path`, `// path`, `-- path`, `/* path */` and `<!-- path -->`.
/// The first token must look like a path: it contains `/` or ends in an
/// extension.
pub fn path_from_first_line(content: &str) -> Option<String> {
    let first = content.lines().next()?.trim();
    if first.starts_with("#!") {
        return None;
    }

    let body = ["<!--", "/*", "//", "--", "#"]
        .iter()
        .find_map(|marker| first.strip_prefix(marker))?;
    let body = body
        .trim()
        .trim_end_matches("-->")
        .trim_end_matches("*/")
        .trim();

    let token = body.split_whitespace().next()?;
    let token = token.trim_end_matches([':', ',']);
    if token.starts_with("http://") || token.starts_with("https://") {
        return None;
    }
    if token.contains('/') || extension_regex().is_match(token) {
        Some(token.to_string())
    } else {
        None
    }
}

/// First backtick-quoted token with a file extension
pub fn backtick_path(text: &str) -> Option<String> {
    backtick_regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Every backtick-quoted token with a file extension, in order
pub fn backtick_paths(text: &str) -> Vec<String> {
    backtick_regex()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Target file for a block under the given resolution order
pub fn resolve_target(
    block: &FencedBlock,
    resolution: PathResolution,
) -> Option<(String, PathSource)> {
    let first_line = || path_from_first_line(&block.content).map(|p| (p, PathSource::FirstLine));
    let preceding = || {
        block
            .preceding
            .as_deref()
            .and_then(backtick_path)
            .map(|p| (p, PathSource::PrecedingText))
    };

    match resolution {
        PathResolution::FirstLineThenPreceding => first_line().or_else(preceding),
        PathResolution::PrecedingThenFirstLine => preceding().or_else(first_line),
        PathResolution::FirstLineOnly => first_line(),
    }
}

/// Strip a markdown fence wrapper from a model response
///
/// Takes the longest fenced block if any, otherwise the trimmed response.
pub fn strip_code_fences(response: &str) -> String {
    fenced_blocks(response)
        .into_iter()
        .max_by_key(|b| b.content.len())
        .map(|b| b.content)
        .unwrap_or_else(|| response.trim().to_string())
}

const SHELL_LANGS: [&str; 6] = ["", "bash", "sh", "shell", "console", "zsh"];

/// Shell lines in `text` that start with one of `prefixes`
///
/// Only blocks tagged as shell (or untagged) are read. A leading `$ `
/// prompt is removed and comment lines are skipped.
pub fn shell_commands(text: &str, prefixes: &[String]) -> Vec<String> {
    fenced_blocks(text)
        .into_iter()
        .filter(|b| SHELL_LANGS.contains(&b.lang.to_lowercase().as_str()))
        .flat_map(|b| {
            b.content
                .lines()
                .map(|l| l.trim())
                .map(|l| l.strip_prefix("$ ").unwrap_or(l).trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter(|l| prefixes.iter().any(|p| l.starts_with(p.as_str())))
        .collect()
}
