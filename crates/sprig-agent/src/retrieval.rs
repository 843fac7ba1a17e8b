//! Retrieval collaborator
//!
//! Keyword scoring over local files. Used only to enrich planning prompts,
//! so every failure path degrades to an empty context.

use sprig_core::{Result, SprigError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Returns formatted context for `text`; empty when nothing matches
pub trait Retriever: Send + Sync {
    fn query(&self, text: &str, top_k: usize) -> Result<String>;
}

/// Retriever that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetrieval;

impl Retriever for NoRetrieval {
    fn query(&self, _text: &str, _top_k: usize) -> Result<String> {
        Ok(String::new())
    }
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "that", "this", "add", "use", "new", "create",
    "update", "implement", "make", "file", "files",
];

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// One retrievable unit of text
#[derive(Debug, Clone)]
struct Chunk {
    source: String,
    heading: String,
    body: String,
}

impl Chunk {
    fn score(&self, query: &HashSet<String>) -> usize {
        let heading_terms = terms(&self.heading);
        let body_terms = terms(&self.body);
        query
            .iter()
            .map(|q| {
                let in_heading = heading_terms.iter().filter(|t| *t == q).count();
                let in_body = body_terms.iter().filter(|t| *t == q).count();
                in_heading * 3 + in_body
            })
            .sum()
    }

    fn render(&self) -> String {
        if self.heading.is_empty() {
            format!("--- {} ---\n{}", self.source, self.body.trim())
        } else {
            format!("--- {} ({}) ---\n{}", self.source, self.heading, self.body.trim())
        }
    }
}

/// Markdown coding standards, split into `#`-headed sections
#[derive(Debug, Clone)]
pub struct StandardsLibrary {
    dir: PathBuf,
}

impl StandardsLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn chunks(&self) -> Result<Vec<Chunk>> {
        if !self.dir.is_dir() {
            debug!("No standards directory at {}", self.dir.display());
            return Ok(Vec::new());
        }

        let pattern = format!("{}/**/*.md", glob::Pattern::escape(&self.dir.to_string_lossy()));
        let paths = glob::glob(&pattern)
            .map_err(|e| SprigError::Retrieval(format!("Invalid standards pattern: {}", e)))?;

        let mut files: Vec<PathBuf> = paths.filter_map(|p| p.ok()).collect();
        files.sort();

        let mut chunks = Vec::new();
        for path in files {
            let text = std::fs::read_to_string(&path)?;
            chunks.extend(split_sections(&relative(&self.dir, &path), &text));
        }
        Ok(chunks)
    }
}

impl Retriever for StandardsLibrary {
    fn query(&self, text: &str, top_k: usize) -> Result<String> {
        let query: HashSet<String> = terms(text).into_iter().collect();
        if query.is_empty() || top_k == 0 {
            return Ok(String::new());
        }

        let mut scored: Vec<(usize, Chunk)> = self
            .chunks()?
            .into_iter()
            .map(|c| (c.score(&query), c))
            .filter(|(score, _)| *score > 0)
            .collect();
        // Stable: equal scores keep file order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let rendered: Vec<String> = scored
            .into_iter()
            .take(top_k)
            .map(|(_, c)| c.render())
            .collect();
        debug!("Retrieved {} standards sections", rendered.len());
        Ok(rendered.join("\n\n"))
    }
}

fn relative(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

fn split_sections(source: &str, text: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut heading = String::new();
    let mut body = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence && trimmed.starts_with('#') {
            push_chunk(&mut chunks, source, &heading, &body);
            heading = trimmed.trim_start_matches('#').trim().to_string();
            body.clear();
            continue;
        }
        body.push(line);
    }
    push_chunk(&mut chunks, source, &heading, &body);
    chunks
}

fn push_chunk(chunks: &mut Vec<Chunk>, source: &str, heading: &str, body: &[&str]) {
    let text = body.join("\n");
    if text.trim().is_empty() {
        return;
    }
    chunks.push(Chunk {
        source: source.to_string(),
        heading: heading.to_string(),
        body: text,
    });
}
