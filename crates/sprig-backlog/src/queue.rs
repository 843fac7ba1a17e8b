//! Queued sprint documents
//!
//! Queue files live in one directory, are named `{prefix}*.md`, and are
//! taken in file-name order.

use regex::Regex;
use sprig_core::{BacklogDocument, Result, SprigError};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::parser::parse_document;

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\]\(([^)\s]+\.md)\)").expect("link pattern is valid"))
}

#[derive(Debug, Clone)]
pub(crate) struct SprintQueue {
    dir: PathBuf,
    prefix: String,
}

/// A queue file together with its parse result
pub(crate) struct QueueEntry {
    pub path: PathBuf,
    pub document: Option<BacklogDocument>,
}

impl QueueEntry {
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

impl SprintQueue {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Queue files sorted by file name. A missing directory is an empty queue.
    pub fn entries(&self) -> Result<Vec<QueueEntry>> {
        if !self.dir.is_dir() {
            debug!("Queue directory {} does not exist", self.dir.display());
            return Ok(Vec::new());
        }

        let pattern = format!(
            "{}/{}*.md",
            glob::Pattern::escape(&self.dir.to_string_lossy()),
            glob::Pattern::escape(&self.prefix)
        );
        let paths = glob::glob(&pattern)
            .map_err(|e| SprigError::Config(format!("Invalid queue pattern {}: {}", pattern, e)))?;

        let mut files: Vec<PathBuf> = paths.filter_map(|p| p.ok()).filter(|p| p.is_file()).collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let entries = files
            .into_iter()
            .map(|path| {
                let document = std::fs::read_to_string(&path)
                    .map_err(SprigError::from)
                    .and_then(|text| parse_document(&text));
                let document = match document {
                    Ok(doc) => Some(doc),
                    Err(e) => {
                        warn!("Skipping unreadable queue file {}: {}", path.display(), e);
                        None
                    }
                };
                QueueEntry { path, document }
            })
            .collect();

        Ok(entries)
    }

    /// Index of the queue file the active document links to
    pub fn referenced(&self, active: &str, entries: &[QueueEntry]) -> Option<usize> {
        link_regex()
            .captures_iter(active)
            .filter_map(|c| c.get(1))
            .filter_map(|m| Path::new(m.as_str()).file_name().and_then(|n| n.to_str()).map(str::to_string))
            .find_map(|linked| entries.iter().position(|e| e.file_name() == linked))
    }

    /// Index of the queue file whose title matches `name`
    pub fn named(&self, name: &str, entries: &[QueueEntry]) -> Option<usize> {
        entries
            .iter()
            .position(|e| e.document.as_ref().is_some_and(|d| d.name == name))
    }

    /// First pending entry after `current` (or from the start)
    pub fn next_pending(&self, current: Option<usize>, entries: &[QueueEntry]) -> Option<usize> {
        let start = current.map(|i| i + 1).unwrap_or(0);
        (start..entries.len()).find(|&i| {
            entries[i]
                .document
                .as_ref()
                .is_some_and(|d| d.status.is_pending())
        })
    }

    /// Whether `active` already links to the file at `index`
    pub fn links_to(&self, active: &str, index: usize, entries: &[QueueEntry]) -> bool {
        self.referenced(active, entries) == Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, status: &str) {
        std::fs::write(
            dir.join(name),
            format!("# {}\n**Objective**: o\n**Status**: {}\n", name, status),
        )
        .unwrap();
    }

    #[test]
    fn test_entries_sorted_and_filtered_by_prefix() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "sprint2_b.md", "PLANNING");
        write(dir.path(), "sprint1_a.md", "PLANNING");
        write(dir.path(), "notes.md", "PLANNING");
        std::fs::write(dir.path().join("sprint3.txt"), "x").unwrap();

        let queue = SprintQueue::new(dir.path(), "sprint");
        let names: Vec<_> = queue
            .entries()
            .unwrap()
            .iter()
            .map(|e| e.file_name().to_string())
            .collect();
        assert_eq!(names, vec!["sprint1_a.md", "sprint2_b.md"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let queue = SprintQueue::new(dir.path().join("nope"), "sprint");
        assert!(queue.entries().unwrap().is_empty());
    }

    #[test]
    fn test_referenced_matches_file_name() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "sprint1_a.md", "PLANNING");
        write(dir.path(), "sprint2_b.md", "PLANNING");
        let queue = SprintQueue::new(dir.path(), "sprint");
        let entries = queue.entries().unwrap();

        let active = "See [plan](docs/dev/sprints/sprint2_b.md) for details";
        assert_eq!(queue.referenced(active, &entries), Some(1));
        assert_eq!(queue.referenced("[x](other/unknown.md)", &entries), None);
    }

    #[test]
    fn test_next_pending_skips_finished_and_unreadable() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "sprint1.md", "COMPLETED");
        std::fs::write(dir.path().join("sprint2.md"), "garbage").unwrap();
        write(dir.path(), "sprint3.md", "IDLE");
        let queue = SprintQueue::new(dir.path(), "sprint");
        let entries = queue.entries().unwrap();

        assert_eq!(queue.next_pending(None, &entries), Some(2));
        assert_eq!(queue.next_pending(Some(2), &entries), None);
        assert_eq!(queue.named("sprint3.md", &entries), Some(2));
    }
}
