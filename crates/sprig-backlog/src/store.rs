//! Active sprint document persistence

use sprig_core::{BacklogDocument, Result, SprigConfig, SprigError, SprintStatus};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::parser::{
    add_title_prefix, insert_after_status, mark_complete, parse_document, set_status,
    strip_title_prefix,
};
use crate::queue::SprintQueue;

/// The active sprint document plus the queue it is drawn from
///
/// The supervisor is the only writer. Every write replaces the file
/// atomically, so an interrupted write never leaves a half-written
/// document behind.
#[derive(Debug, Clone)]
pub struct BacklogStore {
    active: PathBuf,
    queue: SprintQueue,
    /// Directory text used when writing `**Source**:` links
    link_base: String,
}

impl BacklogStore {
    pub fn new(
        active: impl Into<PathBuf>,
        queue_dir: impl Into<PathBuf>,
        queue_prefix: impl Into<String>,
    ) -> Self {
        let queue = SprintQueue::new(queue_dir, queue_prefix);
        let link_base = queue.dir().to_string_lossy().to_string();
        Self {
            active: active.into(),
            queue,
            link_base,
        }
    }

    pub fn from_config(config: &SprigConfig) -> Self {
        let mut store = Self::new(
            config.active_document_path(),
            config.queue_dir_path(),
            config.paths.queue_prefix.clone(),
        );
        store.link_base = config.paths.queue_dir.trim_end_matches('/').to_string();
        store
    }

    pub fn path(&self) -> &Path {
        &self.active
    }

    pub fn exists(&self) -> bool {
        self.active.is_file()
    }

    /// Raw document text
    pub fn read_raw(&self) -> Result<String> {
        if !self.exists() {
            return Err(SprigError::NotFound(self.active.clone()));
        }
        Ok(std::fs::read_to_string(&self.active)?)
    }

    /// Parse the active document
    pub fn read(&self) -> Result<BacklogDocument> {
        parse_document(&self.read_raw()?)
    }

    #[instrument(skip(self))]
    pub fn write_status(&self, status: SprintStatus) -> Result<()> {
        let content = self.read_raw()?;
        let updated = set_status(&content, status)?;
        if updated != content {
            write_atomic(&self.active, &updated)?;
        }
        Ok(())
    }

    /// Tick a task; returns whether the document changed
    #[instrument(skip(self))]
    pub fn mark_task_complete(&self, task_name: &str) -> Result<bool> {
        let content = self.read_raw()?;
        let (updated, changed) = mark_complete(&content, task_name);
        if changed {
            write_atomic(&self.active, &updated)?;
        } else {
            warn!("No open task named '{}'", task_name);
        }
        Ok(changed)
    }

    /// Archive the active document and activate the next queued one
    ///
    /// The finished document is written back to its queue file with status
    /// COMPLETED and the active marker removed. The next queue file (by
    /// file name) whose status is IDLE or PLANNING becomes the active
    /// document. Returns `false` when the queue holds nothing further.
    #[instrument(skip(self))]
    pub fn advance_to_next_document(&self) -> Result<bool> {
        let active = if self.exists() {
            self.read_raw()?
        } else {
            String::new()
        };
        let entries = self.queue.entries()?;

        let current = self.queue.referenced(&active, &entries).or_else(|| {
            parse_document(&active)
                .ok()
                .and_then(|doc| self.queue.named(&doc.name, &entries))
        });

        if let Some(index) = current {
            let archived = strip_title_prefix(&active);
            let archived = set_status(&archived, SprintStatus::Completed).unwrap_or(archived);
            write_atomic(&entries[index].path, &archived)?;
            info!("Archived finished sprint to {}", entries[index].path.display());
        }

        let Some(next) = self.queue.next_pending(current, &entries) else {
            info!("No further sprint documents queued");
            return Ok(false);
        };

        let source = std::fs::read_to_string(&entries[next].path)?;
        let mut activated = add_title_prefix(&source);
        if !self.queue.links_to(&activated, next, &entries) {
            let file_name = entries[next].file_name();
            let link = format!(
                "**Source**: [{}]({}/{})",
                file_name, self.link_base, file_name
            );
            activated = insert_after_status(&activated, &link)?;
        }

        if let Some(parent) = self.active.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_atomic(&self.active, &activated)?;
        info!("Advanced to {}", entries[next].file_name());
        Ok(true)
    }

    /// Human-readable progress report
    pub fn report(&self) -> Result<String> {
        let doc = self.read()?;
        let mut out = format!("# Sprint Report: {}\n\n", doc.name);
        out.push_str(&format!("**Objective**: {}\n", doc.objective));
        out.push_str(&format!("**Status**: {}\n", doc.status));
        out.push_str(&format!(
            "**Progress**: {}/{} tasks ({:.1}%)\n",
            doc.completed_tasks().len(),
            doc.tasks.len(),
            doc.progress()
        ));
        out.push_str(&format!(
            "**Generated**: {}\n",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        ));

        out.push_str("\n## Completed\n");
        let completed = doc.completed_tasks();
        if completed.is_empty() {
            out.push_str("- (none)\n");
        }
        for task in completed {
            out.push_str(&format!("- {}\n", task));
        }

        out.push_str("\n## Pending\n");
        let pending = doc.pending_tasks();
        if pending.is_empty() {
            out.push_str("- (none)\n");
        }
        for task in &pending {
            out.push_str(&format!("- {}\n", task));
        }

        if let Some(next) = pending.first() {
            out.push_str(&format!("\n**Next Task**: {}\n", next.name));
        }
        Ok(out)
    }
}

/// Write through a sibling temp file and rename over the target
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SprigError::PathValidation(format!("Not a file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ACTIVE: &str = "# Current Sprint: Sprint 1 Setup
**Objective**: Bootstrap the project
**Status**: BUILDING
**Source**: [sprint1_setup.md](docs/dev/sprints/sprint1_setup.md)

## Backlog
- [x] Create the repo
- [ ] Add a README
";

    fn setup() -> (TempDir, BacklogStore) {
        let dir = TempDir::new().unwrap();
        let sprint_dir = dir.path().join("docs/dev/sprints");
        std::fs::create_dir_all(&sprint_dir).unwrap();
        std::fs::create_dir_all(dir.path().join(".sprig")).unwrap();

        let mut config = SprigConfig::new(dir.path());
        config.paths.queue_dir = "docs/dev/sprints".to_string();
        let store = BacklogStore::from_config(&config);
        (dir, store)
    }

    fn queue_file(dir: &TempDir, name: &str, title: &str, status: &str) {
        std::fs::write(
            dir.path().join("docs/dev/sprints").join(name),
            format!(
                "# {}\n**Objective**: Next thing\n**Status**: {}\n\n## Backlog\n- [ ] First step\n",
                title, status
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (_dir, store) = setup();
        assert!(matches!(store.read().unwrap_err(), SprigError::NotFound(_)));
        assert!(matches!(
            store.write_status(SprintStatus::Idle).unwrap_err(),
            SprigError::NotFound(_)
        ));
    }

    #[test]
    fn test_status_roundtrip_on_disk() {
        let (_dir, store) = setup();
        std::fs::write(store.path(), ACTIVE).unwrap();

        let before = store.read().unwrap();
        store.write_status(before.status).unwrap();
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), ACTIVE);
        assert_eq!(store.read().unwrap(), before);

        store.write_status(SprintStatus::ErrorHalt).unwrap();
        let after = store.read().unwrap();
        assert_eq!(after.status, SprintStatus::ErrorHalt);
        assert_eq!(after.tasks, before.tasks);
    }

    #[test]
    fn test_mark_task_complete_idempotent_on_disk() {
        let (_dir, store) = setup();
        std::fs::write(store.path(), ACTIVE).unwrap();

        assert!(store.mark_task_complete("Add a README").unwrap());
        let once = std::fs::read_to_string(store.path()).unwrap();
        assert!(!store.mark_task_complete("Add a README").unwrap());
        let twice = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(once, twice);
        assert!(store.read().unwrap().pending_tasks().is_empty());
    }

    #[test]
    fn test_advance_archives_and_activates_next() {
        let (dir, store) = setup();
        std::fs::write(store.path(), ACTIVE).unwrap();
        queue_file(&dir, "sprint1_setup.md", "Sprint 1 Setup", "PLANNING");
        queue_file(&dir, "sprint2_api.md", "Sprint 2 API", "PLANNING");

        assert!(store.advance_to_next_document().unwrap());

        let archived =
            std::fs::read_to_string(dir.path().join("docs/dev/sprints/sprint1_setup.md")).unwrap();
        assert!(archived.starts_with("# Sprint 1 Setup\n"));
        assert!(archived.contains("**Status**: COMPLETED"));
        assert!(archived.contains("- [ ] Add a README"));

        let doc = store.read().unwrap();
        assert_eq!(doc.name, "Sprint 2 API");
        assert_eq!(doc.status, SprintStatus::Planning);
        let active = store.read_raw().unwrap();
        assert!(active.starts_with("# Current Sprint: Sprint 2 API\n"));
        assert!(active.contains("**Source**: [sprint2_api.md](docs/dev/sprints/sprint2_api.md)"));
    }

    #[test]
    fn test_advance_walks_the_whole_queue() {
        let (dir, store) = setup();
        std::fs::write(store.path(), ACTIVE).unwrap();
        queue_file(&dir, "sprint1_setup.md", "Sprint 1 Setup", "PLANNING");
        queue_file(&dir, "sprint2_api.md", "Sprint 2 API", "PLANNING");

        assert!(store.advance_to_next_document().unwrap());
        assert!(!store.advance_to_next_document().unwrap());

        let second =
            std::fs::read_to_string(dir.path().join("docs/dev/sprints/sprint2_api.md")).unwrap();
        assert!(second.contains("**Status**: COMPLETED"));
        assert!(!store.advance_to_next_document().unwrap());
    }

    #[test]
    fn test_advance_without_queue_is_false() {
        let (_dir, store) = setup();
        std::fs::write(store.path(), ACTIVE).unwrap();
        assert!(!store.advance_to_next_document().unwrap());
        assert_eq!(store.read_raw().unwrap(), ACTIVE);
    }

    #[test]
    fn test_advance_matches_by_title_without_link() {
        let (dir, store) = setup();
        let unlinked = ACTIVE.replace(
            "**Source**: [sprint1_setup.md](docs/dev/sprints/sprint1_setup.md)\n",
            "",
        );
        std::fs::write(store.path(), unlinked).unwrap();
        queue_file(&dir, "sprint0_old.md", "Sprint 0 Old", "PLANNING");
        queue_file(&dir, "sprint1_setup.md", "Sprint 1 Setup", "PLANNING");
        queue_file(&dir, "sprint2_api.md", "Sprint 2 API", "PLANNING");

        assert!(store.advance_to_next_document().unwrap());
        assert_eq!(store.read().unwrap().name, "Sprint 2 API");
    }

    #[test]
    fn test_report_lists_tasks() {
        let (_dir, store) = setup();
        std::fs::write(store.path(), ACTIVE).unwrap();
        let report = store.report().unwrap();
        assert!(report.starts_with("# Sprint Report: Sprint 1 Setup"));
        assert!(report.contains("**Progress**: 1/2 tasks (50.0%)"));
        assert!(report.contains("- ✓ Create the repo"));
        assert!(report.contains("- ○ Add a README"));
        assert!(report.contains("**Next Task**: Add a README"));
    }
}
