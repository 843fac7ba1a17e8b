//! Change applier
//!
//! Writes fenced code blocks to disk, from a task description or, when the
//! description carries none, from the generated plan. A block is written
//! only when a target path can be resolved for it; every write is a full
//! overwrite.

use sprig_backlog::extract::{backtick_paths, fenced_blocks, resolve_target, strip_code_fences};
use sprig_core::{ApplierConfig, PathResolution, Result, SprigConfig, SprigError, Task};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Outcome of applying one task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Paths written, relative to the project root
    pub written: Vec<String>,
    /// Blocks without a resolvable path
    pub skipped: usize,
    /// Paths rejected or failed, with the reason
    pub errors: Vec<String>,
}

impl ApplyReport {
    pub fn changes_made(&self) -> bool {
        !self.written.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.written.is_empty() {
            parts.push(format!("{} written", self.written.len()));
        }
        if self.skipped > 0 {
            parts.push(format!("{} skipped", self.skipped));
        }
        if !self.errors.is_empty() {
            parts.push(format!("{} errors", self.errors.len()));
        }
        if parts.is_empty() {
            "no code blocks".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Normalize a target path and refuse anything outside the project
///
/// A leading `/` is read as project-root relative. Parent traversal and
/// protected paths are rejected.
pub fn validate_path(raw: &str, protected: &[String]) -> Result<PathBuf> {
    let trimmed = raw.trim().trim_start_matches('/');
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(SprigError::PathValidation(format!("Empty path: '{}'", raw)));
    }

    let path = Path::new(trimmed);
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(SprigError::PathValidation(format!(
                    "Path escapes the project: {}",
                    raw
                )))
            }
        }
    }

    for guarded in protected {
        let guarded = Path::new(guarded);
        let hit = path.starts_with(guarded)
            || path
                .components()
                .any(|c| c.as_os_str() == guarded.as_os_str());
        if hit {
            return Err(SprigError::PathValidation(format!(
                "Cannot write to protected path: {}",
                raw
            )));
        }
    }

    Ok(path.to_path_buf())
}

#[derive(Debug, Clone)]
pub struct ChangeApplier {
    root: PathBuf,
    resolution: PathResolution,
    protected: Vec<String>,
}

impl ChangeApplier {
    pub fn new(root: impl Into<PathBuf>, config: &ApplierConfig) -> Self {
        Self {
            root: root.into(),
            resolution: config.path_resolution,
            protected: config.protected_paths.clone(),
        }
    }

    pub fn from_config(config: &SprigConfig) -> Self {
        Self::new(config.project_root.clone(), &config.applier)
    }

    /// Write every resolvable fenced block of the task description
    #[instrument(skip_all, fields(task = %task.name))]
    pub fn apply(&self, task: &Task) -> ApplyReport {
        let report = self.write_blocks(&task.description);
        log_report(&report);
        report
    }

    /// Write the fenced code of a generated plan
    ///
    /// Blocks with a resolvable path are written as in [`ChangeApplier::apply`].
    /// When none resolves and the task name points at exactly one file, the
    /// plan's main code block (fences stripped) becomes that file.
    #[instrument(skip_all, fields(task = %task.name))]
    pub fn apply_plan(&self, plan: &str, task: &Task) -> ApplyReport {
        let mut report = self.write_blocks(plan);

        let targets = backtick_paths(&task.name);
        if !report.changes_made() && report.errors.is_empty() && report.skipped > 0 {
            if let [target] = targets.as_slice() {
                debug!("Using the plan's main code block for {}", target);
                report.skipped -= 1;
                match self.write(target, &strip_code_fences(plan)) {
                    Ok(relative) => report.written.push(relative),
                    Err(e) => {
                        warn!("Failed to write {}: {}", target, e);
                        report.errors.push(format!("{}: {}", target, e));
                    }
                }
            }
        }

        log_report(&report);
        report
    }

    fn write_blocks(&self, text: &str) -> ApplyReport {
        let mut report = ApplyReport::default();

        for block in fenced_blocks(text) {
            let Some((target, source)) = resolve_target(&block, self.resolution) else {
                info!("Code block found but no file path detected; skipping");
                report.skipped += 1;
                continue;
            };
            debug!("Resolved {} from {:?}", target, source);

            match self.write(&target, &block.content) {
                Ok(relative) => report.written.push(relative),
                Err(e) => {
                    warn!("Failed to write {}: {}", target, e);
                    report.errors.push(format!("{}: {}", target, e));
                }
            }
        }
        report
    }

    fn write(&self, target: &str, content: &str) -> Result<String> {
        let relative = validate_path(target, &self.protected)?;
        let full = self.root.join(&relative);
        let created = !full.exists();

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut body = content.to_string();
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
        fs::write(&full, body)?;

        if created {
            info!("Created file: {}", relative.display());
        } else {
            info!("Modified file: {}", relative.display());
        }
        Ok(relative.to_string_lossy().to_string())
    }
}

fn log_report(report: &ApplyReport) {
    if report.changes_made() {
        info!("Applied code changes ({})", report.summary());
    } else {
        info!("No file changes applied ({})", report.summary());
    }
}
