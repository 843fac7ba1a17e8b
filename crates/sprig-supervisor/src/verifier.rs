//! Layered task verification
//!
//! 1. Shell commands from the task description (decisive when present)
//! 2. Backtick-quoted paths in the task name must exist
//! 3. Project smoke markers, informational only
//!
//! Verification stops at the first layer that gives a decisive answer.

use sprig_backlog::extract::{backtick_paths, shell_commands};
use sprig_core::process::tail_chars;
use sprig_core::{ProcessRunner, SprigConfig, SprigError, Task, VerifierConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Which layer decided the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationLayer {
    Commands,
    FileExistence,
    /// No decisive layer; passed on smoke checks alone
    Smoke,
}

/// Outcome of verifying one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub passed: bool,
    pub layer: VerificationLayer,
    /// Failure detail, fed back into healing
    pub error: Option<String>,
    /// Smoke check observations
    pub notes: Vec<String>,
}

impl Verification {
    fn pass(layer: VerificationLayer) -> Self {
        Self {
            passed: true,
            layer,
            error: None,
            notes: Vec::new(),
        }
    }

    fn fail(layer: VerificationLayer, error: String) -> Self {
        Self {
            passed: false,
            layer,
            error: Some(error),
            notes: Vec::new(),
        }
    }
}

pub struct Verifier {
    runner: Arc<dyn ProcessRunner>,
    project_root: PathBuf,
    working_dir: PathBuf,
    config: VerifierConfig,
}

impl Verifier {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        project_root: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        config: VerifierConfig,
    ) -> Self {
        Self {
            runner,
            project_root: project_root.into(),
            working_dir: working_dir.into(),
            config,
        }
    }

    pub fn from_config(runner: Arc<dyn ProcessRunner>, config: &SprigConfig) -> Self {
        Self::new(
            runner,
            config.project_root.clone(),
            config.verify_working_dir(),
            config.verifier.clone(),
        )
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    #[instrument(skip_all, fields(task = %task.name))]
    pub async fn verify(&self, task: &Task) -> Verification {
        let commands = shell_commands(&task.description, &self.config.command_prefixes);
        if !commands.is_empty() {
            return self.run_commands(&commands).await;
        }

        let paths = backtick_paths(&task.name);
        if !paths.is_empty() {
            for path in &paths {
                let trimmed = path.trim_start_matches('/');
                if !self.project_root.join(trimmed).exists() {
                    warn!("Expected file missing: {}", path);
                    return Verification::fail(
                        VerificationLayer::FileExistence,
                        format!("File {} was not created.", path),
                    );
                }
                debug!("Verified file exists: {}", path);
            }
            info!("Verification passed ({} files present)", paths.len());
            return Verification::pass(VerificationLayer::FileExistence);
        }

        let mut verification = Verification::pass(VerificationLayer::Smoke);
        verification.notes = self.smoke_checks().await;
        info!("No decisive verification available; passing on smoke checks");
        verification
    }

    async fn run_commands(&self, commands: &[String]) -> Verification {
        for command in commands {
            info!("Running verification: {}", command);
            match self
                .runner
                .run(command, &self.working_dir, self.timeout())
                .await
            {
                Ok(output) if output.success => {
                    debug!("Verification command passed: {}", command);
                }
                Ok(output) => {
                    warn!("Verification command failed: {}", command);
                    return Verification::fail(
                        VerificationLayer::Commands,
                        format!(
                            "Verification command failed: {}\nOutput: {}",
                            command,
                            output.tail(self.config.output_tail_chars)
                        ),
                    );
                }
                Err(SprigError::ExecutionTimeout { seconds, .. }) => {
                    warn!("Verification command timed out: {}", command);
                    return Verification::fail(
                        VerificationLayer::Commands,
                        format!(
                            "Verification command timed out after {}s: {}",
                            seconds, command
                        ),
                    );
                }
                Err(e) => {
                    warn!("Verification command could not run: {}", e);
                    return Verification::fail(
                        VerificationLayer::Commands,
                        format!(
                            "Verification command failed: {}\nOutput: {}",
                            command,
                            tail_chars(&e.to_string(), self.config.output_tail_chars)
                        ),
                    );
                }
            }
        }
        info!("All {} verification commands passed", commands.len());
        Verification::pass(VerificationLayer::Commands)
    }

    async fn smoke_checks(&self) -> Vec<String> {
        let mut notes = Vec::new();
        for marker in &self.config.smoke_markers {
            if !self.project_root.join(&marker.path).exists() {
                continue;
            }
            let Some(command) = &marker.command else {
                notes.push(format!("{} present", marker.path));
                continue;
            };

            let note = match self
                .runner
                .run(command, &self.project_root, self.timeout())
                .await
            {
                Ok(output) if output.success => format!("{}: `{}` ok", marker.path, command),
                Ok(output) => format!(
                    "{}: `{}` failed ({})",
                    marker.path,
                    command,
                    output.tail(200)
                ),
                Err(e) => format!("{}: `{}` skipped ({})", marker.path, command, e),
            };
            info!("Smoke check: {}", note);
            notes.push(note);
        }
        notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_core::{MockRunner, ProcessOutput, SmokeMarker};
    use tempfile::TempDir;

    fn verifier(dir: &TempDir, runner: MockRunner) -> Verifier {
        Verifier::new(
            Arc::new(runner),
            dir.path(),
            dir.path(),
            VerifierConfig::default(),
        )
    }

    fn task_with_commands(commands: &str) -> Task {
        Task::new("Wire the radio", false)
            .with_description(format!("Check it:\n```bash\n{}\n```", commands))
    }

    #[tokio::test]
    async fn test_failing_command_reports_output_tail() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new()
            .with_response("cargo test", ProcessOutput::failed(101, "test radio::send ... FAILED"));
        let result = verifier(&dir, runner.clone())
            .verify(&task_with_commands("$ cargo build\n$ cargo test\n$ npm test"))
            .await;

        assert!(!result.passed);
        assert_eq!(result.layer, VerificationLayer::Commands);
        assert_eq!(
            result.error.as_deref(),
            Some("Verification command failed: cargo test\nOutput: test radio::send ... FAILED")
        );
        // Stops at the first failure
        assert_eq!(runner.calls(), vec!["cargo build", "cargo test"]);
    }

    #[tokio::test]
    async fn test_passing_commands_are_decisive() {
        let dir = TempDir::new().unwrap();
        let task = Task::new("Create `missing.rs`", false)
            .with_description("```sh\ncargo check\n# comment\nls -la\n```");
        let runner = MockRunner::new();
        let result = verifier(&dir, runner.clone()).verify(&task).await;

        assert!(result.passed);
        assert_eq!(result.layer, VerificationLayer::Commands);
        // `ls` is not a verification prefix
        assert_eq!(runner.calls(), vec!["cargo check"]);
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new().with_timeout("pytest");
        let result = verifier(&dir, runner).verify(&task_with_commands("pytest")).await;
        assert!(!result.passed);
        assert!(result.error.unwrap().contains("timed out after 300s: pytest"));
    }

    #[tokio::test]
    async fn test_missing_backtick_file_fails() {
        let dir = TempDir::new().unwrap();
        let task = Task::new("Create `src/foo.py`", false);
        let result = verifier(&dir, MockRunner::new()).verify(&task).await;

        assert!(!result.passed);
        assert_eq!(result.layer, VerificationLayer::FileExistence);
        assert_eq!(result.error.as_deref(), Some("File src/foo.py was not created."));

        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/foo.py"), "x = 1\n").unwrap();
        let result = verifier(&dir, MockRunner::new()).verify(&task).await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_smoke_checks_never_fail() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("platformio.ini"), "[env]\n").unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();

        let runner = MockRunner::new()
            .with_response("pio run --list-targets", ProcessOutput::failed(1, "no pio"));
        let mut config = VerifierConfig::default();
        config.smoke_markers.push(SmokeMarker {
            path: "Makefile".to_string(),
            command: Some("make -n".to_string()),
        });
        let verifier = Verifier::new(Arc::new(runner.clone()), dir.path(), dir.path(), config);

        let result = verifier.verify(&Task::new("Tune the build flags", false)).await;
        assert!(result.passed);
        assert_eq!(result.layer, VerificationLayer::Smoke);
        assert_eq!(result.notes.len(), 2);
        assert!(result.notes[0].contains("failed (no pio)"));
        assert_eq!(result.notes[1], "Cargo.toml present");
        assert_eq!(runner.calls(), vec!["pio run --list-targets"]);
    }
}
