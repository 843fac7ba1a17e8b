//! Process execution abstraction
//!
//! Verification commands and smoke checks are the only places the loop
//! blocks on a child process. The caller-supplied timeout is the sole
//! cancellation mechanism: an expired command is killed and reported as
//! [`SprigError::ExecutionTimeout`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Output;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::{Result, SprigError};

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl From<Output> for ProcessOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            success: output.status.success(),
        }
    }
}

impl ProcessOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(exit_code),
            success: false,
        }
    }

    /// Last `max_chars` characters of stderr, falling back to stdout
    pub fn tail(&self, max_chars: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        tail_chars(source, max_chars)
    }
}

/// Keep the last `max_chars` characters of `text` (char-boundary safe)
pub fn tail_chars(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let skipped: String = text.chars().skip(count - max_chars).collect();
    format!("...[truncated]{}", skipped)
}

/// Trait for spawning commands (allows mocking in tests)
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` through the shell in `cwd`, killing it after `timeout`
    async fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> Result<ProcessOutput>;
}

/// Real runner using `sh -c`
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for ShellRunner {
    #[instrument(skip(self, timeout), fields(cwd = %cwd.display()))]
    async fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> Result<ProcessOutput> {
        debug!("Executing {:?}", command);

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(result) => result
                .map_err(|e| SprigError::Process(format!("Failed to spawn {}: {}", command, e)))?,
            Err(_) => {
                return Err(SprigError::ExecutionTimeout {
                    command: command.to_string(),
                    seconds: timeout.as_secs(),
                })
            }
        };

        let output = ProcessOutput::from(output);
        if !output.success {
            debug!("Command failed ({:?}): {}", output.exit_code, output.stderr);
        }
        Ok(output)
    }
}

/// Mock runner for testing
///
/// Commands without a scripted response succeed with empty output.
/// Every invocation is recorded.
#[derive(Clone, Default)]
pub struct MockRunner {
    responses: HashMap<String, ProcessOutput>,
    timeouts: Vec<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, command: &str, output: ProcessOutput) -> Self {
        self.responses.insert(command.to_string(), output);
        self
    }

    /// Make `command` behave as if it exceeded its timeout
    pub fn with_timeout(mut self, command: &str) -> Self {
        self.timeouts.push(command.to_string());
        self
    }

    /// Commands run so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ProcessRunner for MockRunner {
    async fn run(&self, command: &str, _cwd: &Path, timeout: Duration) -> Result<ProcessOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.to_string());
        }
        if self.timeouts.iter().any(|c| c == command) {
            return Err(SprigError::ExecutionTimeout {
                command: command.to_string(),
                seconds: timeout.as_secs(),
            });
        }
        Ok(self
            .responses
            .get(command)
            .cloned()
            .unwrap_or_else(|| ProcessOutput::ok("")))
    }
}
