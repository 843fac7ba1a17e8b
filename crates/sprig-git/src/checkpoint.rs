//! Checkpoint commits after a verified task

use sprig_core::fail_open::fail_open;
use sprig_core::{Result, SprigError};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::GitExecutor;

/// Conventional commit message for an automated task
pub fn commit_message(task_name: &str) -> String {
    format!("feat(auto): {}", task_name)
}

/// What a checkpoint attempt did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    Committed { message: String },
    /// Working tree had nothing to commit
    Clean,
    /// Git failed; the task result is unaffected
    Skipped,
}

/// Stages and commits everything after a task passes verification
#[derive(Clone)]
pub struct CheckpointCommitter {
    executor: Arc<dyn GitExecutor>,
}

impl CheckpointCommitter {
    pub fn new(executor: Arc<dyn GitExecutor>) -> Self {
        Self { executor }
    }

    /// Whether the working tree has uncommitted changes
    pub async fn has_changes(&self) -> Result<bool> {
        let output = self.executor.exec(&["status", "--porcelain"]).await?;
        if !output.success {
            return Err(SprigError::Vcs(format!("git status failed: {}", output.stderr.trim())));
        }
        Ok(!output.stdout.trim().is_empty())
    }

    pub async fn stage_all(&self) -> Result<()> {
        let output = self.executor.exec(&["add", "."]).await?;
        if !output.success {
            return Err(SprigError::Vcs(format!("git add failed: {}", output.stderr.trim())));
        }
        Ok(())
    }

    pub async fn commit(&self, message: &str) -> Result<()> {
        let output = self.executor.exec(&["commit", "-m", message]).await?;
        if !output.success {
            return Err(SprigError::Vcs(format!("git commit failed: {}", output.stderr.trim())));
        }
        Ok(())
    }

    /// Commit all changes for `task_name`. Never fails.
    #[instrument(skip(self))]
    pub async fn checkpoint(&self, task_name: &str) -> CheckpointOutcome {
        let message = commit_message(task_name);
        let attempt = fail_open("checkpoint commit", || async {
            if !self.has_changes().await? {
                return Ok(CheckpointOutcome::Clean);
            }
            self.stage_all().await?;
            self.commit(&message).await?;
            Ok(CheckpointOutcome::Committed {
                message: message.clone(),
            })
        })
        .await;

        match attempt {
            Some(CheckpointOutcome::Committed { message }) => {
                info!("Checkpoint committed: {}", message);
                CheckpointOutcome::Committed { message }
            }
            Some(outcome) => {
                info!("Nothing to commit");
                outcome
            }
            None => CheckpointOutcome::Skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockGitExecutor;
    use sprig_core::ProcessOutput;

    #[tokio::test]
    async fn test_checkpoint_commits_dirty_tree() {
        let git = MockGitExecutor::new()
            .with_response("status --porcelain", ProcessOutput::ok("?? src/new.rs\n"))
            .with_response("add .", ProcessOutput::ok(""))
            .with_response("commit -m feat(auto): Add parser", ProcessOutput::ok(""));
        let committer = CheckpointCommitter::new(Arc::new(git.clone()));

        let outcome = committer.checkpoint("Add parser").await;
        assert_eq!(
            outcome,
            CheckpointOutcome::Committed {
                message: "feat(auto): Add parser".to_string()
            }
        );
        assert_eq!(
            git.calls(),
            vec!["status --porcelain", "add .", "commit -m feat(auto): Add parser"]
        );
    }

    #[tokio::test]
    async fn test_clean_tree_is_a_noop() {
        let git = MockGitExecutor::new().with_response("status --porcelain", ProcessOutput::ok(""));
        let committer = CheckpointCommitter::new(Arc::new(git.clone()));

        assert_eq!(committer.checkpoint("Add parser").await, CheckpointOutcome::Clean);
        assert_eq!(git.calls(), vec!["status --porcelain"]);
    }

    #[tokio::test]
    async fn test_git_failures_fail_open() {
        let git = MockGitExecutor::new()
            .with_response("status --porcelain", ProcessOutput::ok(" M a\n"))
            .with_response("add .", ProcessOutput::ok(""))
            .with_response(
                "commit -m feat(auto): Add parser",
                ProcessOutput::failed(1, "Author identity unknown"),
            );
        let committer = CheckpointCommitter::new(Arc::new(git));
        assert_eq!(committer.checkpoint("Add parser").await, CheckpointOutcome::Skipped);

        let no_repo = MockGitExecutor::new().with_response(
            "status --porcelain",
            ProcessOutput::failed(128, "fatal: not a git repository"),
        );
        let committer = CheckpointCommitter::new(Arc::new(no_repo));
        assert_eq!(committer.checkpoint("Add parser").await, CheckpointOutcome::Skipped);
        assert!(committer.has_changes().await.is_err());
    }
}
