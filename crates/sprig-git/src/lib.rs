//! # sprig-git
//!
//! Git integration for sprig.
//!
//! This crate provides:
//! - Git command execution abstraction
//! - Best-effort checkpoint commits after a verified task

mod checkpoint;
mod command;

pub use checkpoint::{commit_message, CheckpointCommitter, CheckpointOutcome};
pub use command::{GitCommand, GitExecutor, MockGitExecutor};
