//! Unified error types for sprig
//!
//! Policy rejections and verification failures are NOT errors. They are
//! ordinary values (`ApprovalDecision`, `Verification`) that drive state
//! transitions. Everything here is either fatal to the current operation
//! or fatal to the run.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for all sprig operations
#[derive(Error, Debug)]
pub enum SprigError {
    // Backlog errors
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    // Process errors
    #[error("Command timed out after {seconds}s: {command}")]
    ExecutionTimeout { command: String, seconds: u64 },

    #[error("Process error: {0}")]
    Process(String),

    // Collaborator errors
    #[error("Reasoning error: {0}")]
    Reasoning(String),

    #[error("Reasoning limit: {0}")]
    ReasoningLimit(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("VCS error: {0}")]
    Vcs(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Path validation failed: {0}")]
    PathValidation(String),

    // Supervisor errors
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using SprigError
pub type Result<T> = std::result::Result<T, SprigError>;
