//! # sprig-core
//!
//! Core types for the sprig sprint supervisor.
//!
//! sprig works through a backlog of tasks written in a markdown sprint
//! document: it plans each task, checks the plan against a safety policy,
//! applies it, verifies the result, and records its own progress back into
//! the same document.
//!
//! ## Core Paradigm
//!
//! - The document IS the state (status line + checklist)
//! - Policy decisions and verification failures are values, not errors
//! - One explicit configuration, passed to every component
//! - Best-effort collaborators fail open

pub mod config;
mod error;
pub mod fail_open;
pub mod process;
mod types;

pub use config::{
    ApplierConfig, PathResolution, PathsConfig, PolicyConfig, ReasoningConfig, SmokeMarker,
    SprigConfig, SupervisorConfig, VerifierConfig,
};
pub use error::{Result, SprigError};
pub use process::{MockRunner, ProcessOutput, ProcessRunner, ShellRunner};
pub use types::*;
