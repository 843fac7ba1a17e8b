//! # sprig-supervisor
//!
//! The sprint supervisor for sprig.
//!
//! This crate provides:
//! - A pure state machine over the sprint statuses
//! - Layered verification of applied tasks
//! - Heuristic diagnosis of failures for self-healing
//! - The manual approval flag
//! - The supervisor loop tying planner, policy, applier, verifier and
//!   checkpoint commits together

mod healing;
mod signal;
mod state_machine;
mod supervisor;
mod verifier;

pub use healing::{diagnose, healing_context, Diagnosis};
pub use signal::ApprovalSignal;
pub use state_machine::{transition, Action, Event};
pub use supervisor::{RunOptions, RunOutcome, Supervisor};
pub use verifier::{Verification, VerificationLayer, Verifier};
