//! # sprig-policy
//!
//! Safety policy for sprig.
//!
//! This crate provides:
//! - Command evaluation (destructive, sensitive-path, external-impact rules)
//! - Plan evaluation (six independent checks, full diagnostics)
//! - Rule tables compiled from configuration
//!
//! Evaluation is pure: no I/O, no state, safe to share across threads.

mod engine;
mod rules;

pub use engine::{ApprovalDecision, ApprovalEngine, ApprovalResult, RiskLevel};
pub use rules::{PatternRule, RuleSet};
