//! # sprig-agent
//!
//! The parts of sprig that produce and apply work:
//!
//! - a reasoning client for an Anthropic-style messages API, guarded by a
//!   circuit breaker and retry/backoff
//! - a keyword retriever over the project's coding standards
//! - the plan generator, with a deterministic template when no reasoning
//!   backend is configured
//! - the change applier, which writes fenced code from task descriptions
//!
//! Every collaborator sits behind a trait so the supervisor can be driven
//! without network access.

mod applier;
mod circuit_breaker;
mod client;
mod planner;
mod retrieval;
mod types;

pub use applier::{validate_path, ApplyReport, ChangeApplier};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use client::{AnthropicClient, ReasoningClient, RetryPolicy, ScriptedClient};
pub use planner::{split_thought, template_plan, PlanGenerator, PlanRequest};
pub use retrieval::{NoRetrieval, Retriever, StandardsLibrary};
pub use types::*;
