//! Supervisor loop
//!
//! Drives the sprint document through the state machine one task at a
//! time: plan, approve, build, verify, then checkpoint or heal. The status
//! field of the document is written at every transition, so the document
//! always shows where the loop is and why it stopped.

use sprig_agent::{ChangeApplier, PlanGenerator, PlanRequest};
use sprig_backlog::BacklogStore;
use sprig_core::{ProcessRunner, Result, SprigConfig, SprintStatus};
use sprig_git::{CheckpointCommitter, GitExecutor};
use sprig_policy::{ApprovalDecision, ApprovalEngine, ApprovalResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::healing::healing_context;
use crate::signal::ApprovalSignal;
use crate::state_machine::{transition, Action, Event};
use crate::verifier::Verifier;

/// Options for a single run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Maximum loop iterations (0 = unlimited)
    pub max_iterations: usize,
}

/// Why a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every queued sprint is done
    Completed,
    /// Stopped in a status that needs intervention
    Halted { status: SprintStatus, reason: String },
    /// `max_iterations` was reached; the persisted status is unchanged
    IterationLimit,
}

/// In-memory run state; only the status is persisted
#[derive(Debug, Clone)]
struct RunState {
    status: SprintStatus,
    task: Option<String>,
    retry_count: usize,
    last_error: Option<String>,
}

enum Step {
    Next,
    Pause(Duration),
    Stop(RunOutcome),
}

pub struct Supervisor {
    config: Arc<SprigConfig>,
    store: BacklogStore,
    planner: PlanGenerator,
    policy: ApprovalEngine,
    applier: ChangeApplier,
    verifier: Verifier,
    committer: CheckpointCommitter,
    signal: ApprovalSignal,
    state: RunState,
}

impl Supervisor {
    /// Build every component from one configuration
    ///
    /// The planner starts in template mode; attach a reasoning client with
    /// [`Supervisor::with_planner`].
    pub fn new(
        config: Arc<SprigConfig>,
        runner: Arc<dyn ProcessRunner>,
        git: Arc<dyn GitExecutor>,
    ) -> Result<Self> {
        Ok(Self {
            store: BacklogStore::from_config(&config),
            planner: PlanGenerator::from_config(&config),
            policy: ApprovalEngine::from_config(&config.policy)?,
            applier: ChangeApplier::from_config(&config),
            verifier: Verifier::from_config(runner, &config),
            committer: CheckpointCommitter::new(git),
            signal: ApprovalSignal::from_config(&config),
            state: RunState {
                status: SprintStatus::Idle,
                task: None,
                retry_count: 0,
                last_error: None,
            },
            config,
        })
    }

    pub fn with_planner(mut self, planner: PlanGenerator) -> Self {
        self.planner = planner;
        self
    }

    pub fn status(&self) -> SprintStatus {
        self.state.status
    }

    pub fn retry_count(&self) -> usize {
        self.state.retry_count
    }

    /// Healing context for the next plan, if any
    pub fn last_error(&self) -> Option<&str> {
        self.state.last_error.as_deref()
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.supervisor.poll_interval_secs)
    }

    fn task_delay(&self) -> Duration {
        Duration::from_secs(self.config.supervisor.task_delay_secs)
    }

    /// Run until the queue is exhausted, the run halts, or the iteration
    /// limit is hit. Never returns without a status on disk that explains
    /// the stop, unless the document itself cannot be written.
    #[instrument(skip_all, fields(document = %self.store.path().display()))]
    pub async fn run(&mut self, options: RunOptions) -> RunOutcome {
        info!("Supervisor started (max retries {})", self.config.supervisor.max_retries);

        let max_display = if options.max_iterations == 0 {
            "unlimited".to_string()
        } else {
            options.max_iterations.to_string()
        };

        let mut iteration: usize = 0;
        loop {
            iteration += 1;
            if options.max_iterations > 0 && iteration > options.max_iterations {
                info!("Iteration limit reached ({})", options.max_iterations);
                return RunOutcome::IterationLimit;
            }
            debug!("=== Iteration {} of {} ===", iteration, max_display);

            match self.step().await {
                Ok(Step::Next) => {}
                Ok(Step::Pause(delay)) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Ok(Step::Stop(outcome)) => {
                    info!("Supervisor stopped: {:?}", outcome);
                    return outcome;
                }
                Err(e) => return self.fault(e.to_string()),
            }
        }
    }

    async fn step(&mut self) -> Result<Step> {
        let document = self.store.read()?;
        // External edits win over in-memory status
        self.state.status = document.status;

        // Scan first: an exhausted backlog is reviewed whatever the status
        let Some(task) = document.next_task().cloned() else {
            return self.finish_document().await;
        };

        if document.status.needs_intervention() {
            if document.status == SprintStatus::WaitingUser && self.signal.is_present() {
                self.apply(Event::Unblocked).await?;
                return Ok(Step::Next);
            }
            debug!("Status is {}; waiting for intervention", document.status);
            return Ok(Step::Pause(self.poll_interval()));
        }

        if document.status == SprintStatus::Idle && self.apply(Event::Start).await? {
            return Ok(Step::Stop(self.stopped("invalid start")));
        }

        if self.state.task.as_deref() != Some(task.name.as_str()) {
            self.state.task = Some(task.name.clone());
            self.state.retry_count = 0;
            self.state.last_error = None;
        }

        if self.apply(Event::TaskSelected { task: task.name.clone() }).await? {
            return Ok(Step::Stop(self.stopped("cannot plan from this status")));
        }

        let plan = self
            .planner
            .generate(&PlanRequest {
                task: &task,
                document: &document,
                prior_error: self.state.last_error.as_deref(),
            })
            .await;

        let approval = if self.signal.take() {
            ApprovalResult::manual_override()
        } else {
            self.policy.evaluate_plan(&plan, &task.name)
        };
        log_approval(&approval);

        let event = match approval.decision {
            ApprovalDecision::AutoApprove => Event::PlanApproved,
            ApprovalDecision::RequireUser => Event::ApprovalRequired {
                reason: approval.reason.clone(),
            },
            ApprovalDecision::Forbidden => Event::PlanForbidden {
                reason: approval.reason.clone(),
            },
        };
        if self.apply(event).await? {
            return Ok(Step::Stop(self.stopped(&approval.reason)));
        }
        if approval.decision == ApprovalDecision::RequireUser {
            info!(
                "Waiting for approval; create {} to continue",
                self.signal.path().display()
            );
            return Ok(Step::Pause(self.poll_interval()));
        }

        let mut report = self.applier.apply(&task);
        if !report.changes_made() {
            report = self.applier.apply_plan(&plan, &task);
        }
        let changes_made = report.changes_made();
        if self.apply(Event::BuildFinished { changes_made }).await? {
            return Ok(Step::Stop(self.stopped("build finished out of order")));
        }

        let verification = self.verifier.verify(&task).await;
        if verification.passed {
            if self
                .apply(Event::VerificationPassed { task: task.name.clone() })
                .await?
            {
                return Ok(Step::Stop(self.stopped("verification finished out of order")));
            }
            return Ok(Step::Pause(self.task_delay()));
        }

        self.state.retry_count += 1;
        let error = verification
            .error
            .unwrap_or_else(|| "Verification failed".to_string());
        warn!(
            "Verification failed (attempt {}/{}): {}",
            self.state.retry_count, self.config.supervisor.max_retries, error
        );

        let halt = self
            .apply(Event::VerificationFailed {
                task: task.name.clone(),
                error: error.clone(),
                retry_count: self.state.retry_count,
                max_retries: self.config.supervisor.max_retries,
            })
            .await?;
        if halt {
            return Ok(Step::Stop(self.stopped(&error)));
        }
        Ok(Step::Next)
    }

    /// No pending tasks: review, then advance or complete
    async fn finish_document(&mut self) -> Result<Step> {
        if self.apply(Event::BacklogExhausted).await? {
            return Ok(Step::Stop(self.stopped("cannot review from this status")));
        }

        let event = if self.store.advance_to_next_document()? {
            Event::DocumentAdvanced
        } else {
            Event::NoFurtherDocuments
        };
        if self.apply(event).await? {
            return Ok(Step::Stop(self.stopped("sprint queue exhausted")));
        }
        Ok(Step::Next)
    }

    /// Run one transition: persist the new status, then perform its actions.
    /// Returns whether the run must halt.
    async fn apply(&mut self, event: Event) -> Result<bool> {
        let from = self.state.status;
        let (to, actions) = transition(from, event);

        self.store.write_status(to)?;
        self.state.status = to;
        if from != to {
            info!("Status: {} -> {}", from, to);
        }

        let mut halt = false;
        for action in actions {
            match action {
                Action::LogActivity { message } => {
                    if to.needs_intervention() {
                        warn!("{}", message);
                    } else {
                        info!("{}", message);
                    }
                }
                Action::MarkTaskComplete { task } => {
                    if !self.store.mark_task_complete(&task)? {
                        warn!("Task not found or already complete: {}", task);
                    }
                }
                Action::CheckpointCommit { task } => {
                    self.committer.checkpoint(&task).await;
                }
                Action::ResetRetries => {
                    self.state.retry_count = 0;
                    self.state.last_error = None;
                }
                Action::RecordError { error } => {
                    let context = healing_context(&error);
                    info!("Self-healing context:\n{}", context);
                    self.state.last_error = Some(context);
                }
                Action::Halt => halt = true,
            }
        }
        Ok(halt)
    }

    fn stopped(&self, reason: &str) -> RunOutcome {
        match self.state.status {
            SprintStatus::Completed => RunOutcome::Completed,
            status => RunOutcome::Halted {
                status,
                reason: reason.to_string(),
            },
        }
    }

    /// Unexpected error: record ERROR_HALT and stop
    fn fault(&mut self, message: String) -> RunOutcome {
        error!("Unhandled error: {}", message);
        let (to, _) = transition(
            self.state.status,
            Event::Fault {
                message: message.clone(),
            },
        );
        if let Err(e) = self.store.write_status(to) {
            error!("Could not record {} in the sprint document: {}", to, e);
        }
        self.state.status = to;
        RunOutcome::Halted {
            status: to,
            reason: message,
        }
    }
}

fn log_approval(approval: &ApprovalResult) {
    info!(
        "Approval: {} ({} risk): {}",
        approval.decision, approval.risk_level, approval.reason
    );
    for check in &approval.checks_passed {
        debug!("  passed: {}", check);
    }
    for check in &approval.checks_failed {
        warn!("  failed: {}", check);
    }
}
