//! Pure state machine for the supervisor control flow
//!
//! No I/O happens here. The supervisor feeds events in, persists the
//! returned status and performs the returned actions.
//!
//! - Pure function: transition(status, event) -> (status, actions)
//! - Invalid transitions go to ERROR_HALT (never panic)
//! - HEALING is an ordinary state reached by an ordinary event

use sprig_core::SprintStatus;

/// Something that happened during a loop iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Supervisor picked up an idle document
    Start,
    /// A pending task was chosen for planning
    TaskSelected { task: String },
    /// Policy (or the manual override) approved the plan
    PlanApproved,
    /// Policy wants a human to look at the plan
    ApprovalRequired { reason: String },
    /// Policy forbids the plan outright
    PlanForbidden { reason: String },
    /// External intervention cleared a blocked document
    Unblocked,
    /// Changes were applied
    BuildFinished { changes_made: bool },
    VerificationPassed { task: String },
    VerificationFailed {
        task: String,
        error: String,
        /// Failures so far for this task, including this one
        retry_count: usize,
        max_retries: usize,
    },
    /// No pending tasks remain in the active document
    BacklogExhausted,
    /// The next queued document was activated
    DocumentAdvanced,
    /// The queue is empty
    NoFurtherDocuments,
    /// An unexpected error
    Fault { message: String },
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    LogActivity { message: String },
    MarkTaskComplete { task: String },
    CheckpointCommit { task: String },
    ResetRetries,
    /// Keep the failure as context for the next plan
    RecordError { error: String },
    /// Stop the run after persisting the new status
    Halt,
}

fn log(message: impl Into<String>) -> Action {
    Action::LogActivity {
        message: message.into(),
    }
}

/// Pure state transition function
///
/// # Invalid Transitions
/// Any event the current status cannot handle yields ERROR_HALT with a
/// Halt action. This function never panics.
pub fn transition(status: SprintStatus, event: Event) -> (SprintStatus, Vec<Action>) {
    use SprintStatus::*;

    match (status, event) {
        (Idle, Event::Start) => (Scanning, vec![log("Supervisor started")]),

        (
            Idle | Scanning | Planning | Building | Verifying | Healing | Review | Completed,
            Event::TaskSelected { task },
        ) => (Planning, vec![log(format!("Planning task: {}", task))]),

        (Planning, Event::PlanApproved) => (Building, vec![log("Plan approved")]),

        (Planning, Event::ApprovalRequired { reason }) => (
            WaitingUser,
            vec![log(format!("User approval required: {}", reason))],
        ),

        (Planning, Event::PlanForbidden { reason }) => (
            WaitingUser,
            vec![log(format!("Plan forbidden: {}", reason)), Action::Halt],
        ),

        (WaitingUser | ErrorHalt, Event::Unblocked) => {
            (Planning, vec![log(format!("Unblocked from {}", status))])
        }

        (Building, Event::BuildFinished { changes_made }) => {
            let message = if changes_made {
                "Changes applied"
            } else {
                "No file changes applied"
            };
            (Verifying, vec![log(message)])
        }

        (Verifying, Event::VerificationPassed { task }) => (
            Scanning,
            vec![
                Action::MarkTaskComplete { task: task.clone() },
                Action::CheckpointCommit { task: task.clone() },
                Action::ResetRetries,
                log(format!("Task completed: {}", task)),
            ],
        ),

        (
            Verifying,
            Event::VerificationFailed {
                task,
                error,
                retry_count,
                max_retries,
            },
        ) => {
            if retry_count >= max_retries {
                (
                    ErrorHalt,
                    vec![
                        log(format!(
                            "Max retries ({}) reached for '{}': {}",
                            max_retries, task, error
                        )),
                        Action::Halt,
                    ],
                )
            } else {
                (
                    Healing,
                    vec![
                        log(format!(
                            "Verification failed ({}/{}), healing '{}'",
                            retry_count, max_retries, task
                        )),
                        Action::RecordError { error },
                    ],
                )
            }
        }

        // Any status: the document may be re-read mid-run or after a crash
        (_, Event::BacklogExhausted) => {
            (Review, vec![log("All tasks completed, reviewing sprint")])
        }

        (Review, Event::DocumentAdvanced) => (
            Planning,
            vec![Action::ResetRetries, log("Advanced to the next sprint")],
        ),

        (Review, Event::NoFurtherDocuments) => (
            Completed,
            vec![log("All available sprints have been completed"), Action::Halt],
        ),

        (_, Event::Fault { message }) => (
            ErrorHalt,
            vec![log(format!("Unexpected error: {}", message)), Action::Halt],
        ),

        (status, event) => (
            ErrorHalt,
            vec![
                log(format!(
                    "Invalid state transition: {} cannot handle {:?}",
                    status, event
                )),
                Action::Halt,
            ],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SprintStatus::*;

    fn select(task: &str) -> Event {
        Event::TaskSelected {
            task: task.to_string(),
        }
    }

    fn failed(retry_count: usize) -> Event {
        Event::VerificationFailed {
            task: "t".to_string(),
            error: "boom".to_string(),
            retry_count,
            max_retries: 3,
        }
    }

    #[test]
    fn test_happy_path_full_flow() {
        let (status, _) = transition(Idle, Event::Start);
        assert_eq!(status, Scanning);

        let (status, _) = transition(status, select("Add parser"));
        assert_eq!(status, Planning);

        let (status, _) = transition(status, Event::PlanApproved);
        assert_eq!(status, Building);

        let (status, _) = transition(status, Event::BuildFinished { changes_made: true });
        assert_eq!(status, Verifying);

        let (status, actions) = transition(
            status,
            Event::VerificationPassed {
                task: "Add parser".to_string(),
            },
        );
        assert_eq!(status, Scanning);
        assert_eq!(
            &actions[..3],
            &[
                Action::MarkTaskComplete {
                    task: "Add parser".to_string()
                },
                Action::CheckpointCommit {
                    task: "Add parser".to_string()
                },
                Action::ResetRetries,
            ]
        );

        let (status, _) = transition(status, Event::BacklogExhausted);
        assert_eq!(status, Review);
        let (status, actions) = transition(status, Event::NoFurtherDocuments);
        assert_eq!(status, Completed);
        assert!(actions.contains(&Action::Halt));
    }

    #[test]
    fn test_healing_loop_until_retry_budget() {
        let (status, actions) = transition(Verifying, failed(1));
        assert_eq!(status, Healing);
        assert!(actions.contains(&Action::RecordError {
            error: "boom".to_string()
        }));
        assert!(!actions.contains(&Action::Halt));

        // Healing re-plans the same task
        let (status, _) = transition(status, select("t"));
        assert_eq!(status, Planning);

        let (status, _) = transition(Verifying, failed(2));
        assert_eq!(status, Healing);

        let (status, actions) = transition(Verifying, failed(3));
        assert_eq!(status, ErrorHalt);
        assert!(actions.contains(&Action::Halt));
    }

    #[test]
    fn test_policy_outcomes() {
        let (status, actions) = transition(
            Planning,
            Event::ApprovalRequired {
                reason: "external".to_string(),
            },
        );
        assert_eq!(status, WaitingUser);
        assert!(!actions.contains(&Action::Halt));

        let (status, actions) = transition(
            Planning,
            Event::PlanForbidden {
                reason: "rm -rf /".to_string(),
            },
        );
        assert_eq!(status, WaitingUser);
        assert!(actions.contains(&Action::Halt));

        let (status, _) = transition(WaitingUser, Event::Unblocked);
        assert_eq!(status, Planning);
    }

    #[test]
    fn test_review_advances_to_planning() {
        let (status, actions) = transition(Review, Event::DocumentAdvanced);
        assert_eq!(status, Planning);
        assert!(actions.contains(&Action::ResetRetries));
    }

    #[test]
    fn test_exhausted_backlog_reviewed_from_any_status() {
        for status in SprintStatus::ALL {
            let (next, actions) = transition(status, Event::BacklogExhausted);
            assert_eq!(next, Review, "from {}", status);
            assert!(!actions.contains(&Action::Halt));
        }

        let (status, _) = transition(Verifying, Event::BacklogExhausted);
        let (status, actions) = transition(status, Event::NoFurtherDocuments);
        assert_eq!(status, Completed);
        assert!(actions.contains(&Action::Halt));
    }

    #[test]
    fn test_fault_from_any_status() {
        for status in SprintStatus::ALL {
            let (next, actions) = transition(
                status,
                Event::Fault {
                    message: "disk full".to_string(),
                },
            );
            assert_eq!(next, ErrorHalt);
            assert!(actions.contains(&Action::Halt));
        }
    }

    #[test]
    fn test_invalid_transition_never_panics() {
        let (status, actions) = transition(Idle, Event::PlanApproved);
        assert_eq!(status, ErrorHalt);
        assert!(actions.contains(&Action::Halt));

        let (status, _) = transition(WaitingUser, select("t"));
        assert_eq!(status, ErrorHalt);

        let (status, _) = transition(Completed, Event::DocumentAdvanced);
        assert_eq!(status, ErrorHalt);

        let (status, _) = transition(Building, failed(1));
        assert_eq!(status, ErrorHalt);
    }
}
