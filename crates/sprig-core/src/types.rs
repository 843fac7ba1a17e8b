//! Core type definitions for sprig

use serde::{Deserialize, Serialize};

use crate::SprigError;

/// Sprint execution status, persisted in the backlog document's `**Status**:` line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SprintStatus {
    #[default]
    Idle,
    Scanning,
    Planning,
    Building,
    Verifying,
    Healing,
    Review,
    Completed,
    ErrorHalt,
    WaitingUser,
}

impl SprintStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [SprintStatus; 10] = [
        Self::Idle,
        Self::Scanning,
        Self::Planning,
        Self::Building,
        Self::Verifying,
        Self::Healing,
        Self::Review,
        Self::Completed,
        Self::ErrorHalt,
        Self::WaitingUser,
    ];

    /// The exact text written to the document
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Scanning => "SCANNING",
            Self::Planning => "PLANNING",
            Self::Building => "BUILDING",
            Self::Verifying => "VERIFYING",
            Self::Healing => "HEALING",
            Self::Review => "REVIEW",
            Self::Completed => "COMPLETED",
            Self::ErrorHalt => "ERROR_HALT",
            Self::WaitingUser => "WAITING_USER",
        }
    }

    /// Statuses that end a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::ErrorHalt)
    }

    /// Statuses that need an external signal before work resumes
    pub fn needs_intervention(&self) -> bool {
        matches!(self, Self::ErrorHalt | Self::WaitingUser)
    }

    /// Statuses a queued document can be activated from
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Idle | Self::Planning)
    }
}

impl std::fmt::Display for SprintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SprintStatus {
    type Err = SprigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace([' ', '-'], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| SprigError::UnknownStatus(s.trim().to_string()))
    }
}

/// A single backlog item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task title, bold markers stripped. May embed backtick-quoted file paths.
    pub name: String,
    /// Whether the checklist box is ticked
    pub completed: bool,
    /// Free text below the checklist line (may contain fenced code blocks)
    #[serde(default)]
    pub description: String,
}

impl Task {
    pub fn new(name: impl Into<String>, completed: bool) -> Self {
        Self {
            name: name.into(),
            completed,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = if self.completed { "✓" } else { "○" };
        write!(f, "{} {}", mark, self.name)
    }
}

/// Parsed backlog document (one sprint)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogDocument {
    pub name: String,
    pub objective: String,
    pub status: SprintStatus,
    /// Ordered; the first incomplete task is "next"
    pub tasks: Vec<Task>,
}

impl BacklogDocument {
    /// Tasks not yet completed, in document order
    pub fn pending_tasks(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| !t.completed).collect()
    }

    pub fn completed_tasks(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.completed).collect()
    }

    pub fn next_task(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| !t.completed)
    }

    /// Completion percentage (0.0 for an empty backlog)
    pub fn progress(&self) -> f64 {
        if self.tasks.is_empty() {
            return 0.0;
        }
        let done = self.tasks.iter().filter(|t| t.completed).count();
        (done as f64 / self.tasks.len() as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_text() {
        for status in SprintStatus::ALL {
            let parsed: SprintStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_status_parse_is_lenient_on_case_and_separators() {
        assert_eq!(
            "waiting user".parse::<SprintStatus>().unwrap(),
            SprintStatus::WaitingUser
        );
        assert_eq!(
            "error-halt".parse::<SprintStatus>().unwrap(),
            SprintStatus::ErrorHalt
        );
    }

    #[test]
    fn test_unknown_status_is_typed_error() {
        let err = "SHIPPING".parse::<SprintStatus>().unwrap_err();
        assert!(matches!(err, SprigError::UnknownStatus(ref s) if s == "SHIPPING"));
    }

    #[test]
    fn test_status_serde_uses_document_text() {
        let json = serde_json::to_string(&SprintStatus::ErrorHalt).unwrap();
        assert_eq!(json, "\"ERROR_HALT\"");
    }

    #[test]
    fn test_document_progress_and_pending() {
        let doc = BacklogDocument {
            name: "Sprint 1".to_string(),
            objective: "Ship".to_string(),
            status: SprintStatus::Planning,
            tasks: vec![
                Task::new("one", true),
                Task::new("two", false),
                Task::new("three", false),
                Task::new("four", true),
            ],
        };

        assert_eq!(doc.progress(), 50.0);
        assert_eq!(doc.pending_tasks().len(), 2);
        assert_eq!(doc.completed_tasks().len(), 2);
        assert_eq!(doc.next_task().unwrap().name, "two");
    }

    #[test]
    fn test_empty_document_progress() {
        let doc = BacklogDocument {
            name: String::new(),
            objective: String::new(),
            status: SprintStatus::Idle,
            tasks: vec![],
        };
        assert_eq!(doc.progress(), 0.0);
        assert!(doc.next_task().is_none());
    }
}
