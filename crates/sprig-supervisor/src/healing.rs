//! Heuristic diagnosis of verification failures
//!
//! The diagnosis only enriches the context handed back to the planner; it
//! never changes control flow.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnosis {
    MissingPath,
    MissingDependency,
    FailingTest,
    Timeout,
    Unknown,
}

impl Diagnosis {
    pub fn hint(&self) -> &'static str {
        match self {
            Self::MissingPath => {
                "Create every missing file and parent directory at its full path from the project root."
            }
            Self::MissingDependency => {
                "Declare or install the missing dependency, or fix the import path."
            }
            Self::FailingTest => {
                "Read the failing assertion and change the implementation, not the test."
            }
            Self::Timeout => {
                "Look for hangs or unbounded loops and keep verification commands fast."
            }
            Self::Unknown => "Re-read the error output and address its first reported cause.",
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MissingPath => "missing file or directory",
            Self::MissingDependency => "missing dependency",
            Self::FailingTest => "failing test",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

const DEPENDENCY_MARKERS: &[&str] = &[
    "ImportError",
    "ModuleNotFoundError",
    "Cannot find module",
    "cannot find crate",
    "unresolved import",
    "command not found",
    "No matching distribution",
];

const PATH_MARKERS: &[&str] = &[
    "File not found",
    "was not created",
    "No such file or directory",
];

/// Classify an error message. Order matters: the more specific markers
/// are checked first.
pub fn diagnose(error: &str) -> Diagnosis {
    let lower = error.to_lowercase();

    if lower.contains("timed out") || lower.contains("timeout") {
        return Diagnosis::Timeout;
    }
    if DEPENDENCY_MARKERS.iter().any(|m| error.contains(m)) {
        return Diagnosis::MissingDependency;
    }
    if PATH_MARKERS.iter().any(|m| error.contains(m)) || lower.contains("directory") {
        return Diagnosis::MissingPath;
    }
    if lower.contains("assert")
        || error.contains("FAILED")
        || (lower.contains("test") && lower.contains("fail"))
    {
        return Diagnosis::FailingTest;
    }
    Diagnosis::Unknown
}

/// Error text plus diagnosis, as handed to the next plan
pub fn healing_context(error: &str) -> String {
    let diagnosis = diagnose(error);
    format!(
        "{}\n\nDiagnosis: {}. {}",
        error.trim_end(),
        diagnosis,
        diagnosis.hint()
    )
}
