//! Approval engine
//!
//! Classifies shell commands and free-text plans into an approval decision.
//! Rule tables come from configuration; precedence is fixed:
//! destructive or sensitive-path → FORBIDDEN, external impact → REQUIRE_USER,
//! any other failed check → REQUIRE_USER, otherwise AUTO_APPROVE.

use serde::{Deserialize, Serialize};
use sprig_core::{PolicyConfig, Result};
use tracing::debug;

use crate::rules::RuleSet;

/// Outcome of a policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalDecision {
    AutoApprove,
    RequireUser,
    Forbidden,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoApprove => "AUTO_APPROVE",
            Self::RequireUser => "REQUIRE_USER",
            Self::Forbidden => "FORBIDDEN",
        }
    }
}

impl std::fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk attached to a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Immutable result of one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResult {
    pub decision: ApprovalDecision,
    pub reason: String,
    pub risk_level: RiskLevel,
    pub checks_passed: Vec<String>,
    pub checks_failed: Vec<String>,
}

impl ApprovalResult {
    /// Result used when an operator has explicitly approved the next step
    pub fn manual_override() -> Self {
        Self {
            decision: ApprovalDecision::AutoApprove,
            reason: "Manual approval flag present".to_string(),
            risk_level: RiskLevel::Low,
            checks_passed: vec!["Manual override".to_string()],
            checks_failed: vec![],
        }
    }

    pub fn is_approved(&self) -> bool {
        self.decision == ApprovalDecision::AutoApprove
    }
}

/// Evaluates commands and plans against the configured rule tables
#[derive(Debug, Clone)]
pub struct ApprovalEngine {
    rules: RuleSet,
}

impl ApprovalEngine {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// Compile an engine from configuration
    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        Ok(Self::new(RuleSet::from_config(config)?))
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Evaluate a single shell command. Short-circuits on the first forbidding rule.
    pub fn evaluate_command(&self, command: &str) -> ApprovalResult {
        if let Some(rule) = self.rules.first_destructive(command) {
            debug!("Forbidden command {:?}: matched {}", command, rule.source);
            return ApprovalResult {
                decision: ApprovalDecision::Forbidden,
                reason: format!("Command contains destructive pattern: {}", rule.source),
                risk_level: RiskLevel::High,
                checks_passed: vec![],
                checks_failed: vec!["Destructive operation detected".to_string()],
            };
        }

        if let Some(path) = self.rules.first_sensitive(command) {
            debug!("Forbidden command {:?}: sensitive path {}", command, path);
            return ApprovalResult {
                decision: ApprovalDecision::Forbidden,
                reason: format!("Command accesses sensitive path: {}", path),
                risk_level: RiskLevel::High,
                checks_passed: vec!["No destructive operations".to_string()],
                checks_failed: vec!["Sensitive path access".to_string()],
            };
        }

        if let Some(rule) = self.rules.first_external(command) {
            return ApprovalResult {
                decision: ApprovalDecision::RequireUser,
                reason: format!("Command has external impact: {}", rule.source),
                risk_level: RiskLevel::Medium,
                checks_passed: vec![
                    "No destructive operations".to_string(),
                    "No sensitive path access".to_string(),
                ],
                checks_failed: vec!["External impact found".to_string()],
            };
        }

        ApprovalResult {
            decision: ApprovalDecision::AutoApprove,
            reason: "Command is safe for auto-execution".to_string(),
            risk_level: RiskLevel::Low,
            checks_passed: vec![
                "No destructive operations".to_string(),
                "No sensitive path access".to_string(),
                "No external impact".to_string(),
            ],
            checks_failed: vec![],
        }
    }

    /// Evaluate an implementation plan for `task_name`
    ///
    /// All six checks always run so the diagnostics are complete even when
    /// an earlier rule already decides the outcome.
    pub fn evaluate_plan(&self, plan: &str, task_name: &str) -> ApprovalResult {
        let mut checks_passed = Vec::new();
        let mut checks_failed = Vec::new();

        // 1. Task is well defined
        if task_name.trim().chars().count() >= self.rules.min_task_name_len {
            checks_passed.push("Task is well defined".to_string());
        } else {
            checks_failed.push("Task name ambiguous".to_string());
        }

        // 2. Destructive operations
        let destructive = self.rules.first_destructive(plan);
        match destructive {
            Some(rule) => checks_failed.push(format!("Destructive pattern found: {}", rule.source)),
            None => checks_passed.push("No destructive operations".to_string()),
        }

        // 3. External impact
        let external = self.rules.first_external(plan);
        match external {
            Some(rule) => checks_failed.push(format!("External impact found: {}", rule.source)),
            None => checks_passed.push("No external impact".to_string()),
        }

        // 4. Sensitive paths
        let sensitive = self.rules.first_sensitive(plan);
        match sensitive {
            Some(path) => checks_failed.push(format!("Sensitive path: {}", path)),
            None => checks_passed.push("No sensitive path access".to_string()),
        }

        // 5. Reversibility: the workspace is version-controlled either way
        if self.rules.mentions_reversibility(plan) {
            checks_passed.push("Version control mentioned".to_string());
        } else {
            checks_passed.push("Standard action is reversible (checkpointed workspace)".to_string());
        }

        // 6. Detail level
        if plan.chars().count() >= self.rules.min_plan_len {
            checks_passed.push("Plan is sufficiently detailed".to_string());
        } else {
            checks_failed.push("Plan too short/ambiguous".to_string());
        }

        let (decision, reason, risk_level) = if destructive.is_some() || sensitive.is_some() {
            (
                ApprovalDecision::Forbidden,
                "Plan contains destructive operations or sensitive path access",
                RiskLevel::High,
            )
        } else if external.is_some() {
            (
                ApprovalDecision::RequireUser,
                "Plan has external impact (deploy, publish, outbound calls)",
                RiskLevel::Medium,
            )
        } else if !checks_failed.is_empty() {
            (
                ApprovalDecision::RequireUser,
                "Plan has concerns that need review",
                RiskLevel::Medium,
            )
        } else {
            (
                ApprovalDecision::AutoApprove,
                "All safety checks passed",
                RiskLevel::Low,
            )
        };

        debug!(
            "Plan for {:?}: {} ({} passed, {} failed)",
            task_name,
            decision,
            checks_passed.len(),
            checks_failed.len()
        );

        ApprovalResult {
            decision,
            reason: reason.to_string(),
            risk_level,
            checks_passed,
            checks_failed,
        }
    }
}

impl Default for ApprovalEngine {
    fn default() -> Self {
        Self::from_config(&PolicyConfig::default()).expect("default policy patterns compile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAILED_PLAN: &str = "# Implementation Plan\n\n\
        1. Create src/parser.rs with the tokenizer and unit tests.\n\
        2. Wire the parser into main.rs and handle errors explicitly.\n\
        3. Run the test suite and fix any failures.\n";

    fn engine() -> ApprovalEngine {
        ApprovalEngine::default()
    }

    #[test]
    fn test_root_anchored_recursive_delete_is_forbidden() {
        let result = engine().evaluate_command("rm -rf /tmp/x");
        assert_eq!(result.decision, ApprovalDecision::Forbidden);
        assert_eq!(result.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_relative_recursive_delete_is_not_forbidden() {
        let result = engine().evaluate_command("rm -rf build");
        assert_eq!(result.decision, ApprovalDecision::AutoApprove);
    }

    #[test]
    fn test_destructive_wins_regardless_of_other_content() {
        for cmd in [
            "npm publish && rm -rf /",
            "cat /etc/passwd; dd if=/dev/zero of=/dev/sda",
            "echo hi; DROP TABLE users",
            "mkfs.ext4 /dev/sdb1",
        ] {
            let result = engine().evaluate_command(cmd);
            assert_eq!(result.decision, ApprovalDecision::Forbidden, "{}", cmd);
            assert_eq!(result.risk_level, RiskLevel::High, "{}", cmd);
            assert_eq!(result.checks_failed, vec!["Destructive operation detected"]);
        }
    }

    #[test]
    fn test_sensitive_path_is_forbidden() {
        let result = engine().evaluate_command("cp ~/.ssh/id_rsa /tmp/key");
        assert_eq!(result.decision, ApprovalDecision::Forbidden);
        assert!(result.reason.contains("~/.ssh/id_rsa"));
    }

    #[test]
    fn test_external_impact_requires_user() {
        for cmd in ["npm publish", "docker push registry/app:1", "terraform apply -auto-approve"] {
            let result = engine().evaluate_command(cmd);
            assert_eq!(result.decision, ApprovalDecision::RequireUser, "{}", cmd);
            assert_eq!(result.risk_level, RiskLevel::Medium);
        }
    }

    #[test]
    fn test_safe_command_auto_approves_with_three_checks() {
        let result = engine().evaluate_command("ls -la");
        assert_eq!(result.decision, ApprovalDecision::AutoApprove);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.checks_passed.len(), 3);
        assert!(result.checks_failed.is_empty());
    }

    #[test]
    fn test_git_push_boundary_is_configuration() {
        // Not external by default
        assert_eq!(
            engine().evaluate_command("git push origin main").decision,
            ApprovalDecision::AutoApprove
        );

        let mut config = PolicyConfig::default();
        config.external_patterns.push(r"git\s+push".to_string());
        let strict = ApprovalEngine::from_config(&config).unwrap();
        assert_eq!(
            strict.evaluate_command("git push origin main").decision,
            ApprovalDecision::RequireUser
        );
    }

    #[test]
    fn test_detailed_safe_plan_auto_approves() {
        let result = engine().evaluate_plan(DETAILED_PLAN, "Implement the parser");
        assert_eq!(result.decision, ApprovalDecision::AutoApprove);
        assert!(result.checks_failed.is_empty());
        assert_eq!(result.checks_passed.len(), 6);
    }

    #[test]
    fn test_plan_exactly_at_threshold_auto_approves() {
        let plan = "x".repeat(100);
        let result = engine().evaluate_plan(&plan, "Build module");
        assert_eq!(result.decision, ApprovalDecision::AutoApprove);

        let short = "x".repeat(99);
        let result = engine().evaluate_plan(&short, "Build module");
        assert_eq!(result.decision, ApprovalDecision::RequireUser);
        assert_eq!(result.checks_failed, vec!["Plan too short/ambiguous"]);
    }

    #[test]
    fn test_short_task_name_requires_user() {
        let result = engine().evaluate_plan(DETAILED_PLAN, "fix");
        assert_eq!(result.decision, ApprovalDecision::RequireUser);
        assert_eq!(result.checks_failed, vec!["Task name ambiguous"]);
    }

    #[test]
    fn test_plan_checks_are_not_short_circuited() {
        let plan = format!("{}\nThen rm -rf / and npm publish, reading /etc/shadow.", DETAILED_PLAN);
        let result = engine().evaluate_plan(&plan, "abc");

        assert_eq!(result.decision, ApprovalDecision::Forbidden);
        assert_eq!(result.risk_level, RiskLevel::High);
        // name, destructive, external, sensitive all reported
        assert_eq!(result.checks_failed.len(), 4);
        assert!(result.checks_failed.iter().any(|c| c.starts_with("External impact")));
        assert!(result.checks_failed.iter().any(|c| c.starts_with("Sensitive path")));
    }

    #[test]
    fn test_external_plan_requires_user_over_other_failures() {
        let plan = format!("{}\nFinally deploy to production.", DETAILED_PLAN);
        let result = engine().evaluate_plan(&plan, "Ship release");
        assert_eq!(result.decision, ApprovalDecision::RequireUser);
        assert!(result.reason.contains("external impact"));
    }

    #[test]
    fn test_reversibility_check_always_passes() {
        let with_git = format!("{}\nCommit the change with git.", DETAILED_PLAN);
        let result = engine().evaluate_plan(&with_git, "Implement the parser");
        assert!(result.checks_passed.contains(&"Version control mentioned".to_string()));

        let result = engine().evaluate_plan(DETAILED_PLAN, "Implement the parser");
        assert!(result.checks_passed.iter().any(|c| c.starts_with("Standard action")));
    }

    #[test]
    fn test_manual_override_result() {
        let result = ApprovalResult::manual_override();
        assert!(result.is_approved());
        assert_eq!(result.checks_passed, vec!["Manual override"]);
    }

    #[test]
    fn test_result_serializes_decision_text() {
        let result = engine().evaluate_command("ls");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["decision"], "AUTO_APPROVE");
        assert_eq!(json["risk_level"], "low");
    }
}
