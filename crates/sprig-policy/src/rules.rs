//! Compiled policy rule tables

use regex::{Regex, RegexBuilder};
use sprig_core::{PolicyConfig, Result, SprigError};

/// A case-insensitive pattern together with its source text
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub source: String,
    regex: Regex,
}

impl PatternRule {
    pub fn new(source: &str) -> Result<Self> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(true)
            .build()
            .map_err(|e| SprigError::Config(format!("Invalid policy pattern '{}': {}", source, e)))?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Ordered rule tables. The first matching rule of a table wins.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub destructive: Vec<PatternRule>,
    pub external: Vec<PatternRule>,
    /// Literal, case-sensitive substrings
    pub sensitive_paths: Vec<String>,
    pub reversibility_keywords: Vec<String>,
    pub min_task_name_len: usize,
    pub min_plan_len: usize,
}

impl RuleSet {
    /// Compile the tables from configuration
    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<PatternRule>> {
            patterns.iter().map(|p| PatternRule::new(p)).collect()
        };

        Ok(Self {
            destructive: compile(&config.destructive_patterns)?,
            external: compile(&config.external_patterns)?,
            sensitive_paths: config.sensitive_paths.clone(),
            reversibility_keywords: config
                .reversibility_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            min_task_name_len: config.min_task_name_len,
            min_plan_len: config.min_plan_len,
        })
    }

    pub fn first_destructive(&self, text: &str) -> Option<&PatternRule> {
        self.destructive.iter().find(|r| r.is_match(text))
    }

    pub fn first_external(&self, text: &str) -> Option<&PatternRule> {
        self.external.iter().find(|r| r.is_match(text))
    }

    pub fn first_sensitive(&self, text: &str) -> Option<&str> {
        self.sensitive_paths
            .iter()
            .find(|p| text.contains(p.as_str()))
            .map(String::as_str)
    }

    pub fn mentions_reversibility(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.reversibility_keywords
            .iter()
            .any(|k| lower.contains(k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_are_case_insensitive() {
        let rule = PatternRule::new(r"DROP\s+TABLE").unwrap();
        assert!(rule.is_match("drop table users;"));
        assert!(!rule.is_match("dropdown table"));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let config = PolicyConfig {
            destructive_patterns: vec!["(unclosed".to_string()],
            ..PolicyConfig::default()
        };
        let err = RuleSet::from_config(&config).unwrap_err();
        assert!(matches!(err, SprigError::Config(_)));
    }

    #[test]
    fn test_first_match_wins_in_table_order() {
        let config = PolicyConfig {
            external_patterns: vec![r"docker\s+push".to_string(), r"push".to_string()],
            ..PolicyConfig::default()
        };
        let rules = RuleSet::from_config(&config).unwrap();
        assert_eq!(
            rules.first_external("docker push img").unwrap().source,
            r"docker\s+push"
        );
        assert_eq!(rules.first_external("git push").unwrap().source, "push");
    }

    #[test]
    fn test_sensitive_paths_are_literal() {
        let rules = RuleSet::from_config(&PolicyConfig::default()).unwrap();
        assert_eq!(rules.first_sensitive("cat /etc/passwd"), Some("/etc/passwd"));
        assert_eq!(rules.first_sensitive("cat /etc/hosts"), None);
    }
}
