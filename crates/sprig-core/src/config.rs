//! Configuration management for sprig
//!
//! One `SprigConfig` is built at process start and handed to every
//! component. Nothing below the binary reads the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Result, SprigError};

const CONFIG_DIR: &str = ".sprig";
const CONFIG_FILE: &str = "config.toml";

/// Project-level sprig configuration
///
/// Loaded from `.sprig/config.toml` in the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprigConfig {
    /// Project root every relative path is resolved against
    #[serde(skip)]
    pub project_root: PathBuf,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub verifier: VerifierConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub applier: ApplierConfig,

    #[serde(default)]
    pub reasoning: ReasoningConfig,
}

/// Where the supervisor finds and keeps its documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// The active backlog document
    #[serde(default = "default_active_document")]
    pub active_document: String,

    /// Directory holding queued sprint documents
    #[serde(default = "default_queue_dir")]
    pub queue_dir: String,

    /// Only queue files starting with this prefix are considered
    #[serde(default = "default_queue_prefix")]
    pub queue_prefix: String,

    /// Manual approval flag file
    #[serde(default = "default_approval_flag")]
    pub approval_flag: String,

    /// Where the most recent plan is archived
    #[serde(default = "default_last_plan")]
    pub last_plan: String,

    /// Markdown coding standards consulted while planning
    #[serde(default = "default_standards_dir")]
    pub standards_dir: String,
}

/// Control loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Verification failures tolerated per task before ERROR_HALT
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Sleep while idling in WAITING_USER / ERROR_HALT
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Pause after a completed task
    #[serde(default = "default_task_delay_secs")]
    pub task_delay_secs: u64,

    /// Delete the approval flag after it has been honoured once
    #[serde(default = "default_true")]
    pub consume_approval_flag: bool,
}

/// Verification command discovery and execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Lines in shell fences starting with one of these are executed
    #[serde(default = "default_command_prefixes")]
    pub command_prefixes: Vec<String>,

    #[serde(default = "default_verify_timeout_secs")]
    pub timeout_secs: u64,

    /// How much of stdout/stderr is kept for the healing context
    #[serde(default = "default_output_tail_chars")]
    pub output_tail_chars: usize,

    /// Working directory for verification commands, relative to the project root
    #[serde(default = "default_working_dir")]
    pub working_dir: String,

    /// Marker files that trigger informational smoke checks
    #[serde(default = "default_smoke_markers")]
    pub smoke_markers: Vec<SmokeMarker>,
}

/// Informational project check keyed on a marker file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmokeMarker {
    /// Marker path relative to the project root
    pub path: String,

    /// Optional command run from the marker's directory
    #[serde(default)]
    pub command: Option<String>,
}

/// Policy rule tables. Order matters: first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Case-insensitive regexes that are always forbidden
    #[serde(default = "default_destructive_patterns")]
    pub destructive_patterns: Vec<String>,

    /// Case-insensitive regexes that need a human
    #[serde(default = "default_external_patterns")]
    pub external_patterns: Vec<String>,

    /// Literal substrings that are always forbidden
    #[serde(default = "default_sensitive_paths")]
    pub sensitive_paths: Vec<String>,

    #[serde(default = "default_min_task_name_len")]
    pub min_task_name_len: usize,

    #[serde(default = "default_min_plan_len")]
    pub min_plan_len: usize,

    #[serde(default = "default_reversibility_keywords")]
    pub reversibility_keywords: Vec<String>,
}

/// Order in which the change applier looks for a target path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathResolution {
    #[default]
    FirstLineThenPreceding,
    PrecedingThenFirstLine,
    FirstLineOnly,
}

/// Change applier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplierConfig {
    #[serde(default)]
    pub path_resolution: PathResolution,

    /// Paths that are never written
    #[serde(default = "default_protected_paths")]
    pub protected_paths: Vec<String>,
}

/// Reasoning collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// When false the deterministic template planner is used
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable the binary reads the API key from
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Resolved by the binary; never serialized
    #[serde(skip)]
    pub api_key: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_standards_top_k")]
    pub standards_top_k: usize,
}

// Default value providers
fn default_active_document() -> String {
    ".sprig/current_sprint.md".to_string()
}

fn default_queue_dir() -> String {
    "docs/dev/sprints".to_string()
}

fn default_queue_prefix() -> String {
    "sprint".to_string()
}

fn default_approval_flag() -> String {
    ".sprig/approved".to_string()
}

fn default_last_plan() -> String {
    ".sprig/last_plan.md".to_string()
}

fn default_standards_dir() -> String {
    "docs/standards".to_string()
}

fn default_max_retries() -> usize {
    3
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_task_delay_secs() -> u64 {
    2
}

fn default_true() -> bool {
    true
}

fn default_command_prefixes() -> Vec<String> {
    [
        "uv run",
        "python verify",
        "npm test",
        "npm run test",
        "./verify",
        "cargo test",
        "cargo build",
        "cargo check",
        "pytest",
        "make test",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_verify_timeout_secs() -> u64 {
    300
}

fn default_output_tail_chars() -> usize {
    2000
}

fn default_working_dir() -> String {
    ".".to_string()
}

fn default_smoke_markers() -> Vec<SmokeMarker> {
    vec![
        SmokeMarker {
            path: "platformio.ini".to_string(),
            command: Some("pio run --list-targets".to_string()),
        },
        SmokeMarker {
            path: "package.json".to_string(),
            command: None,
        },
        SmokeMarker {
            path: "Cargo.toml".to_string(),
            command: None,
        },
    ]
}

fn default_destructive_patterns() -> Vec<String> {
    [
        r"rm\s+-rf\s+/",
        r"DROP\s+TABLE",
        r"DELETE\s+FROM.*WHERE\s+1=1",
        r"truncate\s+table",
        r"mkfs\.",
        r"dd\s+if=",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_external_patterns() -> Vec<String> {
    [
        r"npm\s+publish",
        r"cargo\s+publish",
        r"docker\s+push",
        r"kubectl\s+apply",
        r"terraform\s+apply",
        r"curl.*POST.*api",
        r"send.*email",
        r"deploy\s+to\s+production",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_sensitive_paths() -> Vec<String> {
    [
        "/etc/passwd",
        "/etc/shadow",
        "~/.ssh/id_rsa",
        "~/.ssh/id_dsa",
        "~/.aws/credentials",
        "/root/",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_min_task_name_len() -> usize {
    6
}

fn default_min_plan_len() -> usize {
    100
}

fn default_reversibility_keywords() -> Vec<String> {
    vec!["git".to_string(), "commit".to_string(), "version".to_string()]
}

fn default_protected_paths() -> Vec<String> {
    vec![
        ".git".to_string(),
        ".env".to_string(),
        ".secrets".to_string(),
    ]
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> usize {
    8000
}

fn default_standards_top_k() -> usize {
    4
}

impl SprigConfig {
    /// Defaults rooted at `project_root`
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Self::default()
        }
    }

    /// Location of the configuration file for `project_root`
    pub fn config_path(project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load configuration from `.sprig/config.toml` or use defaults
    pub fn load_or_default(project_root: &Path) -> Result<Self> {
        let config_path = Self::config_path(project_root);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Self>(&content)
                .map_err(|e| SprigError::Config(format!("Failed to parse config file: {}", e)))?
        } else {
            Self::default()
        };

        config.project_root = project_root.to_path_buf();
        Ok(config)
    }

    /// Write default configuration to `.sprig/config.toml`
    pub fn write_default(project_root: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(project_root.join(CONFIG_DIR))?;

        let config_path = Self::config_path(project_root);
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| SprigError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    /// Resolve a configured path against the project root
    pub fn resolve(&self, relative: &str) -> PathBuf {
        let trimmed = relative.trim_start_matches("./");
        self.project_root.join(trimmed)
    }

    pub fn active_document_path(&self) -> PathBuf {
        self.resolve(&self.paths.active_document)
    }

    pub fn queue_dir_path(&self) -> PathBuf {
        self.resolve(&self.paths.queue_dir)
    }

    pub fn approval_flag_path(&self) -> PathBuf {
        self.resolve(&self.paths.approval_flag)
    }

    pub fn last_plan_path(&self) -> PathBuf {
        self.resolve(&self.paths.last_plan)
    }

    pub fn standards_dir_path(&self) -> PathBuf {
        self.resolve(&self.paths.standards_dir)
    }

    pub fn verify_working_dir(&self) -> PathBuf {
        self.resolve(&self.verifier.working_dir)
    }
}

impl Default for SprigConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            paths: PathsConfig::default(),
            supervisor: SupervisorConfig::default(),
            verifier: VerifierConfig::default(),
            policy: PolicyConfig::default(),
            applier: ApplierConfig::default(),
            reasoning: ReasoningConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            active_document: default_active_document(),
            queue_dir: default_queue_dir(),
            queue_prefix: default_queue_prefix(),
            approval_flag: default_approval_flag(),
            last_plan: default_last_plan(),
            standards_dir: default_standards_dir(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            poll_interval_secs: default_poll_interval_secs(),
            task_delay_secs: default_task_delay_secs(),
            consume_approval_flag: true,
        }
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            command_prefixes: default_command_prefixes(),
            timeout_secs: default_verify_timeout_secs(),
            output_tail_chars: default_output_tail_chars(),
            working_dir: default_working_dir(),
            smoke_markers: default_smoke_markers(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            destructive_patterns: default_destructive_patterns(),
            external_patterns: default_external_patterns(),
            sensitive_paths: default_sensitive_paths(),
            min_task_name_len: default_min_task_name_len(),
            min_plan_len: default_min_plan_len(),
            reversibility_keywords: default_reversibility_keywords(),
        }
    }
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            path_resolution: PathResolution::default(),
            protected_paths: default_protected_paths(),
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_model(),
            api_key_env: default_api_key_env(),
            api_key: None,
            max_tokens: default_max_tokens(),
            standards_top_k: default_standards_top_k(),
        }
    }
}
