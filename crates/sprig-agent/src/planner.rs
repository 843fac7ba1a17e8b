//! Plan generation
//!
//! With a reasoning client the plan is drafted by the model from the task,
//! the sprint context, retrieved coding standards and, when healing, the
//! previous failure. Without one a fixed four-step template is produced so
//! the loop runs end to end offline.

use chrono::Utc;
use sprig_core::fail_open::fail_open_sync;
use sprig_core::{BacklogDocument, SprigConfig, Task};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::client::ReasoningClient;
use crate::retrieval::{NoRetrieval, Retriever};

const SYSTEM_PROMPT: &str = "You are a senior developer writing implementation plans for an \
automated build loop. Plans are executed and verified by machines: be concrete, name every \
file by its full path relative to the project root, and make every step verifiable with a \
shell command.";

const NO_STANDARDS: &str = "(No specific standards found - using general best practices)";

/// Inputs for one plan
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub task: &'a Task,
    pub document: &'a BacklogDocument,
    /// Failure context from the previous attempt (healing)
    pub prior_error: Option<&'a str>,
}

/// Deterministic plan used when no reasoning backend is configured
pub fn template_plan(task_name: &str, document: &BacklogDocument) -> String {
    format!(
        "# Implementation Plan: {}\n\n\
         ## Steps\n\
         1. Analyze task requirements\n\
         2. Identify files to modify/create\n\
         3. Execute modifications using appropriate tools\n\
         4. Verify the changes\n\n\
         ## Context\n\
         Sprint: {}\n\
         Objective: {}\n",
        task_name, document.name, document.objective
    )
}

/// Split a `<thought>...</thought>` preamble from the plan body
pub fn split_thought(response: &str) -> (Option<String>, String) {
    match response.rfind("</thought>") {
        Some(end) => {
            let thought = response[..end].replace("<thought>", "").trim().to_string();
            let plan = response[end + "</thought>".len()..].trim().to_string();
            (Some(thought), plan)
        }
        None => (None, response.trim().to_string()),
    }
}

pub struct PlanGenerator {
    client: Option<Arc<dyn ReasoningClient>>,
    standards: Arc<dyn Retriever>,
    standards_top_k: usize,
    archive: Option<PathBuf>,
}

impl Default for PlanGenerator {
    fn default() -> Self {
        Self {
            client: None,
            standards: Arc::new(NoRetrieval),
            standards_top_k: 4,
            archive: None,
        }
    }
}

impl PlanGenerator {
    /// Template-only generator
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator archiving to the configured `last_plan` path
    pub fn from_config(config: &SprigConfig) -> Self {
        Self {
            standards_top_k: config.reasoning.standards_top_k,
            archive: Some(config.last_plan_path()),
            ..Self::default()
        }
    }

    pub fn with_client(mut self, client: Arc<dyn ReasoningClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_standards(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.standards = retriever;
        self
    }

    pub fn uses_reasoning(&self) -> bool {
        self.client.is_some()
    }

    /// Produce a plan. Never fails: a reasoning error falls back to the template.
    #[instrument(skip_all, fields(task = %request.task.name, healing = request.prior_error.is_some()))]
    pub async fn generate(&self, request: &PlanRequest<'_>) -> String {
        let Some(client) = &self.client else {
            let plan = template_plan(&request.task.name, request.document);
            self.archive(request.task, None, &plan);
            return plan;
        };

        let prompt = self.build_prompt(request);
        match client.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(response) => {
                let (thought, plan) = split_thought(&response);
                if let Some(thought) = &thought {
                    debug!("Strategic thought:\n{}", thought);
                }
                info!("Generated plan ({} chars)", plan.len());
                self.archive(request.task, thought.as_deref(), &plan);
                plan
            }
            Err(e) => {
                warn!("Reasoning failed, using template plan: {}", e);
                let plan = template_plan(&request.task.name, request.document);
                self.archive(request.task, None, &plan);
                plan
            }
        }
    }

    fn build_prompt(&self, request: &PlanRequest<'_>) -> String {
        let query = format!("{}\n{}", request.task.name, request.task.description);
        let standards = self
            .standards
            .query(&query, self.standards_top_k)
            .unwrap_or_else(|e| {
                warn!("Standards retrieval failed (fail-open): {}", e);
                String::new()
            });
        let standards = if standards.trim().is_empty() {
            NO_STANDARDS.to_string()
        } else {
            standards
        };

        let mut prompt = format!(
            "TASK: {}\nSPRINT: {}\nOBJECTIVE: {}\n",
            request.task.name, request.document.name, request.document.objective
        );
        if !request.task.description.is_empty() {
            prompt.push_str(&format!(
                "\n--- TASK DETAILS ---\n{}\n",
                request.task.description
            ));
        }
        prompt.push_str(&format!("\n--- CODING STANDARDS (Must follow) ---\n{}\n", standards));
        if let Some(error) = request.prior_error {
            prompt.push_str(&format!(
                "\nPREVIOUS ERROR (Self-Healing):\n{}\n\nPlease provide a corrective plan to fix this error.\n",
                error
            ));
        }
        prompt.push_str(
            "\nINSTRUCTIONS:\n\
             1. Briefly check the context and standards.\n\
             2. Include a `## Detailed Spec` section with the exact code structure and signatures.\n\
             3. Use full paths relative to the project root for every file.\n\
             4. Every step must be verifiable with a shell command.\n\n\
             EXPECTED FORMAT:\n\
             <thought>\n[reasoning and risks]\n</thought>\n\n\
             ### Implementation Plan\n[steps]\n",
        );
        prompt
    }

    fn archive(&self, task: &Task, thought: Option<&str>, plan: &str) {
        let Some(path) = &self.archive else {
            return;
        };
        let content = format!(
            "<!-- {} | {} -->\n# Strategic Thought\n{}\n\n# Plan\n{}\n",
            task.name,
            Utc::now().to_rfc3339(),
            thought.unwrap_or("No strategic thought found"),
            plan
        );
        fail_open_sync("plan archive", || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ScriptedClient;
    use crate::retrieval::StandardsLibrary;
    use sprig_core::{SprigError, SprintStatus};

    fn document() -> BacklogDocument {
        BacklogDocument {
            name: "Sprint 3 Radio".to_string(),
            objective: "Send telemetry".to_string(),
            status: SprintStatus::Planning,
            tasks: vec![Task::new("Write `src/radio.rs`", false).with_description("Use tracing.")],
        }
    }

    #[tokio::test]
    async fn test_template_without_client() {
        let doc = document();
        let generator = PlanGenerator::new();
        assert!(!generator.uses_reasoning());

        let plan = generator
            .generate(&PlanRequest {
                task: &doc.tasks[0],
                document: &doc,
                prior_error: None,
            })
            .await;

        assert!(plan.starts_with("# Implementation Plan: Write `src/radio.rs`"));
        assert!(plan.contains("1. Analyze task requirements"));
        assert!(plan.contains("4. Verify the changes"));
        assert!(plan.contains("Sprint: Sprint 3 Radio"));
        assert!(plan.contains("Objective: Send telemetry"));
        assert!(plan.len() >= 100);
    }

    #[test]
    fn test_split_thought() {
        let (thought, plan) = split_thought("<thought>\nrisky\n</thought>\n\n### Plan\n1. do");
        assert_eq!(thought.as_deref(), Some("risky"));
        assert_eq!(plan, "### Plan\n1. do");

        let (thought, plan) = split_thought("  just a plan \n");
        assert!(thought.is_none());
        assert_eq!(plan, "just a plan");
    }

    #[tokio::test]
    async fn test_reasoning_prompt_includes_context_and_error() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("logging.md"),
            "## Logging\nAlways use tracing spans.\n",
        )
        .unwrap();

        let doc = document();
        let client = ScriptedClient::new().with_reply("<thought>ok</thought>\n### Implementation Plan\n1. fix");
        let generator = PlanGenerator::new()
            .with_client(Arc::new(client.clone()))
            .with_standards(Arc::new(StandardsLibrary::new(dir.path())));

        let plan = generator
            .generate(&PlanRequest {
                task: &doc.tasks[0],
                document: &doc,
                prior_error: Some("cargo test failed: missing module radio"),
            })
            .await;

        assert_eq!(plan, "### Implementation Plan\n1. fix");
        let prompts = client.prompts();
        let user = &prompts[0].1;
        assert!(user.contains("TASK: Write `src/radio.rs`"));
        assert!(user.contains("OBJECTIVE: Send telemetry"));
        assert!(user.contains("Always use tracing spans."));
        assert!(user.contains("PREVIOUS ERROR (Self-Healing):\ncargo test failed: missing module radio"));
    }

    #[tokio::test]
    async fn test_reasoning_failure_falls_back_to_template() {
        let doc = document();
        let client = ScriptedClient::new().with_error(SprigError::Reasoning("503".to_string()));
        let generator = PlanGenerator::new().with_client(Arc::new(client));

        let plan = generator
            .generate(&PlanRequest {
                task: &doc.tasks[0],
                document: &doc,
                prior_error: None,
            })
            .await;
        assert_eq!(plan, template_plan(&doc.tasks[0].name, &doc));
    }

    #[tokio::test]
    async fn test_plan_is_archived() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = SprigConfig::new(dir.path());
        let doc = document();
        let client = ScriptedClient::new().with_reply("<thought>because</thought>the plan");
        let generator = PlanGenerator::from_config(&config).with_client(Arc::new(client));

        generator
            .generate(&PlanRequest {
                task: &doc.tasks[0],
                document: &doc,
                prior_error: None,
            })
            .await;

        let archived = std::fs::read_to_string(config.last_plan_path()).unwrap();
        assert!(archived.contains("# Strategic Thought\nbecause"));
        assert!(archived.contains("# Plan\nthe plan"));
    }
}
