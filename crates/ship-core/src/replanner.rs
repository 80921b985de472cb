use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ship_store::{StateStore, Task, TaskStatus};

use crate::llm::LlmClient;
use crate::prompts::replanner_prompt;
use crate::refiner::parse_tasks;

const TIMEOUT: Duration = Duration::from_secs(90);

/// Thin shell around one LLM call: reassesses the whole run against
/// the original goal and returns any follow-up tasks still needed.
pub struct Replanner {
    llm: Arc<dyn LlmClient>,
    project_context: String,
}

impl Replanner {
    pub fn new(llm: Arc<dyn LlmClient>, project_context: String) -> Self {
        Self { llm, project_context }
    }

    pub async fn replan(&self, state: &StateStore, data_dir: &Path) -> Vec<Task> {
        let Some(work) = state.get_work_state().await else {
            return Vec::new();
        };

        let all_tasks = state.get_all_tasks().await;
        let completed: Vec<&Task> = all_tasks.iter().filter(|t| t.status == TaskStatus::Completed).collect();
        let failed: Vec<&Task> = all_tasks.iter().filter(|t| t.status == TaskStatus::Failed).collect();

        let completed_summary = joined_or_none(completed.iter().rev().take(15).rev().map(|t| format!("- {}", t.description)));
        let failed_summary = joined_or_none(failed.iter().rev().take(5).rev().map(|t| format!("- {}: {}", t.description, t.error)));

        let progress = std::fs::read_to_string(data_dir.join("PROGRESS.md")).unwrap_or_default();
        let plan = std::fs::read_to_string(data_dir.join("PLAN.md")).unwrap_or_default();
        let progress_section = if progress.is_empty() {
            String::new()
        } else {
            format!("PROGRESS.md (includes per-task judgments):\n{}", truncate(&progress, 1500))
        };
        let plan_section = if plan.is_empty() { String::new() } else { format!("PLAN.md:\n{}", truncate(&plan, 1000)) };

        let prompt = replanner_prompt(
            &self.project_context,
            &truncate(&work.goal_text, 2000),
            &plan_section,
            &progress_section,
            &completed_summary,
            &failed_summary,
        );

        match self.llm.execute(&prompt, TIMEOUT, None).await {
            Ok((result, _session_id)) => {
                let tasks = parse_tasks(&result);
                for task in &tasks {
                    if let Err(e) = state.add_task(task.clone()).await {
                        tracing::warn!("replanner: failed to add task: {e}");
                    }
                }
                tasks
            }
            Err(e) => {
                tracing::warn!("replanner llm call failed: {e}");
                Vec::new()
            }
        }
    }
}

fn joined_or_none(lines: impl Iterator<Item = String>) -> String {
    let joined: Vec<String> = lines.collect();
    if joined.is_empty() { "None".to_owned() } else { joined.join("\n") }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
