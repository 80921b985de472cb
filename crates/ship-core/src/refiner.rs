use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ship_store::{StateStore, Task, TaskStatus};

use crate::llm::LlmClient;
use crate::prompts::refiner_prompt;
use crate::tags;

const TIMEOUT: Duration = Duration::from_secs(300);

/// Thin shell around one codex-backed LLM call: critiques progress
/// and returns any follow-up tasks it thinks are needed.
pub struct Refiner {
    llm: Arc<dyn LlmClient>,
    project_context: String,
}

impl Refiner {
    pub fn new(llm: Arc<dyn LlmClient>, project_context: String) -> Self {
        Self { llm, project_context }
    }

    pub async fn refine(&self, state: &StateStore, data_dir: &Path) -> Vec<Task> {
        let all_tasks = state.get_all_tasks().await;
        let completed: Vec<&Task> = all_tasks.iter().filter(|t| t.status == TaskStatus::Completed).collect();
        let failed: Vec<&Task> = all_tasks.iter().filter(|t| t.status == TaskStatus::Failed).collect();

        if completed.is_empty() && failed.is_empty() {
            return Vec::new();
        }

        let progress = std::fs::read_to_string(data_dir.join("PROGRESS.md")).unwrap_or_default();
        let progress_section = if progress.is_empty() { String::new() } else { format!("PROGRESS.md (includes judge verdicts):\n{progress}") };

        let completed_summary = summarize(completed.iter().rev().take(10).rev().map(|t| format!("- [DONE] {}", t.description)));
        let failed_summary = summarize(failed.iter().rev().take(5).rev().map(|t| {
            if t.followups.is_empty() {
                format!("- [FAIL] {}: {}", t.description, t.error)
            } else {
                format!("- [FAIL] {}: {} (followups: {:?})", t.description, t.error, t.followups)
            }
        }));

        let prompt = refiner_prompt(&self.project_context, &progress_section, &completed_summary, &failed_summary);

        match self.llm.execute(&prompt, TIMEOUT, None).await {
            Ok((result, _session_id)) => {
                let tasks = parse_tasks(&result);
                for task in &tasks {
                    if let Err(e) = state.add_task(task.clone()).await {
                        tracing::warn!("refiner: failed to add task: {e}");
                    }
                }
                tasks
            }
            Err(e) => {
                tracing::warn!("refiner llm call failed: {e}");
                Vec::new()
            }
        }
    }
}

fn summarize(lines: impl Iterator<Item = String>) -> String {
    let joined: Vec<String> = lines.collect();
    if joined.is_empty() { "None".to_owned() } else { joined.join("\n") }
}

/// Shared by Refiner and Replanner: `<task>...</task>` entries longer
/// than 5 characters become fresh pending tasks.
pub fn parse_tasks(text: &str) -> Vec<Task> {
    tags::find_all_tags(text, "task")
        .into_iter()
        .filter(|desc| desc.len() > 5)
        .map(Task::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tasks_drops_short_descriptions() {
        let text = "<task>ok</task><task>retry with a different approach</task>";
        let tasks = parse_tasks(text);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "retry with a different approach");
    }

    #[test]
    fn parse_tasks_empty_block_yields_nothing() {
        assert!(parse_tasks("<tasks>\n</tasks>").is_empty());
    }
}
