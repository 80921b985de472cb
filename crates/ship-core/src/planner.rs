use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ship_store::{ExecutionMode, StateStore, StoreError, Task, WorkerPin};

use crate::llm::LlmClient;
use crate::prompts::planner_prompt;
use crate::tags;

const TIMEOUT: Duration = Duration::from_secs(180);

/// Raised by the caller (never by [`Planner`] itself) when a planning
/// pass produces zero tasks -- a primary-role failure per the
/// fail-open rule, so it is fatal rather than silently skipped.
#[derive(Debug, thiserror::Error)]
pub enum PlanParseError {
    #[error("planner produced no tasks from the design")]
    NoTasksGenerated,
}

/// Transforms an accepted design into a dependency graph of [`Task`]s.
pub struct Planner {
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Runs the planner against the current `WorkState`'s goal text,
    /// seeds the store with the resulting tasks, and writes `PLAN.md`.
    /// Returns the empty vec if there is no work state or the LLM call
    /// fails -- a primary-role failure the caller must treat as fatal.
    pub async fn plan_once(&self, state: &StateStore, data_dir: &Path) -> Result<Vec<Task>, StoreError> {
        let Some(work) = state.get_work_state().await else {
            return Ok(Vec::new());
        };

        let plan_path = data_dir.join("PLAN.md");
        let prompt = planner_prompt(&work.goal_text, &plan_path.display().to_string(), &work.override_prompt);

        let result = match self.llm.execute(&prompt, TIMEOUT, None).await {
            Ok((text, _session_id)) => text,
            Err(e) => {
                tracing::warn!("planner llm call failed: {e}");
                return Ok(Vec::new());
            }
        };

        let (context, tasks, mode) = Self::parse(&result);

        if !context.is_empty() {
            state.set_project_context(&context).await?;
        }
        state.set_execution_mode(mode).await?;

        for task in &tasks {
            state.add_task(task.clone()).await?;
        }

        Ok(tasks)
    }

    fn parse(text: &str) -> (String, Vec<Task>, ExecutionMode) {
        let context = tags::find_tag(text, "context").unwrap_or_default();
        let mode: ExecutionMode = tags::find_tag(text, "mode")
            .unwrap_or_default()
            .to_lowercase()
            .parse()
            .unwrap_or(ExecutionMode::Parallel);

        let elements = tags::find_task_elements(text);
        let mut tasks = Vec::new();
        let mut dep_indices = Vec::new();

        for element in &elements {
            if element.body.len() <= 5 {
                continue;
            }
            let worker = tags::find_attr(&element.attrs, "worker")
                .map(WorkerPin)
                .unwrap_or_default();
            let depends = tags::find_attr(&element.attrs, "depends").unwrap_or_default();
            let indices = tags::parse_index_list(&depends);

            tasks.push(Task::new(element.body.clone()).with_worker(worker));
            dep_indices.push(indices);
        }

        for (i, indices) in dep_indices.iter().enumerate() {
            for &idx in indices {
                if idx >= 1 && idx <= tasks.len() && idx - 1 != i {
                    let dep_id = tasks[idx - 1].id;
                    tasks[i].depends_on.push(dep_id);
                }
            }
        }

        (context, tasks, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_context_mode_and_tasks_with_dependencies() {
        let text = r#"
<project>
<context>building a thing</context>
<mode>sequential</mode>
<tasks>
<task worker="auto">Create go.mod with dependencies</task>
<task worker="w1" depends="1">Implement server</task>
<task depends="1,2">Write tests for server</task>
</tasks>
</project>
"#;
        let (context, tasks, mode) = Planner::parse(text);
        assert_eq!(context, "building a thing");
        assert_eq!(mode, ExecutionMode::Sequential);
        assert_eq!(tasks.len(), 3);
        assert!(tasks[1].depends_on.contains(&tasks[0].id));
        assert!(tasks[2].depends_on.contains(&tasks[0].id));
        assert!(tasks[2].depends_on.contains(&tasks[1].id));
    }

    #[test]
    fn parse_drops_short_descriptions_and_out_of_range_deps() {
        let text = r#"<tasks><task>ok</task><task depends="99,1">Do a real task here</task></tasks>"#;
        let (_context, tasks, _mode) = Planner::parse(text);
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].depends_on.is_empty());
    }

    #[test]
    fn parse_drops_self_referential_dependency() {
        let text = r#"<tasks><task depends="1">First real task</task></tasks>"#;
        let (_context, tasks, _mode) = Planner::parse(text);
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].depends_on.is_empty());
    }

    #[test]
    fn parse_invalid_mode_normalizes_to_parallel() {
        let (_context, _tasks, mode) = Planner::parse("<mode>bogus</mode>");
        assert_eq!(mode, ExecutionMode::Parallel);
    }
}
