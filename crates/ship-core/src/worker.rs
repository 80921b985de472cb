use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use ship_store::{StateStore, Task, TaskStatus};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::llm::LlmClient;
use crate::prompts::worker_prompt;
use crate::queue::WorkerInbox;
use crate::tags;

/// Parsed outcome of a worker's structured reply.
struct WorkerOutput {
    done: bool,
    summary: String,
    followups: Vec<String>,
}

fn parse_worker_output(text: &str) -> WorkerOutput {
    let status = tags::find_tag(text, "status").unwrap_or_else(|| "done".to_owned());
    let summary = tags::find_tag(text, "summary").unwrap_or_default();
    // Only scan for <task> inside <followups>, so a stray <task> the
    // model echoes elsewhere (e.g. quoting the prompt) isn't picked up.
    let followups = tags::find_tag(text, "followups").map(|block| tags::find_all_tags(&block, "task")).unwrap_or_default();
    WorkerOutput {
        done: status != "partial",
        summary,
        followups,
    }
}

async fn git_head(cwd: &Path) -> String {
    let output = Command::new("git").arg("rev-parse").arg("HEAD").current_dir(cwd).output().await;
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_owned(),
        _ => String::new(),
    }
}

/// Compact `N files, +X/-Y` summary of everything changed since
/// `old_head`. Empty string if there is no prior head or git fails --
/// git is an optional convenience here, never a hard dependency.
async fn git_diff_stat(cwd: &Path, old_head: &str) -> String {
    if old_head.is_empty() {
        return String::new();
    }
    let output = Command::new("git")
        .arg("diff")
        .arg("--shortstat")
        .arg(old_head)
        .current_dir(cwd)
        .output()
        .await;
    let Ok(out) = output else {
        return String::new();
    };
    let text = String::from_utf8_lossy(&out.stdout);
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }

    let digits_before = |needle: &str| -> String {
        text.find(needle)
            .and_then(|pos| text[..pos].trim_end().rsplit(' ').next())
            .unwrap_or("0")
            .to_owned()
    };
    let files = digits_before(" file");
    let insertions = digits_before(" insertion");
    let deletions = digits_before(" deletion");
    format!("{files} files, +{insertions}/-{deletions}")
}

fn append_log_line(path: &Path, line: &str) {
    let result = std::fs::OpenOptions::new().create(true).append(true).open(path).and_then(|mut f| writeln!(f, "{line}"));
    if let Err(e) = result {
        tracing::debug!("failed to append to {}: {e}", path.display());
    }
}

/// Long-lived actor executing tasks pulled from one [`WorkerInbox`].
pub struct Worker {
    id: String,
    llm: Arc<dyn LlmClient>,
    state: Arc<StateStore>,
    data_dir: PathBuf,
    project_context: String,
    override_prompt: String,
    task_timeout: Duration,
    on_complete: tokio::sync::mpsc::Sender<Task>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        state: Arc<StateStore>,
        data_dir: PathBuf,
        project_context: String,
        override_prompt: String,
        task_timeout: Duration,
        on_complete: tokio::sync::mpsc::Sender<Task>,
    ) -> Self {
        Self {
            id: id.into(),
            llm,
            state,
            data_dir,
            project_context,
            override_prompt,
            task_timeout,
            on_complete,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn run(&self, inbox: &mut WorkerInbox, cancel: CancellationToken) {
        tracing::info!("{} starting", self.id);
        loop {
            let task = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                task = inbox.recv() => task,
            };
            let Some(task) = task else { break };
            self.execute(task).await;
        }
        tracing::info!("{} stopping", self.id);
    }

    async fn execute(&self, task: Task) {
        let short_desc: String = task.description.chars().take(60).collect();
        tracing::debug!("[{}] {short_desc}", self.id);

        if let Err(e) = self.state.update_task(task.id, TaskStatus::Running, None, None, None, None, None).await {
            tracing::error!("[{}] failed to mark task running: {e}", self.id);
            return;
        }

        let head_before = git_head(&self.data_dir).await;
        let progress_log: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let progress_log_for_cb = Arc::clone(&progress_log);
        let worker_id = self.id.clone();
        let on_progress = move |msg: &str| {
            tracing::debug!("[{worker_id}] {msg}");
            progress_log_for_cb.lock().unwrap().push(msg.to_owned());
        };

        let prompt = worker_prompt(
            &self.project_context,
            &self.override_prompt,
            self.task_timeout.as_secs() / 60,
            &task.description,
            &self.data_dir.join("PLAN.md").display().to_string(),
            &self.data_dir.join("LOG.md").display().to_string(),
        );

        let outcome = self.llm.execute(&prompt, self.task_timeout, Some(&on_progress)).await;

        match outcome {
            Ok((result, session_id)) => self.record_success(task, &result, session_id, head_before).await,
            Err(e) => {
                let partial = e.partial().map(str::to_owned);
                let fallback = partial.clone().unwrap_or_else(|| {
                    let log = progress_log.lock().unwrap();
                    if log.is_empty() {
                        String::new()
                    } else {
                        let tail: Vec<&String> = log.iter().rev().take(10).collect();
                        let mut lines: Vec<String> = tail.into_iter().map(|p| format!("- {p}")).collect();
                        lines.reverse();
                        format!("progress before failure:\n{}", lines.join("\n"))
                    }
                });
                self.record_failure(task, e.to_string(), fallback).await;
            }
        }
    }

    async fn record_success(&self, task: Task, result: &str, session_id: String, head_before: String) {
        let parsed = parse_worker_output(result);

        if !parsed.done {
            if let Err(e) = self
                .state
                .update_task(
                    task.id,
                    TaskStatus::Failed,
                    Some("worker reported partial"),
                    Some(result),
                    None,
                    None,
                    Some(parsed.followups),
                )
                .await
            {
                tracing::error!("[{}] failed to record partial result: {e}", self.id);
            }
            append_log_line(&self.data_dir.join("LOG.md"), &format!("- partial: {}", task.description));
            return;
        }

        if let Err(e) = self
            .state
            .update_task(task.id, TaskStatus::Completed, None, Some(result), Some(&parsed.summary), Some(&session_id), None)
            .await
        {
            tracing::error!("[{}] failed to record completion: {e}", self.id);
            return;
        }

        if let Some(mut completed) = self.state.get_task(task.id).await {
            completed.result = result.to_owned();
            let _ = self.on_complete.send(completed).await;
        }

        let git_summary = git_diff_stat(&self.data_dir, &head_before).await;
        let label = if parsed.summary.is_empty() { &task.description } else { &parsed.summary };
        let suffix = if git_summary.is_empty() { String::new() } else { format!(" ({git_summary})") };
        append_log_line(&self.data_dir.join("LOG.md"), &format!("- done: {label}{suffix}"));
    }

    async fn record_failure(&self, task: Task, error_msg: String, result_text: String) {
        let parsed = parse_worker_output(&result_text);
        let followups = if parsed.followups.is_empty() { None } else { Some(parsed.followups) };
        if let Err(e) = self
            .state
            .update_task(task.id, TaskStatus::Failed, Some(&error_msg), Some(&result_text), None, None, followups)
            .await
        {
            tracing::error!("[{}] failed to record failure: {e}", self.id);
        }
        tracing::warn!("[{}] failed: {}: {error_msg}", self.id, task.description);
    }
}
