use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use uuid::Uuid;

use super::error::LlmError;
use super::{LlmClient, ProgressCallback};
use crate::tags;

/// Tools the agent is allowed to use without per-call confirmation.
/// Mirrors the always-available dev toolbelt a coding agent needs to
/// make progress unattended.
const DEFAULT_ALLOWED_TOOLS: &[&str] = &["Bash", "Read", "Edit", "Write", "Glob", "Grep"];

#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub binary: String,
    pub model: String,
    pub permission_mode: String,
    pub max_turns: Option<u32>,
    pub allowed_tools: Vec<String>,
    pub cwd: PathBuf,
    /// Identifies this client in trace records, e.g. `"worker-w0"`,
    /// `"judge"`, `"planner"`.
    pub role: String,
    /// Appended with one NDJSON record per call. `None` disables tracing.
    pub trace_path: Option<PathBuf>,
}

impl ClaudeConfig {
    pub fn new(role: impl Into<String>, cwd: PathBuf) -> Self {
        Self {
            binary: "claude".to_owned(),
            model: "sonnet".to_owned(),
            permission_mode: "bypassPermissions".to_owned(),
            max_turns: None,
            allowed_tools: DEFAULT_ALLOWED_TOOLS.iter().map(|s| s.to_string()).collect(),
            cwd,
            role: role.into(),
            trace_path: None,
        }
    }

    pub fn with_max_turns(mut self, max_turns: Option<u32>) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_trace_path(mut self, path: Option<PathBuf>) -> Self {
        self.trace_path = path;
        self
    }
}

/// [`LlmClient`] backed by the `claude` CLI in `stream-json` output mode.
pub struct ClaudeCodeLlm {
    cfg: ClaudeConfig,
}

impl ClaudeCodeLlm {
    pub fn new(cfg: ClaudeConfig) -> Self {
        Self { cfg }
    }

    fn build_command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.cfg.binary);
        cmd.arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--model")
            .arg(&self.cfg.model)
            .arg("--permission-mode")
            .arg(&self.cfg.permission_mode);

        if let Some(max_turns) = self.cfg.max_turns {
            cmd.arg("--max-turns").arg(max_turns.to_string());
        }
        if !self.cfg.allowed_tools.is_empty() {
            cmd.arg("--allowedTools").arg(self.cfg.allowed_tools.join(","));
        }

        cmd.current_dir(&self.cfg.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Run in its own process group so a timeout can kill the CLI
        // and any child processes it spawned, not just the CLI itself.
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        cmd
    }

    fn trace(&self, prompt_len: usize, response_len: usize, timeout: Duration, ok: bool) {
        let Some(path) = &self.cfg.trace_path else {
            return;
        };
        let record = serde_json::json!({
            "ts": Utc::now().to_rfc3339(),
            "role": self.cfg.role,
            "model": self.cfg.model,
            "prompt_len": prompt_len,
            "response_len": response_len,
            "timeout": timeout.as_secs(),
            "ok": ok,
        });
        if let Ok(mut line) = serde_json::to_string(&record) {
            line.push('\n');
            if let Err(e) = append_line(path, &line) {
                tracing::debug!("trace write failed: {e}");
            }
        }
    }
}

fn append_line(path: &std::path::Path, line: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}

/// Accumulated state while reading the event stream.
#[derive(Default)]
struct StreamOutcome {
    result: Option<String>,
    session_id: Option<String>,
    subtype: Option<String>,
    last_assistant_text: String,
}

fn classify_line(line: &str, outcome: &mut StreamOutcome, on_progress: Option<ProgressCallback<'_>>) {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return;
    };
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return;
    };

    match kind {
        "assistant" => {
            let Some(blocks) = value
                .pointer("/message/content")
                .and_then(Value::as_array)
            else {
                return;
            };
            for block in blocks {
                if block.get("type").and_then(Value::as_str) == Some("text") {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        outcome.last_assistant_text = text.to_owned();
                        if let Some(cb) = on_progress {
                            for marker in tags::find_all_tags(text, "progress") {
                                cb(&marker);
                            }
                        }
                    }
                }
            }
        }
        "result" => {
            if let Some(result) = value.get("result").and_then(Value::as_str) {
                outcome.result = Some(result.to_owned());
            }
            if let Some(session_id) = value.get("session_id").and_then(Value::as_str) {
                outcome.session_id = Some(session_id.to_owned());
            }
            if let Some(subtype) = value.get("subtype").and_then(Value::as_str) {
                outcome.subtype = Some(subtype.to_owned());
            }
        }
        other => {
            tracing::debug!("ignoring unhandled claude event type: {other}");
        }
    }
}

async fn read_events(
    child: &mut Child,
    on_progress: Option<ProgressCallback<'_>>,
) -> std::io::Result<StreamOutcome> {
    let stdout = child.stdout.take().expect("stdout piped");
    let mut lines = BufReader::new(stdout).lines();
    let mut outcome = StreamOutcome::default();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        classify_line(&line, &mut outcome, on_progress);
    }

    Ok(outcome)
}

/// Send SIGTERM to the whole process group, wait up to
/// [`crate::limits::PROCESS_KILL_GRACE`], then SIGKILL if still alive.
#[cfg(unix)]
async fn kill_process_group(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let pgid = pid as libc::pid_t;
    unsafe {
        libc::kill(-pgid, libc::SIGTERM);
    }

    let grace = tokio::time::timeout(crate::limits::PROCESS_KILL_GRACE, child.wait()).await;
    if grace.is_err() {
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
        let _ = child.wait().await;
    }
}

#[cfg(not(unix))]
async fn kill_process_group(child: &mut Child) {
    let _ = child.kill().await;
}

#[async_trait]
impl LlmClient for ClaudeCodeLlm {
    async fn execute(
        &self,
        prompt: &str,
        timeout: Duration,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<(String, String), LlmError> {
        let mut child = self.build_command(prompt).spawn().map_err(LlmError::Spawn)?;

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = BufReader::new(stderr).read_to_string(&mut buf).await;
                buf
            })
        });

        let read = tokio::time::timeout(timeout, read_events(&mut child, on_progress)).await;

        let outcome = match read {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_io_err)) => {
                kill_process_group(&mut child).await;
                StreamOutcome::default()
            }
            Err(_elapsed) => {
                kill_process_group(&mut child).await;
                let partial = None;
                self.trace(prompt.len(), 0, timeout, false);
                return Err(LlmError::Timeout {
                    seconds: timeout.as_secs(),
                    partial,
                    session_id: None,
                });
            }
        };

        let status = child.wait().await.ok();
        let stderr_text = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        let session_id = outcome.session_id.clone().or_else(|| Some(Uuid::new_v4().to_string()));
        let partial = if outcome.last_assistant_text.is_empty() {
            None
        } else {
            Some(outcome.last_assistant_text.clone())
        };

        if outcome.subtype.as_deref() == Some("error_max_turns") {
            self.trace(prompt.len(), 0, timeout, false);
            return Err(LlmError::MaxTurns {
                partial: outcome.result.or(partial),
                session_id,
            });
        }

        if let Some(status) = status {
            if !status.success() {
                let code = status.code().unwrap_or(-1);
                self.trace(prompt.len(), 0, timeout, false);
                let stderr_trimmed = stderr_text.trim();
                let detail = if !stderr_trimmed.is_empty() {
                    stderr_trimmed.to_owned()
                } else {
                    outcome.result.clone().unwrap_or_else(|| "no output".to_owned())
                };
                return Err(LlmError::ExitFailure {
                    code,
                    detail,
                    partial: outcome.result.or(partial),
                    session_id,
                });
            }
        }

        let Some(result) = outcome.result.filter(|r| !r.is_empty()) else {
            self.trace(prompt.len(), 0, timeout, false);
            return Err(LlmError::EmptyOutput { partial, session_id });
        };

        self.trace(prompt.len(), result.len(), timeout, true);
        Ok((result, session_id.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_assistant_text_extracts_progress_markers() {
        let line = serde_json::json!({
            "type": "assistant",
            "message": {
                "content": [
                    {"type": "text", "text": "working on it <progress>half done</progress>"}
                ]
            }
        })
        .to_string();

        let mut outcome = StreamOutcome::default();
        let seen = std::sync::Mutex::new(Vec::new());
        let cb = |m: &str| seen.lock().unwrap().push(m.to_owned());
        classify_line(&line, &mut outcome, Some(&cb));
        assert_eq!(seen.into_inner().unwrap(), vec!["half done"]);
    }

    #[test]
    fn classify_result_extracts_session_and_subtype() {
        let line = serde_json::json!({
            "type": "result",
            "result": "final text",
            "session_id": "abc123",
            "subtype": "error_max_turns",
        })
        .to_string();

        let mut outcome = StreamOutcome::default();
        classify_line(&line, &mut outcome, None);
        assert_eq!(outcome.result.as_deref(), Some("final text"));
        assert_eq!(outcome.session_id.as_deref(), Some("abc123"));
        assert_eq!(outcome.subtype.as_deref(), Some("error_max_turns"));
    }

    #[test]
    fn classify_line_ignores_unknown_type() {
        let mut outcome = StreamOutcome::default();
        classify_line(r#"{"type":"tool_use","name":"Bash"}"#, &mut outcome, None);
        assert!(outcome.result.is_none());
    }

    #[test]
    fn classify_line_ignores_malformed_json() {
        let mut outcome = StreamOutcome::default();
        classify_line("not json", &mut outcome, None);
        assert!(outcome.result.is_none());
    }
}
