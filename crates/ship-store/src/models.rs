use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ---------------------------------------------------------------------------

/// How the planner intends the generated tasks to be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Parallel,
    Sequential,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
        };
        f.write_str(s)
    }
}

impl FromStr for ExecutionMode {
    type Err = std::convert::Infallible;

    /// Unlike [`TaskStatus`], an unrecognized mode string is not an error --
    /// the planner normalizes any unknown value to `parallel` rather than
    /// rejecting the planner's output over a single bad attribute.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "sequential" => Self::Sequential,
            _ => Self::Parallel,
        })
    }
}

/// Identifies which worker a task is pinned to, or `auto` for any worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerPin(pub String);

impl WorkerPin {
    pub const AUTO: &'static str = "auto";

    pub fn auto() -> Self {
        Self(Self::AUTO.to_owned())
    }

    pub fn is_auto(&self) -> bool {
        self.0 == Self::AUTO
    }
}

impl Default for WorkerPin {
    fn default() -> Self {
        Self::auto()
    }
}

impl fmt::Display for WorkerPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The prefix `cascade_failure` stamps on a task's `error` field. A task
/// whose error carries this prefix is never retried.
pub const CASCADE_PREFIX: &str = "cascade:";

/// A single unit of coding work handed to the LLM CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub depends_on: Vec<Uuid>,
    #[serde(default = "WorkerPin::auto")]
    pub worker: WorkerPin,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub followups: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A fresh pending task with a newly-generated id, as produced by the
    /// Planner, Refiner, Replanner, or Verifier.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            status: TaskStatus::Pending,
            depends_on: Vec::new(),
            worker: WorkerPin::auto(),
            retries: 0,
            error: String::new(),
            result: String::new(),
            summary: String::new(),
            session_id: String::new(),
            followups: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_worker(mut self, worker: WorkerPin) -> Self {
        self.worker = worker;
        self
    }

    pub fn is_cascaded(&self) -> bool {
        self.error.starts_with(CASCADE_PREFIX)
    }
}

/// Singleton per-run record tracking the overall goal and its progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkState {
    pub design_file: String,
    pub goal_text: String,
    pub spec_hash: String,
    #[serde(default)]
    pub project_context: String,
    #[serde(default = "default_execution_mode")]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub override_prompt: String,
    #[serde(default)]
    pub is_complete: bool,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

fn default_execution_mode() -> ExecutionMode {
    ExecutionMode::Parallel
}

impl WorkState {
    pub fn new(design_file: impl Into<String>, goal_text: impl Into<String>, spec_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            design_file: design_file.into(),
            goal_text: goal_text.into(),
            spec_hash: spec_hash.into(),
            project_context: String::new(),
            execution_mode: ExecutionMode::Parallel,
            override_prompt: String::new(),
            is_complete: false,
            started_at: now,
            last_updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_display_roundtrip() {
        let variants = [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: TaskStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn task_status_invalid() {
        assert!("bogus".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn execution_mode_unknown_normalizes_to_parallel() {
        assert_eq!("sequential".parse::<ExecutionMode>().unwrap(), ExecutionMode::Sequential);
        assert_eq!("parallel".parse::<ExecutionMode>().unwrap(), ExecutionMode::Parallel);
        assert_eq!("garbage".parse::<ExecutionMode>().unwrap(), ExecutionMode::Parallel);
    }

    #[test]
    fn worker_pin_default_is_auto() {
        assert!(WorkerPin::default().is_auto());
        assert!(!WorkerPin("w0".to_owned()).is_auto());
    }

    #[test]
    fn new_task_is_pending_with_no_dependencies() {
        let t = Task::new("do the thing");
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.depends_on.is_empty());
        assert_eq!(t.retries, 0);
        assert!(!t.is_cascaded());
    }

    #[test]
    fn cascaded_task_detected_by_error_prefix() {
        let mut t = Task::new("x");
        t.error = format!("{CASCADE_PREFIX} dependency failed");
        assert!(t.is_cascaded());
    }
}
