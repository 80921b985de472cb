use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::io::{read_json_if_present, write_json_atomic};
use crate::lock::DataDirLock;
use crate::models::{CASCADE_PREFIX, ExecutionMode, Task, TaskStatus, WorkState};

struct Inner {
    tasks: HashMap<Uuid, Task>,
    work: Option<WorkState>,
}

/// Durable, concurrency-safe store for [`Task`] and [`WorkState`] records.
///
/// All mutations are serialized behind one [`tokio::sync::Mutex`] and
/// flushed to disk (via write-to-tmp-then-rename, see [`crate::io`])
/// before the lock is released, so every observed state on disk is
/// either the previous complete snapshot or the new one -- never a
/// partial write. Readers get clones; nothing aliases the store's
/// internal maps.
pub struct StateStore {
    data_dir: PathBuf,
    tasks_path: PathBuf,
    work_path: PathBuf,
    inner: Mutex<Inner>,
    _lock: DataDirLock,
}

impl StateStore {
    /// Open (or create) the data directory, acquire its advisory lock,
    /// and load any existing `tasks.json` / `work.json`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir).map_err(|source| StoreError::Io {
            path: data_dir.display().to_string(),
            source,
        })?;

        let lock = DataDirLock::acquire(&data_dir)?;

        let tasks_path = data_dir.join("tasks.json");
        let work_path = data_dir.join("work.json");

        let task_list: Vec<Task> = read_json_if_present(&tasks_path)?.unwrap_or_default();
        let tasks = task_list.into_iter().map(|t| (t.id, t)).collect();
        let work: Option<WorkState> = read_json_if_present(&work_path)?;

        Ok(Self {
            data_dir,
            tasks_path,
            work_path,
            inner: Mutex::new(Inner { tasks, work }),
            _lock: lock,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn save_tasks(&self, inner: &Inner) -> Result<(), StoreError> {
        let list: Vec<&Task> = inner.tasks.values().collect();
        write_json_atomic(&self.tasks_path, &list)
    }

    fn save_work(&self, inner: &Inner) -> Result<(), StoreError> {
        if let Some(work) = &inner.work {
            write_json_atomic(&self.work_path, work)?;
        }
        Ok(())
    }

    pub async fn init_work(
        &self,
        design_file: impl Into<String>,
        goal_text: impl Into<String>,
        spec_hash: impl Into<String>,
        override_prompt: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let mut work = WorkState::new(design_file, goal_text, spec_hash);
        work.override_prompt = override_prompt.into();
        inner.work = Some(work);
        self.save_work(&inner)
    }

    pub async fn set_project_context(&self, context: impl Into<String>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(work) = inner.work.as_mut() {
            work.project_context = context.into();
        }
        self.save_work(&inner)
    }

    pub async fn set_execution_mode(&self, mode: ExecutionMode) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(work) = inner.work.as_mut() {
            work.execution_mode = mode;
        }
        self.save_work(&inner)
    }

    /// Updates the stored spec hash in place, keeping the rest of the
    /// work state (and every task) untouched. Used when a changed spec
    /// is judged to still match the existing plan.
    pub async fn set_spec_hash(&self, hash: impl Into<String>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(work) = inner.work.as_mut() {
            work.spec_hash = hash.into();
            work.last_updated_at = Utc::now();
        }
        self.save_work(&inner)
    }

    /// Drops every task, keeping the work state record. Used when a
    /// changed spec is judged to invalidate the existing plan, ahead of
    /// validating and planning from scratch.
    pub async fn clear_tasks(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.tasks.clear();
        self.save_tasks(&inner)
    }

    /// Insert a new task. Returns `false` without error if a task with
    /// this id already exists (matches the source's idempotent insert).
    pub async fn add_task(&self, task: Task) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.tasks.contains_key(&task.id) {
            return Ok(false);
        }
        inner.tasks.insert(task.id, task);
        self.save_tasks(&inner)?;
        Ok(true)
    }

    /// Apply a status transition plus whichever optional fields the
    /// caller has new values for. `None` leaves the existing value
    /// untouched (distinct from an explicit empty string, which the
    /// source's "falsy means skip" convention could not express).
    #[allow(clippy::too_many_arguments)]
    pub async fn update_task(
        &self,
        id: Uuid,
        status: TaskStatus,
        error: Option<&str>,
        result: Option<&str>,
        summary: Option<&str>,
        session_id: Option<&str>,
        followups: Option<Vec<String>>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(&id).ok_or(StoreError::NotFound { id })?;

        let old_status = task.status;
        task.status = status;

        if let Some(e) = error {
            task.error = e.to_owned();
        }
        if let Some(r) = result {
            task.result = r.to_owned();
        }
        if let Some(s) = summary {
            task.summary = s.to_owned();
        }
        if let Some(sid) = session_id {
            task.session_id = sid.to_owned();
        }
        if let Some(f) = followups {
            task.followups = f;
        }

        if old_status != TaskStatus::Running && status == TaskStatus::Running {
            task.started_at = Some(Utc::now());
        }
        if matches!(status, TaskStatus::Completed | TaskStatus::Failed) {
            task.completed_at = Some(Utc::now());
        }

        self.save_tasks(&inner)
    }

    /// Reset a `failed` task to `pending`, bump its retry count, and
    /// clear its timestamps and error so it looks fresh to a worker.
    pub async fn retry_task(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let task = inner.tasks.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        task.retries += 1;
        task.status = TaskStatus::Pending;
        task.error.clear();
        task.started_at = None;
        task.completed_at = None;
        self.save_tasks(&inner)
    }

    /// BFS over the reverse dependency graph: every `pending` or
    /// `running` task transitively depending on `id` becomes `failed`
    /// with a `cascade:` error. Already-terminal tasks are untouched.
    /// Returns the cascaded ids in discovery order.
    pub async fn cascade_failure(&self, id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut cascaded = Vec::new();
        let mut queue = VecDeque::from([id]);

        while let Some(failed_id) = queue.pop_front() {
            let dependents: Vec<Uuid> = inner
                .tasks
                .values()
                .filter(|t| {
                    t.depends_on.contains(&failed_id)
                        && matches!(t.status, TaskStatus::Pending | TaskStatus::Running)
                })
                .map(|t| t.id)
                .collect();

            for dep_id in dependents {
                if let Some(t) = inner.tasks.get_mut(&dep_id) {
                    t.status = TaskStatus::Failed;
                    t.error = format!("{CASCADE_PREFIX} dependency {} failed", short_id(&failed_id));
                    t.completed_at = Some(Utc::now());
                }
                cascaded.push(dep_id);
                queue.push_back(dep_id);
            }
        }

        if !cascaded.is_empty() {
            self.save_tasks(&inner)?;
        }
        Ok(cascaded)
    }

    /// Recovery step run on startup/continuation: promote `running` and
    /// `failed` tasks back to `pending` with retries zeroed, so an
    /// interrupted run can be replayed cleanly.
    pub async fn reset_interrupted_tasks(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        for task in inner.tasks.values_mut() {
            if matches!(task.status, TaskStatus::Running | TaskStatus::Failed) {
                task.status = TaskStatus::Pending;
                task.retries = 0;
                task.error.clear();
                task.started_at = None;
                task.completed_at = None;
            }
        }
        self.save_tasks(&inner)
    }

    pub async fn mark_complete(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(work) = inner.work.as_mut() {
            work.is_complete = true;
            work.last_updated_at = Utc::now();
        }
        self.save_work(&inner)
    }

    pub async fn get_pending_tasks(&self) -> Vec<Task> {
        let inner = self.inner.lock().await;
        inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect()
    }

    pub async fn get_all_tasks(&self) -> Vec<Task> {
        let inner = self.inner.lock().await;
        inner.tasks.values().cloned().collect()
    }

    pub async fn get_task(&self, id: Uuid) -> Option<Task> {
        let inner = self.inner.lock().await;
        inner.tasks.get(&id).cloned()
    }

    pub async fn get_work_state(&self) -> Option<WorkState> {
        let inner = self.inner.lock().await;
        inner.work.clone()
    }

    pub async fn is_complete(&self) -> bool {
        let inner = self.inner.lock().await;
        if inner.work.as_ref().is_some_and(|w| w.is_complete) {
            return true;
        }
        let has_pending_or_running = inner
            .tasks
            .values()
            .any(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Running));
        !inner.tasks.is_empty() && !has_pending_or_running
    }
}

fn short_id(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn add_task_is_idempotent_on_duplicate_id() {
        let (_dir, store) = open_temp().await;
        let task = Task::new("do a thing");
        assert!(store.add_task(task.clone()).await.unwrap());
        assert!(!store.add_task(task).await.unwrap());
        assert_eq!(store.get_all_tasks().await.len(), 1);
    }

    #[tokio::test]
    async fn update_task_stamps_started_and_completed() {
        let (_dir, store) = open_temp().await;
        let task = Task::new("x");
        let id = task.id;
        store.add_task(task).await.unwrap();

        store
            .update_task(id, TaskStatus::Running, None, None, None, None, None)
            .await
            .unwrap();
        let running = store.get_task(id).await.unwrap();
        assert!(running.started_at.is_some());
        assert!(running.completed_at.is_none());

        store
            .update_task(
                id,
                TaskStatus::Completed,
                None,
                Some("output"),
                Some("done"),
                Some("sess-1"),
                None,
            )
            .await
            .unwrap();
        let done = store.get_task(id).await.unwrap();
        assert!(done.completed_at.is_some());
        assert_eq!(done.result, "output");
        assert_eq!(done.summary, "done");
        assert_eq!(done.session_id, "sess-1");
    }

    #[tokio::test]
    async fn retry_resets_to_pending_and_bumps_retries() {
        let (_dir, store) = open_temp().await;
        let task = Task::new("x");
        let id = task.id;
        store.add_task(task).await.unwrap();
        store
            .update_task(id, TaskStatus::Failed, Some("boom"), None, None, None, None)
            .await
            .unwrap();

        store.retry_task(id).await.unwrap();
        let retried = store.get_task(id).await.unwrap();
        assert_eq!(retried.status, TaskStatus::Pending);
        assert_eq!(retried.retries, 1);
        assert!(retried.error.is_empty());
    }

    #[tokio::test]
    async fn cascade_failure_propagates_through_chain_but_skips_completed() {
        let (_dir, store) = open_temp().await;
        let a = Task::new("a");
        let mut b = Task::new("b");
        b.depends_on.push(a.id);
        let mut c = Task::new("c");
        c.depends_on.push(b.id);
        let mut d = Task::new("d");
        d.depends_on.push(a.id);
        d.status = TaskStatus::Completed;

        let a_id = a.id;
        let b_id = b.id;
        let c_id = c.id;
        let d_id = d.id;

        store.add_task(a).await.unwrap();
        store.add_task(b).await.unwrap();
        store.add_task(c).await.unwrap();
        store.add_task(d).await.unwrap();

        store
            .update_task(a_id, TaskStatus::Failed, Some("died"), None, None, None, None)
            .await
            .unwrap();

        let mut cascaded = store.cascade_failure(a_id).await.unwrap();
        cascaded.sort();
        let mut expected = vec![b_id, c_id];
        expected.sort();
        assert_eq!(cascaded, expected);

        assert!(store.get_task(b_id).await.unwrap().is_cascaded());
        assert!(store.get_task(c_id).await.unwrap().is_cascaded());
        assert_eq!(store.get_task(d_id).await.unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn reset_interrupted_tasks_zeroes_retries() {
        let (_dir, store) = open_temp().await;
        let mut task = Task::new("x");
        task.status = TaskStatus::Running;
        task.retries = 3;
        let id = task.id;
        store.add_task(task).await.unwrap();

        store.reset_interrupted_tasks().await.unwrap();
        let reset = store.get_task(id).await.unwrap();
        assert_eq!(reset.status, TaskStatus::Pending);
        assert_eq!(reset.retries, 0);
    }

    #[tokio::test]
    async fn is_complete_requires_no_pending_or_running_and_at_least_one_task() {
        let (_dir, store) = open_temp().await;
        assert!(!store.is_complete().await);

        let task = Task::new("x");
        let id = task.id;
        store.add_task(task).await.unwrap();
        assert!(!store.is_complete().await);

        store
            .update_task(id, TaskStatus::Completed, None, None, None, None, None)
            .await
            .unwrap();
        assert!(store.is_complete().await);
    }

    #[tokio::test]
    async fn reopening_store_reloads_persisted_tasks() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = StateStore::open(dir.path()).unwrap();
            store.add_task(Task::new("persisted")).await.unwrap();
        }
        let store = StateStore::open(dir.path()).unwrap();
        let tasks = store.get_all_tasks().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "persisted");
    }

    #[tokio::test]
    async fn second_open_on_same_dir_fails_while_first_is_alive() {
        let dir = tempfile::tempdir().unwrap();
        let _first = StateStore::open(dir.path()).unwrap();
        assert!(StateStore::open(dir.path()).is_err());
    }
}
