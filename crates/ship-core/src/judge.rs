use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use ship_store::{StateStore, Task, TaskStatus};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::limits::{JUDGE_TICK, MAX_ADV_ATTEMPTS, MAX_ADV_ROUNDS, MAX_REFINE_ROUNDS, MAX_REPLAN_ROUNDS, MAX_RETRIES};
use crate::llm::LlmClient;
use crate::prompts::judge_task_prompt;
use crate::queue::WorkQueue;
use crate::refiner::Refiner;
use crate::replanner::Replanner;
use crate::verifier::Verifier;

const JUDGE_TASK_TIMEOUT: Duration = Duration::from_secs(45);

/// Outcome of checking whether a batch of adversarial challenge tasks
/// has settled.
#[derive(Debug, PartialEq, Eq)]
enum AdvOutcome {
    Pending,
    Pass,
    Fail,
}

fn classify_adv_batch(expected: usize, statuses: &[TaskStatus]) -> AdvOutcome {
    if statuses.len() != expected {
        return AdvOutcome::Pending;
    }
    if statuses.iter().any(|s| matches!(s, TaskStatus::Pending | TaskStatus::Running)) {
        return AdvOutcome::Pending;
    }
    if statuses.iter().any(|s| *s == TaskStatus::Failed) {
        return AdvOutcome::Fail;
    }
    AdvOutcome::Pass
}

/// The scheduling core: retries/cascades failed tasks, drains
/// completion notifications for advisory per-task verification, and
/// drives the refine -> replan -> adversarial convergence ladder once
/// no task is pending or running.
pub struct Judge {
    state: Arc<StateStore>,
    queue: Arc<WorkQueue>,
    judge_llm: Arc<dyn LlmClient>,
    refiner: Refiner,
    replanner: Replanner,
    verifier: Verifier,
    data_dir: PathBuf,
    project_context: String,
    use_codex: bool,
    completed_rx: mpsc::Receiver<Task>,

    refine_count: u32,
    replan_count: u32,
    adv_round: u32,
    adv_attempts: u32,
    adv_task_ids: HashSet<Uuid>,
    seen_challenges: HashSet<String>,
    dispatched: HashSet<Uuid>,
}

impl Judge {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<StateStore>,
        queue: Arc<WorkQueue>,
        judge_llm: Arc<dyn LlmClient>,
        refiner: Refiner,
        replanner: Replanner,
        verifier: Verifier,
        data_dir: PathBuf,
        project_context: String,
        use_codex: bool,
        completed_rx: mpsc::Receiver<Task>,
    ) -> Self {
        Self {
            state,
            queue,
            judge_llm,
            refiner,
            replanner,
            verifier,
            data_dir,
            project_context,
            use_codex,
            completed_rx,
            refine_count: 0,
            replan_count: 0,
            adv_round: 0,
            adv_attempts: 0,
            adv_task_ids: HashSet::new(),
            seen_challenges: HashSet::new(),
            dispatched: HashSet::new(),
        }
    }

    pub async fn run(&mut self, cancel: CancellationToken) {
        tracing::info!("judge starting");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("judge stopping");
                    return;
                }
                _ = tokio::time::sleep(JUDGE_TICK) => {}
            }

            self.dispatch_ready().await;
            self.drain_completions().await;

            if self.retry_and_cascade().await {
                continue;
            }

            if !self.adv_task_ids.is_empty() {
                match self.check_adv_batch().await {
                    AdvOutcome::Pending => continue,
                    AdvOutcome::Fail => {
                        tracing::info!("adversarial challenge failed, re-entering refine cycle");
                        self.adv_task_ids.clear();
                        self.seen_challenges.clear();
                        self.adv_round = 0;
                        self.refine_count = 0;
                        self.replan_count = 0;
                        continue;
                    }
                    AdvOutcome::Pass => {
                        self.adv_round += 1;
                        self.adv_task_ids.clear();
                        tracing::info!("adversarial round {}/{} passed", self.adv_round, MAX_ADV_ROUNDS);
                        if self.adv_round >= MAX_ADV_ROUNDS {
                            tracing::info!("goal satisfied (adversarial verified)");
                            let _ = self.state.mark_complete().await;
                            return;
                        }
                        continue;
                    }
                }
            }

            if !self.state.is_complete().await {
                continue;
            }

            if self.use_codex && self.refine_count < MAX_REFINE_ROUNDS {
                self.refine_count += 1;
                let new_tasks = self.refiner.refine(&self.state, &self.data_dir).await;
                if !new_tasks.is_empty() {
                    for task in new_tasks {
                        self.dispatched.insert(task.id);
                        self.queue.push(task).await;
                    }
                    continue;
                }
            }

            if self.replan_count < MAX_REPLAN_ROUNDS {
                self.replan_count += 1;
                let new_tasks = self.replanner.replan(&self.state, &self.data_dir).await;
                if !new_tasks.is_empty() {
                    for task in new_tasks {
                        self.dispatched.insert(task.id);
                        self.queue.push(task).await;
                    }
                    continue;
                }
            }

            if self.run_adversarial_round().await {
                tracing::info!("goal satisfied (adversarial exhausted)");
                let _ = self.state.mark_complete().await;
                return;
            }
        }
    }

    /// Pushes every `Pending` task whose `depends_on` are all
    /// `Completed` and that hasn't been handed to the queue yet.
    /// Mirrors `StateStore::cascade_failure`'s reverse-dependency walk,
    /// but runs forward: readiness instead of failure propagation.
    async fn dispatch_ready(&mut self) {
        let all_tasks = self.state.get_all_tasks().await;
        let completed: HashSet<Uuid> =
            all_tasks.iter().filter(|t| t.status == TaskStatus::Completed).map(|t| t.id).collect();

        for task in all_tasks {
            if task.status != TaskStatus::Pending || self.dispatched.contains(&task.id) {
                continue;
            }
            if task.depends_on.iter().all(|dep| completed.contains(dep)) {
                self.dispatched.insert(task.id);
                self.queue.push(task).await;
            }
        }
    }

    async fn drain_completions(&mut self) {
        while let Ok(task) = self.completed_rx.try_recv() {
            self.judge_task(&task).await;
        }
    }

    async fn judge_task(&self, task: &Task) {
        let progress_path = self.data_dir.join("PROGRESS.md").display().to_string();
        let truncated: String = task.result.chars().take(500).collect();
        let prompt = judge_task_prompt(&task.description, &truncated, &progress_path);
        if let Err(e) = self.judge_llm.execute(&prompt, JUDGE_TASK_TIMEOUT, None).await {
            tracing::warn!("judge task verification failed: {e}");
        }
    }

    /// Returns `true` when a retry or cascade happened this tick, so
    /// the caller loops back to the top rather than falling into the
    /// completion/convergence checks on stale state.
    async fn retry_and_cascade(&self) -> bool {
        let all_tasks = self.state.get_all_tasks().await;
        let retryable: Vec<Task> = all_tasks
            .into_iter()
            .filter(|t| t.status == TaskStatus::Failed && !t.is_cascaded() && !self.adv_task_ids.contains(&t.id))
            .collect();

        let mut acted = false;
        for task in retryable {
            acted = true;
            if task.retries >= MAX_RETRIES {
                match self.state.cascade_failure(task.id).await {
                    Ok(cascaded) if !cascaded.is_empty() => {
                        tracing::info!("cascade: {} -> {} tasks", task.id, cascaded.len());
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("cascade_failure failed: {e}"),
                }
                continue;
            }
            if let Err(e) = self.state.retry_task(task.id).await {
                tracing::error!("retry_task failed: {e}");
                continue;
            }
            if let Some(retried) = self.state.get_task(task.id).await {
                tracing::info!("retry {} ({}/{})", task.id, retried.retries, MAX_RETRIES);
                self.queue.push(retried).await;
            }
        }
        acted
    }

    async fn check_adv_batch(&self) -> AdvOutcome {
        let all_tasks = self.state.get_all_tasks().await;
        let statuses: Vec<TaskStatus> = all_tasks.iter().filter(|t| self.adv_task_ids.contains(&t.id)).map(|t| t.status).collect();
        classify_adv_batch(self.adv_task_ids.len(), &statuses)
    }

    /// Runs one round of adversarial verification. Returns `true` if
    /// the attempt budget is exhausted and the Judge should give up
    /// and finalize anyway.
    async fn run_adversarial_round(&mut self) -> bool {
        self.adv_attempts += 1;
        if self.adv_attempts > MAX_ADV_ATTEMPTS {
            tracing::warn!("adversarial max attempts reached");
            return true;
        }

        let Some(work) = self.state.get_work_state().await else {
            return true;
        };

        let goal_prefix: String = work.goal_text.chars().take(2000).collect();
        let challenges = self.verifier.challenge(&goal_prefix, &self.project_context).await;
        if challenges.is_empty() {
            tracing::warn!("verifier returned no challenges");
            return false;
        }

        let novel: Vec<String> = challenges.into_iter().filter(|c| !self.seen_challenges.contains(c)).collect();
        if novel.is_empty() {
            tracing::warn!("all challenges already seen");
            return false;
        }

        let mut shuffled = novel;
        {
            let mut rng = rand::rng();
            shuffled.shuffle(&mut rng);
        }
        let picked: Vec<String> = shuffled.into_iter().take(2).collect();
        for c in &picked {
            self.seen_challenges.insert(c.clone());
        }

        self.adv_task_ids.clear();
        for desc in &picked {
            let task = Task::new(desc.clone());
            if let Err(e) = self.state.add_task(task.clone()).await {
                tracing::error!("failed to add adversarial task: {e}");
                continue;
            }
            self.adv_task_ids.insert(task.id);
            self.dispatched.insert(task.id);
            self.queue.push(task).await;
        }

        tracing::info!("queued {} adversarial challenges", picked.len());
        false
    }
}
