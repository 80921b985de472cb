use std::collections::HashMap;
use std::sync::Arc;

use ship_store::Task;
use tokio::sync::{Mutex, mpsc};

const CHANNEL_CAPACITY: usize = 256;

/// Routes tasks to workers: each worker gets a private channel for
/// tasks pinned to it (`worker="wN"`), and all workers share one
/// "auto" channel for everything else. A single dispatcher task reads
/// the ingest channel and decides which of those it belongs on, so
/// callers (Judge, Planner, Refiner, Replanner, Verifier) only ever
/// need to `push` into one place.
pub struct WorkQueue {
    ingest: mpsc::Sender<Task>,
}

impl WorkQueue {
    /// Builds the queue plus one [`WorkerInbox`] per worker id and
    /// spawns the dispatcher. The dispatcher runs until every sender
    /// handle (this `WorkQueue` and its clones) is dropped.
    pub fn new(worker_ids: &[String]) -> (Self, Vec<WorkerInbox>) {
        let (ingest_tx, mut ingest_rx) = mpsc::channel::<Task>(CHANNEL_CAPACITY);
        let (auto_tx, auto_rx) = mpsc::channel::<Task>(CHANNEL_CAPACITY);
        let auto_rx = Arc::new(Mutex::new(auto_rx));

        let mut private_txs = HashMap::new();
        let mut inboxes = Vec::new();
        for id in worker_ids {
            let (tx, rx) = mpsc::channel::<Task>(CHANNEL_CAPACITY);
            private_txs.insert(id.clone(), tx);
            inboxes.push(WorkerInbox {
                id: id.clone(),
                private: rx,
                shared: Arc::clone(&auto_rx),
            });
        }

        tokio::spawn(async move {
            while let Some(task) = ingest_rx.recv().await {
                let pinned = if task.worker.is_auto() { None } else { private_txs.get(task.worker.0.as_str()) };

                let routed = match pinned {
                    Some(tx) => tx.send(task).await,
                    None => auto_tx.send(task).await,
                };
                if routed.is_err() {
                    tracing::warn!("queue dispatcher: target inbox closed, task dropped");
                }
            }
        });

        (Self { ingest: ingest_tx }, inboxes)
    }

    pub async fn push(&self, task: Task) {
        let description = task.description.clone();
        if self.ingest.send(task).await.is_err() {
            tracing::warn!("queue dispatcher is gone, task lost: {}", description);
        }
    }
}

/// One worker's view of the queue: its own pinned-task channel plus
/// the shared auto channel, polled together.
pub struct WorkerInbox {
    id: String,
    private: mpsc::Receiver<Task>,
    shared: Arc<Mutex<mpsc::Receiver<Task>>>,
}

impl WorkerInbox {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for whichever arrives first: a task pinned to this
    /// worker, or the next task off the shared auto channel. The
    /// private branch is checked first (`biased`) so pinned work is
    /// never starved by a busy shared channel.
    pub async fn recv(&mut self) -> Option<Task> {
        let shared = Arc::clone(&self.shared);
        tokio::select! {
            biased;
            task = self.private.recv() => task,
            task = async move { shared.lock().await.recv().await } => task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pinned_task_routes_to_named_worker_only() {
        let ids = vec!["w0".to_owned(), "w1".to_owned()];
        let (queue, mut inboxes) = WorkQueue::new(&ids);
        let mut w1 = inboxes.remove(1);
        let mut w0 = inboxes.remove(0);

        let task = Task::new("pinned work").with_worker(ship_store::WorkerPin("w1".to_owned()));
        queue.push(task.clone()).await;

        let received = w1.recv().await.expect("w1 should receive its pinned task");
        assert_eq!(received.id, task.id);

        // w0 must not have received it; prove its inbox is still empty
        // by pushing an auto task and confirming that one comes back.
        let auto_task = Task::new("auto work");
        queue.push(auto_task.clone()).await;
        let received_auto = w0.recv().await.expect("w0 should receive the auto task");
        assert_eq!(received_auto.id, auto_task.id);
    }

    #[tokio::test]
    async fn auto_task_goes_to_whichever_worker_polls() {
        let ids = vec!["w0".to_owned()];
        let (queue, mut inboxes) = WorkQueue::new(&ids);
        let mut w0 = inboxes.remove(0);

        let task = Task::new("auto work");
        queue.push(task.clone()).await;
        let received = w0.recv().await.expect("should receive auto task");
        assert_eq!(received.id, task.id);
    }
}
