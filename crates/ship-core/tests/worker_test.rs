use std::sync::Arc;
use std::time::Duration;

use ship_core::Worker;
use ship_core::llm::LlmError;
use ship_store::{Task, TaskStatus};
use ship_test_utils::{FailingLlmClient, temp_store};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn spawn_worker_with_queue(
    llm: Arc<dyn ship_core::LlmClient>,
    state: Arc<ship_store::StateStore>,
    data_dir: std::path::PathBuf,
) -> (ship_core::WorkQueue, mpsc::Receiver<Task>, CancellationToken, tokio::task::JoinHandle<()>) {
    let (queue, mut inboxes) = ship_core::WorkQueue::new(&["w0".to_owned()]);
    let mut inbox = inboxes.remove(0);
    let (done_tx, done_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let worker = Worker::new(
        "w0".to_owned(),
        llm,
        state,
        data_dir,
        "building a thing".to_owned(),
        String::new(),
        Duration::from_secs(5),
        done_tx,
    );
    let worker_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        worker.run(&mut inbox, worker_cancel).await;
    });
    (queue, done_rx, cancel, handle)
}

#[tokio::test]
async fn successful_task_is_marked_completed_and_notifies_on_complete() {
    let (dir, store) = temp_store();
    let state = Arc::new(store);
    let llm: Arc<dyn ship_core::LlmClient> =
        Arc::new(ship_test_utils::FakeLlmClient::new(vec!["<status>done</status><summary>wrote the file</summary>".to_owned()]));

    let (queue, mut done_rx, cancel, handle) = spawn_worker_with_queue(llm, Arc::clone(&state), dir.path().to_path_buf());

    let task = Task::new("write a readme");
    let id = task.id;
    state.add_task(task.clone()).await.unwrap();
    queue.push(task).await;

    let completed = tokio::time::timeout(Duration::from_secs(5), done_rx.recv())
        .await
        .expect("worker should report completion")
        .expect("channel should not be closed");
    assert_eq!(completed.id, id);

    let stored = state.get_task(id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.summary, "wrote the file");

    cancel.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn partial_status_is_recorded_as_failed_with_followups() {
    let (dir, store) = temp_store();
    let state = Arc::new(store);
    let llm: Arc<dyn ship_core::LlmClient> = Arc::new(ship_test_utils::FakeLlmClient::new(vec![
        "<status>partial</status><followups><task>finish wiring the router</task></followups>".to_owned(),
    ]));

    let (queue, mut done_rx, cancel, handle) = spawn_worker_with_queue(llm, Arc::clone(&state), dir.path().to_path_buf());

    let task = Task::new("wire up the router");
    let id = task.id;
    state.add_task(task.clone()).await.unwrap();
    queue.push(task).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(done_rx.try_recv().is_err());

    let stored = state.get_task(id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(stored.error, "worker reported partial");
    assert_eq!(stored.followups, vec!["finish wiring the router"]);

    cancel.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn llm_failure_records_task_as_failed_with_error_message() {
    let (dir, store) = temp_store();
    let state = Arc::new(store);
    let llm: Arc<dyn ship_core::LlmClient> = Arc::new(FailingLlmClient::new(|| LlmError::ExitFailure {
        code: 1,
        detail: "boom".to_owned(),
        partial: None,
        session_id: None,
    }));

    let (queue, _done_rx, cancel, handle) = spawn_worker_with_queue(llm, Arc::clone(&state), dir.path().to_path_buf());

    let task = Task::new("do something that fails");
    let id = task.id;
    state.add_task(task.clone()).await.unwrap();
    queue.push(task).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let stored = state.get_task(id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert!(!stored.error.is_empty());

    cancel.cancel();
    let _ = handle.await;
}
