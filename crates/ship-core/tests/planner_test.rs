use std::sync::Arc;

use ship_core::Planner;
use ship_store::{ExecutionMode, TaskStatus};
use ship_test_utils::{FakeLlmClient, temp_store};

#[tokio::test]
async fn plan_once_seeds_store_with_resolved_dependencies() {
    let (dir, store) = temp_store();
    store.init_work("spec.md", "build a thing", "hash1", "").await.unwrap();

    let plan_reply = r#"
<project>
<context>building a small http service</context>
<mode>sequential</mode>
<tasks>
<task worker="auto">Create go.mod with module name</task>
<task worker="auto" depends="1">Implement health endpoint</task>
<task depends="1,2">Write integration tests</task>
</tasks>
</project>
"#;
    let llm = Arc::new(FakeLlmClient::new(vec![plan_reply.to_owned()]));
    let planner = Planner::new(llm);

    let tasks = planner.plan_once(&store, dir.path()).await.unwrap();
    assert_eq!(tasks.len(), 3);

    let all = store.get_all_tasks().await;
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|t| t.status == TaskStatus::Pending));

    let work = store.get_work_state().await.unwrap();
    assert_eq!(work.project_context, "building a small http service");
    assert_eq!(work.execution_mode, ExecutionMode::Sequential);

    let third = tasks.iter().find(|t| t.description == "Write integration tests").unwrap();
    assert_eq!(third.depends_on.len(), 2);
}

#[tokio::test]
async fn plan_once_without_work_state_returns_nothing() {
    let (dir, store) = temp_store();
    let llm = Arc::new(FakeLlmClient::new(vec!["<tasks></tasks>".to_owned()]));
    let planner = Planner::new(llm);

    let tasks = planner.plan_once(&store, dir.path()).await.unwrap();
    assert!(tasks.is_empty());
}
