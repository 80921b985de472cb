use std::sync::Arc;

use ship_core::Validator;
use ship_test_utils::FakeLlmClient;

#[tokio::test]
async fn accepted_design_yields_project_markdown() {
    let llm = Arc::new(FakeLlmClient::new(vec![
        "<decision>accept</decision><gaps></gaps><project># PROJECT\nbuild a cli</project>".to_owned(),
    ]));
    let validator = Validator::new(llm);

    let result = validator.validate("a detailed design", &[], "").await.unwrap();
    assert!(result.accept);
    assert_eq!(result.project_md, "# PROJECT\nbuild a cli");
}

#[tokio::test]
async fn rejected_design_retries_then_keeps_gaps_from_first_useful_reply() {
    let llm = Arc::new(FakeLlmClient::new(vec![
        "<decision>reject</decision><gaps></gaps>".to_owned(),
        "<decision>reject</decision><gaps><gap>no success criteria</gap></gaps>".to_owned(),
    ]));
    let validator = Validator::new(llm);

    let result = validator.validate("vague design", &[], "").await.unwrap();
    assert!(!result.accept);
    assert_eq!(result.gaps, vec!["no success criteria"]);
}

#[tokio::test]
async fn repeated_empty_rejections_synthesize_a_gap() {
    let llm = Arc::new(FakeLlmClient::new(vec![
        "<decision>reject</decision><gaps></gaps>".to_owned(),
        "<decision>reject</decision><gaps></gaps>".to_owned(),
        "<decision>reject</decision><gaps></gaps>".to_owned(),
    ]));
    let validator = Validator::new(llm);

    let result = validator.validate("vague design", &[], "").await.unwrap();
    assert!(!result.accept);
    assert_eq!(result.gaps, vec!["rejected without explanation"]);
}
