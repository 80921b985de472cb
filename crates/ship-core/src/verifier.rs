use std::sync::Arc;
use std::time::Duration;

use crate::llm::LlmClient;
use crate::prompts::verifier_prompt;
use crate::tags;

const TIMEOUT: Duration = Duration::from_secs(90);

/// Adversarial reviewer: tries to prove the goal is not actually met
/// by emitting concrete, executable challenges.
pub struct Verifier {
    llm: Arc<dyn LlmClient>,
}

impl Verifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Returns up to 10 non-empty challenge strings, or an empty vec
    /// on LLM failure -- the caller (Judge) treats that as "no
    /// challenges this round" rather than a fatal error.
    pub async fn challenge(&self, goal_text: &str, project_context: &str) -> Vec<String> {
        let prompt = verifier_prompt(goal_text, project_context);
        match self.llm.execute(&prompt, TIMEOUT, None).await {
            Ok((result, _session_id)) => tags::find_all_tags(&result, "challenge"),
            Err(e) => {
                tracing::warn!("verifier llm call failed: {e}");
                Vec::new()
            }
        }
    }
}
