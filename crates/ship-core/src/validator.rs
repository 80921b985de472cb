use std::sync::Arc;
use std::time::Duration;

use crate::llm::{LlmClient, LlmError};
use crate::prompts::validator_prompt;
use crate::tags;

const TIMEOUT: Duration = Duration::from_secs(180);

/// Verdict on whether a design is specific enough to plan from.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub accept: bool,
    pub gaps: Vec<String>,
    pub project_md: String,
}

/// Reviews a design document before it reaches the Planner.
pub struct Validator {
    llm: Arc<dyn LlmClient>,
}

impl Validator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Retries the call up to twice when the model rejects without
    /// articulating why, since a blank rejection is usually the model
    /// dropping the `<gaps>` block rather than a considered verdict.
    ///
    /// Returns `Err` only when the underlying LLM call itself failed on
    /// the final attempt (transport/process failure) — that is a fatal
    /// infrastructure problem, not a content verdict, and must not be
    /// laundered into a rejecting [`ValidationResult`].
    pub async fn validate(&self, design_text: &str, context: &[String], override_prompt: &str) -> Result<ValidationResult, LlmError> {
        let prompt = validator_prompt(design_text, context, override_prompt);
        let mut last_err = None;

        for attempt in 0..3 {
            let outcome = match self.llm.execute(&prompt, TIMEOUT, None).await {
                Ok((result, _session_id)) => Self::parse(&result),
                Err(e) => {
                    tracing::warn!("validator llm call failed: {e}");
                    last_err = Some(e);
                    continue;
                }
            };

            if outcome.accept || !outcome.gaps.is_empty() {
                return Ok(outcome);
            }
            last_err = None;
            tracing::debug!("validator attempt {attempt} rejected with no gaps, retrying");
        }

        if let Some(e) = last_err {
            return Err(e);
        }

        Ok(ValidationResult {
            accept: false,
            gaps: vec!["rejected without explanation".to_owned()],
            project_md: String::new(),
        })
    }

    fn parse(text: &str) -> ValidationResult {
        let decision = tags::find_tag(text, "decision").map(|d| d.to_lowercase());
        let accept = decision.as_deref() == Some("accept");

        let gaps = tags::find_all_tags(text, "gap");
        let project_md = tags::find_tag(text, "project").unwrap_or_default();

        ValidationResult { accept, gaps, project_md }
    }
}
