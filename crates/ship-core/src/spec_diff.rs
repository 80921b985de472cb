use std::sync::Arc;
use std::time::Duration;

use crate::llm::LlmClient;
use crate::prompts::replan_decision_prompt;
use crate::tags;

const TIMEOUT: Duration = Duration::from_secs(60);

/// What to do when the on-disk spec no longer matches the hash a prior
/// run was planned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecDecision {
    Keep,
    Replan,
}

/// Asks the LLM whether a changed spec still matches the existing plan.
/// Retries once on an LLM error; a hiccup defaults to `Replan` rather
/// than silently continuing on a plan that may no longer apply.
pub struct SpecDiffJudge {
    llm: Arc<dyn LlmClient>,
}

impl SpecDiffJudge {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn decide(&self, old_goal: &str, new_goal: &str) -> SpecDecision {
        let prompt = replan_decision_prompt(old_goal, new_goal);

        for attempt in 0..2 {
            match self.llm.execute(&prompt, TIMEOUT, None).await {
                Ok((result, _session_id)) => return Self::parse(&result),
                Err(e) => tracing::warn!("spec-diff decision attempt {attempt} failed: {e}"),
            }
        }

        SpecDecision::Replan
    }

    fn parse(text: &str) -> SpecDecision {
        match tags::find_tag(text, "decision").as_deref() {
            Some("keep") => SpecDecision::Keep,
            _ => SpecDecision::Replan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keep() {
        assert_eq!(SpecDiffJudge::parse("<decision>keep</decision>"), SpecDecision::Keep);
    }

    #[test]
    fn parse_replan() {
        assert_eq!(SpecDiffJudge::parse("<decision>replan</decision>"), SpecDecision::Replan);
    }

    #[test]
    fn parse_unrecognized_defaults_to_replan() {
        assert_eq!(SpecDiffJudge::parse("no structured output"), SpecDecision::Replan);
    }
}
