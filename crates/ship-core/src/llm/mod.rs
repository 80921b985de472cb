//! Client seam for the external LLM coding-agent CLI.
//!
//! The CLI subprocess is treated as a black box: it reads a prompt,
//! streams line-delimited JSON events to stdout, and exits. Everything
//! downstream of the engine (Validator, Planner, Worker, Judge,
//! Refiner, Replanner, Verifier) talks to [`LlmClient`], never to the
//! concrete subprocess shape, so a different CLI tool can be swapped in
//! by providing a new implementation.

mod claude;
mod error;

use std::time::Duration;

use async_trait::async_trait;

pub use claude::{ClaudeCodeLlm, ClaudeConfig};
pub use error::LlmError;

/// Callback invoked with each `<progress>` marker scanned from the
/// model's streamed output, in order.
pub type ProgressCallback<'a> = &'a (dyn Fn(&str) + Send + Sync);

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one prompt to completion and return `(output, session_id)`.
    async fn execute(
        &self,
        prompt: &str,
        timeout: Duration,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<(String, String), LlmError>;
}

const _: () = {
    fn assert_object_safe(_: &dyn LlmClient) {}
};
