//! Shared test fixtures for ship's store and core crates.
//!
//! There is no database to containerize here, so this crate is
//! intentionally light: a tempdir-backed [`StateStore`] opener plus a
//! scriptable [`FakeLlmClient`] test double standing in for the real
//! `claude` CLI subprocess.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ship_core::llm::{LlmClient, LlmError, ProgressCallback};
use ship_store::StateStore;

/// Opens a fresh [`StateStore`] in a new tempdir. The tempdir is
/// returned alongside so the caller keeps it alive for the test's
/// duration (dropping it removes the directory).
pub fn temp_store() -> (tempfile::TempDir, StateStore) {
    let dir = tempfile::tempdir().expect("create tempdir");
    let store = StateStore::open(dir.path()).expect("open store");
    (dir, store)
}

/// A scripted reply for [`FakeLlmClient`]: either a successful
/// `(output, session_id)` pair or a typed failure.
pub enum Scripted {
    Ok(String),
    Err(LlmError),
}

/// Stands in for [`ship_core::llm::ClaudeCodeLlm`] in tests: returns
/// canned responses in order, repeating the last one once the script
/// runs out, and records every prompt it was asked to execute.
pub struct FakeLlmClient {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlmClient {
    pub fn new(responses: impl IntoIterator<Item = String>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Scripted::Ok).collect()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn scripted(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every prompt this client was asked to execute, in call order.
    pub fn prompts_seen(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn execute(&self, prompt: &str, _timeout: Duration, _on_progress: Option<ProgressCallback<'_>>) -> Result<(String, String), LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_owned());

        let next = self.script.lock().unwrap().pop_front();
        let response = match next {
            Some(Scripted::Ok(text)) => {
                *self.last.lock().unwrap() = Some(text.clone());
                Scripted::Ok(text)
            }
            Some(Scripted::Err(e)) => Scripted::Err(e),
            None => match self.last.lock().unwrap().clone() {
                Some(text) => Scripted::Ok(text),
                None => Scripted::Ok(String::new()),
            },
        };

        match response {
            Scripted::Ok(text) => Ok((text, "fake-session".to_owned())),
            Scripted::Err(e) => Err(e),
        }
    }
}

/// A client that always fails the same way, for exercising error
/// paths (fail-open corrective roles, fatal primary roles).
pub struct FailingLlmClient {
    make_err: Box<dyn Fn() -> LlmError + Send + Sync>,
}

impl FailingLlmClient {
    pub fn new(make_err: impl Fn() -> LlmError + Send + Sync + 'static) -> Self {
        Self { make_err: Box::new(make_err) }
    }
}

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn execute(&self, _prompt: &str, _timeout: Duration, _on_progress: Option<ProgressCallback<'_>>) -> Result<(String, String), LlmError> {
        Err((self.make_err)())
    }
}
