use thiserror::Error;

/// Error from one [`super::LlmClient::execute`] call. Every variant
/// carries whatever partial result and session id were observed before
/// the failure, so a caller can log a useful summary or hand the
/// session back to the user for resume.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("claude cli timeout after {seconds}s")]
    Timeout {
        seconds: u64,
        partial: Option<String>,
        session_id: Option<String>,
    },

    #[error("claude cli failed (exit {code}): {detail}")]
    ExitFailure {
        code: i32,
        detail: String,
        partial: Option<String>,
        session_id: Option<String>,
    },

    #[error("claude cli returned empty output")]
    EmptyOutput {
        partial: Option<String>,
        session_id: Option<String>,
    },

    #[error("reached max turns")]
    MaxTurns {
        partial: Option<String>,
        session_id: Option<String>,
    },

    #[error("failed to spawn claude cli: {0}")]
    Spawn(#[source] std::io::Error),
}

impl LlmError {
    pub fn partial(&self) -> Option<&str> {
        match self {
            Self::Timeout { partial, .. }
            | Self::ExitFailure { partial, .. }
            | Self::EmptyOutput { partial, .. }
            | Self::MaxTurns { partial, .. } => partial.as_deref(),
            Self::Spawn(_) => None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Timeout { session_id, .. }
            | Self::ExitFailure { session_id, .. }
            | Self::EmptyOutput { session_id, .. }
            | Self::MaxTurns { session_id, .. } => session_id.as_deref(),
            Self::Spawn(_) => None,
        }
    }
}
