use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the [`crate::StateStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize state at {path}: {source}")]
    Serde {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("another ship instance holds the lock at {path}")]
    LockHeld { path: String },

    #[error("task {id} not found")]
    NotFound { id: Uuid },
}
