//! Engine error surface.
//!
//! Three caller-visible kinds (all returned, never swallowed):
//! - `Fetch` — network/backend failure; recoverable, prior state untouched
//! - `Validation` — malformed client input, rejected before any network call
//! - `NotFound` — the conversation is absent from both cache and list

use crate::models::ReviewRequest;

/// Failure from the remote backend boundary.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    pub message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the engine to its UI consumer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("backend fetch failed: {0}")]
    Fetch(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("conversation not found: {0}")]
    NotFound(String),
    #[error("internal lock error")]
    LockPoisoned,
    /// A mutation was pushed locally but the backend rejected it. The
    /// optimistic copy is kept and reconciled on the next fetch.
    #[error("backend update failed (local change kept): {source}")]
    PushFailed {
        source: FetchError,
        updated: Box<ReviewRequest>,
    },
}

impl From<FetchError> for EngineError {
    fn from(err: FetchError) -> Self {
        Self::Fetch(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_converts_to_engine_error() {
        let err: EngineError = FetchError::new("connection refused").into();
        match err {
            EngineError::Fetch(msg) => assert_eq!(msg, "connection refused"),
            other => panic!("expected Fetch, got: {other}"),
        }
    }

    #[test]
    fn error_messages_are_distinguishable() {
        assert!(EngineError::Validation("empty text".into())
            .to_string()
            .contains("invalid input"));
        assert!(EngineError::NotFound("conv-9".into())
            .to_string()
            .contains("not found"));
    }
}
