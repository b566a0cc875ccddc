//! Shared error types for the services crate.

use thiserror::Error;

use practice_core::engine::EngineError;

/// Errors emitted by `PracticeService`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PracticeError {
    #[error("deck has no cards to practice")]
    EmptyDeck,

    /// Covers a missing id, an expired session, and a foreign owner alike,
    /// so callers cannot probe which sessions exist.
    #[error("session not found or expired")]
    SessionNotFound,

    #[error(transparent)]
    Engine(#[from] EngineError),
}
