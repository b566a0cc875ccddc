#![forbid(unsafe_code)]

pub mod error;
pub mod practice_service;
pub mod session_store;

pub use practice_core::Clock;

pub use error::PracticeError;
pub use practice_service::{
    AnswerReply, CardPrompt, FinishedSession, PracticeService, SessionStatus, StartedSession,
};
pub use session_store::{CardMeta, PracticeSession, SessionStore, spawn_sweeper};
