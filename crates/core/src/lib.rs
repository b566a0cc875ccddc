#![forbid(unsafe_code)]

pub mod engine;
pub mod model;
pub mod time;

pub use engine::{AnswerOutcome, CardState, EngineError, SessionState, MASTERY_THRESHOLD};
pub use time::Clock;
