use serde::{Deserialize, Serialize};

use crate::model::ids::CardId;

/// A flashcard as handed to the session engine.
///
/// The engine only reads `id`; question and answer travel along so a caller
/// can build its display lookup from the same list it initializes with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub question: String,
    pub answer: String,
}

impl Card {
    #[must_use]
    pub fn new(id: CardId, question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            id,
            question: question.into(),
            answer: answer.into(),
        }
    }
}
