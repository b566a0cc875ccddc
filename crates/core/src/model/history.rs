use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::model::ids::CardId;

/// One answer as recorded by the session engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub card_id: CardId,
    pub round: u32,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(card_id: CardId, round: u32, is_correct: bool, answered_at: DateTime<Utc>) -> Self {
        Self {
            card_id,
            round,
            is_correct,
            answered_at,
        }
    }
}

/// Aggregate summary for a finished practice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    cards_seen: u32,
    rounds: u32,
    correct_count: u32,
    wrong_count: u32,
}

impl SessionSummary {
    /// Build a summary from the answers accumulated over a session.
    ///
    /// `rounds` is the highest round reached, never below 1, so an abandoned
    /// first round still reports as one round.
    #[must_use]
    pub fn from_history(history: &[HistoryEntry]) -> Self {
        let mut seen: HashSet<CardId> = HashSet::new();
        let mut rounds = 1_u32;
        let mut correct_count = 0_u32;
        let mut wrong_count = 0_u32;

        for entry in history {
            seen.insert(entry.card_id);
            rounds = rounds.max(entry.round);
            if entry.is_correct {
                correct_count = correct_count.saturating_add(1);
            } else {
                wrong_count = wrong_count.saturating_add(1);
            }
        }

        Self {
            cards_seen: u32::try_from(seen.len()).unwrap_or(u32::MAX),
            rounds,
            correct_count,
            wrong_count,
        }
    }

    /// Number of distinct cards that were answered at least once.
    #[must_use]
    pub fn cards_seen(&self) -> u32 {
        self.cards_seen
    }

    /// Highest round the session reached.
    #[must_use]
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn wrong_count(&self) -> u32 {
        self.wrong_count
    }

    /// Total number of recorded answers.
    #[must_use]
    pub fn total_answers(&self) -> u32 {
        self.correct_count.saturating_add(self.wrong_count)
    }
}
