use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use practice_core::engine::SessionState;
use practice_core::model::{Card, CardId, DeckId, SessionId, SessionSummary, UserId};

use crate::error::PracticeError;
use crate::session_store::{CardMeta, PracticeSession, SessionStore};

//
// ─── REPLY TYPES ───────────────────────────────────────────────────────────────
//

/// The question side of a card, as shown to the learner.
///
/// The answer text never leaves the store through this surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardPrompt {
    pub id: CardId,
    pub question: String,
    pub question_image_url: Option<String>,
}

impl CardPrompt {
    fn from_meta(meta: &CardMeta) -> Self {
        Self {
            id: meta.id,
            question: meta.question.clone(),
            question_image_url: meta.question_image_url.clone(),
        }
    }
}

/// Reply to a session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub total_cards: usize,
    pub round: u32,
    pub first_card: CardPrompt,
}

/// Reply to a submitted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AnswerReply {
    Next {
        card: CardPrompt,
        round: u32,
        remaining: usize,
    },
    Done,
}

/// Point-in-time view of a running session, for resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub round: u32,
    pub remaining: usize,
    pub current_card: Option<CardPrompt>,
}

/// Reply to a finished session; the session itself is gone afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedSession {
    pub summary: SessionSummary,
    pub duration: Duration,
}

//
// ─── PRACTICE SERVICE ──────────────────────────────────────────────────────────
//

/// Facade over engine and store for the surrounding request layer.
///
/// Lookup failures of any kind (unknown id, expired, foreign owner) surface
/// uniformly as [`PracticeError::SessionNotFound`]; engine precondition
/// violations propagate unchanged for the caller to translate.
#[derive(Clone)]
pub struct PracticeService {
    store: Arc<SessionStore>,
}

impl PracticeService {
    #[must_use]
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Start a session over the given cards.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::EmptyDeck` when `cards` is empty.
    pub fn start(
        &self,
        owner_id: UserId,
        deck_id: DeckId,
        cards: Vec<CardMeta>,
    ) -> Result<StartedSession, PracticeError> {
        let Some(front) = cards.first() else {
            return Err(PracticeError::EmptyDeck);
        };
        let first_card = CardPrompt::from_meta(front);

        let engine_cards: Vec<Card> = cards
            .iter()
            .map(|meta| Card::new(meta.id, meta.question.clone(), meta.answer.clone()))
            .collect();
        let state = SessionState::init(&engine_cards);
        let round = state.round();

        let session = self.store.create(owner_id, deck_id, state, cards);
        debug!(session_id = %session.id, total = session.cards.len(), "practice started");

        Ok(StartedSession {
            session_id: session.id,
            total_cards: session.cards.len(),
            round,
            first_card,
        })
    }

    /// Submit an answer for the current card.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for a missing, expired, or foreign session,
    /// and propagates engine errors for a bad `card_id`.
    pub fn answer(
        &self,
        session_id: SessionId,
        owner_id: UserId,
        card_id: CardId,
        is_correct: bool,
    ) -> Result<AnswerReply, PracticeError> {
        let session = self
            .store
            .get(session_id, owner_id)
            .ok_or(PracticeError::SessionNotFound)?;

        let outcome = session
            .state
            .answer(card_id, is_correct, self.store.now())?;
        self.store.update(session_id, outcome.state.clone());

        let Some(next_id) = outcome.state.next_card_id() else {
            return Ok(AnswerReply::Done);
        };
        let card = Self::prompt(&session, next_id)?;

        Ok(AnswerReply::Next {
            card,
            round: outcome.state.round(),
            remaining: outcome.state.remaining(),
        })
    }

    /// Current round, remaining count, and card, for resuming a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for a missing, expired, or foreign session.
    pub fn status(
        &self,
        session_id: SessionId,
        owner_id: UserId,
    ) -> Result<SessionStatus, PracticeError> {
        let session = self
            .store
            .get(session_id, owner_id)
            .ok_or(PracticeError::SessionNotFound)?;

        let current_card = match session.state.next_card_id() {
            Some(id) => Some(Self::prompt(&session, id)?),
            None => None,
        };

        Ok(SessionStatus {
            round: session.state.round(),
            remaining: session.state.remaining(),
            current_card,
        })
    }

    /// Finish a session: aggregate its history, then destroy it.
    ///
    /// The reported duration is clamped to at least one millisecond.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for a missing, expired, or foreign session.
    pub fn finish(
        &self,
        session_id: SessionId,
        owner_id: UserId,
        duration: Duration,
    ) -> Result<FinishedSession, PracticeError> {
        let session = self
            .store
            .get(session_id, owner_id)
            .ok_or(PracticeError::SessionNotFound)?;

        let summary = SessionSummary::from_history(session.state.history());
        self.store.remove(session_id);
        debug!(session_id = %session_id, answers = summary.total_answers(), "practice finished");

        Ok(FinishedSession {
            summary,
            duration: duration.max(Duration::milliseconds(1)),
        })
    }

    /// Abandon a session without aggregation.
    ///
    /// Already-gone sessions are ignored; abandoning twice is fine. Only the
    /// owner's lookup succeeds, so a foreign caller cannot delete a session.
    pub fn end(&self, session_id: SessionId, owner_id: UserId) {
        if self.store.get(session_id, owner_id).is_some() {
            self.store.remove(session_id);
            debug!(session_id = %session_id, "practice abandoned");
        }
    }

    fn prompt(session: &PracticeSession, card_id: CardId) -> Result<CardPrompt, PracticeError> {
        session
            .card(card_id)
            .map(CardPrompt::from_meta)
            .ok_or_else(|| {
                PracticeError::Engine(practice_core::engine::EngineError::UnknownCard(card_id))
            })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
