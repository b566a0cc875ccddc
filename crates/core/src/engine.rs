use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::model::{Card, CardId, HistoryEntry};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    #[error("card {0} is not part of this session")]
    UnknownCard(CardId),
    #[error("card {0} is already mastered and cannot be answered")]
    CardAlreadyDone(CardId),
    #[error("card {0} is not in the current round")]
    CardNotInRound(CardId),
    #[error("malformed session snapshot: {0}")]
    MalformedState(String),
}

//
// ─── CARD STATE ────────────────────────────────────────────────────────────────
//

/// Number of cumulative correct answers after which a card is mastered.
pub const MASTERY_THRESHOLD: u32 = 2;

/// Per-card learning progress within one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardState {
    pub id: CardId,
    pub correct_count: u32,
    pub done: bool,
}

impl CardState {
    fn new(id: CardId) -> Self {
        Self {
            id,
            correct_count: 0,
            done: false,
        }
    }
}

//
// ─── SESSION STATE ─────────────────────────────────────────────────────────────
//

/// Result of applying one answer: the successor state and whether the whole
/// session finished with this answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub state: SessionState,
    pub completed: bool,
}

/// Full engine state for one practice session.
///
/// This is a plain value: every operation takes `&self` and returns a fresh
/// state, so callers hold the authoritative copy and the engine keeps no
/// hidden state. A card must be answered correctly twice to leave the
/// learning pool; rounds repeat until no undone card remains.
///
/// Invariant: every id in `queue` has a `CardState` with `done == false`; a
/// mastered card never reappears in any later queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    round: u32,
    queue: Vec<CardId>,
    card_states: HashMap<CardId, CardState>,
    history: Vec<HistoryEntry>,
}

impl SessionState {
    /// Initialize a session over the given cards.
    ///
    /// The first round's queue follows the input order. O(n).
    #[must_use]
    pub fn init(cards: &[Card]) -> Self {
        let mut card_states = HashMap::with_capacity(cards.len());
        let mut queue = Vec::with_capacity(cards.len());

        for card in cards {
            card_states.insert(card.id, CardState::new(card.id));
            queue.push(card.id);
        }

        Self {
            round: 1,
            queue,
            card_states,
            history: Vec::new(),
        }
    }

    /// Current round, starting at 1.
    #[must_use]
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Card ids still to be answered in the current round.
    #[must_use]
    pub fn queue(&self) -> &[CardId] {
        &self.queue
    }

    /// Number of cards left in the current round.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// All answers recorded so far, in order.
    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Progress for a single card, if it belongs to this session.
    #[must_use]
    pub fn card_state(&self, card_id: CardId) -> Option<&CardState> {
        self.card_states.get(&card_id)
    }

    /// The next card to show, or `None` once the session is complete.
    #[must_use]
    pub fn next_card_id(&self) -> Option<CardId> {
        self.queue.first().copied()
    }

    /// True once no card is left to answer. There is no way back from here.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.queue.is_empty()
    }

    /// Apply one answer and return the successor state.
    ///
    /// Correct answers increment the card's `correct_count`; reaching
    /// [`MASTERY_THRESHOLD`] marks it done. Wrong answers leave the count
    /// unchanged. The answered card leaves the current queue; when the queue
    /// empties the next round's queue is rebuilt (wrong cards first) and
    /// `round` increments.
    ///
    /// # Errors
    ///
    /// - `UnknownCard` if `card_id` is not part of this session
    /// - `CardAlreadyDone` if the card is already mastered
    /// - `CardNotInRound` if the card was already answered this round
    pub fn answer(
        &self,
        card_id: CardId,
        is_correct: bool,
        answered_at: DateTime<Utc>,
    ) -> Result<AnswerOutcome, EngineError> {
        match self.card_states.get(&card_id) {
            None => return Err(EngineError::UnknownCard(card_id)),
            Some(card) if card.done => return Err(EngineError::CardAlreadyDone(card_id)),
            Some(_) => {}
        }
        if !self.queue.contains(&card_id) {
            return Err(EngineError::CardNotInRound(card_id));
        }

        let mut next = self.clone();

        let card = next
            .card_states
            .get_mut(&card_id)
            .ok_or(EngineError::UnknownCard(card_id))?;
        if is_correct {
            card.correct_count += 1;
            if card.correct_count >= MASTERY_THRESHOLD {
                card.done = true;
            }
        }

        next.history
            .push(HistoryEntry::new(card_id, self.round, is_correct, answered_at));
        next.queue.retain(|id| *id != card_id);

        let mut completed = false;
        if next.queue.is_empty() {
            let finished_round = next.round_participants(self.round);
            next.queue =
                build_next_round_queue(&next.card_states, &finished_round, card_id, is_correct);
            next.round += 1;
            completed = next.queue.is_empty();
        }

        Ok(AnswerOutcome {
            state: next,
            completed,
        })
    }

    /// Cards answered during `round`, in the order they were encountered.
    ///
    /// A card is answered at most once per round, so the history slice for a
    /// round needs no deduplication.
    fn round_participants(&self, round: u32) -> Vec<CardId> {
        self.history
            .iter()
            .filter(|entry| entry.round == round)
            .map(|entry| entry.card_id)
            .collect()
    }

    //
    // ─── SNAPSHOT CODEC ────────────────────────────────────────────────────────
    //

    /// Encode the state as a JSON snapshot.
    ///
    /// # Errors
    ///
    /// Returns `MalformedState` if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EngineError> {
        serde_json::to_vec(self).map_err(|e| EngineError::MalformedState(e.to_string()))
    }

    /// Decode a JSON snapshot produced by [`SessionState::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `MalformedState` when the snapshot does not parse, when
    /// `round` is zero, when the queue references a card that is missing or
    /// already done, or when an empty queue claims completion while an
    /// unmastered card remains.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        let state: Self = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::MalformedState(e.to_string()))?;
        state.validate()?;
        Ok(state)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.round == 0 {
            return Err(EngineError::MalformedState(
                "round must be at least 1".to_string(),
            ));
        }
        for id in &self.queue {
            match self.card_states.get(id) {
                Some(card) if !card.done => {}
                Some(_) => {
                    return Err(EngineError::MalformedState(format!(
                        "queued card {id} is already done"
                    )));
                }
                None => {
                    return Err(EngineError::MalformedState(format!(
                        "queued card {id} has no card state"
                    )));
                }
            }
        }
        if self.queue.is_empty() && self.card_states.values().any(|card| !card.done) {
            return Err(EngineError::MalformedState(
                "empty queue with unmastered cards".to_string(),
            ));
        }
        Ok(())
    }
}

//
// ─── ROUND REBUILD ─────────────────────────────────────────────────────────────
//

/// Build the queue for the round after `finished_round`.
///
/// Non-done participants of the finished round are partitioned into a wrong
/// list and a right list, wrong first, each keeping its encounter order. The
/// card answered last is classified by the answer just supplied; every other
/// card counts as "right" iff it has any accumulated correct answer, so a
/// card that failed this round but passed an earlier one still sorts with
/// the right group.
#[must_use]
pub fn build_next_round_queue(
    card_states: &HashMap<CardId, CardState>,
    finished_round: &[CardId],
    last_answered: CardId,
    last_correct: bool,
) -> Vec<CardId> {
    let mut wrong = Vec::new();
    let mut right = Vec::new();

    for &id in finished_round {
        let Some(card) = card_states.get(&id) else {
            continue;
        };
        if card.done {
            continue;
        }

        let was_correct = if id == last_answered {
            last_correct
        } else {
            card.correct_count > 0
        };

        if was_correct {
            right.push(id);
        } else {
            wrong.push(id);
        }
    }

    wrong.extend(right);
    wrong
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn cards(n: u64) -> Vec<Card> {
        (1..=n)
            .map(|i| Card::new(CardId::new(i), format!("Q{i}"), format!("A{i}")))
            .collect()
    }

    fn id(i: u64) -> CardId {
        CardId::new(i)
    }

    /// Answer the head of the queue and return the successor state.
    fn answer_head(state: &SessionState, is_correct: bool) -> AnswerOutcome {
        let head = state.next_card_id().expect("queue should not be empty");
        state.answer(head, is_correct, fixed_now()).unwrap()
    }

    #[test]
    fn init_builds_queue_in_input_order() {
        let state = SessionState::init(&cards(3));

        assert_eq!(state.round(), 1);
        assert_eq!(state.queue(), &[id(1), id(2), id(3)]);
        assert_eq!(state.next_card_id(), Some(id(1)));
        assert!(state.history().is_empty());
        for i in 1..=3 {
            let card = state.card_state(id(i)).unwrap();
            assert_eq!(card.correct_count, 0);
            assert!(!card.done);
        }
    }

    #[test]
    fn init_of_no_cards_is_immediately_complete() {
        let state = SessionState::init(&[]);
        assert!(state.is_complete());
        assert_eq!(state.next_card_id(), None);
    }

    #[test]
    fn answer_unknown_card_errors() {
        let state = SessionState::init(&cards(2));
        let err = state.answer(id(99), true, fixed_now()).unwrap_err();
        assert_eq!(err, EngineError::UnknownCard(id(99)));
    }

    #[test]
    fn answer_card_outside_current_round_errors() {
        let state = SessionState::init(&cards(2));
        // One correct answer removes the card from the round without mastering it.
        let outcome = state.answer(id(1), true, fixed_now()).unwrap();

        let err = outcome.state.answer(id(1), true, fixed_now()).unwrap_err();
        assert_eq!(err, EngineError::CardNotInRound(id(1)));
    }

    #[test]
    fn answer_done_card_errors_idempotently() {
        let state = SessionState::init(&cards(2));
        let state = state.answer(id(1), true, fixed_now()).unwrap().state;
        let state = state.answer(id(2), true, fixed_now()).unwrap().state;
        // Round 2: master card 1.
        let state = state.answer(id(1), true, fixed_now()).unwrap().state;
        assert!(state.card_state(id(1)).unwrap().done);

        let first = state.answer(id(1), true, fixed_now()).unwrap_err();
        let second = state.answer(id(1), true, fixed_now()).unwrap_err();
        assert_eq!(first, EngineError::CardAlreadyDone(id(1)));
        assert_eq!(first, second);
    }

    #[test]
    fn failed_answer_leaves_state_untouched() {
        let state = SessionState::init(&cards(2));
        let before = state.clone();

        let _ = state.answer(id(99), true, fixed_now()).unwrap_err();
        assert_eq!(state, before);
    }

    #[test]
    fn wrong_answer_keeps_correct_count() {
        let state = SessionState::init(&cards(2));
        let outcome = state.answer(id(1), false, fixed_now()).unwrap();

        let card = outcome.state.card_state(id(1)).unwrap();
        assert_eq!(card.correct_count, 0);
        assert!(!card.done);
        assert_eq!(outcome.state.queue(), &[id(2)]);
        assert!(!outcome.completed);
    }

    #[test]
    fn history_records_round_and_outcome() {
        let at = fixed_now();
        let state = SessionState::init(&cards(2));
        let state = state.answer(id(1), false, at).unwrap().state;
        let state = state.answer(id(2), true, at).unwrap().state;

        let history = state.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], HistoryEntry::new(id(1), 1, false, at));
        assert_eq!(history[1], HistoryEntry::new(id(2), 1, true, at));
    }

    // Scenario: answer a correct, b wrong, c correct. The next round must
    // start with the wrong card, then the two right ones in encounter order.
    #[test]
    fn wrong_cards_lead_the_next_round() {
        let state = SessionState::init(&cards(3));
        let state = state.answer(id(1), true, fixed_now()).unwrap().state;
        let state = state.answer(id(2), false, fixed_now()).unwrap().state;
        let outcome = state.answer(id(3), true, fixed_now()).unwrap();

        assert!(!outcome.completed);
        assert_eq!(outcome.state.round(), 2);
        assert_eq!(outcome.state.queue(), &[id(2), id(1), id(3)]);
    }

    #[test]
    fn single_card_masters_after_two_correct_answers() {
        let state = SessionState::init(&cards(1));

        let first = answer_head(&state, true);
        assert!(!first.completed);
        assert_eq!(first.state.round(), 2);
        assert_eq!(first.state.queue(), &[id(1)]);

        let second = answer_head(&first.state, true);
        assert!(second.completed);
        assert!(second.state.is_complete());
        assert!(second.state.card_state(id(1)).unwrap().done);
        assert_eq!(second.state.next_card_id(), None);
        assert_eq!(second.state.round(), 3);
    }

    #[test]
    fn round_increments_only_when_queue_refills() {
        let state = SessionState::init(&cards(3));
        let state = answer_head(&state, true).state;
        assert_eq!(state.round(), 1);
        let state = answer_head(&state, true).state;
        assert_eq!(state.round(), 1);
        let state = answer_head(&state, true).state;
        assert_eq!(state.round(), 2);
    }

    #[test]
    fn mastered_cards_never_reappear() {
        let mut state = SessionState::init(&cards(4));
        let mut steps = 0;

        while let Some(head) = state.next_card_id() {
            // Alternate outcomes so rounds mix wrong and right cards.
            let outcome = state.answer(head, steps % 2 == 0, fixed_now()).unwrap();
            state = outcome.state;
            steps += 1;

            for queued in state.queue() {
                let card = state.card_state(*queued).unwrap();
                assert!(!card.done, "done card {queued} found in queue");
            }
            assert!(steps < 200, "session did not terminate");
        }

        // Complete means every card accumulated two correct answers.
        for i in 1..=4 {
            let card = state.card_state(id(i)).unwrap();
            assert!(card.done);
            assert_eq!(card.correct_count, MASTERY_THRESHOLD);
        }
    }

    #[test]
    fn all_wrong_answers_still_terminate_each_round() {
        let state = SessionState::init(&cards(2));
        let state = answer_head(&state, false).state;
        let outcome = answer_head(&state, false);

        // Nobody mastered anything, so the full set returns for round 2.
        assert!(!outcome.completed);
        assert_eq!(outcome.state.round(), 2);
        assert_eq!(outcome.state.remaining(), 2);
    }

    // A card answered wrong in the current round still sorts with the right
    // group when it holds a correct answer from an earlier round.
    #[test]
    fn earlier_correct_answer_outweighs_a_wrong_one_in_this_round() {
        let state = SessionState::init(&cards(2));
        // Round 1: both right (one correct answer each, nobody mastered).
        let state = state.answer(id(1), true, fixed_now()).unwrap().state;
        let state = state.answer(id(2), true, fixed_now()).unwrap().state;
        assert_eq!(state.queue(), &[id(1), id(2)]);

        // Round 2: both wrong. Card 2 was answered last, so only it is
        // classified by the answer just given; card 1 keeps its accumulated
        // correct count and lands in the right group.
        let state = state.answer(id(1), false, fixed_now()).unwrap().state;
        let outcome = state.answer(id(2), false, fixed_now()).unwrap();

        assert!(!outcome.completed);
        assert_eq!(outcome.state.round(), 3);
        assert_eq!(outcome.state.queue(), &[id(2), id(1)]);
    }

    #[test]
    fn rebuild_preserves_encounter_order_within_groups() {
        let state = SessionState::init(&cards(4));
        let state = state.answer(id(1), false, fixed_now()).unwrap().state;
        let state = state.answer(id(2), true, fixed_now()).unwrap().state;
        let state = state.answer(id(3), false, fixed_now()).unwrap().state;
        let outcome = state.answer(id(4), true, fixed_now()).unwrap();

        // wrong: 1, 3 (in encounter order), right: 2, 4.
        assert_eq!(outcome.state.queue(), &[id(1), id(3), id(2), id(4)]);
    }

    #[test]
    fn snapshot_round_trips() {
        let state = SessionState::init(&cards(3));
        let state = answer_head(&state, true).state;
        let state = answer_head(&state, false).state;

        let bytes = state.to_bytes().unwrap();
        let decoded = SessionState::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn snapshot_decode_rejects_garbage() {
        let err = SessionState::from_bytes(b"not json at all").unwrap_err();
        assert!(matches!(err, EngineError::MalformedState(_)));
    }

    #[test]
    fn snapshot_decode_rejects_missing_fields() {
        let err = SessionState::from_bytes(br#"{"round": 1, "queue": []}"#).unwrap_err();
        assert!(matches!(err, EngineError::MalformedState(_)));
    }

    #[test]
    fn snapshot_decode_rejects_round_zero() {
        let bytes = br#"{"round":0,"queue":[],"card_states":{},"history":[]}"#;
        let err = SessionState::from_bytes(bytes).unwrap_err();
        assert!(matches!(err, EngineError::MalformedState(_)));
    }

    #[test]
    fn snapshot_decode_rejects_queue_without_card_state() {
        let bytes = br#"{"round":1,"queue":[7],"card_states":{},"history":[]}"#;
        let err = SessionState::from_bytes(bytes).unwrap_err();
        assert!(matches!(err, EngineError::MalformedState(_)));
    }

    #[test]
    fn snapshot_decode_rejects_empty_queue_with_unmastered_cards() {
        // An empty queue means complete, which contradicts the live card.
        let bytes = br#"{"round":2,"queue":[],"card_states":{"7":{"id":7,"correct_count":0,"done":false}},"history":[]}"#;
        let err = SessionState::from_bytes(bytes).unwrap_err();
        assert!(matches!(err, EngineError::MalformedState(_)));
    }

    #[test]
    fn snapshot_decode_accepts_a_completed_session() {
        let state = SessionState::init(&cards(1));
        let state = answer_head(&state, true).state;
        let state = answer_head(&state, true).state;
        assert!(state.is_complete());

        let decoded = SessionState::from_bytes(&state.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, state);
    }
}
