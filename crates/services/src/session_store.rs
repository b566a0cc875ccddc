use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use practice_core::engine::SessionState;
use practice_core::model::{CardId, DeckId, SessionId, UserId};
use practice_core::time::Clock;

//
// ─── CARD METADATA ─────────────────────────────────────────────────────────────
//

/// Display data for one card, kept per session so the engine state never has
/// to carry content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardMeta {
    pub id: CardId,
    pub question: String,
    pub answer: String,
    pub question_image_url: Option<String>,
    pub answer_image_url: Option<String>,
}

impl CardMeta {
    /// A text-only card with no images.
    #[must_use]
    pub fn text_only(id: CardId, question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            id,
            question: question.into(),
            answer: answer.into(),
            question_image_url: None,
            answer_image_url: None,
        }
    }
}

//
// ─── PRACTICE SESSION ──────────────────────────────────────────────────────────
//

/// One live practice session: engine state plus ownership and card lookup.
///
/// Owned exclusively by the [`SessionStore`]; callers only ever see cloned
/// snapshots.
#[derive(Debug, Clone)]
pub struct PracticeSession {
    pub id: SessionId,
    pub owner_id: UserId,
    pub deck_id: DeckId,
    pub state: SessionState,
    pub cards: HashMap<CardId, CardMeta>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub ttl: Duration,
}

impl PracticeSession {
    /// Display data for a card in this session.
    #[must_use]
    pub fn card(&self, card_id: CardId) -> Option<&CardMeta> {
        self.cards.get(&card_id)
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.last_activity > self.ttl
    }
}

//
// ─── SESSION STORE ─────────────────────────────────────────────────────────────
//

const DEFAULT_TTL_SECS: i64 = 2 * 60 * 60;
const SWEEP_PERIOD_SECS: u64 = 10 * 60;

/// Concurrent table of live practice sessions with sliding TTL expiry.
///
/// All operations are keyed on the session id; the sharded map serializes
/// access per key. Two racing `update` calls for the same session resolve
/// last-writer-wins, which is acceptable since a session is driven by a
/// single caller at a time.
pub struct SessionStore {
    sessions: DashMap<SessionId, PracticeSession>,
    clock: Clock,
    ttl: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Clock::default_clock())
    }

    /// Store driven by the given clock, for deterministic tests.
    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
        }
    }

    /// Override the idle TTL applied to newly created sessions.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Current time according to the store's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Interval at which the background sweeper should run.
    #[must_use]
    pub fn sweep_period() -> std::time::Duration {
        std::time::Duration::from_secs(SWEEP_PERIOD_SECS)
    }

    /// Number of live (not yet swept) sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Create a session under a fresh unguessable id and return a snapshot.
    pub fn create(
        &self,
        owner_id: UserId,
        deck_id: DeckId,
        state: SessionState,
        cards: Vec<CardMeta>,
    ) -> PracticeSession {
        let id = SessionId::generate();
        let now = self.clock.now();
        let cards: HashMap<CardId, CardMeta> = cards.into_iter().map(|c| (c.id, c)).collect();

        let session = PracticeSession {
            id,
            owner_id,
            deck_id,
            state,
            cards,
            started_at: now,
            last_activity: now,
            ttl: self.ttl,
        };
        self.sessions.insert(id, session.clone());
        debug!(session_id = %id, owner = %owner_id, deck = %deck_id, "practice session created");
        session
    }

    /// Look up a session for its owner, refreshing the sliding expiration.
    ///
    /// Returns `None` for an unknown id, for a different owner (treated
    /// identically so ownership cannot be probed), and for a session idle
    /// beyond its TTL. An expired session is evicted on access.
    #[must_use]
    pub fn get(&self, session_id: SessionId, owner_id: UserId) -> Option<PracticeSession> {
        self.get_at(session_id, owner_id, self.clock.now())
    }

    /// [`SessionStore::get`] with an explicit timestamp.
    #[must_use]
    pub fn get_at(
        &self,
        session_id: SessionId,
        owner_id: UserId,
        now: DateTime<Utc>,
    ) -> Option<PracticeSession> {
        let mut expired = false;
        let snapshot = {
            let mut entry = self.sessions.get_mut(&session_id)?;
            if entry.owner_id != owner_id {
                return None;
            }
            if entry.is_expired_at(now) {
                expired = true;
                None
            } else {
                entry.last_activity = now;
                Some(entry.clone())
            }
        };

        // The map shard is unlocked here; removing inside the borrow above
        // would deadlock.
        if expired {
            self.sessions.remove(&session_id);
            debug!(session_id = %session_id, "expired practice session evicted on access");
        }
        snapshot
    }

    /// Replace a session's engine state and refresh its activity timestamp.
    ///
    /// Silently does nothing if the session no longer exists.
    pub fn update(&self, session_id: SessionId, new_state: SessionState) {
        if let Some(mut entry) = self.sessions.get_mut(&session_id) {
            entry.state = new_state;
            entry.last_activity = self.clock.now();
        }
    }

    /// Delete a session. Deleting an already-gone session is a no-op.
    pub fn remove(&self, session_id: SessionId) {
        self.sessions.remove(&session_id);
    }

    /// Evict every session idle beyond its TTL; returns the eviction count.
    pub fn sweep(&self) -> usize {
        self.sweep_at(self.clock.now())
    }

    /// [`SessionStore::sweep`] with an explicit timestamp.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, "sweep evicted idle practice sessions");
        }
        evicted
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

//
// ─── BACKGROUND SWEEPER ────────────────────────────────────────────────────────
//

/// Spawn the periodic sweep task for a store.
///
/// Runs until aborted; each tick evicts all sessions idle beyond their TTL,
/// independent of access.
pub fn spawn_sweeper(
    store: Arc<SessionStore>,
    period: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick of an interval fires immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            store.sweep();
        }
    })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
