mod card;
mod history;
mod ids;

pub use card::Card;
pub use history::{HistoryEntry, SessionSummary};
pub use ids::{CardId, DeckId, ParseIdError, SessionId, UserId};
