use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    rules,
    state::{
        game::{MatchStatus, Side, ThrowEntry},
        state_machine::ConfirmedThrow,
    },
};

/// Identity returned when a match is created server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedMatch {
    /// Server-issued match id.
    pub match_id: String,
    /// Lock granted together with the match, when the server does so.
    #[serde(default)]
    pub lock: Option<MatchLock>,
}

/// Time-bounded write permission for one `(match, session)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchLock {
    /// Match the lock covers.
    pub match_id: String,
    /// Session allowed to write.
    pub session_id: String,
    /// End of the grant.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl MatchLock {
    /// Whether the grant is still valid at `now`.
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }
}

/// A throw as submitted to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrowCommand {
    /// 1-based leg number.
    pub leg_number: u32,
    /// 1-based set number.
    pub set_number: u32,
    /// 1-based round within the leg.
    pub round_number: u32,
    /// Side that threw.
    pub player: Side,
    /// Position of the visit within the round, 1 or 2.
    pub throw_index: u8,
    /// Points entered, including busted ones.
    pub score: u32,
    /// Remaining after the visit.
    pub remaining: u32,
    /// Whether the visit busted.
    pub is_bust: bool,
    /// Whether the visit started on a finishable remaining.
    pub is_checkout_attempt: bool,
    /// Whether the visit reached zero.
    pub is_winning_throw: bool,
}

impl ThrowCommand {
    /// Serialize a ledger entry for the given set.
    pub fn from_entry(entry: &ThrowEntry, set_number: u32) -> Self {
        Self {
            leg_number: entry.leg,
            set_number,
            round_number: entry.round,
            player: entry.side,
            throw_index: entry.throw_index,
            score: entry.score,
            remaining: entry.remaining_after,
            is_bust: entry.is_bust,
            is_checkout_attempt: entry.is_checkout_attempt,
            is_winning_throw: entry.is_winning_throw,
        }
    }
}

/// Throw as persisted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrowRecord {
    /// Server-issued throw id.
    pub id: String,
    /// Leg the throw was booked to.
    pub leg_number: u32,
    /// Round the throw was booked to.
    pub round_number: u32,
    /// Side that threw.
    pub player: Side,
    /// Points as accepted by the server.
    pub score: u32,
    /// Remaining as computed by the server.
    pub remaining: u32,
    /// Whether the server judged the visit a bust.
    #[serde(default)]
    pub is_bust: bool,
    /// Whether the visit won the leg.
    #[serde(default)]
    pub is_winning_throw: bool,
}

/// Completion flags attached to a recorded throw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrowMeta {
    /// The throw finished the leg.
    #[serde(default)]
    pub leg_completed: bool,
    /// The throw finished the match.
    #[serde(default)]
    pub match_completed: bool,
}

/// Response of a successful throw submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedThrow {
    /// The persisted throw.
    pub throw: ThrowRecord,
    /// Completion flags.
    #[serde(default)]
    pub meta: ThrowMeta,
}

impl RecordedThrow {
    /// Translate the server's record for the ledger round at `round_index`.
    pub fn confirm(&self, round_index: usize) -> ConfirmedThrow {
        ConfirmedThrow {
            leg: self.throw.leg_number,
            round_index,
            side: self.throw.player,
            scored: rules::recorded_score(self.throw.score, self.throw.is_bust),
            remaining: self.throw.remaining,
            leg_completed: self.meta.leg_completed || self.throw.is_winning_throw,
            match_completed: self.meta.match_completed,
        }
    }
}

/// Subset of the server's match document the core cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// Server match id.
    pub id: String,
    /// Server-side status.
    pub status: MatchStatus,
    /// Legs won by the player.
    #[serde(default)]
    pub player_legs: u32,
    /// Legs won by the opponent.
    #[serde(default)]
    pub opponent_legs: u32,
}

/// Per-player aggregates computed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    /// Side the figures belong to.
    pub player: Side,
    /// Legs won.
    #[serde(default)]
    pub legs_won: u32,
    /// Darts thrown.
    #[serde(default)]
    pub darts_thrown: u32,
    /// Average per three darts.
    #[serde(default)]
    pub three_dart_average: f64,
    /// Best single visit.
    #[serde(default)]
    pub highest_score: u32,
    /// Visits started on a finishable remaining.
    #[serde(default)]
    pub checkout_attempts: u32,
    /// Checkout attempts that won the leg.
    #[serde(default)]
    pub checkouts_hit: u32,
    /// Visits of 100 or more.
    #[serde(default)]
    pub tons: u32,
    /// Maximum visits.
    #[serde(default)]
    pub one_eighties: u32,
}

impl PlayerStats {
    /// Share of checkout attempts that were converted, in percent.
    pub fn checkout_percentage(&self) -> f64 {
        if self.checkout_attempts == 0 {
            0.0
        } else {
            f64::from(self.checkouts_hit) * 100.0 / f64::from(self.checkout_attempts)
        }
    }
}

/// Partial update of a match document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPatch {
    /// New status.
    pub match_status: MatchStatus,
}
