use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{error::MatchError, state::ledger::RoundLedger};

/// Prefix marking a match id that was generated on this device and never reached the server.
pub const LOCAL_MATCH_PREFIX: &str = "local-";

/// One of the two participants of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The home player (left column of the ledger).
    Player,
    /// The visiting player (right column of the ledger).
    Opponent,
}

impl Side {
    /// The side throwing after this one.
    pub fn other(self) -> Self {
        match self {
            Side::Player => Side::Opponent,
            Side::Opponent => Side::Player,
        }
    }
}

/// Immutable input describing a match before it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MatchSetup {
    /// Display name of the home player.
    #[validate(length(min = 1, max = 64))]
    pub player_name: String,
    /// Display name of the visiting player.
    #[validate(length(min = 1, max = 64))]
    pub opponent_name: String,
    /// Countdown target, e.g. 501.
    #[validate(range(min = 2, max = 1001))]
    pub starting_score: u32,
    /// Maximum number of rounds per leg, if bounded.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub round_limit: Option<u32>,
    /// Legs needed to win the match. Unbounded when absent.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub legs_to_win: Option<u32>,
}

impl MatchSetup {
    /// Two-player setup with no round limit and open-ended leg count.
    pub fn new(
        player_name: impl Into<String>,
        opponent_name: impl Into<String>,
        starting_score: u32,
    ) -> Self {
        Self {
            player_name: player_name.into(),
            opponent_name: opponent_name.into(),
            starting_score,
            round_limit: None,
            legs_to_win: None,
        }
    }

    /// Display name for `side`.
    pub fn name_of(&self, side: Side) -> &str {
        match side {
            Side::Player => &self.player_name,
            Side::Opponent => &self.opponent_name,
        }
    }
}

/// One round of the ledger: a cell per player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    /// One-based round number.
    pub round: u32,
    /// Points recorded for the home player, `None` while the cell is unfilled.
    pub player1_scored: Option<u32>,
    /// Home player's remaining score after this round.
    pub player1_to_go: u32,
    /// Points recorded for the visiting player, `None` while the cell is unfilled.
    pub player2_scored: Option<u32>,
    /// Visiting player's remaining score after this round.
    pub player2_to_go: u32,
}

impl Round {
    /// Unfilled round carrying forward both remaining scores.
    pub fn empty(round: u32, player1_to_go: u32, player2_to_go: u32) -> Self {
        Self {
            round,
            player1_scored: None,
            player1_to_go,
            player2_scored: None,
            player2_to_go,
        }
    }

    /// Recorded score of `side`.
    pub fn scored(&self, side: Side) -> Option<u32> {
        match side {
            Side::Player => self.player1_scored,
            Side::Opponent => self.player2_scored,
        }
    }

    /// Remaining score of `side` after this round.
    pub fn to_go(&self, side: Side) -> u32 {
        match side {
            Side::Player => self.player1_to_go,
            Side::Opponent => self.player2_to_go,
        }
    }

    /// Overwrite the cell of `side`.
    pub fn set_cell(&mut self, side: Side, scored: Option<u32>, to_go: u32) {
        match side {
            Side::Player => {
                self.player1_scored = scored;
                self.player1_to_go = to_go;
            }
            Side::Opponent => {
                self.player2_scored = scored;
                self.player2_to_go = to_go;
            }
        }
    }

    /// Whether `side` already has a value in this round.
    pub fn is_filled(&self, side: Side) -> bool {
        self.scored(side).is_some()
    }
}

/// A single submitted visit, the unit of work applied to the ledger and forwarded to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrowEntry {
    /// Side that threw.
    pub side: Side,
    /// Zero-based index of the ledger round the entry targets.
    pub round_index: usize,
    /// One-based round number.
    pub round: u32,
    /// Dart index within the visit (whole-visit entry, so always 1..=3).
    pub throw_index: u8,
    /// Raw score typed in, before bust handling.
    pub score: u32,
    /// Remaining score before the visit.
    pub remaining_before: u32,
    /// Remaining score after the visit.
    pub remaining_after: u32,
    /// Overshoot or leave-one.
    pub is_bust: bool,
    /// Visit started on a finishable score.
    pub is_checkout_attempt: bool,
    /// Visit reached zero.
    pub is_winning_throw: bool,
    /// Leg the entry belongs to.
    pub leg: u32,
    /// Entry overwrites an already filled cell.
    pub is_correction: bool,
}

/// Lifecycle status of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Built but not started; no identity yet.
    Setup,
    /// Accepting score entries.
    InProgress,
    /// Temporarily halted by the user.
    Paused,
    /// Finished; entries are rejected.
    Completed,
}

/// The aggregate owned by the match state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    /// Players and rules fixed at creation.
    pub setup: MatchSetup,
    /// Rounds of the current leg.
    pub rounds: RoundLedger,
    /// Zero-based index of the round holding the active cell.
    pub active_round_index: usize,
    /// Side owning the active cell.
    pub active_player: Side,
    /// Legs won by the home player.
    pub player_legs: u32,
    /// Legs won by the visiting player.
    pub opponent_legs: u32,
    /// One-based number of the leg being played.
    pub current_leg: u32,
    /// One-based set number (single-set matches keep this at 1).
    pub current_set: u32,
    /// Entry is frozen until the next leg starts.
    pub leg_finished: bool,
    /// Winner of the current leg once it is finished.
    pub winner: Option<Side>,
    /// Darts used in the finishing visit, captured after a win.
    pub checkout_darts: Option<u8>,
    /// Lifecycle status.
    pub match_status: MatchStatus,
    /// Server id, a [`LOCAL_MATCH_PREFIX`] placeholder, or nothing before start.
    pub match_id: Option<String>,
    /// This session believes it holds the write lock.
    pub has_lock: bool,
}

impl MatchState {
    /// Fresh state in the `setup` phase with one empty round.
    pub fn new(setup: MatchSetup) -> Result<Self, MatchError> {
        setup.validate()?;
        let rounds = RoundLedger::new(setup.starting_score);
        Ok(Self {
            setup,
            rounds,
            active_round_index: 0,
            active_player: Side::Player,
            player_legs: 0,
            opponent_legs: 0,
            current_leg: 1,
            current_set: 1,
            leg_finished: false,
            winner: None,
            checkout_darts: None,
            match_status: MatchStatus::Setup,
            match_id: None,
            has_lock: false,
        })
    }

    /// Legs won by `side`.
    pub fn legs(&self, side: Side) -> u32 {
        match side {
            Side::Player => self.player_legs,
            Side::Opponent => self.opponent_legs,
        }
    }

    pub(crate) fn legs_mut(&mut self, side: Side) -> &mut u32 {
        match side {
            Side::Player => &mut self.player_legs,
            Side::Opponent => &mut self.opponent_legs,
        }
    }

    /// Remaining score shown for `side`: the last filled value, or the starting score.
    pub fn current_display_score(&self, side: Side) -> u32 {
        self.rounds.current_remaining(side)
    }

    /// `(round_index, side)` of the cell the next entry fills.
    pub fn active_cell(&self) -> (usize, Side) {
        (self.active_round_index, self.active_player)
    }

    /// True when the match id was minted locally rather than by the server.
    pub fn is_local_only(&self) -> bool {
        self.match_id
            .as_deref()
            .is_none_or(|id| id.starts_with(LOCAL_MATCH_PREFIX))
    }

    /// Server-issued match id, if any.
    pub fn remote_match_id(&self) -> Option<&str> {
        self.match_id
            .as_deref()
            .filter(|id| !id.starts_with(LOCAL_MATCH_PREFIX))
    }

    /// Whether the current leg still accepts entries.
    pub fn accepts_entries(&self) -> bool {
        self.match_status == MatchStatus::InProgress && !self.leg_finished
    }
}

/// Locally generated placeholder id used when the server cannot be reached.
pub fn local_match_id() -> String {
    format!("{LOCAL_MATCH_PREFIX}{}", uuid::Uuid::new_v4().simple())
}
