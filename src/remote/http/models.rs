use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{remote::models::MatchLock, state::game::MatchSetup};

/// `{ "data": ..., "meta": ... }` envelope wrapping every successful response.
#[derive(Debug, Deserialize)]
pub struct Envelope<T, M = serde_json::Value> {
    /// Primary payload.
    pub data: T,
    /// Side information such as completion flags or a granted lock.
    pub meta: Option<M>,
}

/// Error body returned alongside non-success statuses.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
    /// Short error code, used when no message is given.
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// Best available description of the failure.
    pub fn into_message(self) -> String {
        self.message
            .or(self.error)
            .unwrap_or_else(|| "no error message".to_string())
    }
}

/// Body of the match creation request.
#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct CreateMatchBody<'a> {
    /// Server-side match type.
    pub match_type_id: u32,
    /// Name of the first side.
    pub player_name: &'a str,
    /// Name of the second side.
    pub opponent_name: &'a str,
    /// Score each leg starts from.
    pub starting_score: u32,
    /// Optional round cap per leg.
    pub round_limit: Option<u32>,
    /// Optional number of legs needed to win.
    pub legs_to_win: Option<u32>,
    /// Ask for the write lock in the same call.
    pub acquire_lock: bool,
}

impl<'a> CreateMatchBody<'a> {
    /// Body for `setup`, always requesting the lock.
    pub fn new(setup: &'a MatchSetup, match_type_id: u32) -> Self {
        Self {
            match_type_id,
            player_name: &setup.player_name,
            opponent_name: &setup.opponent_name,
            starting_score: setup.starting_score,
            round_limit: setup.round_limit,
            legs_to_win: setup.legs_to_win,
            acquire_lock: true,
        }
    }
}

/// `data` of the match creation response.
#[derive(Debug, Deserialize)]
pub struct CreatedMatchData {
    /// Server-issued match id.
    pub id: String,
}

/// `meta` of the match creation response.
#[derive(Debug, Deserialize)]
pub struct CreatedMatchMeta {
    /// Lock granted with the match, if any.
    #[serde(default)]
    pub lock: Option<MatchLock>,
}

/// Body of the lock request.
#[derive(Debug, Serialize)]
pub struct AcquireLockBody {
    /// Take the lock over from another session.
    pub forced: bool,
}
