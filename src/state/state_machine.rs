use thiserror::Error;

use crate::{
    error::MatchError,
    rules,
    state::game::{MatchSetup, MatchState, MatchStatus, Side, ThrowEntry},
};

/// Authoritative outcome of a throw as acknowledged by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedThrow {
    /// Leg the server recorded the throw in.
    pub leg: u32,
    /// Ledger round the throw targets.
    pub round_index: usize,
    /// Side that threw.
    pub side: Side,
    /// Points the server kept (zero on a bust).
    pub scored: u32,
    /// Remaining score after the throw.
    pub remaining: u32,
    /// The server considers the leg finished.
    pub leg_completed: bool,
    /// The server considers the whole match finished.
    pub match_completed: bool,
}

/// Events that can be applied to a [`MatchState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEvent {
    /// An identity was obtained and play begins.
    Start {
        /// Server id or local placeholder.
        match_id: String,
        /// Whether the write lock was granted.
        has_lock: bool,
    },
    /// A visit was entered into the active cell.
    Score(ThrowEntry),
    /// Move the active cell to an earlier (or the current) cell for correction.
    SelectCell {
        /// Ledger round to select.
        round_index: usize,
        /// Column to select.
        side: Side,
    },
    /// The server acknowledged a throw; its values replace the local prediction.
    ThrowConfirmed(ConfirmedThrow),
    /// Leg tallies reported by the server.
    LegCountsSynced {
        /// Legs won by the home player.
        player_legs: u32,
        /// Legs won by the visiting player.
        opponent_legs: u32,
    },
    /// Darts used for the winning visit.
    CheckoutDarts(u8),
    /// Reset the ledger for the next leg.
    NewLeg,
    /// Lock was gained or lost.
    LockChanged(bool),
    /// Halt entry temporarily.
    Pause,
    /// Resume after a pause.
    Resume,
    /// End the match.
    Complete,
}

/// Error returned when an event cannot be applied in the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?} (leg finished: {leg_finished})")]
pub struct InvalidTransition {
    /// Status when the event was received.
    pub from: MatchStatus,
    /// Whether the leg was frozen at that time.
    pub leg_finished: bool,
    /// The rejected event.
    pub event: MatchEvent,
}

/// Errors that can occur when applying an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// Event not valid from the current phase.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// Event belongs to a leg that is no longer being played.
    #[error("stale event for leg {got} (current leg {expected})")]
    StaleLeg {
        /// Leg currently being played.
        expected: u32,
        /// Leg the event was produced for.
        got: u32,
    },
}

/// Validate `setup` and produce a fresh state awaiting [`MatchEvent::Start`].
pub fn setup_match(setup: MatchSetup) -> Result<MatchState, MatchError> {
    MatchState::new(setup)
}

/// Build the throw entry for `score` against the active cell.
///
/// Returns `Ok(None)` when the state does not accept entries (leg finished, paused, not started).
pub fn build_throw_entry(state: &MatchState, score: u32) -> Result<Option<ThrowEntry>, MatchError> {
    if !state.accepts_entries() {
        return Ok(None);
    }
    let score = rules::ensure_valid_throw_score(score)?;

    let (round_index, side) = state.active_cell();
    let Some(round) = state.rounds.get(round_index) else {
        return Ok(None);
    };
    let is_correction = round.is_filled(side);
    let remaining_before = if is_correction {
        state
            .rounds
            .remaining_before(round_index, side, state.setup.starting_score)
    } else {
        state.current_display_score(side)
    };
    let verdict = rules::evaluate(remaining_before, score)?;

    Ok(Some(ThrowEntry {
        side,
        round_index,
        round: round.round,
        throw_index: 1,
        score,
        remaining_before,
        remaining_after: verdict.remaining_after,
        is_bust: verdict.is_bust,
        is_checkout_attempt: verdict.is_checkout_attempt,
        is_winning_throw: verdict.is_winning_throw,
        leg: state.current_leg,
        is_correction,
    }))
}

/// Apply `event` to `state`, returning the next state. The input is never modified.
pub fn apply(state: &MatchState, event: MatchEvent) -> Result<MatchState, ApplyError> {
    let invalid = |event: MatchEvent| {
        ApplyError::InvalidTransition(InvalidTransition {
            from: state.match_status,
            leg_finished: state.leg_finished,
            event,
        })
    };
    let mut next = state.clone();

    match event {
        MatchEvent::Start { match_id, has_lock } if state.match_status == MatchStatus::Setup => {
            next.match_id = Some(match_id);
            next.has_lock = has_lock;
            next.match_status = MatchStatus::InProgress;
        }
        MatchEvent::Score(entry) => {
            ensure_leg(state, entry.leg)?;
            if !state.accepts_entries() || state.active_cell() != (entry.round_index, entry.side) {
                return Err(invalid(MatchEvent::Score(entry)));
            }
            let scored = rules::recorded_score(entry.score, entry.is_bust);
            next.rounds.write_cell(
                entry.round_index,
                entry.side,
                scored,
                entry.remaining_after,
                state.setup.starting_score,
            );
            settle(&mut next, true);
        }
        MatchEvent::SelectCell { round_index, side }
            if state.accepts_entries() && is_selectable(state, round_index, side) =>
        {
            next.active_round_index = round_index;
            next.active_player = side;
        }
        MatchEvent::ThrowConfirmed(confirmed) => {
            ensure_leg(state, confirmed.leg)?;
            if confirmed.round_index >= state.rounds.len() {
                return Err(invalid(MatchEvent::ThrowConfirmed(confirmed)));
            }
            reconcile(&mut next, &confirmed);
        }
        MatchEvent::LegCountsSynced {
            player_legs,
            opponent_legs,
        } => {
            next.player_legs = player_legs;
            next.opponent_legs = opponent_legs;
        }
        MatchEvent::CheckoutDarts(darts)
            if state.leg_finished && state.winner.is_some() && (1..=3).contains(&darts) =>
        {
            next.checkout_darts = Some(darts);
        }
        MatchEvent::NewLeg
            if state.leg_finished && state.match_status == MatchStatus::InProgress =>
        {
            next.rounds.reset(state.setup.starting_score);
            next.active_round_index = 0;
            next.active_player = Side::Player;
            next.leg_finished = false;
            next.winner = None;
            next.checkout_darts = None;
            next.current_leg += 1;
        }
        MatchEvent::LockChanged(has_lock) => next.has_lock = has_lock,
        MatchEvent::Pause if state.match_status == MatchStatus::InProgress => {
            next.match_status = MatchStatus::Paused;
        }
        MatchEvent::Resume if state.match_status == MatchStatus::Paused => {
            next.match_status = MatchStatus::InProgress;
        }
        MatchEvent::Complete if state.match_status != MatchStatus::Completed => {
            next.match_status = MatchStatus::Completed;
        }
        other => return Err(invalid(other)),
    }

    Ok(next)
}

fn ensure_leg(state: &MatchState, leg: u32) -> Result<(), ApplyError> {
    if state.current_leg == leg {
        Ok(())
    } else {
        Err(ApplyError::StaleLeg {
            expected: state.current_leg,
            got: leg,
        })
    }
}

/// Filled cells and the first unfilled cell can be selected; later empty cells cannot.
fn is_selectable(state: &MatchState, round_index: usize, side: Side) -> bool {
    let Some(round) = state.rounds.get(round_index) else {
        return false;
    };
    round.is_filled(side) || state.rounds.next_unfilled() == Some((round_index, side))
}

/// After a ledger write: finish the leg when someone reached zero, otherwise move the active cell
/// to the next unfilled cell, growing the ledger or enforcing the round limit.
fn settle(state: &mut MatchState, detect_finish: bool) {
    if detect_finish {
        if let Some(winner) = state.rounds.finished_side() {
            finish_leg(state, Some(winner));
            return;
        }
    }

    if let Some((index, side)) = state.rounds.next_unfilled() {
        state.active_round_index = index;
        state.active_player = side;
        return;
    }

    let limit_reached = state
        .setup
        .round_limit
        .is_some_and(|limit| state.rounds.len() >= limit as usize);
    if limit_reached {
        let player = state.rounds.current_remaining(Side::Player);
        let opponent = state.rounds.current_remaining(Side::Opponent);
        let winner = match player.cmp(&opponent) {
            std::cmp::Ordering::Less => Some(Side::Player),
            std::cmp::Ordering::Greater => Some(Side::Opponent),
            std::cmp::Ordering::Equal => None,
        };
        finish_leg(state, winner);
        return;
    }

    state.active_round_index = state.rounds.push_round();
    state.active_player = Side::Player;
}

fn finish_leg(state: &mut MatchState, winner: Option<Side>) {
    state.leg_finished = true;
    state.winner = winner;
    if let Some(side) = winner {
        *state.legs_mut(side) += 1;
        if state
            .setup
            .legs_to_win
            .is_some_and(|needed| state.legs(side) >= needed)
        {
            state.match_status = MatchStatus::Completed;
        }
    }
}

/// Undo a locally predicted leg finish the server did not confirm.
fn reopen_leg(state: &mut MatchState) {
    if let Some(side) = state.winner.take() {
        let legs = state.legs_mut(side);
        *legs = legs.saturating_sub(1);
    }
    state.leg_finished = false;
    state.checkout_darts = None;
    if state.match_status == MatchStatus::Completed {
        state.match_status = MatchStatus::InProgress;
    }
}

/// Replace the predicted cell with the server's values; server completion flags win.
fn reconcile(state: &mut MatchState, confirmed: &ConfirmedThrow) {
    let starting_score = state.setup.starting_score;
    state.rounds.write_cell(
        confirmed.round_index,
        confirmed.side,
        confirmed.scored,
        confirmed.remaining,
        starting_score,
    );

    match (confirmed.leg_completed, state.leg_finished) {
        (true, true) if state.winner == Some(confirmed.side) => {}
        (true, _) => {
            if state.leg_finished {
                reopen_leg(state);
            }
            finish_leg(state, Some(confirmed.side));
        }
        (false, true) => {
            // A finish owned by another visit stands.
            let finish = state.rounds.finishing_cell();
            if finish.is_none() || finish == Some((confirmed.round_index, confirmed.side)) {
                reopen_leg(state);
                settle(state, false);
            }
        }
        (false, false) => {}
    }

    if confirmed.match_completed {
        state.match_status = MatchStatus::Completed;
    }
}
