//! Countdown ("x01") arithmetic: bust detection, checkout flags, winning throws and the
//! re-derivation of remaining scores after a correction.
//!
//! Every function here is pure; callers own the ledger and decide what to do with the verdicts.

use crate::{
    error::MatchError,
    state::game::{Round, Side},
};

/// Highest score a single visit (three darts) can produce.
pub const MAX_VISIT_SCORE: u32 = 180;
/// Highest remaining score that can still be finished in one visit.
pub const MAX_CHECKOUT: u32 = 170;
/// Remaining scores at or below [`MAX_CHECKOUT`] that no three-dart combination can finish.
const BOGEY_NUMBERS: [u32; 7] = [159, 162, 163, 165, 166, 168, 169];

/// Outcome of scoring one visit against a remaining total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrowVerdict {
    /// Remaining score after the visit. Equal to the pre-throw remaining on a bust.
    pub remaining_after: u32,
    /// Visit was wasted by overshooting or by leaving 1.
    pub is_bust: bool,
    /// Visit started from a finishable remaining score.
    pub is_checkout_attempt: bool,
    /// Visit reached exactly zero.
    pub is_winning_throw: bool,
}

/// Validate a visit score before anything is mutated.
pub fn is_valid_throw_score(score: u32) -> bool {
    score <= MAX_VISIT_SCORE
}

/// Same as [`is_valid_throw_score`] but producing the error reported to callers.
pub fn ensure_valid_throw_score(score: u32) -> Result<u32, MatchError> {
    if is_valid_throw_score(score) {
        Ok(score)
    } else {
        Err(MatchError::InvalidScore(score))
    }
}

/// A visit busts when it overshoots or leaves exactly 1 (no double finishes on 1).
///
/// Reaching exactly zero is always accepted; how the finish was achieved is captured separately
/// through the checkout darts prompt.
pub fn is_bust(remaining: u32, thrown: u32) -> bool {
    thrown > remaining || remaining - thrown == 1
}

/// Flags a remaining score from which a single visit could finish the leg.
///
/// This only marks the attempt; it does not validate the finishing segment.
pub fn is_checkout_attempt(remaining: u32) -> bool {
    (2..=MAX_CHECKOUT).contains(&remaining) && !BOGEY_NUMBERS.contains(&remaining)
}

/// A visit wins the leg when it lands exactly on zero without busting.
pub fn is_winning_throw(remaining: u32, thrown: u32) -> bool {
    !is_bust(remaining, thrown) && remaining == thrown
}

/// Score the visit `thrown` against `remaining`.
pub fn evaluate(remaining: u32, thrown: u32) -> Result<ThrowVerdict, MatchError> {
    let thrown = ensure_valid_throw_score(thrown)?;
    let is_bust = is_bust(remaining, thrown);
    Ok(ThrowVerdict {
        remaining_after: if is_bust { remaining } else { remaining - thrown },
        is_bust,
        is_checkout_attempt: is_checkout_attempt(remaining),
        is_winning_throw: is_winning_throw(remaining, thrown),
    })
}

/// Value stored in the ledger cell for a visit: busts are recorded as zero.
pub fn recorded_score(thrown: u32, is_bust: bool) -> u32 {
    if is_bust { 0 } else { thrown }
}

/// Re-derive every `to_go` value of `side` from round `from` onwards.
///
/// Filled cells are re-scored against the corrected running total; a stored score that would now
/// bust is rewritten to zero. Unfilled cells carry the running total forward. Running it again on
/// its own output changes nothing.
pub fn recalculate_to_go_scores(rounds: &mut [Round], from: usize, side: Side, start_score: u32) {
    let mut remaining = match from {
        0 => start_score,
        index => rounds
            .get(index - 1)
            .map(|round| round.to_go(side))
            .unwrap_or(start_score),
    };

    for round in rounds.iter_mut().skip(from) {
        match round.scored(side) {
            Some(scored) if is_bust(remaining, scored) => {
                round.set_cell(side, Some(0), remaining);
            }
            Some(scored) => {
                remaining -= scored;
                round.set_cell(side, Some(scored), remaining);
            }
            None => round.set_cell(side, None, remaining),
        }
    }
}
