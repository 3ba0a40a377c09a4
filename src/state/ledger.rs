//! The round-by-round record of a leg.

use serde::{Deserialize, Serialize};

use crate::{
    rules,
    state::game::{Round, Side},
};

/// Ordered rounds of one leg. Always holds at least one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundLedger {
    rounds: Vec<Round>,
}

impl RoundLedger {
    /// A ledger with a single empty round at `starting_score`.
    pub fn new(starting_score: u32) -> Self {
        Self {
            rounds: vec![Round::empty(1, starting_score, starting_score)],
        }
    }

    /// Number of rounds, filled or not.
    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    /// Always `false` for ledgers built through [`RoundLedger::new`].
    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Round at `index`.
    pub fn get(&self, index: usize) -> Option<&Round> {
        self.rounds.get(index)
    }

    /// Rounds in play order.
    pub fn iter(&self) -> impl Iterator<Item = &Round> {
        self.rounds.iter()
    }

    /// Remaining score of `side` before round `index` is thrown.
    pub fn remaining_before(&self, index: usize, side: Side, starting_score: u32) -> u32 {
        match index {
            0 => starting_score,
            index => self
                .rounds
                .get(index - 1)
                .map(|round| round.to_go(side))
                .unwrap_or(starting_score),
        }
    }

    /// Remaining score after the last filled cell of `side`.
    pub fn current_remaining(&self, side: Side) -> u32 {
        self.rounds
            .iter()
            .rev()
            .find(|round| round.is_filled(side))
            .or_else(|| self.rounds.first())
            .map(|round| round.to_go(side))
            .unwrap_or_default()
    }

    /// First unfilled cell in throwing order (home before visitor within a round).
    pub fn next_unfilled(&self) -> Option<(usize, Side)> {
        self.rounds.iter().enumerate().find_map(|(index, round)| {
            [Side::Player, Side::Opponent]
                .into_iter()
                .find(|side| !round.is_filled(*side))
                .map(|side| (index, side))
        })
    }

    /// Append an empty round carrying both players' current remaining scores.
    pub fn push_round(&mut self) -> usize {
        let next = self.rounds.len() as u32 + 1;
        let round = Round::empty(
            next,
            self.current_remaining(Side::Player),
            self.current_remaining(Side::Opponent),
        );
        self.rounds.push(round);
        self.rounds.len() - 1
    }

    /// Write a cell and re-derive the rest of that side's column.
    ///
    /// Returns `false` without touching anything when `index` is out of range.
    pub fn write_cell(
        &mut self,
        index: usize,
        side: Side,
        scored: u32,
        to_go: u32,
        starting_score: u32,
    ) -> bool {
        let Some(round) = self.rounds.get_mut(index) else {
            return false;
        };
        round.set_cell(side, Some(scored), to_go);
        rules::recalculate_to_go_scores(&mut self.rounds, index + 1, side, starting_score);
        true
    }

    /// Side whose filled column reached zero, if any.
    pub fn finished_side(&self) -> Option<Side> {
        self.finishing_cell().map(|(_, side)| side)
    }

    /// First filled cell, in throwing order, that brought its side to zero.
    pub fn finishing_cell(&self) -> Option<(usize, Side)> {
        self.rounds.iter().enumerate().find_map(|(index, round)| {
            [Side::Player, Side::Opponent]
                .into_iter()
                .find(|side| round.is_filled(*side) && round.to_go(*side) == 0)
                .map(|side| (index, side))
        })
    }

    /// Whether every cell of every round is filled.
    pub fn is_full(&self) -> bool {
        self.next_unfilled().is_none()
    }

    /// Drop everything and start over at `starting_score`.
    pub fn reset(&mut self, starting_score: u32) {
        *self = Self::new(starting_score);
    }
}
