//! Darts match scoring engine: score rules, the round ledger, the match state machine, and
//! lock-aware synchronization with a remote match service backed by local persistence.

pub mod config;
/// On-device storage.
pub mod dao;
/// Error type surfaced by controller operations.
pub mod error;
pub mod remote;
pub mod rules;
/// Coordination between local state and the remote API.
pub mod services;
pub mod state;

pub use config::{AppConfig, MatchContext};
pub use error::MatchError;
pub use state::{MatchController, ScoreOutcome, SharedController};
