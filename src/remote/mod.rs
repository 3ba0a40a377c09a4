//! Contract of the server-side match API consumed by the sync layer.

#[cfg(test)]
pub(crate) mod fake;
/// `reqwest` implementation of [`MatchApi`].
#[cfg(feature = "http-api")]
pub mod http;
/// Payloads exchanged with the match API.
pub mod models;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::state::game::MatchSetup;

use self::models::{
    CreatedMatch, MatchLock, MatchPatch, MatchSnapshot, PlayerStats, RecordedThrow, ThrowCommand,
};

/// Result alias for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure of a remote call, independent of the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Server answered with a non-success status.
    #[error("API returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Server-provided message.
        message: String,
    },
    /// Request never produced a response.
    #[error("network failure: {0}")]
    Network(String),
    /// Another session holds the match lock.
    #[error("match lock held by another session")]
    LockUnavailable,
}

/// Server-authoritative match operations. Every call is tagged with the caller's session id.
pub trait MatchApi: Send + Sync {
    /// Create a match; the server may grant the lock in the same call.
    fn create_match(
        &self,
        setup: MatchSetup,
        match_type_id: u32,
        session_id: String,
    ) -> BoxFuture<'static, RemoteResult<CreatedMatch>>;
    /// Request the write lock. `forced` takes it over from another session.
    fn acquire_lock(
        &self,
        match_id: String,
        session_id: String,
        forced: bool,
    ) -> BoxFuture<'static, RemoteResult<MatchLock>>;
    /// Give up the write lock held by `session_id`.
    fn release_lock(
        &self,
        match_id: String,
        session_id: String,
    ) -> BoxFuture<'static, RemoteResult<()>>;
    /// Record one visit. Requires the lock.
    fn record_throw(
        &self,
        match_id: String,
        command: ThrowCommand,
        session_id: String,
    ) -> BoxFuture<'static, RemoteResult<RecordedThrow>>;
    /// Read the match document, expanding the relations listed in `include`.
    fn get_match(
        &self,
        match_id: String,
        session_id: String,
        include: Vec<String>,
    ) -> BoxFuture<'static, RemoteResult<MatchSnapshot>>;
    /// Per-player statistics, for one leg or the whole match.
    fn get_match_stats(
        &self,
        match_id: String,
        leg: Option<u32>,
        session_id: String,
    ) -> BoxFuture<'static, RemoteResult<Vec<PlayerStats>>>;
    /// Mark the match finished server-side.
    fn end_match(&self, match_id: String, session_id: String)
    -> BoxFuture<'static, RemoteResult<()>>;
    /// Apply a partial update, currently the match status.
    fn update_match(
        &self,
        match_id: String,
        patch: MatchPatch,
        session_id: String,
    ) -> BoxFuture<'static, RemoteResult<()>>;
}
