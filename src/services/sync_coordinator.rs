//! Decides per operation whether the server is written to, and degrades to local-only mode when
//! it cannot be. None of the calls here ever make the match unusable: failures are logged and
//! reported back as values.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use time::OffsetDateTime;
use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    config::MatchContext,
    error::MatchError,
    remote::{
        MatchApi, RemoteError, RemoteResult,
        models::{MatchLock, MatchPatch, PlayerStats, ThrowCommand},
    },
    state::{
        game::{MatchSetup, MatchState, MatchStatus, ThrowEntry, local_match_id},
        state_machine::ConfirmedThrow,
    },
};

/// Include list requested when re-reading leg tallies.
const LEG_INCLUDES: [&str; 1] = ["legs"];

/// Match identity obtained when a match starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchIdentity {
    /// Server id, or a locally generated placeholder.
    pub match_id: String,
    /// Whether this session may write authoritative throws.
    pub has_lock: bool,
}

/// Where a remote write goes, captured from the state before any await.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    /// Server-issued match id.
    pub match_id: String,
    /// Set number the throw belongs to.
    pub set_number: u32,
}

/// Result of routing one throw.
#[derive(Debug)]
pub enum SyncOutcome {
    /// No remote write was attempted.
    LocalOnly,
    /// Server accepted the throw; its values should replace the prediction.
    Reconciled(ConfirmedThrow),
    /// Remote write failed; the local mutation stands for this operation.
    Failed(MatchError),
}

/// Routes match operations to the remote API when this session holds the lock.
pub struct SyncCoordinator {
    api: Option<Arc<dyn MatchApi>>,
    session_id: String,
    match_type_id: u32,
    remote_timeout: Option<Duration>,
    write_gate: Mutex<()>,
}

impl SyncCoordinator {
    /// Build a coordinator. Without an API every operation stays local.
    pub fn new(api: Option<Arc<dyn MatchApi>>, context: &MatchContext) -> Self {
        Self {
            api,
            session_id: context.session_id.clone(),
            match_type_id: context.match_type_id,
            remote_timeout: context.remote_timeout,
            write_gate: Mutex::new(()),
        }
    }

    /// Session id used as the lock ownership key.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether a remote API is configured at all.
    pub fn is_connected(&self) -> bool {
        self.api.is_some()
    }

    /// Remote write target for `state`, or `None` when the state must be mutated locally only.
    pub fn remote_target(&self, state: &MatchState) -> Option<RemoteTarget> {
        if self.api.is_none() || !state.has_lock {
            return None;
        }
        state.remote_match_id().map(|match_id| RemoteTarget {
            match_id: match_id.to_string(),
            set_number: state.current_set,
        })
    }

    /// Create the match server-side and try to obtain the write lock.
    ///
    /// Any failure yields a local placeholder identity.
    pub async fn acquire_identity(&self, setup: &MatchSetup) -> MatchIdentity {
        let Some(api) = self.api.as_ref() else {
            return Self::local_identity();
        };

        let created = match self
            .call(api.create_match(setup.clone(), self.match_type_id, self.session_id.clone()))
            .await
        {
            Ok(created) => created,
            Err(err) => {
                warn!(error = %err, "failed to create remote match; continuing in local-only mode");
                return Self::local_identity();
            }
        };

        let has_lock = match created.lock {
            Some(lock) => self.owns(&lock),
            None => self.try_acquire_lock(&created.match_id).await,
        };
        info!(match_id = %created.match_id, has_lock, "remote match created");

        MatchIdentity {
            match_id: created.match_id,
            has_lock,
        }
    }

    /// Single, non-forced attempt at the match lock. Failure is a normal outcome.
    pub async fn try_acquire_lock(&self, match_id: &str) -> bool {
        let Some(api) = self.api.as_ref() else {
            return false;
        };

        match self
            .call(api.acquire_lock(match_id.to_string(), self.session_id.clone(), false))
            .await
        {
            Ok(lock) => self.owns(&lock),
            Err(RemoteError::LockUnavailable) => {
                info!(%match_id, "match lock held elsewhere; running local-only");
                false
            }
            Err(err) => {
                warn!(%match_id, error = %err, "lock acquisition failed; running local-only");
                false
            }
        }
    }

    /// Forward a throw to the server. Writes are sent in submission order.
    pub async fn submit_throw(&self, target: &RemoteTarget, entry: &ThrowEntry) -> SyncOutcome {
        let Some(api) = self.api.as_ref() else {
            return SyncOutcome::LocalOnly;
        };

        let _ordered = self.write_gate.lock().await;
        let command = ThrowCommand::from_entry(entry, target.set_number);
        match self
            .call(api.record_throw(target.match_id.clone(), command, self.session_id.clone()))
            .await
        {
            Ok(recorded) => {
                debug!(
                    match_id = %target.match_id,
                    throw_id = %recorded.throw.id,
                    leg_completed = recorded.meta.leg_completed,
                    "throw recorded remotely"
                );
                SyncOutcome::Reconciled(recorded.confirm(entry.round_index))
            }
            Err(err) => {
                warn!(
                    match_id = %target.match_id,
                    round = entry.round,
                    error = %err,
                    "remote throw failed; keeping local entry"
                );
                SyncOutcome::Failed(err.into())
            }
        }
    }

    /// Authoritative leg tallies, or `None` when they cannot be fetched.
    pub async fn fetch_leg_counts(&self, match_id: &str) -> Option<(u32, u32)> {
        let api = self.api.as_ref()?;
        let include = LEG_INCLUDES.iter().map(|s| s.to_string()).collect();
        match self
            .call(api.get_match(match_id.to_string(), self.session_id.clone(), include))
            .await
        {
            Ok(snapshot) => Some((snapshot.player_legs, snapshot.opponent_legs)),
            Err(err) => {
                warn!(%match_id, error = %err, "could not refresh leg counts; keeping local tally");
                None
            }
        }
    }

    /// Server-side per-player stats. Local-only matches have none.
    pub async fn fetch_stats(
        &self,
        state: &MatchState,
        leg: Option<u32>,
    ) -> Result<Vec<PlayerStats>, MatchError> {
        let (Some(api), Some(match_id)) = (self.api.as_ref(), state.remote_match_id()) else {
            return Ok(Vec::new());
        };
        self.call(api.get_match_stats(match_id.to_string(), leg, self.session_id.clone()))
            .await
            .map_err(Into::into)
    }

    /// Best-effort status update.
    pub async fn update_status(&self, target: &RemoteTarget, status: MatchStatus) {
        let Some(api) = self.api.as_ref() else {
            return;
        };
        let patch = MatchPatch {
            match_status: status,
        };
        if let Err(err) = self
            .call(api.update_match(target.match_id.clone(), patch, self.session_id.clone()))
            .await
        {
            warn!(match_id = %target.match_id, ?status, error = %err, "failed to update remote match status");
        }
    }

    /// Best-effort end of the remote match.
    pub async fn end_match(&self, target: &RemoteTarget) {
        let Some(api) = self.api.as_ref() else {
            return;
        };
        if let Err(err) = self
            .call(api.end_match(target.match_id.clone(), self.session_id.clone()))
            .await
        {
            warn!(match_id = %target.match_id, error = %err, "failed to end remote match");
        }
    }

    /// Best-effort lock release; errors are logged and dropped.
    pub async fn release_lock(&self, match_id: &str) {
        let Some(api) = self.api.as_ref() else {
            return;
        };
        match self
            .call(api.release_lock(match_id.to_string(), self.session_id.clone()))
            .await
        {
            Ok(()) => debug!(%match_id, "match lock released"),
            Err(err) => warn!(%match_id, error = %err, "failed to release match lock"),
        }
    }

    async fn call<T>(&self, request: BoxFuture<'static, RemoteResult<T>>) -> RemoteResult<T> {
        match self.remote_timeout {
            Some(limit) => timeout(limit, request)
                .await
                .unwrap_or_else(|_| Err(RemoteError::Network(format!("timed out after {limit:?}")))),
            None => request.await,
        }
    }

    fn owns(&self, lock: &MatchLock) -> bool {
        lock.session_id == self.session_id && lock.is_valid_at(OffsetDateTime::now_utc())
    }

    fn local_identity() -> MatchIdentity {
        MatchIdentity {
            match_id: local_match_id(),
            has_lock: false,
        }
    }
}
