//! Match state and the controller owning it.

/// Match data model.
pub mod game;
/// Round-by-round score ledger.
pub mod ledger;
/// Pure transitions between match states.
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    config::MatchContext,
    dao::local::LocalPersistence,
    error::MatchError,
    remote::{MatchApi, models::PlayerStats},
    services::sync_coordinator::{RemoteTarget, SyncCoordinator, SyncOutcome},
    state::{
        game::{MatchSetup, MatchState, MatchStatus, Side},
        state_machine::{
            ApplyError, ConfirmedThrow, MatchEvent, apply, build_throw_entry, setup_match,
        },
    },
};

/// Shared handle to the controller.
pub type SharedController = Arc<MatchController>;

/// What happened to a score entry.
#[derive(Debug)]
pub enum ScoreOutcome {
    /// Entry was dropped: no match, not in progress, or the leg is finished.
    Ignored,
    /// Applied to the local state only.
    LocalOnly,
    /// Applied locally, then replaced by the server's authoritative values.
    Reconciled(ConfirmedThrow),
    /// Server accepted the throw but the state moved on (new leg or new match) before the answer.
    Superseded,
    /// Applied locally; the remote write failed and is reported for display.
    Failed(MatchError),
}

/// Owns the state of the match played on this device and serializes access to it.
pub struct MatchController {
    state: RwLock<Option<MatchState>>,
    sync: SyncCoordinator,
    persistence: LocalPersistence,
    auto_save: bool,
}

impl MatchController {
    /// Construct a controller wrapped in an [`Arc`]. Pass `None` as `api` for offline use.
    pub fn new(
        context: MatchContext,
        persistence: LocalPersistence,
        api: Option<Arc<dyn MatchApi>>,
    ) -> SharedController {
        Arc::new(Self {
            state: RwLock::new(None),
            sync: SyncCoordinator::new(api, &context),
            persistence,
            auto_save: context.auto_save,
        })
    }

    /// Copy of the current state, if a match is set up.
    pub async fn snapshot(&self) -> Option<MatchState> {
        self.state.read().await.clone()
    }

    /// Session id used for lock ownership.
    pub fn session_id(&self) -> &str {
        self.sync.session_id()
    }

    /// Remaining score displayed for `side`.
    pub async fn current_display_score(&self, side: Side) -> Option<u32> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|state| state.current_display_score(side))
    }

    /// Replace whatever is loaded with a fresh match in the `setup` phase.
    pub async fn setup_match(&self, setup: MatchSetup) -> Result<MatchState, MatchError> {
        let state = setup_match(setup)?;
        let mut slot = self.state.write().await;
        *slot = Some(state.clone());
        self.autosave(&state);
        Ok(state)
    }

    /// Load the persisted match, trying once to regain the lock of a remote match.
    ///
    /// When only the setup survived, a fresh match is set up from it.
    pub async fn restore(&self) -> Result<Option<MatchState>, MatchError> {
        let Some(loaded) = self.persistence.load_match_state()? else {
            return match self.persistence.load_match_setup()? {
                Some(setup) => {
                    info!(
                        player = %setup.player_name,
                        opponent = %setup.opponent_name,
                        "restored match setup"
                    );
                    self.setup_match(setup).await.map(Some)
                }
                None => Ok(None),
            };
        };
        let lock_candidate = loaded
            .remote_match_id()
            .filter(|_| {
                self.sync.is_connected()
                    && !loaded.has_lock
                    && loaded.match_status != MatchStatus::Completed
            })
            .map(str::to_string);
        {
            let mut slot = self.state.write().await;
            *slot = Some(loaded.clone());
        }
        info!(match_id = ?loaded.match_id, leg = loaded.current_leg, "restored match state");

        let Some(match_id) = lock_candidate else {
            return Ok(Some(loaded));
        };
        if !self.sync.try_acquire_lock(&match_id).await {
            return Ok(Some(loaded));
        }

        let restored = self
            .mutate(|state| {
                if state.match_id.as_deref() != Some(match_id.as_str()) {
                    return Ok(state.clone());
                }
                Ok(apply(state, MatchEvent::LockChanged(true))?)
            })
            .await?;
        Ok(Some(restored))
    }

    /// Obtain a match identity and move to `in_progress`.
    ///
    /// Remote failures never fail the start: the match then runs under a local placeholder id.
    pub async fn start_match(&self) -> Result<MatchState, MatchError> {
        let setup = {
            let slot = self.state.read().await;
            match slot.as_ref() {
                Some(state) if state.match_status == MatchStatus::Setup => state.setup.clone(),
                Some(state) => {
                    return Err(MatchError::InvalidState(format!(
                        "match already started (status {:?})",
                        state.match_status
                    )));
                }
                None => return Err(MatchError::InvalidState("no match set up".into())),
            }
        };

        let identity = self.sync.acquire_identity(&setup).await;
        let event = MatchEvent::Start {
            match_id: identity.match_id.clone(),
            has_lock: identity.has_lock,
        };
        match self.mutate(|state| Ok(apply(state, event)?)).await {
            Ok(state) => {
                info!(match_id = %identity.match_id, has_lock = identity.has_lock, "match started");
                Ok(state)
            }
            Err(err) => {
                if identity.has_lock {
                    self.sync.release_lock(&identity.match_id).await;
                }
                Err(err)
            }
        }
    }

    /// Enter a visit score for the active cell.
    ///
    /// The entry is applied locally before any network call; a remote write, when this session
    /// holds the lock, then reconciles the cell with the server's values. Only an out-of-range
    /// score is returned as an error.
    pub async fn enter_score(&self, score: u32) -> Result<ScoreOutcome, MatchError> {
        let (entry, target) = {
            let mut slot = self.state.write().await;
            let Some(state) = slot.as_mut() else {
                return Ok(ScoreOutcome::Ignored);
            };
            let Some(entry) = build_throw_entry(state, score)? else {
                debug!(score, "score ignored; match not accepting entries");
                return Ok(ScoreOutcome::Ignored);
            };
            *state = apply(state, MatchEvent::Score(entry.clone()))?;
            self.autosave(state);
            (entry, self.sync.remote_target(state))
        };

        let Some(target) = target else {
            return Ok(ScoreOutcome::LocalOnly);
        };

        match self.sync.submit_throw(&target, &entry).await {
            SyncOutcome::LocalOnly => Ok(ScoreOutcome::LocalOnly),
            SyncOutcome::Reconciled(confirmed) => {
                let outcome = self.reconcile(&target, confirmed).await;
                if matches!(outcome, ScoreOutcome::Reconciled(_)) && self.is_completed().await {
                    self.sync.end_match(&target).await;
                }
                Ok(outcome)
            }
            SyncOutcome::Failed(MatchError::LockUnavailable) => {
                self.drop_lock(&target).await;
                Ok(ScoreOutcome::Failed(MatchError::LockUnavailable))
            }
            SyncOutcome::Failed(err) => Ok(ScoreOutcome::Failed(err)),
        }
    }

    /// Point the active cell at `(round_index, side)` so the next entry corrects it.
    ///
    /// Returns `false` when entries are currently not accepted.
    pub async fn handle_cell_click(
        &self,
        round_index: usize,
        side: Side,
    ) -> Result<bool, MatchError> {
        let mut slot = self.state.write().await;
        let Some(state) = slot.as_mut() else {
            return Ok(false);
        };
        if !state.accepts_entries() {
            return Ok(false);
        }
        *state = apply(state, MatchEvent::SelectCell { round_index, side })?;
        self.autosave(state);
        Ok(true)
    }

    /// Record how many darts the winning visit used.
    pub async fn record_checkout_darts(&self, darts: u8) -> Result<MatchState, MatchError> {
        self.mutate(|state| Ok(apply(state, MatchEvent::CheckoutDarts(darts))?))
            .await
    }

    /// Reset the ledger for the next leg, refreshing leg tallies from the server first.
    pub async fn start_new_leg(&self) -> Result<MatchState, MatchError> {
        let (remote_id, leg) = {
            let slot = self.state.read().await;
            let state = slot
                .as_ref()
                .ok_or_else(|| MatchError::InvalidState("no match set up".into()))?;
            if !state.leg_finished {
                return Err(MatchError::InvalidState("current leg is not finished".into()));
            }
            (state.remote_match_id().map(str::to_string), state.current_leg)
        };

        let counts = match remote_id.as_deref() {
            Some(match_id) => self.sync.fetch_leg_counts(match_id).await,
            None => None,
        };

        self.mutate(|state| {
            if state.current_leg != leg {
                return Err(MatchError::InvalidState(format!(
                    "leg {leg} was already replaced by leg {}",
                    state.current_leg
                )));
            }
            let synced = match counts {
                Some((player_legs, opponent_legs)) => apply(
                    state,
                    MatchEvent::LegCountsSynced {
                        player_legs,
                        opponent_legs,
                    },
                )?,
                None => state.clone(),
            };
            Ok(apply(&synced, MatchEvent::NewLeg)?)
        })
        .await
    }

    /// Halt entry; mirrored to the server when this session holds the lock.
    pub async fn pause_match(&self) -> Result<MatchState, MatchError> {
        self.change_status(MatchEvent::Pause).await
    }

    /// Resume entry after [`pause_match`](Self::pause_match).
    pub async fn resume_match(&self) -> Result<MatchState, MatchError> {
        self.change_status(MatchEvent::Resume).await
    }

    /// Mark the match completed and end it server-side when possible.
    pub async fn complete_match(&self) -> Result<MatchState, MatchError> {
        let state = self
            .mutate(|state| Ok(apply(state, MatchEvent::Complete)?))
            .await?;
        if let Some(target) = self.sync.remote_target(&state) {
            self.sync.end_match(&target).await;
        }
        Ok(state)
    }

    /// Server-side stats for the match, optionally for a single leg.
    pub async fn fetch_stats(&self, leg: Option<u32>) -> Result<Vec<PlayerStats>, MatchError> {
        let Some(state) = self.snapshot().await else {
            return Ok(Vec::new());
        };
        self.sync.fetch_stats(&state, leg).await
    }

    /// Leave the match: release the lock if held, clear persisted state, and forget everything.
    ///
    /// Always succeeds locally.
    pub async fn exit_match(&self) {
        let previous = self.state.write().await.take();

        if let Some(state) = previous.as_ref() {
            if state.has_lock {
                if let Some(match_id) = state.remote_match_id() {
                    self.sync.release_lock(match_id).await;
                }
            }
            info!(match_id = ?state.match_id, "left match");
        }

        if let Err(err) = self.persistence.clear_match_state() {
            warn!(error = %err, "failed to clear persisted match state");
        }
    }

    async fn change_status(&self, event: MatchEvent) -> Result<MatchState, MatchError> {
        let state = self.mutate(|state| Ok(apply(state, event)?)).await?;
        if let Some(target) = self.sync.remote_target(&state) {
            self.sync.update_status(&target, state.match_status).await;
        }
        Ok(state)
    }

    /// Apply the server's answer unless the match or leg changed while it was in flight.
    async fn reconcile(&self, target: &RemoteTarget, confirmed: ConfirmedThrow) -> ScoreOutcome {
        let mut slot = self.state.write().await;
        let Some(state) = slot.as_mut() else {
            return ScoreOutcome::Superseded;
        };
        if state.match_id.as_deref() != Some(target.match_id.as_str()) {
            debug!(match_id = %target.match_id, "dropping confirmation for a match no longer loaded");
            return ScoreOutcome::Superseded;
        }

        match apply(state, MatchEvent::ThrowConfirmed(confirmed.clone())) {
            Ok(next) => {
                *state = next;
                self.autosave(state);
                ScoreOutcome::Reconciled(confirmed)
            }
            Err(ApplyError::StaleLeg { expected, got }) => {
                debug!(expected, got, "dropping confirmation for a finished leg");
                ScoreOutcome::Superseded
            }
            Err(err) => {
                warn!(error = %err, "server confirmation could not be applied");
                ScoreOutcome::Superseded
            }
        }
    }

    async fn is_completed(&self) -> bool {
        self.state
            .read()
            .await
            .as_ref()
            .is_some_and(|state| state.match_status == MatchStatus::Completed)
    }

    async fn drop_lock(&self, target: &RemoteTarget) {
        let mut slot = self.state.write().await;
        let Some(state) = slot.as_mut() else {
            return;
        };
        if state.match_id.as_deref() != Some(target.match_id.as_str()) {
            return;
        }
        if let Ok(next) = apply(state, MatchEvent::LockChanged(false)) {
            warn!(match_id = %target.match_id, "match lock lost; continuing local-only");
            *state = next;
            self.autosave(state);
        }
    }

    /// Run `transition` against the current state, store its result and persist it.
    async fn mutate<F>(&self, transition: F) -> Result<MatchState, MatchError>
    where
        F: FnOnce(&MatchState) -> Result<MatchState, MatchError>,
    {
        let mut slot = self.state.write().await;
        let current = slot
            .as_ref()
            .ok_or_else(|| MatchError::InvalidState("no match set up".into()))?;
        let next = transition(current)?;
        self.autosave(&next);
        *slot = Some(next.clone());
        Ok(next)
    }

    fn autosave(&self, state: &MatchState) {
        if !self.auto_save {
            return;
        }
        if let Err(err) = self.persistence.save_match_state(state) {
            warn!(error = %err, "failed to persist match state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{sync::Notify, task::JoinHandle};

    use crate::{
        dao::{
            kv_store::{KeyValueStore, MemoryStore},
            local::MATCH_STATE_KEY,
        },
        remote::{
            RemoteError,
            fake::{FakeBehaviour, FakeMatchApi},
        },
        state::game::LOCAL_MATCH_PREFIX,
    };

    fn local_controller() -> (SharedController, LocalPersistence) {
        let persistence = LocalPersistence::new(Arc::new(MemoryStore::new()));
        let controller = MatchController::new(
            MatchContext::new("session-local"),
            persistence.clone(),
            None,
        );
        (controller, persistence)
    }

    fn remote_controller(api: &FakeMatchApi, session: &str) -> (SharedController, LocalPersistence) {
        let persistence = LocalPersistence::new(Arc::new(MemoryStore::new()));
        let controller = MatchController::new(
            MatchContext::new(session),
            persistence.clone(),
            Some(Arc::new(api.clone())),
        );
        (controller, persistence)
    }

    fn locking_api() -> FakeMatchApi {
        FakeMatchApi::new(FakeBehaviour {
            grant_lock_on_create: true,
            ..FakeBehaviour::default()
        })
    }

    async fn started(controller: &MatchController, start: u32) -> MatchState {
        controller
            .setup_match(MatchSetup::new("Ann", "Bob", start))
            .await
            .unwrap();
        controller.start_match().await.unwrap()
    }

    fn enter(controller: &SharedController, score: u32) -> JoinHandle<ScoreOutcome> {
        let controller = controller.clone();
        tokio::spawn(async move { controller.enter_score(score).await.unwrap() })
    }

    async fn wait_for_record_calls(api: &FakeMatchApi, count: usize) {
        while api.calls().iter().filter(|c| *c == "record_throw").count() < count {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_until(controller: &MatchController, done: impl Fn(&MatchState) -> bool) {
        while !controller.snapshot().await.is_some_and(|state| done(&state)) {
            tokio::task::yield_now().await;
        }
    }

    /// Release a held write once it has reached the fake server.
    async fn release(api: &FakeMatchApi, gate: &Notify) {
        wait_for_record_calls(api, 1).await;
        gate.notify_one();
    }

    #[tokio::test]
    async fn local_match_plays_a_leg_to_the_end() {
        let (controller, persistence) = local_controller();
        let state = started(&controller, 501).await;
        assert!(state.match_id.unwrap().starts_with(LOCAL_MATCH_PREFIX));

        for score in [100, 100, 100, 100, 61] {
            assert!(matches!(
                controller.enter_score(score).await.unwrap(),
                ScoreOutcome::LocalOnly
            ));
            controller.enter_score(0).await.unwrap();
        }
        controller.enter_score(40).await.unwrap();

        let state = controller.snapshot().await.unwrap();
        assert!(state.leg_finished);
        assert_eq!(state.winner, Some(Side::Player));
        assert_eq!(state.player_legs, 1);
        assert_eq!(controller.current_display_score(Side::Player).await, Some(0));
        assert_eq!(persistence.load_match_state().unwrap(), Some(state));

        assert!(matches!(
            controller.enter_score(60).await.unwrap(),
            ScoreOutcome::Ignored
        ));
    }

    #[tokio::test]
    async fn invalid_score_is_rejected_and_nothing_changes() {
        let (controller, persistence) = local_controller();
        started(&controller, 501).await;
        let before = controller.snapshot().await;

        let err = controller.enter_score(181).await.unwrap_err();

        assert!(matches!(err, MatchError::InvalidScore(181)));
        assert_eq!(controller.snapshot().await, before);
        assert_eq!(persistence.load_match_state().unwrap(), before);
    }

    #[tokio::test]
    async fn start_requires_setup() {
        let (controller, _) = local_controller();
        assert!(matches!(
            controller.start_match().await,
            Err(MatchError::InvalidState(_))
        ));
        started(&controller, 301).await;
        assert!(matches!(
            controller.start_match().await,
            Err(MatchError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn network_failure_keeps_the_local_entry() {
        let api = locking_api();
        let (controller, _) = remote_controller(&api, "session-a");
        let state = started(&controller, 501).await;
        assert!(state.has_lock);

        api.set(|b| b.record_error = Some(RemoteError::Network("offline".into())));
        let outcome = controller.enter_score(60).await.unwrap();

        assert!(matches!(
            outcome,
            ScoreOutcome::Failed(MatchError::Network(_))
        ));
        let state = controller.snapshot().await.unwrap();
        assert_eq!(state.active_cell(), (0, Side::Opponent));
        assert_eq!(state.current_display_score(Side::Player), 441);
        assert!(state.has_lock, "a transport failure does not drop the lock");

        api.set(|b| b.record_error = None);
        assert!(matches!(
            controller.enter_score(45).await.unwrap(),
            ScoreOutcome::Reconciled(_)
        ));
    }

    #[tokio::test]
    async fn server_values_replace_local_prediction() {
        let api = locking_api();
        api.set(|b| b.score_adjustment = 3);
        let (controller, persistence) = remote_controller(&api, "session-a");
        started(&controller, 501).await;

        let outcome = controller.enter_score(60).await.unwrap();

        let ScoreOutcome::Reconciled(confirmed) = outcome else {
            panic!("expected reconciliation, got {outcome:?}");
        };
        assert_eq!(confirmed.scored, 57);
        let state = controller.snapshot().await.unwrap();
        assert_eq!(state.rounds.get(0).unwrap().player1_scored, Some(57));
        assert_eq!(state.current_display_score(Side::Player), 444);
        assert_eq!(persistence.load_match_state().unwrap(), Some(state));
        assert_eq!(api.recorded.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sessions_without_lock_never_write_remotely() {
        let api = FakeMatchApi::new(FakeBehaviour {
            lock_error: Some(RemoteError::LockUnavailable),
            ..FakeBehaviour::default()
        });
        let (controller, _) = remote_controller(&api, "session-b");
        let state = started(&controller, 501).await;
        assert_eq!(state.match_id.as_deref(), Some("100"));
        assert!(!state.has_lock);

        assert!(matches!(
            controller.enter_score(60).await.unwrap(),
            ScoreOutcome::LocalOnly
        ));
        assert!(api.recorded.lock().unwrap().is_empty());
        assert!(!api.calls().contains(&"record_throw".to_string()));
    }

    #[tokio::test]
    async fn lock_rejection_on_write_demotes_to_local() {
        let api = locking_api();
        let (controller, _) = remote_controller(&api, "session-a");
        started(&controller, 501).await;

        api.set(|b| b.record_error = Some(RemoteError::LockUnavailable));
        assert!(matches!(
            controller.enter_score(60).await.unwrap(),
            ScoreOutcome::Failed(MatchError::LockUnavailable)
        ));
        assert!(!controller.snapshot().await.unwrap().has_lock);

        assert!(matches!(
            controller.enter_score(45).await.unwrap(),
            ScoreOutcome::LocalOnly
        ));
    }

    #[tokio::test]
    async fn independent_local_sessions_do_not_interfere() {
        let (first, first_store) = local_controller();
        let (second, second_store) = local_controller();
        started(&first, 501).await;
        started(&second, 501).await;

        first.enter_score(100).await.unwrap();
        second.enter_score(26).await.unwrap();
        second.enter_score(41).await.unwrap();

        let a = first.snapshot().await.unwrap();
        let b = second.snapshot().await.unwrap();
        assert_eq!(a.current_display_score(Side::Player), 401);
        assert_eq!(b.current_display_score(Side::Player), 475);
        assert_eq!(b.current_display_score(Side::Opponent), 460);
        assert_eq!(first_store.load_match_state().unwrap(), Some(a));
        assert_eq!(second_store.load_match_state().unwrap(), Some(b));
    }

    #[tokio::test]
    async fn cell_click_allows_correcting_a_previous_round() {
        let (controller, _) = local_controller();
        started(&controller, 501).await;
        for score in [60, 45, 100] {
            controller.enter_score(score).await.unwrap();
        }

        assert!(controller.handle_cell_click(0, Side::Opponent).await.unwrap());
        controller.enter_score(85).await.unwrap();

        let state = controller.snapshot().await.unwrap();
        assert_eq!(state.rounds.get(0).unwrap().player2_to_go, 416);
        assert_eq!(state.rounds.get(1).unwrap().player2_to_go, 416);
        assert_eq!(state.rounds.get(1).unwrap().player1_to_go, 341);
        assert_eq!(state.active_cell(), (1, Side::Opponent));
    }

    #[tokio::test]
    async fn cell_click_is_a_noop_after_leg_end() {
        let (controller, _) = local_controller();
        started(&controller, 40).await;
        controller.enter_score(40).await.unwrap();
        assert!(!controller.handle_cell_click(0, Side::Player).await.unwrap());
    }

    #[tokio::test]
    async fn new_leg_takes_server_leg_counts() {
        let api = locking_api();
        let (controller, _) = remote_controller(&api, "session-a");
        started(&controller, 40).await;
        controller.enter_score(40).await.unwrap();
        controller.record_checkout_darts(1).await.unwrap();

        api.set(|b| b.legs = (2, 1));
        let state = controller.start_new_leg().await.unwrap();

        assert_eq!(state.current_leg, 2);
        assert_eq!((state.player_legs, state.opponent_legs), (2, 1));
        assert!(!state.leg_finished);
        assert_eq!(state.checkout_darts, None);
        assert_eq!(state.rounds.len(), 1);
        assert!(api.calls().contains(&"get_match".to_string()));
    }

    #[tokio::test]
    async fn new_leg_requires_a_finished_leg() {
        let (controller, _) = local_controller();
        started(&controller, 501).await;
        assert!(matches!(
            controller.start_new_leg().await,
            Err(MatchError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn confirmations_for_an_old_leg_are_superseded() {
        let api = locking_api();
        let (controller, _) = remote_controller(&api, "session-a");
        let state = started(&controller, 40).await;
        controller.enter_score(40).await.unwrap();
        controller.start_new_leg().await.unwrap();

        let target = RemoteTarget {
            match_id: state.match_id.unwrap(),
            set_number: 1,
        };
        let late = ConfirmedThrow {
            leg: 1,
            round_index: 0,
            side: Side::Player,
            scored: 40,
            remaining: 0,
            leg_completed: true,
            match_completed: false,
        };
        let before = controller.snapshot().await;

        assert!(matches!(
            controller.reconcile(&target, late).await,
            ScoreOutcome::Superseded
        ));
        assert_eq!(controller.snapshot().await, before);
    }

    #[tokio::test]
    async fn winning_the_last_leg_ends_the_remote_match() {
        let api = locking_api();
        let (controller, _) = remote_controller(&api, "session-a");
        let mut setup = MatchSetup::new("Ann", "Bob", 40);
        setup.legs_to_win = Some(1);
        controller.setup_match(setup).await.unwrap();
        controller.start_match().await.unwrap();

        controller.enter_score(40).await.unwrap();

        let state = controller.snapshot().await.unwrap();
        assert_eq!(state.match_status, MatchStatus::Completed);
        assert!(api.calls().contains(&"end_match".to_string()));
    }

    #[tokio::test]
    async fn pause_and_resume_are_mirrored_remotely() {
        let api = locking_api();
        let (controller, _) = remote_controller(&api, "session-a");
        started(&controller, 501).await;

        let paused = controller.pause_match().await.unwrap();
        assert_eq!(paused.match_status, MatchStatus::Paused);
        assert!(matches!(
            controller.enter_score(60).await.unwrap(),
            ScoreOutcome::Ignored
        ));
        controller.resume_match().await.unwrap();

        let calls = api.calls();
        assert_eq!(calls.iter().filter(|c| *c == "update_match").count(), 2);
    }

    #[tokio::test]
    async fn exit_releases_lock_and_clears_storage_even_when_release_fails() {
        let api = locking_api();
        api.set(|b| b.release_error = Some(RemoteError::Network("offline".into())));
        let (controller, persistence) = remote_controller(&api, "session-a");
        started(&controller, 501).await;
        controller.enter_score(60).await.unwrap();

        controller.exit_match().await;

        assert!(api.calls().contains(&"release_lock".to_string()));
        assert_eq!(controller.snapshot().await, None);
        assert_eq!(persistence.load_match_state().unwrap(), None);
    }

    #[tokio::test]
    async fn delayed_confirmations_apply_in_entry_order() {
        let api = locking_api();
        api.set(|b| b.score_adjustment = 3);
        let gate = api.hold_next_record();
        let (controller, _) = remote_controller(&api, "session-a");
        started(&controller, 501).await;

        let first = enter(&controller, 60);
        wait_until(&controller, |s| s.active_cell() == (0, Side::Opponent)).await;
        let second = enter(&controller, 45);
        wait_until(&controller, |s| s.active_cell() == (1, Side::Player)).await;
        release(&api, &gate).await;

        assert!(matches!(first.await.unwrap(), ScoreOutcome::Reconciled(_)));
        assert!(matches!(second.await.unwrap(), ScoreOutcome::Reconciled(_)));
        let state = controller.snapshot().await.unwrap();
        let round = state.rounds.get(0).unwrap();
        assert_eq!(round.scored(Side::Player), Some(57));
        assert_eq!(round.scored(Side::Opponent), Some(42));
        assert_eq!(round.to_go(Side::Player), 444);
        assert_eq!(round.to_go(Side::Opponent), 459);
        let sides: Vec<_> = api.recorded.lock().unwrap().iter().map(|c| c.player).collect();
        assert_eq!(sides, vec![Side::Player, Side::Opponent]);
    }

    #[tokio::test]
    async fn delayed_confirmation_keeps_a_leg_won_afterwards() {
        let api = locking_api();
        let gate = api.hold_next_record();
        let (controller, _) = remote_controller(&api, "session-a");
        started(&controller, 40).await;

        let first = enter(&controller, 20);
        wait_for_record_calls(&api, 1).await;
        api.set(|b| b.record_error = Some(RemoteError::Network("offline".into())));
        let second = enter(&controller, 0);
        wait_until(&controller, |s| s.active_cell() == (1, Side::Player)).await;
        let third = enter(&controller, 20);
        wait_until(&controller, |s| s.leg_finished).await;
        gate.notify_one();

        assert!(matches!(first.await.unwrap(), ScoreOutcome::Reconciled(_)));
        for handle in [second, third] {
            assert!(matches!(
                handle.await.unwrap(),
                ScoreOutcome::Failed(MatchError::Network(_))
            ));
        }
        let state = controller.snapshot().await.unwrap();
        assert!(state.leg_finished);
        assert_eq!(state.winner, Some(Side::Player));
        assert_eq!(state.player_legs, 1);
        assert_eq!(state.current_display_score(Side::Player), 0);
    }

    #[tokio::test]
    async fn delayed_confirmation_leaves_a_selected_correction_alone() {
        let api = locking_api();
        let gate = api.hold_next_record();
        let (controller, _) = remote_controller(&api, "session-a");
        started(&controller, 501).await;

        let first = enter(&controller, 60);
        wait_until(&controller, |s| s.active_cell() == (0, Side::Opponent)).await;
        let second = enter(&controller, 45);
        wait_until(&controller, |s| s.active_cell() == (1, Side::Player)).await;
        assert!(controller.handle_cell_click(0, Side::Opponent).await.unwrap());
        release(&api, &gate).await;

        assert!(matches!(first.await.unwrap(), ScoreOutcome::Reconciled(_)));
        assert!(matches!(second.await.unwrap(), ScoreOutcome::Reconciled(_)));
        let state = controller.snapshot().await.unwrap();
        assert_eq!(state.active_cell(), (0, Side::Opponent));
        assert_eq!(state.current_display_score(Side::Player), 441);
    }

    #[tokio::test]
    async fn restore_falls_back_to_the_saved_setup() {
        let store = Arc::new(MemoryStore::new());
        let persistence = LocalPersistence::new(store.clone());
        let saved = setup_match(MatchSetup::new("Ann", "Bob", 301)).unwrap();
        persistence.save_match_state(&saved).unwrap();
        store.set(MATCH_STATE_KEY, "{not json").unwrap();

        let controller = MatchController::new(MatchContext::new("session-a"), persistence, None);
        let restored = controller.restore().await.unwrap().unwrap();

        assert_eq!(restored.match_status, MatchStatus::Setup);
        assert_eq!(restored.setup, saved.setup);
        assert!(controller.start_match().await.is_ok());
    }

    #[tokio::test]
    async fn restore_reacquires_lock_once() {
        let api = FakeMatchApi::default();
        let store = Arc::new(MemoryStore::new());
        let persistence = LocalPersistence::new(store.clone());
        let mut saved = setup_match(MatchSetup::new("Ann", "Bob", 501)).unwrap();
        saved = apply(
            &saved,
            MatchEvent::Start {
                match_id: "77".into(),
                has_lock: false,
            },
        )
        .unwrap();
        persistence.save_match_state(&saved).unwrap();

        let controller = MatchController::new(
            MatchContext::new("session-a"),
            persistence,
            Some(Arc::new(api.clone())),
        );
        let restored = controller.restore().await.unwrap().unwrap();

        assert!(restored.has_lock);
        assert_eq!(api.calls(), vec!["acquire_lock"]);
    }

    #[tokio::test]
    async fn restore_keeps_local_mode_when_lock_is_taken() {
        let api = FakeMatchApi::new(FakeBehaviour {
            lock_error: Some(RemoteError::LockUnavailable),
            ..FakeBehaviour::default()
        });
        let persistence = LocalPersistence::new(Arc::new(MemoryStore::new()));
        let saved = apply(
            &setup_match(MatchSetup::new("Ann", "Bob", 501)).unwrap(),
            MatchEvent::Start {
                match_id: "77".into(),
                has_lock: false,
            },
        )
        .unwrap();
        persistence.save_match_state(&saved).unwrap();

        let controller = MatchController::new(
            MatchContext::new("session-b"),
            persistence,
            Some(Arc::new(api)),
        );
        let restored = controller.restore().await.unwrap().unwrap();
        assert_eq!(restored, saved);
    }

    #[tokio::test]
    async fn auto_save_can_be_disabled() {
        let persistence = LocalPersistence::new(Arc::new(MemoryStore::new()));
        let mut context = MatchContext::new("session-a");
        context.auto_save = false;
        let controller = MatchController::new(context, persistence.clone(), None);
        started(&controller, 501).await;
        controller.enter_score(60).await.unwrap();
        assert_eq!(persistence.load_match_state().unwrap(), None);
    }

    #[tokio::test]
    async fn stats_are_empty_for_local_matches_and_fetched_for_remote_ones() {
        let (controller, _) = local_controller();
        started(&controller, 501).await;
        assert!(controller.fetch_stats(None).await.unwrap().is_empty());

        let api = locking_api();
        let (remote, _) = remote_controller(&api, "session-a");
        started(&remote, 501).await;
        let stats = remote.fetch_stats(Some(1)).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].checkout_percentage(), 50.0);
    }
}
