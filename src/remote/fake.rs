//! Scriptable in-memory [`MatchApi`] for tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use futures::future::BoxFuture;
use time::{Duration, OffsetDateTime};
use tokio::sync::Notify;

use crate::{
    remote::{
        MatchApi, RemoteError, RemoteResult,
        models::{
            CreatedMatch, MatchLock, MatchPatch, MatchSnapshot, PlayerStats, RecordedThrow,
            ThrowCommand, ThrowMeta, ThrowRecord,
        },
    },
    state::game::{MatchSetup, MatchStatus, Side},
};

#[derive(Debug, Clone, Default)]
pub struct FakeBehaviour {
    pub create_error: Option<RemoteError>,
    pub grant_lock_on_create: bool,
    pub lock_error: Option<RemoteError>,
    pub record_error: Option<RemoteError>,
    /// Points subtracted from every submitted score, to tell server values from predictions.
    pub score_adjustment: u32,
    pub legs: (u32, u32),
    pub release_error: Option<RemoteError>,
    /// Issue locks that have already expired.
    pub expired_locks: bool,
    /// Park the next `record_throw` until the gate is notified.
    pub hold_next_record: Option<Arc<Notify>>,
}

#[derive(Clone, Default)]
pub struct FakeMatchApi {
    pub behaviour: Arc<Mutex<FakeBehaviour>>,
    pub recorded: Arc<Mutex<Vec<ThrowCommand>>>,
    pub calls: Arc<Mutex<Vec<String>>>,
    next_id: Arc<AtomicUsize>,
}

impl FakeMatchApi {
    pub fn new(behaviour: FakeBehaviour) -> Self {
        Self {
            behaviour: Arc::new(Mutex::new(behaviour)),
            ..Self::default()
        }
    }

    pub fn set(&self, update: impl FnOnce(&mut FakeBehaviour)) {
        update(&mut self.behaviour.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn behaviour(&self) -> FakeBehaviour {
        self.behaviour.lock().unwrap().clone()
    }

    /// Hold the next `record_throw` until the returned gate is notified.
    pub fn hold_next_record(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.set(|b| b.hold_next_record = Some(gate.clone()));
        gate
    }

    pub fn lock_for(match_id: &str, session_id: &str, expired: bool) -> MatchLock {
        let ttl = if expired {
            Duration::minutes(-1)
        } else {
            Duration::minutes(30)
        };
        MatchLock {
            match_id: match_id.to_string(),
            session_id: session_id.to_string(),
            expires_at: OffsetDateTime::now_utc() + ttl,
        }
    }
}

impl MatchApi for FakeMatchApi {
    fn create_match(
        &self,
        _setup: MatchSetup,
        _match_type_id: u32,
        session_id: String,
    ) -> BoxFuture<'static, RemoteResult<CreatedMatch>> {
        self.log("create_match");
        let behaviour = self.behaviour();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 100;
        Box::pin(async move {
            if let Some(err) = behaviour.create_error {
                return Err(err);
            }
            let match_id = id.to_string();
            let lock = behaviour
                .grant_lock_on_create
                .then(|| Self::lock_for(&match_id, &session_id, behaviour.expired_locks));
            Ok(CreatedMatch { match_id, lock })
        })
    }

    fn acquire_lock(
        &self,
        match_id: String,
        session_id: String,
        _forced: bool,
    ) -> BoxFuture<'static, RemoteResult<MatchLock>> {
        self.log("acquire_lock");
        let behaviour = self.behaviour();
        Box::pin(async move {
            match behaviour.lock_error {
                Some(err) => Err(err),
                None => Ok(Self::lock_for(&match_id, &session_id, behaviour.expired_locks)),
            }
        })
    }

    fn release_lock(
        &self,
        _match_id: String,
        _session_id: String,
    ) -> BoxFuture<'static, RemoteResult<()>> {
        self.log("release_lock");
        let behaviour = self.behaviour();
        Box::pin(async move {
            match behaviour.release_error {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }

    fn record_throw(
        &self,
        _match_id: String,
        command: ThrowCommand,
        _session_id: String,
    ) -> BoxFuture<'static, RemoteResult<RecordedThrow>> {
        self.log("record_throw");
        let gate = self.behaviour.lock().unwrap().hold_next_record.take();
        let behaviour = self.behaviour();
        let recorded = self.recorded.clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if let Some(err) = behaviour.record_error {
                return Err(err);
            }
            let score = command.score.saturating_sub(behaviour.score_adjustment);
            let before = if command.is_bust {
                command.remaining
            } else {
                command.remaining + command.score
            };
            let is_bust = score > before || before - score == 1;
            let remaining = if is_bust { before } else { before - score };
            let is_winning_throw = !is_bust && remaining == 0;
            recorded.lock().unwrap().push(command.clone());
            Ok(RecordedThrow {
                throw: ThrowRecord {
                    id: format!("throw-{}", recorded.lock().unwrap().len()),
                    leg_number: command.leg_number,
                    round_number: command.round_number,
                    player: command.player,
                    score,
                    remaining,
                    is_bust,
                    is_winning_throw,
                },
                meta: ThrowMeta {
                    leg_completed: is_winning_throw,
                    match_completed: false,
                },
            })
        })
    }

    fn get_match(
        &self,
        match_id: String,
        _session_id: String,
        _include: Vec<String>,
    ) -> BoxFuture<'static, RemoteResult<MatchSnapshot>> {
        self.log("get_match");
        let behaviour = self.behaviour();
        Box::pin(async move {
            Ok(MatchSnapshot {
                id: match_id,
                status: MatchStatus::InProgress,
                player_legs: behaviour.legs.0,
                opponent_legs: behaviour.legs.1,
            })
        })
    }

    fn get_match_stats(
        &self,
        _match_id: String,
        _leg: Option<u32>,
        _session_id: String,
    ) -> BoxFuture<'static, RemoteResult<Vec<PlayerStats>>> {
        self.log("get_match_stats");
        Box::pin(async move {
            Ok(vec![PlayerStats {
                player: Side::Player,
                legs_won: 1,
                darts_thrown: 15,
                three_dart_average: 100.2,
                highest_score: 180,
                checkout_attempts: 2,
                checkouts_hit: 1,
                tons: 3,
                one_eighties: 1,
            }])
        })
    }

    fn end_match(
        &self,
        _match_id: String,
        _session_id: String,
    ) -> BoxFuture<'static, RemoteResult<()>> {
        self.log("end_match");
        Box::pin(async { Ok(()) })
    }

    fn update_match(
        &self,
        _match_id: String,
        _patch: MatchPatch,
        _session_id: String,
    ) -> BoxFuture<'static, RemoteResult<()>> {
        self.log("update_match");
        Box::pin(async { Ok(()) })
    }
}
