//! On-device persistence of the match aggregate, its setup, and the session identifier.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        kv_store::KeyValueStore,
        storage::{StorageError, StorageResult},
    },
    state::game::{MatchSetup, MatchState},
};

/// Key of the serialized [`MatchState`] blob.
pub const MATCH_STATE_KEY: &str = "darts_match_state";
/// Key of the serialized [`MatchSetup`] blob.
pub const MATCH_SETUP_KEY: &str = "darts_match_setup";
/// Key of the per-device session identifier.
pub const SESSION_ID_KEY: &str = "darts_session_id";

/// Reads and writes match blobs through a [`KeyValueStore`].
#[derive(Clone)]
pub struct LocalPersistence {
    store: Arc<dyn KeyValueStore>,
}

impl LocalPersistence {
    /// Persist through `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persist the full match state and its setup.
    pub fn save_match_state(&self, state: &MatchState) -> StorageResult<()> {
        self.put(MATCH_STATE_KEY, state)?;
        self.put(MATCH_SETUP_KEY, &state.setup)
    }

    /// Load the persisted match state.
    ///
    /// A blob that no longer decodes is logged, removed and reported as absent.
    pub fn load_match_state(&self) -> StorageResult<Option<MatchState>> {
        match self.fetch::<MatchState>(MATCH_STATE_KEY) {
            Err(StorageError::Corrupt { key, source }) => {
                warn!(%key, error = %source, "discarding unreadable match state");
                self.store.remove(&key)?;
                Ok(None)
            }
            other => other,
        }
    }

    /// Load the setup of the last persisted match.
    pub fn load_match_setup(&self) -> StorageResult<Option<MatchSetup>> {
        self.fetch(MATCH_SETUP_KEY)
    }

    /// Remove the state and setup blobs. The session id is kept.
    pub fn clear_match_state(&self) -> StorageResult<()> {
        self.store.remove(MATCH_STATE_KEY)?;
        self.store.remove(MATCH_SETUP_KEY)
    }

    /// Return the device's session id, generating and persisting one on first use.
    pub fn get_or_create_session_id(&self) -> StorageResult<String> {
        if let Some(existing) = self.store.get(SESSION_ID_KEY)? {
            let existing = existing.trim();
            if !existing.is_empty() {
                return Ok(existing.to_string());
            }
        }

        let session_id = Uuid::new_v4().to_string();
        self.store.set(SESSION_ID_KEY, &session_id)?;
        debug!(%session_id, "generated new session id");
        Ok(session_id)
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let encoded = serde_json::to_string(value).map_err(|source| StorageError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, &encoded)
    }

    fn fetch<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                key: key.to_string(),
                source,
            })
    }
}
