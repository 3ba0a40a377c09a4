//! Application-level configuration loading and the per-session match context.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the scorer looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/oche.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "OCHE_CONFIG_PATH";
const DEFAULT_STORAGE_DIR: &str = ".oche";
const DEFAULT_STARTING_SCORE: u32 = 501;
const DEFAULT_MATCH_TYPE_ID: u32 = 1;

/// Immutable runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the persisted match blobs and session id.
    pub storage_dir: PathBuf,
    /// Persist the match after every state change.
    pub auto_save: bool,
    /// Match type sent when creating matches server-side.
    pub match_type_id: u32,
    /// Upper bound for each remote call, unbounded when absent.
    pub remote_timeout_ms: Option<u64>,
    /// Starting score used when none is given.
    pub default_starting_score: u32,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        storage_dir = %config.storage_dir.display(),
                        auto_save = config.auto_save,
                        "loaded scorer config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Build the context handed to the match controller for `session_id`.
    pub fn context(&self, session_id: impl Into<String>) -> MatchContext {
        MatchContext {
            session_id: session_id.into(),
            auto_save: self.auto_save,
            match_type_id: self.match_type_id,
            remote_timeout: self.remote_timeout_ms.map(Duration::from_millis),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            auto_save: true,
            match_type_id: DEFAULT_MATCH_TYPE_ID,
            remote_timeout_ms: None,
            default_starting_score: DEFAULT_STARTING_SCORE,
        }
    }
}

/// Per-session settings injected into the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchContext {
    /// Lock ownership key of this device.
    pub session_id: String,
    /// Persist after every state change.
    pub auto_save: bool,
    /// Match type sent on creation.
    pub match_type_id: u32,
    /// Bound applied to each remote call.
    pub remote_timeout: Option<Duration>,
}

impl MatchContext {
    /// Context with defaults for `session_id`.
    pub fn new(session_id: impl Into<String>) -> Self {
        AppConfig::default().context(session_id)
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
