use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    remote::RemoteError,
    state::state_machine::{ApplyError, InvalidTransition},
};

/// Errors surfaced by match operations.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Visit score outside `0..=180`; nothing was mutated.
    #[error("invalid score {0}: a visit scores between 0 and 180")]
    InvalidScore(u32),
    /// Match setup failed validation.
    #[error("invalid setup: {0}")]
    InvalidSetup(String),
    /// The remote API answered with a non-success status.
    #[error("match API error {status}: {message}")]
    Api {
        /// HTTP status code returned by the server.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },
    /// The remote API could not be reached.
    #[error("network error: {0}")]
    Network(String),
    /// A remote write was attempted without holding the match lock.
    #[error("match lock unavailable")]
    LockUnavailable,
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Local persistence failed.
    #[error("local storage failure")]
    Storage(#[source] StorageError),
}

impl MatchError {
    /// Whether the match can carry on in local-only mode after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MatchError::Api { .. } | MatchError::Network(_) | MatchError::LockUnavailable
        )
    }
}

impl From<ValidationErrors> for MatchError {
    fn from(err: ValidationErrors) -> Self {
        MatchError::InvalidSetup(format!("validation failed: {}", err))
    }
}

impl From<StorageError> for MatchError {
    fn from(err: StorageError) -> Self {
        MatchError::Storage(err)
    }
}

impl From<RemoteError> for MatchError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Api { status, message } => MatchError::Api { status, message },
            RemoteError::Network(message) => MatchError::Network(message),
            RemoteError::LockUnavailable => MatchError::LockUnavailable,
        }
    }
}

impl From<InvalidTransition> for MatchError {
    fn from(err: InvalidTransition) -> Self {
        MatchError::InvalidState(err.to_string())
    }
}

impl From<ApplyError> for MatchError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::InvalidTransition(invalid) => invalid.into(),
            ApplyError::StaleLeg { expected, got } => MatchError::InvalidState(format!(
                "event for leg {got} arrived while leg {expected} is being played"
            )),
        }
    }
}
