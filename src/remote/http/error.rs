//! Error types of the HTTP match API client.

use reqwest::StatusCode;
use thiserror::Error;

use crate::remote::RemoteError;

/// Convenient result alias returning [`HttpApiError`] failures.
pub type HttpResult<T> = Result<T, HttpApiError>;

/// Failures that can occur while talking to the match API over HTTP.
#[derive(Debug, Error)]
pub enum HttpApiError {
    /// Required environment variable is missing.
    #[error("missing match API environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build match API client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent or timed out.
    #[error("failed to send match API request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The server rejected the request because another session holds the lock.
    #[error("match lock unavailable for `{path}`")]
    Locked { path: String },
    /// The server returned an unexpected status code.
    #[error("unexpected match API response status {status} for `{path}`: {message}")]
    RequestStatus {
        path: String,
        status: StatusCode,
        message: String,
    },
    /// Response payload could not be parsed into JSON.
    #[error("failed to decode match API response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

impl From<HttpApiError> for RemoteError {
    fn from(err: HttpApiError) -> Self {
        match err {
            HttpApiError::Locked { .. } => RemoteError::LockUnavailable,
            HttpApiError::RequestStatus {
                status, message, ..
            } => RemoteError::Api {
                status: status.as_u16(),
                message,
            },
            HttpApiError::DecodeResponse { ref path, .. } => RemoteError::Api {
                status: StatusCode::BAD_GATEWAY.as_u16(),
                message: format!("malformed response for `{path}`"),
            },
            other => RemoteError::Network(other.to_string()),
        }
    }
}
