//! Error types shared by the credential store, the authenticators and the API gateway.
//!
//! Every variant keeps enough structure (kind plus the provider's raw message or
//! body) for the CLI to render a readable message. Missing or corrupt credential
//! files surface as errors the session layer maps to "not logged in".

use std::io;

use thiserror::Error;

/// Maximum length for provider bodies kept inside error values.
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Failures of the on-disk credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored credential for provider: {0}")]
    NotFound(String),

    #[error("stored credential for {provider} is unreadable: {reason}")]
    CorruptCredential { provider: String, reason: String },

    #[error("credential store I/O error: {0}")]
    IoError(#[from] io::Error),
}

/// Failures of a login handshake, a refresh or a session lookup.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("timed out waiting for the login to complete")]
    TimedOut,

    #[error("state mismatch in OAuth callback, possible CSRF attempt")]
    StateMismatch,

    #[error("authorization code exchange failed ({}): {body}", status_label(.status))]
    ExchangeFailed { status: Option<u16>, body: String },

    #[error("token refresh failed ({}): {body}", status_label(.status))]
    RefreshFailed { status: Option<u16>, body: String },

    #[error("operation not supported by this authenticator")]
    NotSupported,

    #[error("not logged in to {0}")]
    NotLoggedIn(String),

    #[error("login code expired before it was confirmed")]
    Expired,

    #[error("login rejected: {0}")]
    Rejected(String),

    #[error("redirect listener error: {0}")]
    Listener(String),

    #[error("network error during authentication: {0}")]
    Transport(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of a single gateway call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized after one refresh attempt: {body}")]
    Unauthorized { body: String },

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Transport(err.to_string())
    }
}

impl ApiError {
    pub fn from_status(status: u16, body: &str) -> Self {
        ApiError::HttpStatus {
            status,
            body: truncate_body(body),
        }
    }
}

/// Truncate a provider body so error values stay printable.
pub fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }

    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {code}"),
        None => "no response".to_string(),
    }
}
