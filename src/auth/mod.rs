//! # Authentication Module
//!
//! The three login handshakes used by music providers, behind one capability
//! set (authenticate, refresh):
//!
//! - [`pkce`] - OAuth 2.0 authorization code with PKCE and a local redirect
//!   listener; refreshable.
//! - [`polling`] - QR-code scan-and-confirm with a bounded status poll.
//! - [`cookie`] - a session cookie pasted by the user, checked with one probe.
//!
//! [`Authenticator`] selects one variant per provider when the adapter is
//! configured. The interactive part of each flow is always started explicitly
//! by the caller; the session layer only ever asks for [`Authenticator::refresh`].

pub mod cookie;
pub mod pkce;
pub mod polling;

use chrono::Utc;
use reqwest::{RequestBuilder, header};

pub use cookie::CookieAuthenticator;
pub use pkce::{PendingAuthorization, PkceAuthenticator};
pub use polling::{PollOutcome, PollingLoginAuthenticator, QrProtocol, QrTicket, SessionArtifacts};

use crate::{
    error::AuthError,
    types::{Credential, CredentialKind, ProviderConfig},
    utils,
};

#[derive(Clone)]
pub enum Authenticator {
    Pkce(PkceAuthenticator),
    Polling(PollingLoginAuthenticator),
    Cookie(CookieAuthenticator),
}

impl Authenticator {
    pub fn name(&self) -> &'static str {
        match self {
            Authenticator::Pkce(_) => "oauth-pkce",
            Authenticator::Polling(_) => "qr-code",
            Authenticator::Cookie(_) => "cookie",
        }
    }

    /// HTTP client the authenticator talks to the provider with.
    pub fn http(&self) -> &reqwest::Client {
        match self {
            Authenticator::Pkce(pkce) => pkce.http(),
            Authenticator::Polling(polling) => polling.http(),
            Authenticator::Cookie(cookie) => cookie.http(),
        }
    }

    /// Whether [`Authenticator::refresh`] can ever succeed for this variant.
    pub fn supports_refresh(&self) -> bool {
        matches!(self, Authenticator::Pkce(_))
    }

    /// Refreshes `credential` without user interaction where the variant can.
    pub async fn refresh(
        &self,
        config: &ProviderConfig,
        credential: &Credential,
    ) -> Result<Credential, AuthError> {
        match self {
            Authenticator::Pkce(pkce) => pkce.refresh(config, credential).await,
            Authenticator::Polling(_) => Err(AuthError::NotSupported),
            Authenticator::Cookie(cookie) => cookie.refresh(credential),
        }
    }
}

/// Attaches a credential to a request: `Authorization: Bearer` for OAuth
/// tokens, a `Cookie` header for session cookies. Cookie sessions of
/// providers with a `sapisid_origin` are also signed with `SAPISIDHASH`.
pub fn authorize_request(
    request: RequestBuilder,
    credential: &Credential,
    config: &ProviderConfig,
) -> RequestBuilder {
    match credential.kind {
        CredentialKind::OAuthToken => match &credential.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        },
        CredentialKind::SessionCookie => {
            let Some(cookie) = &credential.raw_cookie else {
                return request;
            };
            let request = request.header(header::COOKIE, cookie);
            match signed_cookie_header(config, cookie) {
                Some(value) => request.header(header::AUTHORIZATION, value),
                None => request,
            }
        }
    }
}

/// `SAPISIDHASH` header for `cookie`, or `None` when the provider does not
/// sign requests or the cookie carries no `SAPISID`.
pub fn signed_cookie_header(config: &ProviderConfig, cookie: &str) -> Option<String> {
    let origin = config.sapisid_origin.as_deref()?;
    let sapisid = utils::sapisid(cookie)?;
    Some(utils::sapisid_hash(&sapisid, origin, Utc::now().timestamp()))
}
