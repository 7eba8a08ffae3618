use std::{net::SocketAddr, time::Duration};

use chrono::Utc;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    error::{AuthError, truncate_body},
    management::CredentialStore,
    server::CallbackServer,
    types::{Credential, LoginSession, ProviderConfig},
    utils,
};

/// OAuth 2.0 authorization-code login with PKCE (RFC 7636, `S256`).
///
/// The flow is split in two so the caller can surface the authorization URL
/// before blocking:
///
/// 1. [`PkceAuthenticator::begin`] generates the verifier, challenge and
///    `state`, binds the local redirect listener and builds the URL.
/// 2. [`PendingAuthorization::complete`] waits for the redirect (bounded by the
///    callback timeout), checks `state`, exchanges the code and persists the
///    resulting credential.
///
/// The listener is released on every exit path of `complete`, and also when a
/// `PendingAuthorization` is dropped without being completed.
#[derive(Debug, Clone)]
pub struct PkceAuthenticator {
    http: Client,
    callback_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

/// Raw failure of a token endpoint call, mapped by the caller to
/// `ExchangeFailed` or `RefreshFailed`.
struct TokenEndpointError {
    status: Option<u16>,
    body: String,
}

impl PkceAuthenticator {
    pub fn new(http: Client, callback_timeout: Duration) -> Self {
        PkceAuthenticator {
            http,
            callback_timeout,
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Fresh verifier, challenge and state for one login attempt.
    pub fn new_login_session(redirect_uri: &str) -> LoginSession {
        let code_verifier = utils::generate_code_verifier();
        let code_challenge = utils::generate_code_challenge(&code_verifier);
        LoginSession {
            state: utils::generate_state(),
            code_verifier,
            code_challenge,
            redirect_uri: redirect_uri.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Builds the provider authorization URL for `session`.
    pub fn authorize_url(
        config: &ProviderConfig,
        session: &LoginSession,
    ) -> Result<String, AuthError> {
        let scope = config.scope_param();
        let url = Url::parse_with_params(
            &config.auth_endpoint,
            &[
                ("response_type", "code"),
                ("client_id", config.client_id.as_str()),
                ("state", session.state.as_str()),
                ("code_challenge", session.code_challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("redirect_uri", session.redirect_uri.as_str()),
                ("scope", scope.as_str()),
            ],
        )
        .map_err(|e| {
            AuthError::Rejected(format!(
                "invalid authorization endpoint {}: {}",
                config.auth_endpoint, e
            ))
        })?;
        Ok(url.into())
    }

    /// Starts a login: binds the redirect listener and returns the URL the
    /// user has to open. Opening a browser is left to the caller.
    pub async fn begin(&self, config: &ProviderConfig) -> Result<PendingAuthorization, AuthError> {
        let session = Self::new_login_session(&config.redirect_uri);
        let authorize_url = Self::authorize_url(config, &session)?;

        // bind before the URL is handed out so a fast redirect cannot miss the listener
        let server = CallbackServer::bind(&config.redirect_uri, &session.state).await?;

        info!(provider = %config.provider_id, addr = %server.local_addr(), "waiting for OAuth redirect");
        Ok(PendingAuthorization {
            authenticator: self.clone(),
            config: config.clone(),
            session,
            authorize_url,
            server,
        })
    }

    /// Runs the whole flow, reporting the authorization URL through `on_url`.
    pub async fn authenticate<F>(
        &self,
        config: &ProviderConfig,
        store: &CredentialStore,
        on_url: F,
    ) -> Result<Credential, AuthError>
    where
        F: FnOnce(&str),
    {
        let pending = self.begin(config).await?;
        on_url(pending.authorize_url());
        pending.complete(store).await
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        config: &ProviderConfig,
        code: &str,
        session: &LoginSession,
    ) -> Result<Credential, AuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", session.redirect_uri.as_str()),
            ("client_id", config.client_id.as_str()),
            ("code_verifier", session.code_verifier.as_str()),
        ];

        let tokens = self
            .request_tokens(config, &form)
            .await
            .map_err(|e| AuthError::ExchangeFailed {
                status: e.status,
                body: e.body,
            })?;

        let mut credential = Credential::oauth(&config.provider_id, tokens.access_token);
        credential.refresh_token = tokens.refresh_token;
        credential.expires_at = tokens
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        if let Some(scope) = tokens.scope {
            credential.extra.insert("scope".to_string(), scope);
        }
        if let Some(token_type) = tokens.token_type {
            credential.extra.insert("token_type".to_string(), token_type);
        }

        debug!(provider = %config.provider_id, "authorization code exchanged");
        Ok(credential)
    }

    /// Trades the stored refresh token for a new access token.
    ///
    /// Providers that do not rotate refresh tokens omit it from the response;
    /// the previous one is kept so the credential stays refreshable.
    pub async fn refresh(
        &self,
        config: &ProviderConfig,
        credential: &Credential,
    ) -> Result<Credential, AuthError> {
        let Some(refresh_token) = credential.refresh_token.clone() else {
            return Err(AuthError::RefreshFailed {
                status: None,
                body: "no refresh token stored".to_string(),
            });
        };

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", config.client_id.as_str()),
        ];

        let tokens = self
            .request_tokens(config, &form)
            .await
            .map_err(|e| AuthError::RefreshFailed {
                status: e.status,
                body: e.body,
            })?;

        let mut refreshed = credential.clone();
        refreshed.access_token = Some(tokens.access_token);
        refreshed.refresh_token = Some(tokens.refresh_token.unwrap_or(refresh_token));
        refreshed.expires_at = tokens
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        if let Some(scope) = tokens.scope {
            refreshed.extra.insert("scope".to_string(), scope);
        }

        debug!(provider = %config.provider_id, "access token refreshed");
        Ok(refreshed)
    }

    async fn request_tokens(
        &self,
        config: &ProviderConfig,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, TokenEndpointError> {
        let response = self
            .http
            .post(&config.token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| TokenEndpointError {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| TokenEndpointError {
            status: Some(status.as_u16()),
            body: e.to_string(),
        })?;

        if !status.is_success() {
            warn!(provider = %config.provider_id, status = status.as_u16(), "token endpoint rejected request");
            return Err(TokenEndpointError {
                status: Some(status.as_u16()),
                body: truncate_body(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| TokenEndpointError {
            status: Some(status.as_u16()),
            body: format!("unexpected token response ({e}): {}", truncate_body(&body)),
        })
    }
}

/// A login waiting for its redirect. Owns the running listener.
pub struct PendingAuthorization {
    authenticator: PkceAuthenticator,
    config: ProviderConfig,
    session: LoginSession,
    authorize_url: String,
    server: CallbackServer,
}

impl PendingAuthorization {
    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    pub fn listener_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn session(&self) -> &LoginSession {
        &self.session
    }

    /// Waits for the redirect, validates it and exchanges the code.
    ///
    /// A redirect whose `state` differs from the generated one is rejected
    /// before any token request is made.
    pub async fn complete(self, store: &CredentialStore) -> Result<Credential, AuthError> {
        let PendingAuthorization {
            authenticator,
            config,
            session,
            server,
            ..
        } = self;

        let params = server.wait(authenticator.callback_timeout).await?;

        let received_state = params.get("state").map_or("", String::as_str);
        if received_state != session.state {
            warn!(provider = %config.provider_id, "redirect carried a foreign state");
            return Err(AuthError::StateMismatch);
        }

        if let Some(error) = params.get("error") {
            let reason = match params.get("error_description") {
                Some(description) => format!("{error}: {description}"),
                None => error.clone(),
            };
            return Err(AuthError::Rejected(reason));
        }

        let code = params
            .get("code")
            .ok_or_else(|| AuthError::Rejected("missing code parameter in redirect".to_string()))?;

        let credential = authenticator.exchange_code(&config, code, &session).await?;
        store.save(&config.provider_id, &credential).await?;

        info!(provider = %config.provider_id, "OAuth login completed");
        Ok(credential)
    }
}
