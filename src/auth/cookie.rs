use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::{
    auth::{authorize_request, signed_cookie_header},
    error::AuthError,
    management::CredentialStore,
    types::{Credential, ProviderConfig, Validation},
    utils,
};

/// Login by a session cookie pasted from the user's browser.
///
/// The cookie is stored verbatim; whether it still works is only known after
/// [`CookieAuthenticator::validate`] probes the provider. There is no refresh:
/// an expired cookie has to be replaced by the user.
#[derive(Debug, Clone)]
pub struct CookieAuthenticator {
    http: Client,
}

impl CookieAuthenticator {
    pub fn new(http: Client) -> Self {
        CookieAuthenticator { http }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn accept_cookie(&self, config: &ProviderConfig, raw: &str) -> Credential {
        Credential::cookie(&config.provider_id, raw)
    }

    /// Accepts and persists a cookie in one step.
    pub async fn accept_and_store(
        &self,
        config: &ProviderConfig,
        raw: &str,
        store: &CredentialStore,
    ) -> Result<Credential, AuthError> {
        let credential = self.accept_cookie(config, raw);
        store.save(&config.provider_id, &credential).await?;
        info!(provider = %config.provider_id, length = raw.len(), "cookie stored");
        Ok(credential)
    }

    /// Issues one probe request. Any authorization failure (401/403 or a
    /// provider "session expired" payload) is reported as `Expired`.
    ///
    /// For providers that sign cookie requests, a cookie without `SAPISID`
    /// cannot authenticate at all and is `Expired` without a request.
    pub async fn validate(
        &self,
        credential: &Credential,
        config: &ProviderConfig,
    ) -> Result<Validation, AuthError> {
        if config.sapisid_origin.is_some() {
            let cookie = credential.raw_cookie.as_deref().unwrap_or_default();
            if signed_cookie_header(config, cookie).is_none() {
                debug!(provider = %config.provider_id, "cookie has no SAPISID to sign with");
                return Ok(Validation::Expired);
            }
        }

        let url = utils::join_url(&config.api_base, &config.probe_endpoint);
        let request = match &config.probe_body {
            Some(body) => self.http.post(&url).json(body),
            None => self.http.get(&url),
        };
        let request = config
            .default_headers
            .iter()
            .fold(request, |req, (name, value)| req.header(name, value));

        let response = authorize_request(request, credential, config).send().await?;
        let status = response.status();
        let body = response.text().await?;

        let validation = if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Validation::Expired
        } else if !status.is_success() {
            return Err(AuthError::Transport(format!(
                "probe {} returned HTTP {}",
                url,
                status.as_u16()
            )));
        } else if config.is_session_expired_payload(&body) {
            Validation::Expired
        } else {
            Validation::Valid
        };

        debug!(provider = %config.provider_id, status = status.as_u16(), ?validation, "probe finished");
        Ok(validation)
    }

    pub fn refresh(&self, _credential: &Credential) -> Result<Credential, AuthError> {
        Err(AuthError::NotSupported)
    }
}
